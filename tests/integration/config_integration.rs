//! Layered configuration loading.

use super::test_utils::with_config_env;
use kiln::config::ConfigLoader;
use kiln::error::ApiError;
use kiln::provider::ModelFamily;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(path: PathBuf, text: &str) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn defaults_apply_without_any_file() {
    let temp = TempDir::new().unwrap();
    let config = with_config_env(&temp, || ConfigLoader::load(temp.path()).unwrap());

    assert_eq!(config.default_family, ModelFamily::Gemini);
    assert_eq!(config.retry.max_retries, 3);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.storage.output_dir, PathBuf::from("output"));
    assert_eq!(config.storage.modified_dir, PathBuf::from("modified_output"));
    assert!(config.storage.event_log);
    assert_eq!(config.logging.output, "stderr");
}

#[test]
fn explicit_file_sets_providers_and_storage() {
    let temp = TempDir::new().unwrap();
    let file = write(
        temp.path().join("custom.toml"),
        r#"
default_family = "claude"

[providers.anthropic]
api_key_env = "MY_ANTHROPIC_KEY"
request_timeout_secs = 30

[providers.anthropic.models]
cheap = "claude-small"

[storage]
output_dir = "out"
modified_dir = "out_modified"
event_log = false
"#,
    );

    let config = ConfigLoader::load_from_file(&file).unwrap();
    assert_eq!(config.default_family, ModelFamily::Claude);
    let anthropic = config.providers.for_family(ModelFamily::Claude);
    assert_eq!(anthropic.api_key_env.as_deref(), Some("MY_ANTHROPIC_KEY"));
    assert_eq!(anthropic.request_timeout_secs, 30);
    assert_eq!(anthropic.tiers(ModelFamily::Claude).cheap, "claude-small");
    assert!(config.storage.event_log_path(temp.path()).is_none());
    assert_eq!(config.storage.output_path(temp.path()), temp.path().join("out"));
}

#[test]
fn missing_explicit_file_is_a_config_error() {
    let temp = TempDir::new().unwrap();
    let err = ConfigLoader::load_from_file(&temp.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ApiError::ConfigError(_)));
}

#[test]
fn invalid_values_are_rejected_together() {
    let temp = TempDir::new().unwrap();
    let file = write(
        temp.path().join("bad.toml"),
        r#"
[retry]
max_retries = 0

[storage]
output_dir = "same"
modified_dir = "same"
"#,
    );

    match ConfigLoader::load_from_file(&file).unwrap_err() {
        ApiError::ConfigError(message) => {
            assert!(message.contains("Retry"));
            assert!(message.contains("Storage"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn workspace_file_overrides_global_file() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    write(
        temp.path().join("config").join("kiln").join("config.toml"),
        "default_family = \"gpt\"\n[retry]\nmax_retries = 5\n",
    );
    write(workspace.join("kiln.toml"), "[retry]\nmax_retries = 2\n");

    let config = with_config_env(&temp, || ConfigLoader::load(&workspace).unwrap());
    assert_eq!(config.default_family, ModelFamily::Gpt);
    assert_eq!(config.retry.max_retries, 2);
}

#[test]
fn environment_overrides_files() {
    let temp = TempDir::new().unwrap();
    write(temp.path().join("kiln.toml"), "[retry]\nmax_retries = 2\n");

    let config = with_config_env(&temp, || {
        std::env::set_var("KILN__RETRY__MAX_RETRIES", "7");
        let loaded = ConfigLoader::load(temp.path());
        std::env::remove_var("KILN__RETRY__MAX_RETRIES");
        loaded.unwrap()
    });
    assert_eq!(config.retry.max_retries, 7);
}
