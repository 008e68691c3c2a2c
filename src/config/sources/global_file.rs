//! Global config file source: `<config_dir>/kiln/config.toml`

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::File;
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::debug;

/// Path to global config file, resolved through the platform config directory.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "kiln", "kiln").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Add the global config file source to builder if it exists.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    match global_config_path() {
        Some(path) if path.exists() => {
            let canonical = dunce::canonicalize(&path).unwrap_or(path);
            builder.add_source(File::from(canonical).required(false))
        }
        Some(path) => {
            debug!(config_path = %path.display(), "No global configuration file");
            builder
        }
        None => builder,
    }
}
