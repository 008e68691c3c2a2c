//! Workspace config file source: `<workspace>/kiln.toml`, then
//! `<workspace>/kiln.{KILN_ENV}.toml` when `KILN_ENV` is set.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::File;
use std::path::Path;

pub const WORKSPACE_CONFIG_FILE: &str = "kiln.toml";

/// Add workspace config files to builder.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> ConfigBuilder<DefaultState> {
    let base_config_path = workspace_root.join(WORKSPACE_CONFIG_FILE);
    if base_config_path.exists() {
        builder = builder.add_source(File::from(base_config_path).required(false));
    }

    if let Ok(env_name) = std::env::var("KILN_ENV") {
        let env_config_path = workspace_root.join(format!("kiln.{}.toml", env_name));
        if env_config_path.exists() {
            builder = builder.add_source(File::from(env_config_path).required(false));
        }
    }

    builder
}
