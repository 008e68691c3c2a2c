//! Loads [`KilnConfig`] from layered sources.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::KilnConfig;
use crate::error::ApiError;
use config::File;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace: defaults, global file, workspace file, env.
    pub fn load(workspace_root: &Path) -> Result<KilnConfig, ApiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder);
        let builder = workspace_file::add_to_builder(builder, workspace_root);
        let builder = environment::add_to_builder(builder);

        let config: KilnConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Self::checked(config)
    }

    /// Load from an explicit file, skipping file discovery. Env overrides still apply.
    pub fn load_from_file(path: &Path) -> Result<KilnConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        let builder = environment::add_to_builder(builder);

        let config: KilnConfig = builder.build()?.try_deserialize()?;
        Self::checked(config)
    }

    fn checked(config: KilnConfig) -> Result<KilnConfig, ApiError> {
        config.validate().map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            ApiError::ConfigError(joined)
        })?;
        Ok(config)
    }
}
