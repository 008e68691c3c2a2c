//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Only scalar leaves are seeded here; nested tables fall back to serde defaults.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("default_family", "gemini")?
        .set_default("retry.max_retries", 3)?
        .set_default("retry.base_delay_ms", 1000)?
        .set_default("retry.max_delay_ms", 30_000)?
        .set_default("storage.output_dir", "output")?
        .set_default("storage.modified_dir", "modified_output")?
        .set_default("storage.event_log", true)
}
