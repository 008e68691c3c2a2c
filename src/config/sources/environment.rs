//! Environment source: `KILN__RETRY__MAX_RETRIES=5` sets `retry.max_retries`.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment};

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("KILN")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
