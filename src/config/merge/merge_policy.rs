//! Built-in defaults, the lowest-precedence layer.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the scalar defaults.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("build.pages_dir", "pages")?
        .set_default("build.out_dir", "dist")?
        .set_default("cache.backend", "fs")?
        .set_default("cache.dir", ".kiln/cache")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
