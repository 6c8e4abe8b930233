//! Environment variable source: `KILN__SECTION__KEY` overrides.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Keys whose environment values are comma-separated lists.
const LIST_KEYS: &[&str] = &["build.extensions"];

/// Add the environment overlay, e.g. `KILN__CACHE__BACKEND=kv` or
/// `KILN__BUILD__EXTENSIONS=tsx,mdx`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let source = LIST_KEYS.iter().fold(
        Environment::with_prefix("KILN")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .try_parsing(true),
        |env, key| env.with_list_parse_key(key),
    );
    Ok(builder.add_source(source))
}
