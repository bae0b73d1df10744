//! Configuration management for fieldkit tools.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`FIELDKIT__<SECTION>__<KEY>`)
//! 2. Config file (`fieldkit.toml` unless another prefix is given)
//! 3. Defaults

use serde::de::DeserializeOwned;

use crate::error::FieldkitError;

/// Environment variable prefix shared by every section.
pub const ENV_PREFIX: &str = "FIELDKIT";

/// Default config file prefix (resolved by the `config` crate to
/// `fieldkit.toml`, `fieldkit.yaml`, ...).
pub const DEFAULT_FILE_PREFIX: &str = "fieldkit";

/// Load one named section, e.g. `[scan]` or `[ftp]`.
///
/// A missing section is not an error: the type's defaults are returned.
/// A present but malformed section is.
pub fn load_section<T>(file_prefix: &str, section: &str) -> Result<T, FieldkitError>
where
    T: DeserializeOwned + Default,
{
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<T>(section) {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section, "Config section absent, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(FieldkitError::Config(format!("[{section}]: {e}"))),
    }
}
