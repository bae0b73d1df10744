use thiserror::Error;

/// Top-level error type shared by the fieldkit crates.
#[derive(Error, Debug)]
pub enum FieldkitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for FieldkitError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
