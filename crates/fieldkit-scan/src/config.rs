//! Configuration for the fieldkit-scan subnet scanner.

use serde::Deserialize;

use crate::scanner::DEFAULT_MAX_CONCURRENCY;

/// Scanner settings.
///
/// Loaded from the `[scan]` section of `fieldkit.toml` or
/// `FIELDKIT__SCAN__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Per-host ping timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum probes in flight.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Whether reachable hosts get a reverse name lookup.
    #[serde(default = "default_true")]
    pub resolve_names: bool,

    /// Path to the ping binary (default: "ping").
    #[serde(default = "default_ping_path")]
    pub ping_path: String,
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_true() -> bool {
    true
}

fn default_ping_path() -> String {
    "ping".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            resolve_names: default_true(),
            ping_path: default_ping_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.max_concurrency, 128);
        assert!(config.resolve_names);
        assert_eq!(config.ping_path, "ping");
    }
}
