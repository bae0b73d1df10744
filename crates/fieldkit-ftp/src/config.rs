//! Configuration for fieldkit FTP sessions.

use std::time::Duration;

use fieldkit_core::Credentials;
use serde::Deserialize;

use crate::downloader::DEFAULT_CHUNK_SIZE;

/// FTP connection settings.
///
/// Loaded from the `[ftp]` section of `fieldkit.toml` or
/// `FIELDKIT__FTP__*` environment variables (handy for the password).
#[derive(Debug, Clone, Deserialize)]
pub struct FtpConfig {
    /// Server host name or IPv4 address.
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Applies to every control reply and data read.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Download buffer size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl FtpConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.host, &self.username, &self.password)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_port() -> u16 {
    21
}

fn default_username() -> String {
    "anonymous".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: default_username(),
            password: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            chunk_size: default_chunk_size(),
        }
    }
}
