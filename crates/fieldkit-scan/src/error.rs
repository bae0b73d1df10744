//! Error types for the fieldkit-scan crate.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScanError {
    #[error("Invalid IPv4 address: {input}")]
    InvalidAddress { input: String },

    #[error("Invalid CIDR '{input}': expected <a.b.c.d>/<0-32>")]
    InvalidCidr { input: String },

    #[error("Prefix length {prefix} is outside 0..=32")]
    PrefixOutOfRange { prefix: u32 },

    #[error("Probe timeout must be a positive number of milliseconds")]
    InvalidTimeout,

    #[error("Scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// True for errors caused by malformed caller input.
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
