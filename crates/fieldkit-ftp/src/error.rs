//! Error types for the fieldkit-ftp crate.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failures on the remote side of a session. Carries the underlying cause;
/// retrying is the caller's decision.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("{what} timed out after {millis}ms")]
    Timeout { what: String, millis: u64 },

    #[error("Login rejected ({code}): {message}")]
    AuthRejected { code: u16, message: String },

    #[error("{command} rejected ({code}): {message}")]
    Rejected {
        command: String,
        code: u16,
        message: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum FtpError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Local IO error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FtpError {
    pub fn local(path: &Path, source: io::Error) -> Self {
        Self::LocalIo {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, FtpError>;
