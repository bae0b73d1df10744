//! fieldkit-core: Shared types, configuration, and error handling for fieldkit.
//!
//! This crate provides the foundational pieces used by the scanner and the
//! FTP tooling:
//! - Value types returned to callers (HostRecord, RemoteEntry, ScanReport)
//! - Progress payloads and the sink trait workers report through
//! - Layered configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod progress;
pub mod types;

pub use error::FieldkitError;
pub use progress::ProgressSink;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    join_remote_path, Credentials, HostRecord, RemoteEntry, ScanProgress, ScanReport,
    TransferProgress,
};
