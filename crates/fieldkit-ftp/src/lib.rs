//! fieldkit-ftp: FTP listing parser, recursive tree walker, and downloader.
//!
//! Every remote call opens its own plain-FTP session (passive, binary, no
//! keep-alive), and every read observes the caller's cancellation token.

pub mod codec;
pub mod config;
pub mod downloader;
pub mod error;
pub mod listing;
pub mod mirror;
pub mod transport;
pub mod walker;

pub use downloader::FtpDownloader;
pub use error::{FtpError, Result, TransportError};
pub use transport::{FtpTransport, RemoteFile, RemoteLines, TcpFtpTransport};
