//! Remote listing and download streams.
//!
//! [`FtpTransport`] is the seam between the walker/downloader and the
//! network. [`TcpFtpTransport`] speaks plain FTP: one session per call,
//! passive data channel, binary type, `QUIT` once the data is drained.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use fieldkit_core::{CancellationToken, Credentials};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;

use crate::codec::{self, ControlChannel};
use crate::config::FtpConfig;
use crate::error::{FtpError, Result, TransportError};

/// Issues single listing or download requests.
#[async_trait]
pub trait FtpTransport: Send + Sync {
    /// Raw `LIST` output for `remote_dir`, one line at a time.
    async fn list_details(
        &self,
        remote_dir: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<RemoteLines>;

    /// Contents of `remote_path`, with its length when the server reports one.
    async fn download(
        &self,
        remote_path: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<RemoteFile>;
}

/// Race `io` against cancellation and an optional deadline.
async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    what: &str,
    io: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, TransportError>>,
{
    if cancel.is_cancelled() {
        return Err(FtpError::Cancelled);
    }
    let bounded = async {
        match limit {
            Some(d) => match tokio::time::timeout(d, io).await {
                Ok(r) => r,
                Err(_) => Err(TransportError::Timeout {
                    what: what.to_string(),
                    millis: d.as_millis() as u64,
                }),
            },
            None => io.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FtpError::Cancelled),
        r = bounded => r.map_err(FtpError::from),
    }
}

/// Read the transfer-complete reply once the data channel is drained.
async fn finish_transfer(control: &mut Option<ControlChannel>, cancel: &CancellationToken) -> Result<()> {
    let Some(mut channel) = control.take() else {
        return Ok(());
    };
    let reply = guarded(cancel, None, "Transfer completion", channel.read_reply()).await?;
    if !reply.is_success() {
        return Err(codec::rejected("transfer", &reply).into());
    }
    channel.quit().await;
    Ok(())
}

/// Line stream of a directory listing.
///
/// Decoding is lossy UTF-8; a leading byte-order mark is stripped and blank
/// lines are skipped.
pub struct RemoteLines {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    control: Option<ControlChannel>,
    read_timeout: Option<Duration>,
    at_start: bool,
    exhausted: bool,
}

impl RemoteLines {
    /// Wrap any buffered reader, e.g. a simulated listing.
    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            control: None,
            read_timeout: None,
            at_start: true,
            exhausted: false,
        }
    }

    fn over_session(data: TcpStream, control: Option<ControlChannel>, read_timeout: Duration) -> Self {
        Self {
            reader: Box::new(BufReader::new(data)),
            control,
            read_timeout: Some(read_timeout),
            at_start: true,
            exhausted: false,
        }
    }

    /// Next non-blank line, or `None` at the end of the listing.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> Result<Option<String>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            let mut buf = Vec::new();
            let n = guarded(
                cancel,
                self.read_timeout,
                "Listing read",
                async {
                    self.reader
                        .read_until(b'\n', &mut buf)
                        .await
                        .map_err(TransportError::from)
                },
            )
            .await?;

            if n == 0 {
                self.exhausted = true;
                finish_transfer(&mut self.control, cancel).await?;
                return Ok(None);
            }

            let decoded = String::from_utf8_lossy(&buf);
            let mut line = decoded.trim_end_matches(['\r', '\n']);
            if self.at_start {
                self.at_start = false;
                line = line.strip_prefix('\u{feff}').unwrap_or(line);
            }
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }
}

/// Byte stream of a remote file.
pub struct RemoteFile {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    total_len: Option<u64>,
    control: Option<ControlChannel>,
    read_timeout: Option<Duration>,
    exhausted: bool,
}

impl RemoteFile {
    /// Wrap any reader, e.g. a simulated download.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, total_len: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            total_len,
            control: None,
            read_timeout: None,
            exhausted: false,
        }
    }

    /// Length reported by the server; `None` when unknown.
    pub fn total_len(&self) -> Option<u64> {
        self.total_len
    }

    /// Fill `buf` with the next chunk. Returns 0 at end of file.
    pub async fn read_chunk(&mut self, buf: &mut [u8], cancel: &CancellationToken) -> Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        let n = guarded(
            cancel,
            self.read_timeout,
            "Download read",
            async { self.reader.read(&mut buf[..]).await.map_err(TransportError::from) },
        )
        .await?;
        if n == 0 {
            self.exhausted = true;
            finish_transfer(&mut self.control, cancel).await?;
        }
        Ok(n)
    }
}

/// Plain-FTP transport over TCP.
#[derive(Debug, Clone)]
pub struct TcpFtpTransport {
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpFtpTransport {
    pub fn new(port: u16, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
            read_timeout,
        }
    }

    pub fn from_config(config: &FtpConfig) -> Self {
        Self::new(config.port, config.connect_timeout(), config.read_timeout())
    }

    /// Connect, log in, and switch to binary type.
    async fn open_session(
        &self,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<ControlChannel> {
        let (mut control, _banner) = guarded(
            cancel,
            None,
            "Connect",
            ControlChannel::connect(
                &credentials.host,
                self.port,
                self.connect_timeout,
                self.read_timeout,
            ),
        )
        .await?;

        let user = guarded(
            cancel,
            None,
            "USER",
            control.execute(&format!("USER {}", credentials.username)),
        )
        .await?;

        let login = if user.is_intermediate() {
            guarded(
                cancel,
                None,
                "PASS",
                control.execute(&format!("PASS {}", credentials.password)),
            )
            .await?
        } else {
            user
        };
        if !login.is_success() {
            return Err(TransportError::AuthRejected {
                code: login.code,
                message: login.text(),
            }
            .into());
        }

        guarded(cancel, None, "TYPE", control.expect_success("TYPE I")).await?;
        tracing::debug!(host = %credentials.host, user = %credentials.username, "FTP session ready");
        Ok(control)
    }

    /// Enter passive mode and connect the data channel.
    async fn open_data(
        &self,
        control: &mut ControlChannel,
        cancel: &CancellationToken,
    ) -> Result<TcpStream> {
        let reply = guarded(cancel, None, "PASV", control.expect_success("PASV")).await?;
        let advertised = codec::parse_pasv(&reply.text())?;

        // Servers behind NAT sometimes advertise 0.0.0.0.
        let ip = if advertised.ip().is_unspecified() {
            control.peer_ip()
        } else {
            IpAddr::V4(*advertised.ip())
        };
        let addr = SocketAddr::new(ip, advertised.port());

        guarded(cancel, Some(self.connect_timeout), "Data connect", async {
            TcpStream::connect(addr)
                .await
                .map_err(|source| TransportError::Connect {
                    addr: addr.to_string(),
                    source,
                })
        })
        .await
    }
}

#[async_trait]
impl FtpTransport for TcpFtpTransport {
    async fn list_details(
        &self,
        remote_dir: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<RemoteLines> {
        let mut control = self.open_session(credentials, cancel).await?;
        let data = self.open_data(&mut control, cancel).await?;

        let dir = if remote_dir.is_empty() { "/" } else { remote_dir };
        let reply = guarded(cancel, None, "LIST", control.execute(&format!("LIST {dir}"))).await?;

        if reply.is_preliminary() {
            Ok(RemoteLines::over_session(data, Some(control), self.read_timeout))
        } else if reply.is_success() {
            // Transfer already complete; the data is buffered on the socket.
            control.quit().await;
            Ok(RemoteLines::over_session(data, None, self.read_timeout))
        } else {
            Err(codec::rejected("LIST", &reply).into())
        }
    }

    async fn download(
        &self,
        remote_path: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<RemoteFile> {
        let mut control = self.open_session(credentials, cancel).await?;

        let size_reply = guarded(
            cancel,
            None,
            "SIZE",
            control.execute(&format!("SIZE {remote_path}")),
        )
        .await?;
        let size = if size_reply.code == 213 {
            size_reply
                .lines
                .last()
                .and_then(|l| l.get(4..))
                .and_then(|s| s.trim().parse::<u64>().ok())
        } else {
            None
        };

        let data = self.open_data(&mut control, cancel).await?;
        let reply = guarded(
            cancel,
            None,
            "RETR",
            control.execute(&format!("RETR {remote_path}")),
        )
        .await?;
        if !reply.is_preliminary() && !reply.is_success() {
            return Err(codec::rejected("RETR", &reply).into());
        }

        let total_len = size.or_else(|| codec::parse_size_hint(&reply.text()));
        tracing::debug!(path = %remote_path, total_len = ?total_len, "Download started");

        let control = if reply.is_preliminary() {
            Some(control)
        } else {
            control.quit().await;
            None
        };
        Ok(RemoteFile {
            reader: Box::new(data),
            total_len,
            control,
            read_timeout: Some(self.read_timeout),
            exhausted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_lines_strip_bom_and_blanks() {
        let body = "\u{feff}first\r\n\r\n   \nsecond\nthird";
        let mut lines = RemoteLines::from_reader(Cursor::new(body.as_bytes().to_vec()));
        let cancel = CancellationToken::new();

        assert_eq!(lines.next_line(&cancel).await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line(&cancel).await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line(&cancel).await.unwrap().as_deref(), Some("third"));
        assert_eq!(lines.next_line(&cancel).await.unwrap(), None);
        assert_eq!(lines.next_line(&cancel).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lines_tolerate_invalid_utf8() {
        let mut body = b"-rw-r--r-- 1 0 0 3 Jan 1 00:00 caf".to_vec();
        body.extend_from_slice(&[0xe9, b'\n']);
        let mut lines = RemoteLines::from_reader(Cursor::new(body));
        let line = lines
            .next_line(&CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert!(line.starts_with("-rw-r--r--"));
        assert!(line.ends_with('\u{fffd}'));
    }

    #[tokio::test]
    async fn test_lines_observe_cancellation() {
        let mut lines = RemoteLines::from_reader(Cursor::new(b"a\nb\n".to_vec()));
        let cancel = CancellationToken::new();
        assert!(lines.next_line(&cancel).await.unwrap().is_some());
        cancel.cancel();
        assert!(matches!(
            lines.next_line(&cancel).await,
            Err(FtpError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_file_chunks_and_length() {
        let mut file = RemoteFile::from_reader(Cursor::new(vec![7u8; 10]), Some(10));
        assert_eq!(file.total_len(), Some(10));
        let cancel = CancellationToken::new();
        let mut buf = [0u8; 4];
        let mut sizes = Vec::new();
        loop {
            let n = file.read_chunk(&mut buf, &cancel).await.unwrap();
            if n == 0 {
                break;
            }
            sizes.push(n);
        }
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_file_read_cancelled() {
        let mut file = RemoteFile::from_reader(Cursor::new(vec![0u8; 10]), None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut buf = [0u8; 4];
        assert!(matches!(
            file.read_chunk(&mut buf, &cancel).await,
            Err(FtpError::Cancelled)
        ));
    }
}
