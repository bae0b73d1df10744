//! FTP control-channel codec (RFC 959 §4).
//!
//! Sends CRLF-terminated commands and reads single- and multi-line replies.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::TransportError;

type Result<T> = std::result::Result<T, TransportError>;

/// A complete server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// All reply lines joined with spaces.
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// 1xx: more replies follow (e.g. a data transfer is starting).
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx: the server wants another command (e.g. PASS after USER).
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// The control connection of one session.
pub struct ControlChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: IpAddr,
    read_timeout: Duration,
}

impl ControlChannel {
    /// Connect and read the server greeting.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<(Self, Reply)> {
        let addr = format!("{host}:{port}");
        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout {
                what: format!("Connect to {addr}"),
                millis: connect_timeout.as_millis() as u64,
            })?
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        tcp.set_nodelay(true).ok();

        let peer = tcp.peer_addr()?.ip();
        let (rd, wr) = tcp.into_split();
        let mut channel = Self {
            reader: BufReader::new(rd),
            writer: wr,
            peer,
            read_timeout,
        };

        let banner = channel.read_reply().await?;
        if !banner.is_success() {
            return Err(TransportError::Rejected {
                command: "connect".to_string(),
                code: banner.code,
                message: banner.text(),
            });
        }
        Ok((channel, banner))
    }

    /// Address of the server end of the control connection.
    pub fn peer_ip(&self) -> IpAddr {
        self.peer
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Send a command; the CRLF is added here.
    pub async fn send(&mut self, cmd: &str) -> Result<()> {
        if cmd.starts_with("PASS ") {
            tracing::trace!(">>> PASS ***");
        } else {
            tracing::trace!(">>> {cmd}");
        }
        self.writer.write_all(format!("{cmd}\r\n").as_bytes()).await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let n = tokio::time::timeout(self.read_timeout, self.reader.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| TransportError::Timeout {
                what: "Control reply".to_string(),
                millis: self.read_timeout.as_millis() as u64,
            })??;
        if n == 0 {
            return Err(TransportError::Protocol(
                "Server closed the control connection".to_string(),
            ));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read one reply, following `NNN-` continuation lines up to `NNN `.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut lines = vec![first];

        if lines[0].as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let next = self.read_line().await?;
                let last = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if last {
                    break;
                }
            }
        }

        tracing::trace!("<<< {}", lines.last().map(String::as_str).unwrap_or(""));
        Ok(Reply { code, lines })
    }

    pub async fn execute(&mut self, cmd: &str) -> Result<Reply> {
        self.send(cmd).await?;
        self.read_reply().await
    }

    /// Execute and require a 2xx reply.
    pub async fn expect_success(&mut self, cmd: &str) -> Result<Reply> {
        let reply = self.execute(cmd).await?;
        if !reply.is_success() {
            return Err(rejected(cmd, &reply));
        }
        Ok(reply)
    }

    /// Say goodbye. The session is over either way, so failures are ignored.
    pub async fn quit(mut self) {
        if let Err(e) = self.execute("QUIT").await {
            tracing::debug!(error = %e, "QUIT failed");
        }
    }
}

/// Build a `Rejected` error for `cmd`, keeping only the verb so paths and
/// passwords stay out of error text.
pub fn rejected(cmd: &str, reply: &Reply) -> TransportError {
    TransportError::Rejected {
        command: cmd.split_whitespace().next().unwrap_or(cmd).to_string(),
        code: reply.code,
        message: reply.text(),
    }
}

fn parse_code(line: &str) -> Result<u16> {
    line.get(..3)
        .and_then(|c| c.parse::<u16>().ok())
        .filter(|c| (100..600).contains(c))
        .ok_or_else(|| TransportError::Protocol(format!("Invalid reply: '{line}'")))
}

/// Parse `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub fn parse_pasv(text: &str) -> Result<SocketAddrV4> {
    let invalid = || TransportError::Protocol(format!("Cannot parse PASV reply: {text}"));

    let start = text.find('(').ok_or_else(invalid)?;
    let end = text[start..].find(')').ok_or_else(invalid)? + start;
    let nums = text[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| invalid())?;
    if nums.len() != 6 {
        return Err(invalid());
    }

    let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Parse the `(N bytes)` hint some servers put in the 150 reply to `RETR`.
pub fn parse_size_hint(text: &str) -> Option<u64> {
    let end = text.find(" bytes)")?;
    let start = text[..end].rfind('(')? + 1;
    text[start..end].trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_reply_classes() {
        let r = |code| Reply {
            code,
            lines: vec![],
        };
        assert!(r(150).is_preliminary());
        assert!(r(226).is_success());
        assert!(r(331).is_intermediate());
        assert!(!r(530).is_success());
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("220 ready").unwrap(), 220);
        assert_eq!(parse_code("230-welcome").unwrap(), 230);
        assert!(parse_code("hello").is_err());
        assert!(parse_code("99").is_err());
    }

    #[test]
    fn test_parse_pasv() {
        let addr = parse_pasv("227 Entering Passive Mode (192,168,1,10,195,80).").unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), 50000));
        assert!(parse_pasv("227 Entering Passive Mode").is_err());
        assert!(parse_pasv("227 (1,2,3,4,5)").is_err());
        assert!(parse_pasv("227 (1,2,3,4,5,300)").is_err());
    }

    #[test]
    fn test_parse_size_hint() {
        assert_eq!(
            parse_size_hint("150 Opening BINARY mode data connection for fw.bin (1048576 bytes)"),
            Some(1_048_576)
        );
        assert_eq!(parse_size_hint("150 Opening data connection"), None);
    }

    #[test]
    fn test_rejected_keeps_only_verb() {
        let reply = Reply {
            code: 550,
            lines: vec!["550 No such file".into()],
        };
        match rejected("RETR /secret/path", &reply) {
            TransportError::Rejected { command, code, .. } => {
                assert_eq!(command, "RETR");
                assert_eq!(code, 550);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiline_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"220-Welcome\r\n220-Second line\r\n220 Ready\r\n")
                .await
                .unwrap();
            let mut buf = [0u8; 64];
            let _ = tokio::io::AsyncReadExt::read(&mut sock, &mut buf).await;
            sock.write_all(b"221 Bye\r\n").await.unwrap();
        });

        let (channel, banner) = ControlChannel::connect(
            "127.0.0.1",
            port,
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(banner.code, 220);
        assert_eq!(banner.lines.len(), 3);
        assert_eq!(banner.lines[2], "220 Ready");
        channel.quit().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = ControlChannel::connect(
            "127.0.0.1",
            port,
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
