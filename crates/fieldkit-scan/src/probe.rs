//! Single-host reachability probe.
//!
//! Pings once (no retry) and, when the host answers, tries a reverse name
//! lookup. Ping and lookup failures are folded into the returned
//! [`HostRecord`]; only cancellation is surfaced as an error.

use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fieldkit_core::{CancellationToken, HostRecord};
use tokio::process::Command;

use crate::error::{Result, ScanError};

/// Sends one echo request.
#[async_trait]
pub trait Pinger: Send + Sync {
    /// `Ok(true)` when a reply arrived within `timeout`.
    async fn ping(&self, addr: Ipv4Addr, timeout: Duration) -> io::Result<bool>;
}

/// Resolves an address back to a host name.
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn lookup(&self, addr: Ipv4Addr) -> io::Result<String>;
}

/// The seam the scanner drives: one address in, one record out.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(
        &self,
        addr: Ipv4Addr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HostRecord>;
}

/// Pings through the operating system's `ping` binary, so no raw-socket
/// privileges are needed.
pub struct SystemPinger {
    ping_path: String,
}

impl SystemPinger {
    pub fn new(ping_path: &str) -> Self {
        Self {
            ping_path: ping_path.to_string(),
        }
    }
}

impl Default for SystemPinger {
    fn default() -> Self {
        Self::new("ping")
    }
}

#[cfg(target_os = "windows")]
fn ping_args(timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "1".into(),
        "-w".into(),
        timeout.as_millis().to_string(),
    ]
}

#[cfg(target_os = "macos")]
fn ping_args(timeout: Duration) -> Vec<String> {
    vec![
        "-c".into(),
        "1".into(),
        "-W".into(),
        timeout.as_millis().to_string(),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn ping_args(timeout: Duration) -> Vec<String> {
    // iputils takes whole seconds.
    let secs = timeout.as_millis().div_ceil(1000).max(1);
    vec!["-c".into(), "1".into(), "-W".into(), secs.to_string()]
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn ping(&self, addr: Ipv4Addr, timeout: Duration) -> io::Result<bool> {
        let status = Command::new(&self.ping_path)
            .args(ping_args(timeout))
            .arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        // `-W` has whole-second granularity on Linux; the wall clock is the real bound.
        match tokio::time::timeout(timeout, status).await {
            Ok(status) => Ok(status?.success()),
            Err(_) => Ok(false),
        }
    }
}

/// Reverse lookup through the system resolver, run on the blocking pool.
#[derive(Default)]
pub struct SystemResolver;

#[async_trait]
impl ReverseResolver for SystemResolver {
    async fn lookup(&self, addr: Ipv4Addr) -> io::Result<String> {
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(addr)))
            .await
            .map_err(io::Error::other)?
    }
}

/// Ping-then-resolve probe.
pub struct HostProbe<P = SystemPinger, R = SystemResolver> {
    pinger: P,
    resolver: Option<R>,
}

impl HostProbe {
    /// Probe using the system `ping` binary and resolver.
    pub fn system(ping_path: &str, resolve_names: bool) -> Self {
        Self::new(
            SystemPinger::new(ping_path),
            resolve_names.then_some(SystemResolver),
        )
    }
}

impl<P: Pinger, R: ReverseResolver> HostProbe<P, R> {
    /// `resolver = None` skips name lookup entirely.
    pub fn new(pinger: P, resolver: Option<R>) -> Self {
        Self { pinger, resolver }
    }

    async fn resolve(&self, addr: Ipv4Addr, cancel: &CancellationToken) -> Result<Option<String>> {
        let Some(resolver) = &self.resolver else {
            return Ok(None);
        };

        let looked_up = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            r = resolver.lookup(addr) => r,
        };

        // Resolvers without a PTR record sometimes echo the address back.
        Ok(match looked_up {
            Ok(name) if !name.is_empty() && name != addr.to_string() => Some(name),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(ip = %addr, error = %e, "Reverse lookup failed");
                None
            }
        })
    }
}

#[async_trait]
impl<P: Pinger, R: ReverseResolver> Probe for HostProbe<P, R> {
    async fn probe(
        &self,
        addr: Ipv4Addr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HostRecord> {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            r = tokio::time::timeout(timeout, self.pinger.ping(addr, timeout)) => r,
        };
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(true)) if elapsed <= timeout => {}
            Ok(Ok(true)) => {
                tracing::debug!(
                    ip = %addr,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Reply arrived after timeout"
                );
                return Ok(HostRecord::unreachable(addr));
            }
            Ok(Ok(false)) => return Ok(HostRecord::unreachable(addr)),
            Ok(Err(e)) => {
                tracing::debug!(ip = %addr, error = %e, "Ping failed");
                return Ok(HostRecord::unreachable(addr));
            }
            Err(_) => {
                tracing::debug!(
                    ip = %addr,
                    timeout_ms = timeout.as_millis() as u64,
                    "Ping timed out"
                );
                return Ok(HostRecord::unreachable(addr));
            }
        }
        let latency_ms = elapsed.as_millis() as u64;

        let hostname = self.resolve(addr, cancel).await?;
        tracing::debug!(ip = %addr, latency_ms, hostname = ?hostname, "Host is up");
        Ok(HostRecord::reachable(addr, latency_ms, hostname))
    }
}
