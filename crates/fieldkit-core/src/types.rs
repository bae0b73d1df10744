//! Core value types returned by fieldkit operations.
//!
//! Everything here is owned by the caller once returned; no subsystem keeps
//! references after an operation completes.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldkitError;

// ── Scan ──────────────────────────────────────────────────────────

/// Outcome of probing a single IPv4 address.
///
/// Built only through [`HostRecord::reachable`] and
/// [`HostRecord::unreachable`]: an unreachable record never carries a
/// hostname or latency. Deserialization goes through the same check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "HostRecordFields")]
pub struct HostRecord {
    address: Ipv4Addr,
    hostname: Option<String>,
    latency_ms: Option<u64>,
    reachable: bool,
}

impl HostRecord {
    pub fn reachable(address: Ipv4Addr, latency_ms: u64, hostname: Option<String>) -> Self {
        Self {
            address,
            hostname,
            latency_ms: Some(latency_ms),
            reachable: true,
        }
    }

    pub fn unreachable(address: Ipv4Addr) -> Self {
        Self {
            address,
            hostname: None,
            latency_ms: None,
            reachable: false,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency_ms
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Numeric value of the address, used to order scan results.
    pub fn sort_key(&self) -> u32 {
        u32::from(self.address)
    }
}

#[derive(Deserialize)]
struct HostRecordFields {
    address: Ipv4Addr,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    latency_ms: Option<u64>,
    reachable: bool,
}

impl TryFrom<HostRecordFields> for HostRecord {
    type Error = String;

    fn try_from(f: HostRecordFields) -> Result<Self, Self::Error> {
        match (f.reachable, f.latency_ms) {
            (true, Some(latency_ms)) => Ok(Self::reachable(f.address, latency_ms, f.hostname)),
            (true, None) => Err(format!("reachable host {} has no latency", f.address)),
            (false, None) if f.hostname.is_none() => Ok(Self::unreachable(f.address)),
            (false, _) => Err(format!(
                "unreachable host {} carries a hostname or latency",
                f.address
            )),
        }
    }
}

/// `(done, total)` pair reported while a scan runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanProgress {
    pub done: usize,
    pub total: usize,
}

impl ScanProgress {
    /// Whole-number completion percentage; an empty scan counts as complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.done.min(self.total) * 100) / self.total) as u8
    }
}

/// A finished scan, ready to print or serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub cidr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub hosts: Vec<HostRecord>,
}

impl ScanReport {
    pub fn alive(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.iter().filter(|h| h.is_reachable())
    }

    pub fn to_json(&self) -> Result<String, FieldkitError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ── FTP ───────────────────────────────────────────────────────────

/// Plaintext login for a remote FTP server. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// One parsed line of a remote directory listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    /// Absolute remote path: single leading `/`, no trailing separator.
    pub full_path: String,
    pub is_directory: bool,
}

impl RemoteEntry {
    /// Build an entry for `name` listed inside `parent`.
    pub fn under(parent: &str, name: impl Into<String>, is_directory: bool) -> Self {
        let name = name.into();
        let full_path = join_remote_path(parent, &name);
        Self {
            name,
            full_path,
            is_directory,
        }
    }
}

/// Join a remote parent path and a child name.
///
/// An empty or root parent yields `/name`; otherwise trailing slashes on the
/// parent and surrounding slashes on the name are stripped before joining.
pub fn join_remote_path(parent: &str, name: &str) -> String {
    let name = name.trim_matches('/');
    if parent.is_empty() || parent == "/" {
        format!("/{name}")
    } else {
        format!("{}/{}", parent.trim_end_matches('/'), name)
    }
}

/// Progress of a multi-file transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferProgress {
    /// Files completed so far.
    pub done: usize,
    pub total: usize,
    /// Percent of the file currently transferring.
    pub percent: u8,
    pub current_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_has_no_optionals() {
        let rec = HostRecord::unreachable(Ipv4Addr::new(10, 0, 0, 9));
        assert!(!rec.is_reachable());
        assert_eq!(rec.hostname(), None);
        assert_eq!(rec.latency_ms(), None);
    }

    #[test]
    fn test_sort_key_is_numeric() {
        let a = HostRecord::unreachable(Ipv4Addr::new(10, 0, 0, 9));
        let b = HostRecord::unreachable(Ipv4Addr::new(10, 0, 0, 10));
        assert!(a.sort_key() < b.sort_key());
        assert_eq!(b.sort_key(), 0x0a00_000a);
    }

    #[test]
    fn test_host_record_serializes_address_as_text() {
        let rec = HostRecord::reachable(Ipv4Addr::new(192, 168, 1, 5), 3, Some("nas".into()));
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["address"], "192.168.1.5");
        assert_eq!(json["hostname"], "nas");
        assert_eq!(json["latency_ms"], 3);
        assert_eq!(json["reachable"], true);
    }

    #[test]
    fn test_host_record_deserialize_keeps_invariant() {
        let rec = HostRecord::reachable(Ipv4Addr::new(10, 0, 0, 1), 7, Some("cam".into()));
        let back: HostRecord = serde_json::from_str(&serde_json::to_string(&rec).unwrap()).unwrap();
        assert_eq!(back, rec);

        let down: HostRecord =
            serde_json::from_str(r#"{"address":"10.0.0.2","reachable":false}"#).unwrap();
        assert_eq!(down, HostRecord::unreachable(Ipv4Addr::new(10, 0, 0, 2)));

        for bad in [
            r#"{"address":"10.0.0.3","reachable":false,"hostname":"x"}"#,
            r#"{"address":"10.0.0.3","reachable":false,"latency_ms":4}"#,
            r#"{"address":"10.0.0.3","reachable":true}"#,
        ] {
            assert!(serde_json::from_str::<HostRecord>(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("", "a.txt"), "/a.txt");
        assert_eq!(join_remote_path("/", "/a.txt/"), "/a.txt");
        assert_eq!(join_remote_path("/data/", "a.txt"), "/data/a.txt");
        assert_eq!(join_remote_path("/data//", "/sub/"), "/data/sub");
    }

    #[test]
    fn test_remote_entry_under() {
        let e = RemoteEntry::under("/a", "sub dir", true);
        assert_eq!(e.name, "sub dir");
        assert_eq!(e.full_path, "/a/sub dir");
        assert!(e.is_directory);
    }

    #[test]
    fn test_scan_progress_percent() {
        assert_eq!(ScanProgress { done: 1, total: 4 }.percent(), 25);
        assert_eq!(ScanProgress { done: 0, total: 0 }.percent(), 100);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let c = Credentials::new("10.0.0.1", "ota", "hunter2");
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("ota"));
    }

    #[test]
    fn test_report_alive_filter() {
        let report = ScanReport {
            scan_id: Uuid::new_v4(),
            cidr: "10.0.0.0/30".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            hosts: vec![
                HostRecord::reachable(Ipv4Addr::new(10, 0, 0, 1), 1, None),
                HostRecord::unreachable(Ipv4Addr::new(10, 0, 0, 2)),
            ],
        };
        assert_eq!(report.alive().count(), 1);
        assert!(report.to_json().unwrap().contains("10.0.0.2"));
    }
}
