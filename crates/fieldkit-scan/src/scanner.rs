//! Subnet scan orchestration.
//!
//! One tokio task per host, gated by a semaphore. A permit is taken *before*
//! the task is spawned, so no more than `max_concurrency` workers exist at a
//! time however large the range is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use fieldkit_core::progress::{self, ProgressSink};
use fieldkit_core::{CancellationToken, HostRecord, ScanProgress, ScanReport};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{Result, ScanError};
use crate::probe::Probe;
use crate::range;

/// Concurrency used when the caller asks for zero.
pub const DEFAULT_MAX_CONCURRENCY: usize = 128;

/// Shared handle to a progress sink that outlives the spawned workers.
pub type ScanProgressSink = Arc<dyn ProgressSink<ScanProgress>>;

/// Parameters for one scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub cidr: String,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub cancel: CancellationToken,
}

impl ScanRequest {
    pub fn new(
        cidr: impl Into<String>,
        timeout_ms: u64,
        max_concurrency: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        if timeout_ms == 0 {
            return Err(ScanError::InvalidTimeout);
        }
        let max_concurrency = if max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max_concurrency
        };
        Ok(Self {
            cidr: cidr.into(),
            timeout: Duration::from_millis(timeout_ms),
            max_concurrency,
            cancel,
        })
    }
}

/// Result accumulator shared by all workers of one scan.
///
/// Append, counter bump and progress report happen under one lock, so
/// reported `done` values rise strictly in call order.
struct Accumulator {
    records: Mutex<Vec<HostRecord>>,
    done: AtomicUsize,
    total: usize,
    progress: Option<ScanProgressSink>,
}

impl Accumulator {
    fn new(total: usize, progress: Option<ScanProgressSink>) -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(total)),
            done: AtomicUsize::new(0),
            total,
            progress,
        }
    }

    fn push(&self, record: HostRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(record);
        self.tick();
    }

    /// Count a host whose worker died without producing a record.
    fn skip(&self) {
        let _records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        self.tick();
    }

    /// Caller must hold the records lock.
    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        progress::report(
            self.progress.as_deref(),
            ScanProgress {
                done,
                total: self.total,
            },
        );
    }

    fn take_sorted(&self) -> Vec<HostRecord> {
        let mut records =
            std::mem::take(&mut *self.records.lock().unwrap_or_else(|e| e.into_inner()));
        records.sort_by_key(HostRecord::sort_key);
        records
    }
}

/// Fans a probe out over every usable host of a CIDR block.
pub struct SubnetScanner<P> {
    probe: Arc<P>,
}

impl<P: Probe + 'static> SubnetScanner<P> {
    pub fn new(probe: P) -> Self {
        Self {
            probe: Arc::new(probe),
        }
    }

    /// Probe every usable host and return the records ordered by address.
    ///
    /// Individual probe failures show up as unreachable records. The only
    /// errors are malformed input and cancellation; a cancelled scan never
    /// returns partial results.
    pub async fn scan(
        &self,
        request: &ScanRequest,
        progress: Option<ScanProgressSink>,
    ) -> Result<Vec<HostRecord>> {
        let (network, prefix) = range::parse_cidr(&request.cidr)?;
        let hosts = range::enumerate(network, prefix)?;
        let total = hosts.len();

        tracing::info!(
            cidr = %request.cidr,
            total,
            max_concurrency = request.max_concurrency,
            timeout_ms = request.timeout.as_millis() as u64,
            "Starting subnet scan"
        );

        let limiter = Arc::new(Semaphore::new(request.max_concurrency));
        let acc = Arc::new(Accumulator::new(total, progress));
        let mut workers = JoinSet::new();

        for addr in hosts {
            let permit = tokio::select! {
                biased;
                _ = request.cancel.cancelled() => {
                    workers.abort_all();
                    return Err(ScanError::Cancelled);
                }
                permit = limiter.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    // The semaphore is never closed while the scan runs.
                    Err(_) => return Err(ScanError::Cancelled),
                },
            };

            // Reap finished workers so the join set stays bounded.
            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = settle(joined, &acc) {
                    workers.abort_all();
                    return Err(e);
                }
            }

            let probe = self.probe.clone();
            let acc = acc.clone();
            let cancel = request.cancel.clone();
            let timeout = request.timeout;
            workers.spawn(async move {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return Err(ScanError::Cancelled);
                }
                let record = probe.probe(addr, timeout, &cancel).await?;
                acc.push(record);
                Ok(())
            });
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = request.cancel.cancelled() => {
                    workers.abort_all();
                    return Err(ScanError::Cancelled);
                }
                joined = workers.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            if let Err(e) = settle(joined, &acc) {
                workers.abort_all();
                return Err(e);
            }
        }

        if request.cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let records = acc.take_sorted();
        tracing::info!(
            cidr = %request.cidr,
            total,
            alive = records.iter().filter(|r| r.is_reachable()).count(),
            "Subnet scan complete"
        );
        Ok(records)
    }

    /// [`scan`](Self::scan), wrapped with an id and timestamps.
    pub async fn scan_report(
        &self,
        request: &ScanRequest,
        progress: Option<ScanProgressSink>,
    ) -> Result<ScanReport> {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        let hosts = self
            .scan(request, progress)
            .instrument(tracing::info_span!("scan", scan_id = %scan_id))
            .await?;

        Ok(ScanReport {
            scan_id,
            cidr: request.cidr.clone(),
            started_at,
            finished_at: Utc::now(),
            hosts,
        })
    }
}

/// Fold one joined worker into the scan outcome.
fn settle(
    joined: std::result::Result<Result<()>, JoinError>,
    acc: &Accumulator,
) -> Result<()> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            tracing::error!(error = %e, "Probe task panicked");
            acc.skip();
            Ok(())
        }
        // Aborted tasks only occur after we have already decided to return.
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;

    /// Lower addresses answer later, so completion order is the reverse of
    /// address order.
    struct ReversedProbe {
        calls: AtomicUsize,
    }

    impl ReversedProbe {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for ReversedProbe {
        async fn probe(
            &self,
            addr: Ipv4Addr,
            _timeout: Duration,
            cancel: &CancellationToken,
        ) -> Result<HostRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = 20u64.saturating_sub(u64::from(addr.octets()[3]) % 20);
            tokio::select! {
                _ = cancel.cancelled() => Err(ScanError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(delay)) => {
                    if addr.octets()[3] % 2 == 1 {
                        Ok(HostRecord::reachable(addr, delay, None))
                    } else {
                        Ok(HostRecord::unreachable(addr))
                    }
                }
            }
        }
    }

    struct CancellingProbe {
        cancel_after: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Probe for CancellingProbe {
        async fn probe(
            &self,
            addr: Ipv4Addr,
            _timeout: Duration,
            cancel: &CancellationToken,
        ) -> Result<HostRecord> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.cancel_after {
                cancel.cancel();
            }
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            Ok(HostRecord::unreachable(addr))
        }
    }

    struct PanickyProbe;

    #[async_trait]
    impl Probe for PanickyProbe {
        async fn probe(
            &self,
            addr: Ipv4Addr,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<HostRecord> {
            if addr.octets()[3] == 2 {
                panic!("probe blew up");
            }
            Ok(HostRecord::unreachable(addr))
        }
    }

    /// Tracks how many probes run at once.
    #[derive(Default)]
    struct InFlightProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Probe for InFlightProbe {
        async fn probe(
            &self,
            addr: Ipv4Addr,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<HostRecord> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(HostRecord::unreachable(addr))
        }
    }

    fn request(cidr: &str, concurrency: usize) -> ScanRequest {
        ScanRequest::new(cidr, 100, concurrency, CancellationToken::new()).unwrap()
    }

    fn recording_sink() -> (ScanProgressSink, Arc<Mutex<Vec<ScanProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ScanProgressSink = Arc::new(move |p: ScanProgress| {
            sink_seen.lock().unwrap().push(p);
        });
        (sink, seen)
    }

    #[tokio::test]
    async fn test_slash_30_sorted_regardless_of_completion_order() {
        for concurrency in [1, 128] {
            let scanner = SubnetScanner::new(ReversedProbe::new());
            let records = scanner
                .scan(&request("203.0.113.0/30", concurrency), None)
                .await
                .unwrap();
            let addrs: Vec<_> = records.iter().map(|r| r.address()).collect();
            assert_eq!(
                addrs,
                vec![Ipv4Addr::new(203, 0, 113, 1), Ipv4Addr::new(203, 0, 113, 2)]
            );
        }
    }

    #[tokio::test]
    async fn test_full_subnet_sorted_and_complete() {
        let scanner = SubnetScanner::new(ReversedProbe::new());
        let records = scanner
            .scan(&request("10.9.8.0/26", 16), None)
            .await
            .unwrap();
        assert_eq!(records.len(), 62);
        assert!(records
            .windows(2)
            .all(|w| w[0].sort_key() < w[1].sort_key()));
        assert_eq!(scanner.probe.calls.load(Ordering::SeqCst), 62);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_progress_reports_each_count_once_in_order() {
        let scanner = SubnetScanner::new(ReversedProbe::new());
        let (sink, seen) = recording_sink();
        scanner
            .scan(&request("172.16.0.0/25", 32), Some(sink))
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 126);
        let dones: Vec<_> = seen.iter().map(|p| p.done).collect();
        assert_eq!(dones, (1..=126).collect::<Vec<_>>());
        assert!(seen.iter().all(|p| p.total == 126));
        let unique: HashSet<_> = dones.iter().collect();
        assert_eq!(unique.len(), 126);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_probes_never_exceed_limit() {
        let scanner = SubnetScanner::new(InFlightProbe::default());
        let records = scanner
            .scan(&request("10.0.0.0/24", 7), None)
            .await
            .unwrap();

        assert_eq!(records.len(), 254);
        let peak = scanner.probe.peak.load(Ordering::SeqCst);
        assert!((1..=7).contains(&peak), "peak in-flight was {peak}");
        assert_eq!(scanner.probe.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let scanner = SubnetScanner::new(ReversedProbe::new());
        let req = request("192.168.5.0/24", 8);
        req.cancel.cancel();
        let (sink, seen) = recording_sink();

        let result = scanner.scan(&req, Some(sink)).await;
        assert_eq!(result, Err(ScanError::Cancelled));
        assert_eq!(scanner.probe.calls.load(Ordering::SeqCst), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_scan_is_not_partial_success() {
        let scanner = SubnetScanner::new(CancellingProbe {
            cancel_after: 5,
            calls: AtomicUsize::new(0),
        });
        let result = scanner.scan(&request("192.168.6.0/24", 2), None).await;
        assert_eq!(result, Err(ScanError::Cancelled));
        assert!(scanner.probe.calls.load(Ordering::SeqCst) < 254);
    }

    #[tokio::test]
    async fn test_panicking_probe_releases_permit() {
        let scanner = SubnetScanner::new(PanickyProbe);
        let (sink, seen) = recording_sink();
        let records = scanner
            .scan(&request("10.0.0.0/29", 1), Some(sink))
            .await
            .unwrap();

        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.address() != Ipv4Addr::new(10, 0, 0, 2)));
        let last = *seen.lock().unwrap().last().unwrap();
        assert_eq!(last, ScanProgress { done: 6, total: 6 });
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let scanner = SubnetScanner::new(ReversedProbe::new());
        let err = scanner
            .scan(&request("not-a-cidr", 4), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidCidr { .. }));
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_host_less_range_is_empty() {
        let scanner = SubnetScanner::new(ReversedProbe::new());
        let records = scanner
            .scan(&request("203.0.113.7/32", 4), None)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_request_defaults() {
        let req = ScanRequest::new("10.0.0.0/24", 500, 0, CancellationToken::new()).unwrap();
        assert_eq!(req.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(req.timeout, Duration::from_millis(500));
        assert_eq!(
            ScanRequest::new("10.0.0.0/24", 0, 4, CancellationToken::new()).unwrap_err(),
            ScanError::InvalidTimeout
        );
    }

    #[tokio::test]
    async fn test_scan_report() {
        let scanner = SubnetScanner::new(ReversedProbe::new());
        let report = scanner
            .scan_report(&request("203.0.113.0/29", 4), None)
            .await
            .unwrap();
        assert_eq!(report.cidr, "203.0.113.0/29");
        assert_eq!(report.hosts.len(), 6);
        assert_eq!(report.alive().count(), 3);
        assert!(report.finished_at >= report.started_at);
    }
}
