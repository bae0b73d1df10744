//! CLI entry point for the fieldkit subnet scanner.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use fieldkit_core::{config as fk_config, CancellationToken, ScanProgress};
use fieldkit_scan::config::ScanConfig;
use fieldkit_scan::detect::detect_subnet_cidr;
use fieldkit_scan::probe::HostProbe;
use fieldkit_scan::scanner::{ScanProgressSink, ScanRequest, SubnetScanner};

#[derive(Parser)]
#[command(name = "fieldkit-scan")]
#[command(about = "Ping-sweep an IPv4 subnet and list the hosts that answer")]
struct Cli {
    /// Subnet to scan (CIDR notation, e.g. 192.168.0.0/24). Detected from
    /// the local interfaces when omitted.
    #[arg(long)]
    cidr: Option<String>,

    /// Per-host ping timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum probes in flight.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Skip reverse name lookups.
    #[arg(long)]
    no_resolve: bool,

    /// Print unreachable hosts too.
    #[arg(long)]
    all: bool,

    /// Emit the full scan report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Config file prefix (default: fieldkit).
    #[arg(short, long, default_value = fk_config::DEFAULT_FILE_PREFIX)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config: ScanConfig = fk_config::load_section(&cli.config, "scan")?;

    let cidr = cli.cidr.clone().unwrap_or_else(detect_subnet_cidr);
    let cancel = CancellationToken::new();
    let request = ScanRequest::new(
        cidr,
        cli.timeout_ms.unwrap_or(config.timeout_ms),
        cli.concurrency.unwrap_or(config.max_concurrency),
        cancel.clone(),
    )?;

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling scan");
            ctrl_c.cancel();
        }
    });

    let probe = HostProbe::system(&config.ping_path, config.resolve_names && !cli.no_resolve);
    let scanner = SubnetScanner::new(probe);

    let progress: ScanProgressSink = Arc::new(|p: ScanProgress| {
        if p.done == p.total || p.done % 16 == 0 {
            tracing::info!(done = p.done, total = p.total, percent = p.percent(), "Scan progress");
        }
    });

    let report = match scanner.scan_report(&request, Some(progress)).await {
        Ok(r) => r,
        Err(e) if e.is_cancelled() => {
            eprintln!("Scan cancelled");
            std::process::exit(130);
        }
        Err(e) => return Err(e.into()),
    };

    if cli.json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!("{:<16} {:>8}  HOSTNAME", "ADDRESS", "RTT");
    for host in report.hosts.iter().filter(|h| cli.all || h.is_reachable()) {
        let rtt = host
            .latency_ms()
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:>8}  {}",
            host.address().to_string(),
            rtt,
            host.hostname().unwrap_or("")
        );
    }
    println!(
        "{} of {} hosts up in {}",
        report.alive().count(),
        report.hosts.len(),
        report.cidr
    );

    Ok(())
}
