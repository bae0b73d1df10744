//! CLI entry point for the fieldkit FTP client.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use fieldkit_core::{config as fk_config, CancellationToken, TransferProgress};
use fieldkit_ftp::config::FtpConfig;
use fieldkit_ftp::mirror::mirror;
use fieldkit_ftp::walker::{list_directory, walk};
use fieldkit_ftp::{FtpDownloader, FtpError, TcpFtpTransport};

#[derive(Parser)]
#[command(name = "fieldkit-ftp")]
#[command(about = "List, fetch, and mirror files from a device's FTP server")]
struct Cli {
    /// Server host (overrides config).
    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    port: Option<u16>,

    #[arg(long, global = true)]
    user: Option<String>,

    /// Prefer FIELDKIT__FTP__PASSWORD over this flag on shared machines.
    #[arg(long, global = true)]
    password: Option<String>,

    /// Config file prefix (default: fieldkit).
    #[arg(short, long, global = true, default_value = fk_config::DEFAULT_FILE_PREFIX)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a remote directory.
    Ls {
        #[arg(default_value = "/")]
        dir: String,

        /// List every file below the directory instead.
        #[arg(short, long)]
        recursive: bool,
    },
    /// Download one remote file.
    Get { remote: String, local: PathBuf },
    /// Download a remote tree into a local directory.
    Mirror { remote_dir: String, local_dir: PathBuf },
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
    let mut config: FtpConfig = fk_config::load_section(&cli.config, "ftp")?;
    if let Some(host) = cli.host.clone() {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(user) = cli.user.clone() {
        config.username = user;
    }
    if let Some(password) = cli.password.clone() {
        config.password = password;
    }
    if config.host.is_empty() {
        anyhow::bail!("No FTP host configured; pass --host or set FIELDKIT__FTP__HOST");
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling transfer");
            ctrl_c.cancel();
        }
    });

    match run(cli.command, &config, &cancel).await {
        Err(e) if e.is_cancelled() => {
            eprintln!("Cancelled");
            std::process::exit(130);
        }
        other => Ok(other?),
    }
}

async fn run(command: Commands, config: &FtpConfig, cancel: &CancellationToken) -> Result<(), FtpError> {
    let transport = TcpFtpTransport::from_config(config);
    let credentials = config.credentials();
    let downloader = FtpDownloader::new(config.chunk_size);

    match command {
        Commands::Ls { dir, recursive } => {
            let entries = if recursive {
                walk(&transport, &dir, &credentials, cancel).await?
            } else {
                list_directory(&transport, &dir, &credentials, cancel).await?
            };
            for entry in entries.iter().filter(|e| e.name != "." && e.name != "..") {
                let kind = if entry.is_directory { "d" } else { "-" };
                println!("{kind} {}", entry.full_path);
            }
        }
        Commands::Get { remote, local } => {
            let report = |percent: u8| {
                tracing::info!(remote = %remote, percent, "Download progress");
            };
            let bytes = downloader
                .download(&transport, &remote, &local, &credentials, cancel, Some(&report))
                .await?;
            println!("{bytes} bytes -> {}", local.display());
        }
        Commands::Mirror {
            remote_dir,
            local_dir,
        } => {
            let report = |p: TransferProgress| {
                if p.percent == 100 {
                    tracing::info!(
                        done = p.done,
                        total = p.total,
                        file = %p.current_name,
                        "Mirror progress"
                    );
                }
            };
            let written = mirror(
                &transport,
                &downloader,
                &remote_dir,
                &local_dir,
                &credentials,
                cancel,
                Some(&report),
            )
            .await?;
            println!("{} files -> {}", written.len(), local_dir.display());
        }
    }
    Ok(())
}
