//! Copy a remote tree to a local directory.

use std::path::{Path, PathBuf};

use fieldkit_core::{progress, CancellationToken, Credentials, ProgressSink, TransferProgress};
use tokio::fs;

use crate::downloader::FtpDownloader;
use crate::error::{FtpError, Result};
use crate::transport::FtpTransport;
use crate::walker::{self, normalize_dir};

/// Walk `remote_dir` and download every file below it into `local_dir`,
/// keeping the relative layout. Returns the local paths written.
///
/// Progress carries the file count plus the percentage of the file in
/// flight. Remote paths that would escape `local_dir` are skipped.
#[allow(clippy::too_many_arguments)]
pub async fn mirror<T: FtpTransport + ?Sized>(
    transport: &T,
    downloader: &FtpDownloader,
    remote_dir: &str,
    local_dir: &Path,
    credentials: &Credentials,
    cancel: &CancellationToken,
    on_progress: Option<&dyn ProgressSink<TransferProgress>>,
) -> Result<Vec<PathBuf>> {
    let root = normalize_dir(remote_dir);
    let files = walker::walk(transport, &root, credentials, cancel).await?;
    let total = files.len();

    fs::create_dir_all(local_dir)
        .await
        .map_err(|e| FtpError::local(local_dir, e))?;

    let mut written = Vec::with_capacity(total);
    for (index, entry) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(FtpError::Cancelled);
        }
        let Some(relative) = relative_local_path(&root, &entry.full_path) else {
            tracing::warn!(path = %entry.full_path, "Skipping remote path unsafe for local use");
            continue;
        };
        let target = local_dir.join(relative);

        let forward = |percent: u8| {
            progress::report(
                on_progress,
                TransferProgress {
                    done: index,
                    total,
                    percent,
                    current_name: entry.name.clone(),
                },
            )
        };
        downloader
            .download(
                transport,
                &entry.full_path,
                &target,
                credentials,
                cancel,
                Some(&forward),
            )
            .await?;

        progress::report(
            on_progress,
            TransferProgress {
                done: index + 1,
                total,
                percent: 100,
                current_name: entry.name.clone(),
            },
        );
        written.push(target);
    }

    tracing::info!(
        remote = %root,
        local = %local_dir.display(),
        files = written.len(),
        "Mirror complete"
    );
    Ok(written)
}

/// Local relative path for `remote_path` under `remote_root`.
///
/// `None` when the path is outside the root or has a component that is
/// empty after cleanup, `.`, `..`, or contains a backslash.
pub fn relative_local_path(remote_root: &str, remote_path: &str) -> Option<PathBuf> {
    let root = normalize_dir(remote_root);
    let rest = if root == "/" {
        remote_path.strip_prefix('/')?
    } else {
        remote_path.strip_prefix(root.as_str())?.strip_prefix('/')?
    };

    let mut relative = PathBuf::new();
    for part in rest.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." || part.contains('\\') {
            return None;
        }
        relative.push(part);
    }
    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}
