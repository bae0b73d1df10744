//! Recursive remote tree walk.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use fieldkit_core::{CancellationToken, Credentials, RemoteEntry};

use crate::error::{FtpError, Result};
use crate::listing;
use crate::transport::FtpTransport;

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Parse the full listing of one remote directory.
///
/// Unparseable lines are dropped.
pub async fn list_directory<T: FtpTransport + ?Sized>(
    transport: &T,
    remote_dir: &str,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<Vec<RemoteEntry>> {
    let mut lines = transport.list_details(remote_dir, credentials, cancel).await?;
    let mut entries = Vec::new();
    while let Some(line) = lines.next_line(cancel).await? {
        match listing::parse_line(&line, remote_dir) {
            Some(entry) => entries.push(entry),
            None => tracing::trace!(line = %line, "Skipping unparseable listing line"),
        }
    }
    Ok(entries)
}

/// Every file below `remote_dir`, depth first in listing order.
///
/// `.` and `..` are skipped and directories are never listed twice, so a
/// server that reports a cycle cannot make the walk run forever.
pub async fn walk<T: FtpTransport + ?Sized>(
    transport: &T,
    remote_dir: &str,
    credentials: &Credentials,
    cancel: &CancellationToken,
) -> Result<Vec<RemoteEntry>> {
    let root = normalize_dir(remote_dir);
    let mut visited = HashSet::new();
    let mut files = Vec::new();

    walk_dir(transport, root.clone(), credentials, cancel, &mut visited, &mut files).await?;

    tracing::info!(
        root = %root,
        directories = visited.len(),
        files = files.len(),
        "Remote walk complete"
    );
    Ok(files)
}

fn walk_dir<'a, T: FtpTransport + ?Sized>(
    transport: &'a T,
    dir: String,
    credentials: &'a Credentials,
    cancel: &'a CancellationToken,
    visited: &'a mut HashSet<String>,
    files: &'a mut Vec<RemoteEntry>,
) -> WalkFuture<'a> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(FtpError::Cancelled);
        }
        let dir = normalize_dir(&dir);
        if !visited.insert(dir.clone()) {
            tracing::warn!(dir = %dir, "Directory already visited, skipping");
            return Ok(());
        }

        let entries = list_directory(transport, &dir, credentials, cancel).await?;
        tracing::debug!(dir = %dir, entries = entries.len(), "Listed remote directory");

        for entry in entries {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            if entry.is_directory {
                if cancel.is_cancelled() {
                    return Err(FtpError::Cancelled);
                }
                walk_dir(
                    transport,
                    entry.full_path,
                    credentials,
                    cancel,
                    &mut *visited,
                    &mut *files,
                )
                .await?;
            } else {
                files.push(entry);
            }
        }
        Ok(())
    })
}

/// Leading `/`, no trailing `/` (except for the root itself).
pub fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}
