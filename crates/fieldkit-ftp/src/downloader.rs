//! Single-file download to local disk with percentage progress.

use std::path::Path;

use fieldkit_core::{progress, CancellationToken, Credentials, ProgressSink};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{FtpError, Result};
use crate::transport::{FtpTransport, RemoteFile};

pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Streams a remote file into a local one, chunk by chunk.
#[derive(Debug, Clone)]
pub struct FtpDownloader {
    chunk_size: usize,
}

impl Default for FtpDownloader {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl FtpDownloader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Download `remote_path` to `local_path`, returning the bytes written.
    ///
    /// Missing parent directories are created and an existing file is
    /// truncated. Progress is reported as a whole percentage, at most once
    /// per value, and always ends at 100 on success. When the server gives
    /// no length only the final 100 is reported. On error or cancellation
    /// the partially written file is left in place.
    ///
    /// On Windows the destination is opened with no sharing, so other
    /// handles to it fail while the download runs. Unix has no mandatory
    /// locking, so there the destination is opened as a plain write.
    pub async fn download<T: FtpTransport + ?Sized>(
        &self,
        transport: &T,
        remote_path: &str,
        local_path: &Path,
        credentials: &Credentials,
        cancel: &CancellationToken,
        on_progress: Option<&dyn ProgressSink<u8>>,
    ) -> Result<u64> {
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FtpError::local(parent, e))?;
        }

        let mut remote = transport.download(remote_path, credentials, cancel).await?;
        let total = remote.total_len().filter(|&n| n > 0);

        let mut file = open_destination(local_path)
            .await
            .map_err(|e| FtpError::local(local_path, e))?;

        let mut last_percent: Option<u8> = None;
        let copied = self
            .copy_chunks(&mut remote, &mut file, local_path, total, cancel, on_progress, &mut last_percent)
            .await;
        // Flush even on failure so the partial file is complete on disk.
        let flushed = file
            .flush()
            .await
            .map_err(|e| FtpError::local(local_path, e));
        let written = copied?;
        flushed?;

        if last_percent != Some(100) {
            progress::report(on_progress, 100);
        }

        tracing::info!(
            remote = %remote_path,
            local = %local_path.display(),
            bytes = written,
            "Download complete"
        );
        Ok(written)
    }

    #[allow(clippy::too_many_arguments)]
    async fn copy_chunks(
        &self,
        remote: &mut RemoteFile,
        file: &mut File,
        local_path: &Path,
        total: Option<u64>,
        cancel: &CancellationToken,
        on_progress: Option<&dyn ProgressSink<u8>>,
        last_percent: &mut Option<u8>,
    ) -> Result<u64> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut written: u64 = 0;

        loop {
            let n = remote.read_chunk(&mut buf, cancel).await?;
            if n == 0 {
                return Ok(written);
            }
            if cancel.is_cancelled() {
                return Err(FtpError::Cancelled);
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| FtpError::local(local_path, e))?;
            written += n as u64;

            if let Some(total) = total {
                let percent = (written.saturating_mul(100) / total).min(100) as u8;
                if *last_percent != Some(percent) {
                    *last_percent = Some(percent);
                    progress::report(on_progress, percent);
                }
            }
        }
    }
}

/// Create or truncate `path` for writing, denying other handles where the
/// platform allows it.
async fn open_destination(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(windows)]
    options.share_mode(0);
    options.open(path).await
}
