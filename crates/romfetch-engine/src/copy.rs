use crate::connection::ConnectionManager;
use crate::error::TransferError;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a file copy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Completed(u64),
    /// Stopped at a chunk boundary; the partial file is kept.
    Cancelled(u64),
}

impl CopyOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            CopyOutcome::Completed(n) | CopyOutcome::Cancelled(n) => *n,
        }
    }
}

/// Cumulative-average throughput since a job started, plus emit throttling.
pub struct ThroughputMeter {
    started: Instant,
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ThroughputMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            interval,
            last_emit: None,
        }
    }

    /// Bytes per second so far; zero before any time has passed.
    pub fn speed(&self, bytes_done: u64) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            bytes_done as f64 / elapsed
        } else {
            0.0
        }
    }

    /// True at most once per interval.
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        match self.last_emit {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_emit = Some(now);
                true
            }
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Copy one source file to `dest` in `chunk_size` pieces.
///
/// The file is opened after a liveness check; every chunk read holds the
/// session lock. With a `cancel` token the copy stops between chunks.
/// On error the partial destination file is removed.
pub async fn copy_file<F>(
    conn: &ConnectionManager,
    source: &str,
    dest: &Path,
    chunk_size: usize,
    cancel: Option<&CancellationToken>,
    mut on_chunk: F,
) -> Result<CopyOutcome, TransferError>
where
    F: FnMut(u64),
{
    let mut stream = {
        let mut session = conn.ensure_live().await?;
        session
            .open_read(source)
            .await
            .map_err(|e| TransferError::Source {
                path: source.to_string(),
                reason: e.to_string(),
            })?
    };

    let mut dst = tokio::fs::File::create(dest)
        .await
        .map_err(|e| dest_error(dest, e))?;

    let result: Result<CopyOutcome, TransferError> = async {
        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut done = 0u64;
        loop {
            if cancel.is_some_and(|t| t.is_cancelled()) {
                dst.flush().await.map_err(|e| dest_error(dest, e))?;
                debug!("Copy of {} cancelled after {} bytes", source, done);
                return Ok(CopyOutcome::Cancelled(done));
            }

            let n = {
                let _session = conn.exclusive().await?;
                stream
                    .read(&mut buf)
                    .await
                    .map_err(|e| TransferError::Source {
                        path: source.to_string(),
                        reason: e.to_string(),
                    })?
            };
            if n == 0 {
                break;
            }

            dst.write_all(&buf[..n])
                .await
                .map_err(|e| dest_error(dest, e))?;
            done += n as u64;
            on_chunk(done);
        }
        dst.flush().await.map_err(|e| dest_error(dest, e))?;
        Ok(CopyOutcome::Completed(done))
    }
    .await;

    if result.is_err() {
        drop(dst);
        if let Err(e) = tokio::fs::remove_file(dest).await {
            warn!("Could not remove partial file {}: {}", dest.display(), e);
        }
    }
    result
}

fn dest_error(dest: &Path, e: std::io::Error) -> TransferError {
    TransferError::Destination {
        path: dest.display().to_string(),
        reason: e.to_string(),
    }
}
