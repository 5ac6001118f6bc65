use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One item of a batch: a file or a folder to copy into `destination_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferJob {
    pub source_path: String,
    pub display_name: String,
    pub is_folder: bool,
    pub destination_dir: PathBuf,
}

impl TransferJob {
    pub fn file(source_path: impl Into<String>, name: impl Into<String>, dest: PathBuf) -> Self {
        Self {
            source_path: source_path.into(),
            display_name: name.into(),
            is_folder: false,
            destination_dir: dest,
        }
    }

    pub fn folder(source_path: impl Into<String>, name: impl Into<String>, dest: PathBuf) -> Self {
        Self {
            source_path: source_path.into(),
            display_name: name.into(),
            is_folder: true,
            destination_dir: dest,
        }
    }

    /// Where the copied file (or the mirrored folder root) ends up.
    pub fn destination_path(&self) -> PathBuf {
        self.destination_dir.join(&self.display_name)
    }
}

/// Jobs whose destination already exists, so the caller can confirm an overwrite.
pub fn existing_destinations(jobs: &[TransferJob]) -> Vec<&TransferJob> {
    jobs.iter()
        .filter(|job| job.destination_path().exists())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferState {
    Queued,
    InProgress,
    Completed,
    Cancelled,
    Failed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Completed | TransferState::Cancelled | TransferState::Failed
        )
    }
}

/// Estimated time remaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Eta {
    #[default]
    Unknown,
    Seconds(u64),
}

impl Eta {
    /// ETA from the bytes still to go and the current throughput. A
    /// non-positive or non-finite rate gives `Unknown`.
    pub fn from_rate(bytes_remaining: u64, bytes_per_sec: f64) -> Self {
        if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
            return Eta::Unknown;
        }
        Eta::Seconds((bytes_remaining as f64 / bytes_per_sec) as u64)
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::Unknown => write!(f, "..."),
            Eta::Seconds(s) if *s < 60 => write!(f, "{}s", s),
            Eta::Seconds(s) if *s < 3600 => write!(f, "{}m", s / 60),
            Eta::Seconds(s) => write!(f, "{}h", s / 3600),
        }
    }
}

/// Snapshot of a running (or just finished) job.
///
/// `bytes_*` and `files_*` count the current job. `batch_bytes_done` and
/// `batch_files_done` count the jobs already finished and only move when a
/// job completes or is cancelled, so a failed job never shows up in them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub job_index: usize,
    pub total_jobs: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub files_done: u64,
    pub files_total: u64,
    pub batch_bytes_done: u64,
    pub batch_files_done: u64,
    pub speed_bytes_per_sec: f64,
    pub eta: Eta,
    pub state: TransferState,
}

impl TransferProgress {
    /// Job progress percentage (0..100). Folder jobs count files, file jobs count bytes.
    pub fn percent(&self) -> f64 {
        if self.files_total > 1 {
            return (self.files_done as f64 / self.files_total as f64 * 100.0).min(100.0);
        }
        if self.bytes_total == 0 {
            return if self.state == TransferState::Completed {
                100.0
            } else {
                0.0
            };
        }
        (self.bytes_done as f64 / self.bytes_total as f64 * 100.0).min(100.0)
    }

    pub fn speed_mbps(&self) -> f64 {
        self.speed_bytes_per_sec / (1024.0 * 1024.0)
    }

    /// One-line status, `[2/5] 40% | 12.5 MB/s | ETA: 3m`.
    pub fn status_line(&self) -> String {
        format!(
            "[{}/{}] {:.0}% | {:.1} MB/s | ETA: {}",
            self.job_index + 1,
            self.total_jobs,
            self.percent(),
            self.speed_mbps(),
            self.eta
        )
    }
}

/// A completed transfer, as kept in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub name: String,
    pub source: String,
    pub dest: String,
    pub size_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(name: &str, source: &str, dest: &str, size_bytes: u64) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            dest: dest.to_string(),
            size_bytes,
            timestamp: Utc::now(),
        }
    }
}

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Final report of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub state: BatchState,
    pub total_jobs: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Total bytes over total elapsed time; zero when no time has passed.
    pub fn average_speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_bytes as f64 / secs
        } else {
            0.0
        }
    }

    pub fn summary_line(&self) -> String {
        match self.state {
            BatchState::Cancelled => format!(
                "Cancelled after {}/{} item(s)",
                self.jobs_completed, self.total_jobs
            ),
            _ => format!(
                "Complete! {} item(s) | {} failed | Avg: {:.1} MB/s",
                self.total_jobs,
                self.jobs_failed,
                self.average_speed() / (1024.0 * 1024.0)
            ),
        }
    }
}
