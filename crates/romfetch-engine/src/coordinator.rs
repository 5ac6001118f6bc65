use crate::connection::ConnectionManager;
use crate::copy::{copy_file, CopyOutcome, ThroughputMeter};
use crate::error::TransferError;
use crate::walker::{RecursiveFolderWalker, WalkEvent};
use parking_lot::Mutex;
use romfetch_core::config::{HistoryLog, TransferConfig};
use romfetch_core::models::{
    BackendKind, BatchState, BatchSummary, Eta, HistoryRecord, TransferJob, TransferProgress,
    TransferState,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Progress and lifecycle events of one batch, in order.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    BatchStarted {
        total_jobs: usize,
    },
    JobStarted {
        job_index: usize,
        job: TransferJob,
    },
    /// Throttled snapshot of the running job.
    Progress(TransferProgress),
    /// A file inside a folder job could not be copied.
    FileSkipped {
        job_index: usize,
        path: String,
        error: String,
    },
    JobFinished {
        job_index: usize,
        progress: TransferProgress,
        error: Option<String>,
    },
    BatchFinished(BatchSummary),
}

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub remote_chunk_size: usize,
    pub local_chunk_size: usize,
    pub progress_interval: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            remote_chunk_size: 512 * 1024,
            local_chunk_size: 128 * 1024,
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl From<&TransferConfig> for TransferSettings {
    fn from(config: &TransferConfig) -> Self {
        Self {
            remote_chunk_size: config.remote_chunk_size,
            local_chunk_size: config.local_chunk_size,
            progress_interval: config.progress_interval(),
        }
    }
}

/// A running batch.
pub struct BatchHandle {
    pub events: mpsc::UnboundedReceiver<TransferEvent>,
    pub task: JoinHandle<BatchSummary>,
    cancel: CancellationToken,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct Shared {
    conn: Arc<ConnectionManager>,
    history: Arc<HistoryLog>,
    settings: TransferSettings,
    state: Mutex<BatchState>,
    downloading: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Runs batches of transfer jobs one job at a time.
#[derive(Clone)]
pub struct TransferCoordinator {
    shared: Arc<Shared>,
}

impl TransferCoordinator {
    pub fn new(
        conn: Arc<ConnectionManager>,
        history: Arc<HistoryLog>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn,
                history,
                settings,
                state: Mutex::new(BatchState::Idle),
                downloading: AtomicBool::new(false),
                cancel: Mutex::new(None),
            }),
        }
    }

    /// Start `jobs` on a background task. Fails while another batch runs.
    pub fn start_batch(&self, jobs: Vec<TransferJob>) -> Result<BatchHandle, TransferError> {
        let token = CancellationToken::new();
        {
            let mut state = self.shared.state.lock();
            if *state == BatchState::Running {
                return Err(TransferError::AlreadyRunning);
            }
            *state = BatchState::Running;
            *self.shared.cancel.lock() = Some(token.clone());
            self.shared.downloading.store(true, Ordering::SeqCst);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = self.shared.clone();
        let run_token = token.clone();
        let task = tokio::spawn(async move {
            let summary = BatchRun::new(shared.clone(), jobs, tx.clone(), run_token)
                .run()
                .await;
            shared.downloading.store(false, Ordering::SeqCst);
            *shared.cancel.lock() = None;
            *shared.state.lock() = BatchState::Idle;
            let _ = tx.send(TransferEvent::BatchFinished(summary.clone()));
            summary
        });

        Ok(BatchHandle {
            events: rx,
            task,
            cancel: token,
        })
    }

    /// Request cancellation of the running batch, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.shared.cancel.lock().as_ref() {
            info!("Cancelling batch");
            token.cancel();
        }
    }

    pub fn state(&self) -> BatchState {
        *self.shared.state.lock()
    }

    /// Whether a batch is running. Read without locking by background
    /// workers that should stay off the session meanwhile.
    pub fn is_downloading(&self) -> bool {
        self.shared.downloading.load(Ordering::Relaxed)
    }
}

struct JobResult {
    state: TransferState,
    bytes: u64,
    files: u64,
    error: Option<TransferError>,
}

struct BatchRun {
    shared: Arc<Shared>,
    jobs: Vec<TransferJob>,
    tx: mpsc::UnboundedSender<TransferEvent>,
    cancel: CancellationToken,
    batch_bytes: u64,
    batch_files: u64,
}

impl BatchRun {
    fn new(
        shared: Arc<Shared>,
        jobs: Vec<TransferJob>,
        tx: mpsc::UnboundedSender<TransferEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared,
            jobs,
            tx,
            cancel,
            batch_bytes: 0,
            batch_files: 0,
        }
    }

    fn send(&self, event: TransferEvent) {
        let _ = self.tx.send(event);
    }

    async fn run(mut self) -> BatchSummary {
        let started = Instant::now();
        let total_jobs = self.jobs.len();
        let mut jobs_completed = 0;
        let mut jobs_failed = 0;
        let mut cancelled = false;

        info!("Starting batch of {} item(s)", total_jobs);
        self.send(TransferEvent::BatchStarted { total_jobs });

        let jobs = std::mem::take(&mut self.jobs);
        for (index, job) in jobs.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.send(TransferEvent::JobStarted {
                job_index: index,
                job: job.clone(),
            });
            info!(
                "[{}/{}] {} -> {}",
                index + 1,
                total_jobs,
                job.source_path,
                job.destination_path().display()
            );

            let mut reporter = JobReporter::new(
                self.tx.clone(),
                index,
                total_jobs,
                self.batch_bytes,
                self.batch_files,
                self.shared.settings.progress_interval,
            );
            reporter.queued();
            let result = if job.is_folder {
                self.run_folder(job, &mut reporter).await
            } else {
                self.run_file(job, &mut reporter).await
            };

            match result.state {
                TransferState::Completed => {
                    jobs_completed += 1;
                    self.batch_bytes += result.bytes;
                    self.batch_files += result.files;
                    let record = HistoryRecord::new(
                        &job.display_name,
                        &job.source_path,
                        &job.destination_path().to_string_lossy(),
                        result.bytes,
                    );
                    if let Err(e) = self.shared.history.append(record) {
                        warn!("Could not record history for {}: {}", job.display_name, e);
                    }
                }
                TransferState::Cancelled => {
                    self.batch_bytes += result.bytes;
                    self.batch_files += result.files;
                    cancelled = true;
                }
                _ => {
                    jobs_failed += 1;
                    if let Some(e) = &result.error {
                        error!("[{}/{}] {} failed: {}", index + 1, total_jobs, job.display_name, e);
                    }
                }
            }

            let progress = reporter.finish(&result, self.batch_bytes, self.batch_files);
            self.send(TransferEvent::JobFinished {
                job_index: index,
                progress,
                error: result.error.map(|e| e.to_string()),
            });

            if cancelled {
                break;
            }
        }

        let summary = BatchSummary {
            state: if cancelled {
                BatchState::Cancelled
            } else {
                BatchState::Completed
            },
            total_jobs,
            jobs_completed,
            jobs_failed,
            total_bytes: self.batch_bytes,
            elapsed: started.elapsed(),
        };

        if cancelled {
            info!("Batch cancelled after {} bytes", self.batch_bytes);
        } else {
            info!("{}", summary.summary_line());
        }
        summary
    }

    fn chunk_size(&self) -> usize {
        let kind = self
            .shared
            .conn
            .connection()
            .map(|c| c.backend)
            .unwrap_or(BackendKind::Remote);
        match kind {
            BackendKind::Remote => self.shared.settings.remote_chunk_size,
            BackendKind::Local => self.shared.settings.local_chunk_size,
        }
    }

    async fn run_file(&self, job: &TransferJob, reporter: &mut JobReporter) -> JobResult {
        let conn = &self.shared.conn;
        let size = {
            let stat = match conn.ensure_live().await {
                Ok(mut session) => session.stat(&job.source_path).await.map_err(|e| {
                    TransferError::Source {
                        path: job.source_path.clone(),
                        reason: e.to_string(),
                    }
                }),
                Err(e) => Err(e.into()),
            };
            match stat {
                Ok(meta) => meta.size,
                Err(e) => return JobResult::failed(e),
            }
        };
        reporter.begin(size, 1);

        let dest = job.destination_path();
        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return JobResult::failed(TransferError::Destination {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let outcome = copy_file(
            conn,
            &job.source_path,
            &dest,
            self.chunk_size(),
            Some(&self.cancel),
            |done| reporter.update(done, 0),
        )
        .await;

        match outcome {
            Ok(CopyOutcome::Completed(bytes)) => JobResult {
                state: TransferState::Completed,
                bytes,
                files: 1,
                error: None,
            },
            Ok(CopyOutcome::Cancelled(bytes)) => JobResult {
                state: TransferState::Cancelled,
                bytes,
                files: 0,
                error: None,
            },
            Err(e) => JobResult::failed(e),
        }
    }

    async fn run_folder(&self, job: &TransferJob, reporter: &mut JobReporter) -> JobResult {
        let walker = RecursiveFolderWalker::new(&self.shared.conn, self.chunk_size());
        let plan = match walker.enumerate(&job.source_path).await {
            Ok(plan) => plan,
            Err(e) => return JobResult::failed(e),
        };
        reporter.begin(plan.total_bytes, plan.files.len() as u64);

        let mut bytes = 0u64;
        let mut files = 0u64;
        let report = walker
            .mirror(&plan, &job.destination_path(), &self.cancel, |event| match event {
                WalkEvent::FileCopied { bytes: n, .. } => {
                    bytes += n;
                    files += 1;
                    reporter.update(bytes, files);
                }
                WalkEvent::FileSkipped { file, error } => {
                    reporter.file_skipped(&file.source, &error);
                }
            })
            .await;

        match report {
            Ok(report) => JobResult {
                state: if report.cancelled {
                    TransferState::Cancelled
                } else {
                    TransferState::Completed
                },
                bytes: report.bytes_copied,
                files: report.files_copied,
                error: None,
            },
            Err(e) => JobResult::failed(e),
        }
    }
}

impl JobResult {
    fn failed(error: TransferError) -> Self {
        Self {
            state: TransferState::Failed,
            bytes: 0,
            files: 0,
            error: Some(error),
        }
    }
}

/// Builds and throttles progress snapshots for one job.
///
/// Batch counters stay at the value the job started from until the job
/// ends, so they never move backwards when the job fails.
struct JobReporter {
    tx: mpsc::UnboundedSender<TransferEvent>,
    job_index: usize,
    total_jobs: usize,
    base_bytes: u64,
    base_files: u64,
    bytes_total: u64,
    files_total: u64,
    last_bytes: u64,
    last_files: u64,
    interval: Duration,
    meter: ThroughputMeter,
}

impl JobReporter {
    fn new(
        tx: mpsc::UnboundedSender<TransferEvent>,
        job_index: usize,
        total_jobs: usize,
        base_bytes: u64,
        base_files: u64,
        interval: Duration,
    ) -> Self {
        Self {
            tx,
            job_index,
            total_jobs,
            base_bytes,
            base_files,
            bytes_total: 0,
            files_total: 0,
            last_bytes: 0,
            last_files: 0,
            interval,
            meter: ThroughputMeter::new(interval),
        }
    }

    /// Announce the job before its size is known.
    fn queued(&self) {
        self.emit(0, 0, TransferState::Queued);
    }

    fn begin(&mut self, bytes_total: u64, files_total: u64) {
        self.bytes_total = bytes_total;
        self.files_total = files_total;
        self.meter = ThroughputMeter::new(self.interval);
        self.meter.should_emit();
        self.emit(0, 0, TransferState::InProgress);
    }

    fn update(&mut self, bytes_done: u64, files_done: u64) {
        self.last_bytes = bytes_done;
        self.last_files = files_done;
        if self.meter.should_emit() {
            self.emit(bytes_done, files_done, TransferState::InProgress);
        }
    }

    fn file_skipped(&self, path: &str, error: &TransferError) {
        let _ = self.tx.send(TransferEvent::FileSkipped {
            job_index: self.job_index,
            path: path.to_string(),
            error: error.to_string(),
        });
    }

    fn emit(&self, bytes_done: u64, files_done: u64, state: TransferState) {
        let progress = self.snapshot(
            bytes_done,
            files_done,
            state,
            self.base_bytes,
            self.base_files,
        );
        let _ = self.tx.send(TransferEvent::Progress(progress));
    }

    /// Terminal snapshot, carrying the batch counters after this job.
    ///
    /// A failed job keeps the per-job counters it last reached.
    fn finish(&self, result: &JobResult, batch_bytes: u64, batch_files: u64) -> TransferProgress {
        let (bytes_done, files_done) = match result.state {
            TransferState::Failed => (
                self.last_bytes.max(result.bytes),
                self.last_files.max(result.files),
            ),
            _ => (result.bytes, result.files),
        };
        self.snapshot(bytes_done, files_done, result.state, batch_bytes, batch_files)
    }

    fn snapshot(
        &self,
        bytes_done: u64,
        files_done: u64,
        state: TransferState,
        batch_bytes: u64,
        batch_files: u64,
    ) -> TransferProgress {
        let speed = self.meter.speed(bytes_done);
        TransferProgress {
            job_index: self.job_index,
            total_jobs: self.total_jobs,
            bytes_done,
            bytes_total: self.bytes_total,
            files_done,
            files_total: self.files_total,
            batch_bytes_done: batch_bytes,
            batch_files_done: batch_files,
            speed_bytes_per_sec: speed,
            eta: Eta::from_rate(self.bytes_total.saturating_sub(bytes_done), speed),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SystemConnector;
    use crate::test_support::FakeRemote;
    use romfetch_core::models::ConnectTarget;
    use romfetch_ssh::SshClient;
    use std::path::Path;

    fn settings() -> TransferSettings {
        TransferSettings {
            remote_chunk_size: 512 * 1024,
            local_chunk_size: 128 * 1024,
            progress_interval: Duration::ZERO,
        }
    }

    async fn coordinator(remote: &FakeRemote, dir: &Path) -> (TransferCoordinator, Arc<HistoryLog>) {
        coordinator_with(remote, dir, settings()).await
    }

    async fn coordinator_with(
        remote: &FakeRemote,
        dir: &Path,
        settings: TransferSettings,
    ) -> (TransferCoordinator, Arc<HistoryLog>) {
        let conn = Arc::new(ConnectionManager::new(
            remote.connector(),
            Duration::from_secs(5),
        ));
        conn.connect(remote.target(), None).await.unwrap();
        let history = Arc::new(HistoryLog::open(dir.join("history.json")));
        (
            TransferCoordinator::new(conn, history.clone(), settings),
            history,
        )
    }

    async fn drain(handle: BatchHandle) -> (Vec<TransferEvent>, BatchSummary) {
        let BatchHandle {
            mut events, task, ..
        } = handle;
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        (seen, task.await.unwrap())
    }

    fn finished(events: &[TransferEvent]) -> Vec<(TransferProgress, Option<String>)> {
        events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::JobFinished {
                    progress, error, ..
                } => Some((progress.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batch_of_three_files() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/a.bin", vec![1; 10_000_000]);
        remote.add_file("/roms/b.bin", vec![2; 15_000_000]);
        remote.add_file("/roms/c.bin", vec![3; 5_000_000]);
        let out = tempfile::tempdir().unwrap();
        let (coord, history) = coordinator(&remote, out.path()).await;

        let jobs = ["a.bin", "b.bin", "c.bin"]
            .iter()
            .map(|n| TransferJob::file(format!("/roms/{}", n), *n, out.path().to_path_buf()))
            .collect();
        let handle = coord.start_batch(jobs).unwrap();
        let (events, summary) = drain(handle).await;

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.jobs_completed, 3);
        assert_eq!(summary.jobs_failed, 0);
        assert_eq!(summary.total_bytes, 30_000_000);

        let mut last_batch_bytes = 0;
        for event in &events {
            if let TransferEvent::Progress(p) = event {
                assert!(p.batch_bytes_done >= last_batch_bytes);
                assert!(p.bytes_done <= p.bytes_total);
                last_batch_bytes = p.batch_bytes_done;
            }
        }

        let done = finished(&events);
        let batch_files: Vec<_> = done.iter().map(|(p, _)| p.batch_files_done).collect();
        assert_eq!(batch_files, vec![1, 2, 3]);
        assert!(done.iter().all(|(p, e)| p.state == TransferState::Completed && e.is_none()));
        assert_eq!(done[2].0.batch_bytes_done, 30_000_000);

        assert_eq!(history.len(), 3);
        assert_eq!(std::fs::metadata(out.path().join("b.bin")).unwrap().len(), 15_000_000);
        assert_eq!(coord.state(), BatchState::Idle);
        assert!(!coord.is_downloading());
        assert!(matches!(events.last(), Some(TransferEvent::BatchFinished(_))));
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_batch() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/a.bin", vec![1; 1000]);
        remote.add_file("/roms/c.bin", vec![3; 3000]);
        let out = tempfile::tempdir().unwrap();
        let (coord, history) = coordinator(&remote, out.path()).await;

        let jobs = vec![
            TransferJob::file("/roms/a.bin", "a.bin", out.path().to_path_buf()),
            TransferJob::file("/roms/missing.bin", "missing.bin", out.path().to_path_buf()),
            TransferJob::file("/roms/c.bin", "c.bin", out.path().to_path_buf()),
        ];
        let (events, summary) = drain(coord.start_batch(jobs).unwrap()).await;

        assert_eq!(summary.jobs_completed, 2);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.total_bytes, 4000);

        let done = finished(&events);
        assert_eq!(done[1].0.state, TransferState::Failed);
        assert!(done[1].1.is_some());
        assert_eq!(done[1].0.batch_bytes_done, 1000);
        assert_eq!(done[2].0.batch_files_done, 2);
        assert_eq!(history.len(), 2);
        assert!(!out.path().join("missing.bin").exists());
    }

    #[tokio::test]
    async fn test_cancel_stops_mid_file_and_skips_rest() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/a.bin", vec![1; 10 * 1024 * 1024]);
        remote.add_file("/roms/b.bin", vec![2; 1024]);
        let out = tempfile::tempdir().unwrap();
        let (coord, history) = coordinator(&remote, out.path()).await;

        let jobs = vec![
            TransferJob::file("/roms/a.bin", "a.bin", out.path().to_path_buf()),
            TransferJob::file("/roms/b.bin", "b.bin", out.path().to_path_buf()),
        ];
        let mut handle = coord.start_batch(jobs).unwrap();
        let mut events = Vec::new();
        while let Some(event) = handle.events.recv().await {
            if let TransferEvent::Progress(p) = &event {
                if p.bytes_done > 0 {
                    coord.cancel();
                }
            }
            events.push(event);
        }
        let summary = handle.task.await.unwrap();

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.jobs_completed, 0);
        assert!(summary.total_bytes < 10 * 1024 * 1024);
        assert!(remote.bytes_served() < 10 * 1024 * 1024);
        assert!(out.path().join("a.bin").exists());
        assert!(!out.path().join("b.bin").exists());
        assert!(history.is_empty());

        let mut last_bytes = 0;
        for event in &events {
            if let TransferEvent::Progress(p) = event {
                assert_eq!(p.job_index, 0);
                assert!(p.bytes_done >= last_bytes);
                last_bytes = p.bytes_done;
            }
        }
        let done = finished(&events);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0.state, TransferState::Cancelled);
        assert!(done[0].0.bytes_done >= last_bytes);
        assert_eq!(done[0].0.batch_bytes_done, summary.total_bytes);
        assert!(matches!(events.last(), Some(TransferEvent::BatchFinished(_))));
        assert_eq!(coord.state(), BatchState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_before_first_job_runs_nothing() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/a.bin", vec![1; 4096]);
        let out = tempfile::tempdir().unwrap();
        let (coord, history) = coordinator(&remote, out.path()).await;

        let jobs = vec![TransferJob::file("/roms/a.bin", "a.bin", out.path().to_path_buf())];
        let handle = coord.start_batch(jobs).unwrap();
        coord.cancel();
        let (events, summary) = drain(handle).await;

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.total_bytes, 0);
        assert_eq!(summary.jobs_completed, 0);
        assert!(events.iter().all(|e| matches!(
            e,
            TransferEvent::BatchStarted { .. } | TransferEvent::BatchFinished(_)
        )));
        assert!(!out.path().join("a.bin").exists());
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_batch_counters_never_drop_when_job_fails() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/ok.bin", vec![1; 1000]);
        remote.add_file("/roms/big.bin", vec![2; 2 * 1024 * 1024]);
        remote.drop_after("/roms/big.bin", 512 * 1024);
        let out = tempfile::tempdir().unwrap();
        let settings = TransferSettings {
            remote_chunk_size: 64 * 1024,
            ..settings()
        };
        let (coord, _history) = coordinator_with(&remote, out.path(), settings).await;

        let jobs = vec![
            TransferJob::file("/roms/ok.bin", "ok.bin", out.path().to_path_buf()),
            TransferJob::file("/roms/big.bin", "big.bin", out.path().to_path_buf()),
        ];
        let (events, summary) = drain(coord.start_batch(jobs).unwrap()).await;
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.total_bytes, 1000);

        let mut last: Option<(usize, u64, u64, u64)> = None;
        let mut saw_partial = false;
        for event in &events {
            let p = match event {
                TransferEvent::Progress(p) => p,
                TransferEvent::JobFinished { progress, .. } => progress,
                _ => continue,
            };
            if p.job_index == 1 && p.bytes_done > 0 {
                saw_partial = true;
            }
            if let Some((index, batch_bytes, batch_files, bytes)) = last {
                assert!(p.batch_bytes_done >= batch_bytes);
                assert!(p.batch_files_done >= batch_files);
                if index == p.job_index {
                    assert!(p.bytes_done >= bytes);
                }
            }
            last = Some((p.job_index, p.batch_bytes_done, p.batch_files_done, p.bytes_done));
        }
        assert!(saw_partial);

        let done = finished(&events);
        assert_eq!(done[1].0.state, TransferState::Failed);
        assert_eq!(done[1].0.batch_bytes_done, 1000);
        assert_eq!(done[1].0.batch_files_done, 1);
        assert!(done[1].0.bytes_done >= 64 * 1024);
    }

    #[tokio::test]
    async fn test_job_announced_as_queued_first() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/a.bin", vec![1; 100]);
        let out = tempfile::tempdir().unwrap();
        let (coord, _history) = coordinator(&remote, out.path()).await;

        let jobs = vec![TransferJob::file("/roms/a.bin", "a.bin", out.path().to_path_buf())];
        let (events, _) = drain(coord.start_batch(jobs).unwrap()).await;
        let states: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::Progress(p) => Some(p.state),
                _ => None,
            })
            .collect();
        assert_eq!(states.first(), Some(&TransferState::Queued));
        assert!(states[1..].iter().all(|s| *s == TransferState::InProgress));
    }

    #[tokio::test]
    async fn test_local_share_batch_uses_local_chunk_size() {
        let share = tempfile::tempdir().unwrap();
        std::fs::write(share.path().join("game.bin"), vec![7u8; 100]).unwrap();
        std::fs::create_dir_all(share.path().join("A").join("B")).unwrap();
        std::fs::write(share.path().join("A").join("B").join("file.bin"), b"nested").unwrap();
        let out = tempfile::tempdir().unwrap();

        let connector = Arc::new(SystemConnector::new(SshClient::default()));
        let conn = Arc::new(ConnectionManager::new(connector, Duration::from_secs(5)));
        conn.connect(
            ConnectTarget::Local {
                root: share.path().to_path_buf(),
            },
            None,
        )
        .await
        .unwrap();
        let history = Arc::new(HistoryLog::open(out.path().join("history.json")));
        let settings = TransferSettings {
            remote_chunk_size: 1024 * 1024,
            local_chunk_size: 10,
            progress_interval: Duration::ZERO,
        };
        let coord = TransferCoordinator::new(conn, history.clone(), settings);

        let source = |name: &str| share.path().join(name).to_string_lossy().into_owned();
        let dest = out.path().join("saves");
        let jobs = vec![
            TransferJob::file(source("game.bin"), "game.bin", dest.clone()),
            TransferJob::folder(source("A"), "A", dest.clone()),
        ];
        let (events, summary) = drain(coord.start_batch(jobs).unwrap()).await;

        assert_eq!(summary.state, BatchState::Completed);
        assert_eq!(summary.jobs_completed, 2);
        assert_eq!(summary.total_bytes, 106);
        let chunks = events
            .iter()
            .filter(|e| matches!(e, TransferEvent::Progress(p) if p.job_index == 0 && p.bytes_done > 0))
            .count();
        assert_eq!(chunks, 10);
        assert_eq!(std::fs::read(dest.join("game.bin")).unwrap(), vec![7u8; 100]);
        assert_eq!(
            std::fs::read(dest.join("A").join("B").join("file.bin")).unwrap(),
            b"nested"
        );
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_session_fails_job_then_reconnects() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/big.bin", vec![9; 5 * 1024 * 1024]);
        remote.add_file("/roms/next.bin", vec![1; 2048]);
        remote.drop_after("/roms/big.bin", 1024 * 1024);
        let out = tempfile::tempdir().unwrap();
        let (coord, history) = coordinator(&remote, out.path()).await;

        let jobs = vec![
            TransferJob::file("/roms/big.bin", "big.bin", out.path().to_path_buf()),
            TransferJob::file("/roms/next.bin", "next.bin", out.path().to_path_buf()),
        ];
        let (events, summary) = drain(coord.start_batch(jobs).unwrap()).await;

        let done = finished(&events);
        assert_eq!(done[0].0.state, TransferState::Failed);
        assert_eq!(done[1].0.state, TransferState::Completed);
        assert_eq!(summary.jobs_failed, 1);
        assert_eq!(summary.total_bytes, 2048);
        assert_eq!(remote.connect_count(), 2);
        assert!(!out.path().join("big.bin").exists());
        assert_eq!(history.list()[0].name, "next.bin");
    }

    #[tokio::test]
    async fn test_folder_job_reports_skipped_files() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/psx/A/1.bin", vec![1; 100]);
        remote.add_file("/roms/psx/A/B/2.bin", vec![2; 200]);
        remote.add_file("/roms/psx/A/3.bin", vec![3; 300]);
        remote.make_unreadable("/roms/psx/A/3.bin");
        let out = tempfile::tempdir().unwrap();
        let (coord, history) = coordinator(&remote, out.path()).await;

        let jobs = vec![TransferJob::folder("/roms/psx/A", "A", out.path().to_path_buf())];
        let (events, summary) = drain(coord.start_batch(jobs).unwrap()).await;

        assert_eq!(summary.jobs_completed, 1);
        assert_eq!(summary.total_bytes, 300);
        let skipped: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TransferEvent::FileSkipped { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec!["/roms/psx/A/3.bin".to_string()]);

        let done = finished(&events);
        assert_eq!(done[0].0.files_total, 3);
        assert_eq!(done[0].0.files_done, 2);
        assert_eq!(done[0].0.bytes_total, 600);
        assert!(out.path().join("A").join("B").join("2.bin").exists());
        assert_eq!(history.list()[0].size_bytes, 300);
    }

    #[tokio::test]
    async fn test_second_batch_rejected_while_running() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/a.bin", vec![1; 4 * 1024 * 1024]);
        let out = tempfile::tempdir().unwrap();
        let (coord, _history) = coordinator(&remote, out.path()).await;

        let job = TransferJob::file("/roms/a.bin", "a.bin", out.path().to_path_buf());
        let handle = coord.start_batch(vec![job.clone()]).unwrap();
        assert!(coord.is_downloading());
        assert!(matches!(
            coord.start_batch(vec![job.clone()]),
            Err(TransferError::AlreadyRunning)
        ));

        drain(handle).await;
        assert!(!coord.is_downloading());
        let (_, summary) = drain(coord.start_batch(vec![job]).unwrap()).await;
        assert_eq!(summary.jobs_completed, 1);
    }
}
