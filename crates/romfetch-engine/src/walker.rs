use crate::connection::ConnectionManager;
use crate::copy::copy_file;
use crate::error::TransferError;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A file found under the folder root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub source: String,
    /// Path below the folder root, used to mirror the layout.
    pub relative: PathBuf,
    pub size: u64,
}

/// Everything a folder copy will transfer, known before the first byte moves.
#[derive(Debug, Clone, Default)]
pub struct TreePlan {
    pub files: Vec<TreeFile>,
    pub total_bytes: u64,
}

pub enum WalkEvent<'a> {
    FileCopied { file: &'a TreeFile, bytes: u64 },
    FileSkipped { file: &'a TreeFile, error: TransferError },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorReport {
    pub files_copied: u64,
    pub bytes_copied: u64,
    pub cancelled: bool,
}

/// Enumerates a source folder and mirrors it file by file.
pub struct RecursiveFolderWalker<'a> {
    conn: &'a ConnectionManager,
    chunk_size: usize,
}

impl<'a> RecursiveFolderWalker<'a> {
    pub fn new(conn: &'a ConnectionManager, chunk_size: usize) -> Self {
        Self { conn, chunk_size }
    }

    /// List the whole tree under `root`. An unreadable root is an error;
    /// unreadable subfolders are logged and left out.
    pub async fn enumerate(&self, root: &str) -> Result<TreePlan, TransferError> {
        let mut plan = TreePlan::default();
        let mut pending = vec![(root.to_string(), PathBuf::new())];

        while let Some((dir, relative)) = pending.pop() {
            let mut session = self.conn.ensure_live().await?;
            let raw = match session.read_dir(&dir).await {
                Ok(raw) => raw,
                Err(e) if relative.as_os_str().is_empty() => {
                    return Err(TransferError::Source {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Skipping unreadable folder {}: {}", dir, e);
                    continue;
                }
            };

            let mut entries: Vec<_> = raw
                .into_iter()
                .filter(|e| e.name != "." && e.name != "..")
                .collect();
            entries.sort_by(|a, b| b.name.cmp(&a.name));

            for entry in entries {
                let Some(meta) = entry.meta else {
                    warn!("Skipping {} in {}: no attributes", entry.name, dir);
                    continue;
                };
                let source = session.join(&dir, &entry.name);
                let rel = relative.join(&entry.name);
                if meta.is_dir {
                    pending.push((source, rel));
                } else {
                    plan.total_bytes += meta.size;
                    plan.files.push(TreeFile {
                        source,
                        relative: rel,
                        size: meta.size,
                    });
                }
            }
        }

        plan.files.sort_by(|a, b| a.relative.cmp(&b.relative));
        info!(
            "Found {} files ({} bytes) under {}",
            plan.files.len(),
            plan.total_bytes,
            root
        );
        Ok(plan)
    }

    /// Copy every planned file below `dest_root`, one at a time.
    ///
    /// `dest_root` itself is created up front; subfolders are created just
    /// before their first file. A failing file is reported and skipped.
    /// Cancellation is checked before each file.
    pub async fn mirror<F>(
        &self,
        plan: &TreePlan,
        dest_root: &Path,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<MirrorReport, TransferError>
    where
        F: FnMut(WalkEvent<'_>),
    {
        tokio::fs::create_dir_all(dest_root)
            .await
            .map_err(|e| TransferError::Destination {
                path: dest_root.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut report = MirrorReport::default();
        for file in &plan.files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let dest = dest_root.join(&file.relative);
            match self.copy_one(file, &dest).await {
                Ok(bytes) => {
                    debug!("Copied {} ({} bytes)", file.source, bytes);
                    report.files_copied += 1;
                    report.bytes_copied += bytes;
                    on_event(WalkEvent::FileCopied { file, bytes });
                }
                Err(error) => {
                    warn!("Skipping {}: {}", file.source, error);
                    on_event(WalkEvent::FileSkipped { file, error });
                }
            }
        }
        Ok(report)
    }

    async fn copy_one(&self, file: &TreeFile, dest: &Path) -> Result<u64, TransferError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::Destination {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
        }
        let outcome = copy_file(self.conn, &file.source, dest, self.chunk_size, None, |_| {}).await?;
        Ok(outcome.bytes())
    }
}
