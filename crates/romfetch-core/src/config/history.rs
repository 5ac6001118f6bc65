use crate::error::{CoreError, Result};
use crate::models::HistoryRecord;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const HISTORY_FILE: &str = "history.json";
pub const MAX_HISTORY: usize = 500;

/// Bounded log of completed transfers, oldest first.
pub struct HistoryLog {
    path: PathBuf,
    records: RwLock<Vec<HistoryRecord>>,
}

impl HistoryLog {
    /// Open the log at `path`. A missing or unreadable file starts an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut records = Self::load(&path);
        truncate_oldest(&mut records);
        Self {
            path,
            records: RwLock::new(records),
        }
    }

    fn load(path: &Path) -> Vec<HistoryRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Could not read history at {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not parse history at {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Record a transfer and persist the (bounded) log.
    pub fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.records.write();
        debug!("History: {} -> {}", record.source, record.dest);
        records.push(record);
        truncate_oldest(&mut records);
        self.save(&records)
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<HistoryRecord> {
        self.records.read().clone()
    }

    /// The `n` most recent records, newest first.
    pub fn recent(&self, n: usize) -> Vec<HistoryRecord> {
        self.records.read().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn clear(&self) -> Result<()> {
        let mut records = self.records.write();
        records.clear();
        self.save(&records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, records: &[HistoryRecord]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(records).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize history: {}", e))
        })?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn truncate_oldest(records: &mut Vec<HistoryRecord>) {
    if records.len() > MAX_HISTORY {
        let excess = records.len() - MAX_HISTORY;
        records.drain(..excess);
    }
}
