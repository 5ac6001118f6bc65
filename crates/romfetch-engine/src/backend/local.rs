use super::{Backend, ByteStream, EntryMeta, RawEntry};
use crate::error::{BackendError, ConnectionError};
use async_trait::async_trait;
use romfetch_core::models::BackendKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A directly readable directory tree, typically a mounted share.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Open `root`, checking that it is a readable directory.
    pub async fn open(root: &Path) -> Result<Self, ConnectionError> {
        if root.as_os_str().is_empty() {
            return Err(ConnectionError::AddressInvalid("empty path".into()));
        }
        let meta = tokio::fs::metadata(root).await.map_err(|e| {
            ConnectionError::NetworkUnreachable(format!("{}: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(ConnectionError::NetworkUnreachable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        tokio::fs::read_dir(root).await.map_err(|e| {
            ConnectionError::NetworkUnreachable(format!("{}: {}", root.display(), e))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn probe(&mut self) -> Result<(), BackendError> {
        let meta = tokio::fs::metadata(&self.root).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(BackendError::Closed)
        }
    }

    async fn read_dir(&mut self, path: &str) -> Result<Vec<RawEntry>, BackendError> {
        let mut rd = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follow symlinks so a linked folder lists as a folder.
            let meta = match tokio::fs::metadata(entry.path()).await {
                Ok(m) => Some(EntryMeta {
                    is_dir: m.is_dir(),
                    size: if m.is_dir() { 0 } else { m.len() },
                }),
                Err(e) => {
                    debug!("No metadata for {}: {}", entry.path().display(), e);
                    None
                }
            };
            entries.push(RawEntry { name, meta });
        }
        Ok(entries)
    }

    async fn stat(&mut self, path: &str) -> Result<EntryMeta, BackendError> {
        let m = tokio::fs::metadata(path).await?;
        Ok(EntryMeta {
            is_dir: m.is_dir(),
            size: m.len(),
        })
    }

    async fn open_read(&mut self, path: &str) -> Result<ByteStream, BackendError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    fn join(&self, dir: &str, name: &str) -> String {
        Path::new(dir).join(name).to_string_lossy().into_owned()
    }

    async fn close(&mut self) {}
}
