use super::{Backend, ByteStream, EntryMeta, RawEntry};
use crate::error::BackendError;
use async_trait::async_trait;
use romfetch_core::models::BackendKind;
use romfetch_ssh::SshSession;
use tracing::warn;

/// SFTP session on the other end of an SSH connection.
pub struct RemoteBackend {
    session: SshSession,
}

impl RemoteBackend {
    pub fn new(session: SshSession) -> Self {
        Self { session }
    }
}

/// Join remote path components with `/`.
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    format!("{}/{}", dir, name)
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn probe(&mut self) -> Result<(), BackendError> {
        Ok(self.session.probe().await?)
    }

    async fn read_dir(&mut self, path: &str) -> Result<Vec<RawEntry>, BackendError> {
        let files = self.session.read_dir(path).await?;
        Ok(files
            .into_iter()
            .map(|f| RawEntry {
                name: f.name,
                meta: f.metadata.map(|m| EntryMeta {
                    is_dir: m.is_dir,
                    size: m.size,
                }),
            })
            .collect())
    }

    async fn stat(&mut self, path: &str) -> Result<EntryMeta, BackendError> {
        let m = self.session.stat(path).await?;
        Ok(EntryMeta {
            is_dir: m.is_dir,
            size: m.size,
        })
    }

    async fn open_read(&mut self, path: &str) -> Result<ByteStream, BackendError> {
        let file = self.session.open_file(path).await?;
        Ok(Box::new(file))
    }

    fn join(&self, dir: &str, name: &str) -> String {
        join_remote(dir, name)
    }

    async fn close(&mut self) {
        if let Err(e) = self.session.disconnect().await {
            warn!("SFTP disconnect failed: {}", e);
        }
    }
}
