pub mod local;
pub mod remote;

use crate::error::{BackendError, ConnectionError};
use async_trait::async_trait;
use romfetch_core::models::{BackendKind, ConnectTarget, Secret};
use romfetch_ssh::SshClient;
use tokio::io::AsyncRead;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Readable stream over a source file.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub is_dir: bool,
    pub size: u64,
}

/// A directory entry as the backend reports it. `meta` is `None` when the
/// entry's attributes could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub meta: Option<EntryMeta>,
}

/// One open session against a file store.
#[async_trait]
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Cheap round trip confirming the session still answers.
    async fn probe(&mut self) -> Result<(), BackendError>;

    async fn read_dir(&mut self, path: &str) -> Result<Vec<RawEntry>, BackendError>;

    async fn stat(&mut self, path: &str) -> Result<EntryMeta, BackendError>;

    async fn open_read(&mut self, path: &str) -> Result<ByteStream, BackendError>;

    /// Child path of `dir` in this backend's path syntax.
    fn join(&self, dir: &str, name: &str) -> String;

    async fn close(&mut self);
}

/// Opens backends for connect targets.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectTarget,
        secret: Option<&Secret>,
    ) -> Result<Box<dyn Backend>, ConnectionError>;
}

/// Local paths go straight to the filesystem, `sftp://` targets through SSH.
pub struct SystemConnector {
    ssh: SshClient,
}

impl SystemConnector {
    pub fn new(ssh: SshClient) -> Self {
        Self { ssh }
    }
}

#[async_trait]
impl Connector for SystemConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
        secret: Option<&Secret>,
    ) -> Result<Box<dyn Backend>, ConnectionError> {
        match target {
            ConnectTarget::Local { root } => {
                let backend = LocalBackend::open(root).await?;
                Ok(Box::new(backend))
            }
            ConnectTarget::Remote(address) => {
                let session = self.ssh.connect(address, secret).await?;
                Ok(Box::new(RemoteBackend::new(session)))
            }
        }
    }
}
