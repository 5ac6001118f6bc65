use crate::handler::{ClientHandler, SshEvent};
use crate::SshError;
use russh::client;
use russh_sftp::client::SftpSession;
use tokio::sync::mpsc;

/// Readable handle to a remote file.
pub type SftpFile = russh_sftp::client::fs::File;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub size: u64,
}

/// One entry of a remote listing. `metadata` is `None` when the server did
/// not report enough attributes to tell a file from a directory.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub name: String,
    pub metadata: Option<RemoteMetadata>,
}

/// An authenticated SSH connection with its SFTP subsystem open.
///
/// Not safe for concurrent use; callers serialize access.
pub struct SshSession {
    handle: client::Handle<ClientHandler>,
    sftp: SftpSession,
    event_rx: mpsc::UnboundedReceiver<SshEvent>,
}

impl SshSession {
    /// Open the `sftp` subsystem on a fresh session channel.
    pub(crate) async fn open(
        handle: client::Handle<ClientHandler>,
        event_rx: mpsc::UnboundedReceiver<SshEvent>,
    ) -> crate::Result<Self> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::Channel(format!("SFTP subsystem request failed: {}", e)))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::Sftp(format!("SFTP session creation failed: {}", e)))?;

        Ok(Self {
            handle,
            sftp,
            event_rx,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Cheap round trip (`stat .`) confirming the session still answers.
    pub async fn probe(&mut self) -> crate::Result<()> {
        if let Some(SshEvent::Disconnected(msg)) = self.drain_events().into_iter().next() {
            tracing::debug!("Session reported disconnect: {}", msg);
            return Err(SshError::SessionClosed);
        }
        if self.is_closed() {
            return Err(SshError::SessionClosed);
        }
        self.sftp.metadata(".").await?;
        Ok(())
    }

    /// List a directory in one `read_dir` call. `.` and `..` are dropped.
    pub async fn read_dir(&self, path: &str) -> crate::Result<Vec<RemoteFile>> {
        let entries = self.sftp.read_dir(path).await?;
        let mut files = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let attrs = entry.metadata();
            let metadata = attrs.permissions.map(|_| RemoteMetadata {
                is_dir: attrs.is_dir(),
                size: attrs.size.unwrap_or(0),
            });
            files.push(RemoteFile { name, metadata });
        }
        Ok(files)
    }

    pub async fn stat(&self, path: &str) -> crate::Result<RemoteMetadata> {
        let attrs = self.sftp.metadata(path).await?;
        Ok(RemoteMetadata {
            is_dir: attrs.is_dir(),
            size: attrs.size.unwrap_or(0),
        })
    }

    /// Open a remote file for reading.
    pub async fn open_file(&self, path: &str) -> crate::Result<SftpFile> {
        Ok(self.sftp.open(path).await?)
    }

    /// Disconnect the session gracefully.
    pub async fn disconnect(&self) -> crate::Result<()> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "romfetch disconnect", "en")
            .await
            .map_err(|e| SshError::Russh(e.to_string()))
    }

    /// Handler events received since the last call.
    pub fn drain_events(&mut self) -> Vec<SshEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}
