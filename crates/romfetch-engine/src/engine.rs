use crate::artwork::{ArtworkLoader, ArtworkResult};
use crate::backend::{Connector, SystemConnector};
use crate::connection::ConnectionManager;
use crate::coordinator::{TransferCoordinator, TransferEvent, TransferSettings};
use crate::error::{ConnectionError, ListingError, TransferError};
use crate::lister::DirectoryLister;
use crate::walker::RecursiveFolderWalker;
use romfetch_core::config::history::HISTORY_FILE;
use romfetch_core::config::{AppConfig, CredentialStore, HistoryLog};
use romfetch_core::models::{ConnectTarget, Connection, DirectoryEntry, SortOrder, TransferJob};
use romfetch_ssh::SshClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Results of background work, delivered to whoever drives the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Connected(Connection),
    ConnectFailed(ConnectionError),
    Listing {
        path: String,
        entries: Vec<DirectoryEntry>,
    },
    ListingFailed {
        path: String,
        error: ListingError,
    },
    Artwork {
        item_name: String,
        result: ArtworkResult,
    },
    Transfer(TransferEvent),
}

/// Owns the session and every component built on it.
///
/// Long operations run as tokio tasks and report back through the event
/// channel returned by [`Engine::new`]; nothing else is shared with callers.
#[derive(Clone)]
pub struct Engine {
    conn: Arc<ConnectionManager>,
    lister: Arc<DirectoryLister>,
    transfers: TransferCoordinator,
    artwork: Arc<ArtworkLoader>,
    credentials: Arc<CredentialStore>,
    history: Arc<HistoryLog>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl Engine {
    pub fn new(
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        settings: TransferSettings,
        credentials: Arc<CredentialStore>,
        history: Arc<HistoryLog>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(ConnectionManager::new(connector, connect_timeout));
        let transfers = TransferCoordinator::new(conn.clone(), history.clone(), settings);
        let engine = Self {
            lister: Arc::new(DirectoryLister::new(conn.clone())),
            artwork: Arc::new(ArtworkLoader::new(conn.clone(), transfers.clone())),
            transfers,
            conn,
            credentials,
            history,
            events: tx,
        };
        (engine, rx)
    }

    /// Wire up the real SSH/local connector and the stores in the config directory.
    pub fn from_config(
        config: &AppConfig,
    ) -> romfetch_core::Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let dir = AppConfig::config_dir();
        let credentials = Arc::new(CredentialStore::open(&dir)?);
        let history = Arc::new(HistoryLog::open(dir.join(HISTORY_FILE)));
        let connector = Arc::new(SystemConnector::new(SshClient::new(
            config.connection.keepalive(),
        )));
        Ok(Self::new(
            connector,
            config.connection.connect_timeout(),
            TransferSettings::from(&config.transfer),
            credentials,
            history,
        ))
    }

    /// Connect to `address`, replacing any current session.
    ///
    /// A password in the address wins over a saved one. With `remember`, a
    /// password that got us in is saved for next time.
    pub async fn connect(&self, address: &str, remember: bool) -> Result<Connection, ConnectionError> {
        let target = ConnectTarget::parse(address)?;
        let secret = match &target {
            ConnectTarget::Remote(remote) => remote
                .password
                .clone()
                .or_else(|| self.credentials.get_password(&remote.user, &remote.host)),
            ConnectTarget::Local { .. } => None,
        };

        let connection = self.conn.connect(target.clone(), secret.clone()).await?;
        self.artwork.clear_cache();

        if remember {
            if let (ConnectTarget::Remote(remote), Some(secret)) = (&target, &secret) {
                match self.credentials.save_password(&remote.user, &remote.host, secret) {
                    Ok(()) => info!("Saved password for {}", remote.credential_key()),
                    Err(e) => warn!("Could not save password for {}: {}", remote.credential_key(), e),
                }
            }
        }
        Ok(connection)
    }

    pub fn request_connect(&self, address: String, remember: bool) {
        let engine = self.clone();
        tokio::spawn(async move {
            let event = match engine.connect(&address, remember).await {
                Ok(connection) => EngineEvent::Connected(connection),
                Err(e) => {
                    warn!("Connecting to {} failed: {}", address, e);
                    EngineEvent::ConnectFailed(e)
                }
            };
            engine.emit(event);
        });
    }

    pub fn request_listing(&self, path: String, order: SortOrder) {
        let engine = self.clone();
        tokio::spawn(async move {
            let event = match engine.lister.list(&path, order).await {
                Ok(entries) => EngineEvent::Listing { path, entries },
                Err(error) => EngineEvent::ListingFailed { path, error },
            };
            engine.emit(event);
        });
    }

    pub fn request_artwork(&self, current_dir: String, item_name: String, is_dir: bool) {
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.artwork.load(&current_dir, &item_name, is_dir).await;
            engine.emit(EngineEvent::Artwork { item_name, result });
        });
    }

    /// Start a batch; its events arrive as [`EngineEvent::Transfer`].
    pub fn start_batch(&self, jobs: Vec<TransferJob>) -> Result<(), TransferError> {
        let mut handle = self.transfers.start_batch(jobs)?;
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = handle.events.recv().await {
                if events.send(EngineEvent::Transfer(event)).is_err() {
                    break;
                }
            }
        });
        Ok(())
    }

    /// Bytes `jobs` would copy: file sizes plus every file under each folder.
    pub async fn planned_bytes(&self, jobs: &[TransferJob]) -> Result<u64, TransferError> {
        let walker = RecursiveFolderWalker::new(&self.conn, 0);
        let mut total = 0u64;
        for job in jobs {
            total += if job.is_folder {
                walker.enumerate(&job.source_path).await?.total_bytes
            } else {
                let mut session = self.conn.ensure_live().await?;
                session
                    .stat(&job.source_path)
                    .await
                    .map_err(|e| TransferError::Source {
                        path: job.source_path.clone(),
                        reason: e.to_string(),
                    })?
                    .size
            };
        }
        Ok(total)
    }

    pub fn cancel(&self) {
        self.transfers.cancel();
    }

    pub async fn disconnect(&self) {
        self.transfers.cancel();
        self.conn.disconnect().await;
        self.artwork.clear_cache();
    }

    pub fn connection(&self) -> Option<Connection> {
        self.conn.connection()
    }

    pub fn lister(&self) -> &DirectoryLister {
        &self.lister
    }

    pub fn transfers(&self) -> &TransferCoordinator {
        &self.transfers
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}
