use crate::backend::{Backend, Connector};
use crate::error::ConnectionError;
use parking_lot::RwLock;
use romfetch_core::models::{ConnectTarget, Connection, Secret};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Default)]
struct Slot {
    backend: Option<Box<dyn Backend>>,
    target: Option<ConnectTarget>,
    secret: Option<Secret>,
}

/// Exclusive use of the live backend for one operation.
///
/// Holds the session lock until dropped.
pub struct SessionGuard<'a> {
    backend: MappedMutexGuard<'a, dyn Backend>,
}

impl<'a> SessionGuard<'a> {
    fn new(slot: MutexGuard<'a, Slot>) -> Result<Self, ConnectionError> {
        MutexGuard::try_map(slot, |s| s.backend.as_deref_mut())
            .map(|backend| SessionGuard { backend })
            .map_err(|_| ConnectionError::NotConnected)
    }
}

impl Deref for SessionGuard<'_> {
    type Target = dyn Backend;

    fn deref(&self) -> &Self::Target {
        &*self.backend
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.backend
    }
}

/// Owns the one logical session and serializes every use of it.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    slot: Mutex<Slot>,
    info: RwLock<Option<Connection>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            slot: Mutex::new(Slot::default()),
            info: RwLock::new(None),
        }
    }

    /// Open a session to `target`, replacing any current one.
    pub async fn connect(
        &self,
        target: ConnectTarget,
        secret: Option<Secret>,
    ) -> Result<Connection, ConnectionError> {
        let mut slot = self.slot.lock().await;
        Self::close_backend(&mut slot).await;
        slot.target = None;
        slot.secret = None;
        *self.info.write() = None;

        let backend = self.open_backend(&target, secret.as_ref()).await?;
        info!("Connected to {}", target);

        let connection = Connection::from_target(&target, secret.clone());
        slot.backend = Some(backend);
        slot.target = Some(target);
        slot.secret = secret;
        *self.info.write() = Some(connection.clone());
        Ok(connection)
    }

    /// Probe the session and reconnect once if it is gone.
    ///
    /// The returned guard holds the session lock; every backend call goes
    /// through one.
    pub async fn ensure_live(&self) -> Result<SessionGuard<'_>, ConnectionError> {
        let mut slot = self.slot.lock().await;
        if slot.target.is_none() {
            return Err(ConnectionError::NotConnected);
        }

        let alive = match slot.backend.as_mut() {
            Some(backend) => match backend.probe().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Liveness probe failed: {}", e);
                    false
                }
            },
            None => false,
        };

        if !alive {
            self.reconnect(&mut slot).await?;
        }
        SessionGuard::new(slot)
    }

    /// Take the session lock without probing. Used between the chunks of a
    /// transfer that already went through `ensure_live`.
    pub async fn exclusive(&self) -> Result<SessionGuard<'_>, ConnectionError> {
        SessionGuard::new(self.slot.lock().await)
    }

    /// Close the session. Safe to call when already disconnected.
    pub async fn disconnect(&self) {
        let mut slot = self.slot.lock().await;
        let was_connected = slot.target.is_some();
        Self::close_backend(&mut slot).await;
        slot.target = None;
        slot.secret = None;
        *self.info.write() = None;
        if was_connected {
            info!("Disconnected");
        }
    }

    /// Last known connection state.
    pub fn connection(&self) -> Option<Connection> {
        self.info.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.info.read().is_some()
    }

    async fn reconnect(&self, slot: &mut Slot) -> Result<(), ConnectionError> {
        Self::close_backend(slot).await;
        let target = slot.target.clone().ok_or(ConnectionError::NotConnected)?;
        info!("Reconnecting to {}", target);

        match self.open_backend(&target, slot.secret.as_ref()).await {
            Ok(backend) => {
                slot.backend = Some(backend);
                self.set_live(true);
                info!("Reconnected to {}", target);
                Ok(())
            }
            Err(e) => {
                self.set_live(false);
                warn!("Reconnect to {} failed: {}", target, e);
                Err(ConnectionError::ReconnectFailed(e.to_string()))
            }
        }
    }

    async fn open_backend(
        &self,
        target: &ConnectTarget,
        secret: Option<&Secret>,
    ) -> Result<Box<dyn Backend>, ConnectionError> {
        match tokio::time::timeout(self.connect_timeout, self.connector.connect(target, secret))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::NetworkUnreachable(format!(
                "Timed out after {}s connecting to {}",
                self.connect_timeout.as_secs(),
                target
            ))),
        }
    }

    async fn close_backend(slot: &mut Slot) {
        if let Some(mut backend) = slot.backend.take() {
            debug!("Closing backend");
            backend.close().await;
        }
    }

    fn set_live(&self, live: bool) {
        if let Some(conn) = self.info.write().as_mut() {
            conn.live = live;
        }
    }
}
