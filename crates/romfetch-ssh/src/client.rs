use crate::handler::ClientHandler;
use crate::known_hosts::default_known_hosts_path;
use crate::session::SshSession;
use crate::SshError;
use romfetch_core::models::{RemoteAddress, Secret};
use russh::client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct SshClient {
    config: Arc<client::Config>,
    known_hosts: PathBuf,
}

impl SshClient {
    pub fn new(keepalive: Duration) -> Self {
        let config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(keepalive),
            keepalive_max: 3,
            ..Default::default()
        };

        Self {
            config: Arc::new(config),
            known_hosts: default_known_hosts_path(),
        }
    }

    pub fn with_known_hosts(mut self, path: PathBuf) -> Self {
        self.known_hosts = path;
        self
    }

    /// Connect, authenticate and open the SFTP subsystem.
    ///
    /// No timeout is applied here; callers bound the whole attempt.
    pub async fn connect(
        &self,
        address: &RemoteAddress,
        password: Option<&Secret>,
    ) -> crate::Result<SshSession> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handler = ClientHandler::new(
            event_tx,
            address.host.clone(),
            address.port,
            self.known_hosts.clone(),
        );

        let addr = format!("{}:{}", address.host, address.port);
        tracing::info!("Connecting to {}", addr);

        let mut handle = client::connect(self.config.clone(), &*addr, handler)
            .await
            .map_err(|e| match e {
                SshError::HostKeyMismatch(_) => e,
                other => SshError::ConnectionFailed(other.to_string()),
            })?;

        self.authenticate(&mut handle, &address.user, password)
            .await?;

        SshSession::open(handle, event_rx).await
    }

    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        user: &str,
        password: Option<&Secret>,
    ) -> crate::Result<()> {
        if let Some(password) = password {
            match self.auth_with_password(handle, user, password).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::debug!("Password auth failed: {}", e),
            }
        }

        let home = std::env::var("HOME").unwrap_or_default();
        let default_keys = [
            format!("{}/.ssh/id_ed25519", home),
            format!("{}/.ssh/id_rsa", home),
            format!("{}/.ssh/id_ecdsa", home),
        ];

        for key_path in &default_keys {
            let path = Path::new(key_path);
            if path.exists() {
                match self.auth_with_key(handle, user, path).await {
                    Ok(()) => return Ok(()),
                    Err(e) => tracing::debug!("Key auth with {} failed: {}", key_path, e),
                }
            }
        }

        Err(SshError::AuthFailed(
            "No valid authentication method found".into(),
        ))
    }

    async fn auth_with_key(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        user: &str,
        key_path: &Path,
    ) -> crate::Result<()> {
        let key_pair = russh_keys::load_secret_key(key_path, None).map_err(|e| {
            SshError::Key(format!("Failed to load key {}: {}", key_path.display(), e))
        })?;

        let auth_result = handle
            .authenticate_publickey(user, Arc::new(key_pair))
            .await
            .map_err(|e| SshError::AuthFailed(e.to_string()))?;

        if !auth_result {
            return Err(SshError::AuthFailed("Public key rejected".into()));
        }

        tracing::info!("Authenticated with key {}", key_path.display());
        Ok(())
    }

    async fn auth_with_password(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        user: &str,
        password: &Secret,
    ) -> crate::Result<()> {
        let auth_result = handle
            .authenticate_password(user, password.expose())
            .await
            .map_err(|e| SshError::AuthFailed(e.to_string()))?;

        if !auth_result {
            tracing::warn!("Password authentication rejected for {}", user);
            return Err(SshError::AuthFailed("Password rejected by server".into()));
        }

        tracing::info!("Authenticated with password for {}", user);
        Ok(())
    }
}

impl Default for SshClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
