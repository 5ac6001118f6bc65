use async_trait::async_trait;
use russh::client::{self, DisconnectReason, Session};
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::known_hosts::{self, KnownHostResult};
use crate::SshError;

/// Things the transport tells us outside of a request/response.
#[derive(Debug, Clone)]
pub enum SshEvent {
    Disconnected(String),
}

/// russh callbacks for one SFTP connection.
pub struct ClientHandler {
    events: mpsc::UnboundedSender<SshEvent>,
    host: String,
    port: u16,
    known_hosts: PathBuf,
}

impl ClientHandler {
    pub fn new(
        events: mpsc::UnboundedSender<SshEvent>,
        host: String,
        port: u16,
        known_hosts: PathBuf,
    ) -> Self {
        Self {
            events,
            host,
            port,
            known_hosts,
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = SshError;

    /// Trust on first use: unknown hosts are recorded, changed keys refused.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let key_type = server_public_key.name();
        let key_base64 = server_public_key.public_key_base64();

        match known_hosts::check_known_host(
            &self.known_hosts,
            &self.host,
            self.port,
            key_type,
            &key_base64,
        ) {
            KnownHostResult::Match => Ok(true),
            KnownHostResult::Mismatch => {
                tracing::error!("Host key for {} has changed, refusing to connect", self.host);
                Err(SshError::HostKeyMismatch(self.host.clone()))
            }
            KnownHostResult::NotFound => {
                tracing::info!("Recording {} key for new host {}", key_type, self.host);
                known_hosts::add_known_host(
                    &self.known_hosts,
                    &self.host,
                    self.port,
                    key_type,
                    &key_base64,
                );
                Ok(true)
            }
        }
    }

    async fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Banner from {}: {}", self.host, banner.trim_end());
        Ok(())
    }

    async fn disconnected(
        &mut self,
        reason: DisconnectReason<Self::Error>,
    ) -> Result<(), Self::Error> {
        let msg = match reason {
            DisconnectReason::ReceivedDisconnect(info) => {
                format!("{} closed the connection: {:?}", self.host, info)
            }
            DisconnectReason::Error(e) => format!("Connection to {} lost: {}", self.host, e),
        };
        tracing::warn!("{}", msg);
        let _ = self.events.send(SshEvent::Disconnected(msg));
        Ok(())
    }
}
