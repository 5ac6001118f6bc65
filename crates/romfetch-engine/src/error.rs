use romfetch_core::CoreError;
use romfetch_ssh::SshError;
use thiserror::Error;

/// Why a session could not be opened or restored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Invalid address: {0}")]
    AddressInvalid(String),
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Reconnect failed: {0}")]
    ReconnectFailed(String),
    #[error("Not connected")]
    NotConnected,
}

impl From<CoreError> for ConnectionError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidAddress(msg) => ConnectionError::AddressInvalid(msg),
            other => ConnectionError::ProtocolError(other.to_string()),
        }
    }
}

impl From<SshError> for ConnectionError {
    fn from(e: SshError) -> Self {
        match e {
            SshError::AuthFailed(msg) | SshError::Key(msg) => ConnectionError::AuthFailed(msg),
            SshError::ConnectionFailed(msg) => ConnectionError::NetworkUnreachable(msg),
            SshError::Io(e) => ConnectionError::NetworkUnreachable(e.to_string()),
            other => ConnectionError::ProtocolError(other.to_string()),
        }
    }
}

/// A failed operation on an open backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Session closed")]
    Closed,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(e.to_string()),
            _ => BackendError::Io(e.to_string()),
        }
    }
}

impl From<SshError> for BackendError {
    fn from(e: SshError) -> Self {
        match e {
            SshError::SessionClosed => BackendError::Closed,
            SshError::Io(e) => BackendError::from(e),
            other => BackendError::Protocol(other.to_string()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("A batch is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Cannot read {path}: {reason}")]
    Source { path: String, reason: String },
    #[error("Cannot write {path}: {reason}")]
    Destination { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
