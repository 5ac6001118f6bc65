use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("SFTP error: {0}")]
    Sftp(String),
    #[error("Session closed")]
    SessionClosed,
    #[error("Host key for {0} does not match known_hosts")]
    HostKeyMismatch(String),
    #[error("Key error: {0}")]
    Key(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Russh error: {0}")]
    Russh(String),
}

impl From<russh_sftp::client::error::Error> for SshError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        SshError::Sftp(e.to_string())
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Russh(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SshError>;
