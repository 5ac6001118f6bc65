pub mod client;
pub mod error;
pub mod handler;
pub mod known_hosts;
pub mod session;

pub use client::SshClient;
pub use error::{Result, SshError};
pub use session::{RemoteFile, RemoteMetadata, SftpFile, SshSession};
