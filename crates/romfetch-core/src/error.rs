use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
