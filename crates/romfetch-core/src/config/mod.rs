pub mod app_config;
pub mod credentials;
pub mod history;

pub use app_config::{AppConfig, ConnectionConfig, TransferConfig};
pub use credentials::{CredentialStore, MachineKey};
pub use history::HistoryLog;
