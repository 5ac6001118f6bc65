use crate::error::{CoreError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const MAX_RECENT_CONNECTIONS: usize = 10;
const MIN_PROGRESS_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Last address connected to (`sftp://…` or a local path).
    pub network_path: String,
    pub recent_connections: Vec<String>,
    pub auto_connect: bool,
    pub connect_timeout_secs: u64,
    pub keepalive_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub download_path: PathBuf,
    pub remote_chunk_size: usize,
    pub local_chunk_size: usize,
    pub progress_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            network_path: String::new(),
            recent_connections: Vec::new(),
            auto_connect: false,
            connect_timeout_secs: 10,
            keepalive_secs: 30,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// The address to use when none is given: the saved network path, and
    /// only with `auto_connect` on.
    pub fn saved_address(&self) -> Option<&str> {
        let path = self.network_path.trim();
        (self.auto_connect && !path.is_empty()).then_some(path)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        let download_path = directories::UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            download_path,
            remote_chunk_size: 512 * 1024,
            local_chunk_size: 128 * 1024,
            progress_interval_ms: 100,
        }
    }
}

impl TransferConfig {
    /// Minimum gap between progress events, never below 100 ms.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(MIN_PROGRESS_INTERVAL_MS))
    }
}

impl AppConfig {
    /// Get the project directories for romfetch.
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "romfetch", "romfetch").ok_or_else(|| {
            CoreError::Config("Could not determine config directory".to_string())
        })
    }

    /// Get the config directory path.
    pub fn config_dir() -> PathBuf {
        match Self::project_dirs() {
            Ok(dirs) => dirs.config_dir().to_path_buf(),
            Err(_) => {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config").join("romfetch")
            }
        }
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from disk, or create and save defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                CoreError::Config(format!(
                    "Failed to parse config at {}: {}",
                    path.display(),
                    e
                ))
            })?;
            info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        info!("Saved config to {}", path.display());

        Ok(())
    }

    /// Move `address` to the front of the recent list, keeping at most ten.
    pub fn add_recent_connection(&mut self, address: &str) {
        let address = address.trim();
        if address.is_empty() {
            return;
        }
        let recent = &mut self.connection.recent_connections;
        recent.retain(|a| a != address);
        recent.insert(0, address.to_string());
        recent.truncate(MAX_RECENT_CONNECTIONS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.connection.keepalive(), Duration::from_secs(30));
        assert_eq!(config.transfer.remote_chunk_size, 524_288);
        assert_eq!(config.transfer.local_chunk_size, 131_072);
        assert_eq!(config.transfer.progress_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_load_creates_defaults_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::load_from(&path).unwrap();
        assert!(path.exists());

        config.connection.network_path = "sftp://deck@nas/roms".to_string();
        config.connection.auto_connect = true;
        config.save_to(&path).unwrap();

        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection]\nauto_connect = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.connection.auto_connect);
        assert_eq!(config.connection.connect_timeout_secs, 10);
        assert_eq!(config.transfer.progress_interval_ms, 100);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[connection\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_progress_interval_floor() {
        let mut transfer = TransferConfig {
            progress_interval_ms: 0,
            ..TransferConfig::default()
        };
        assert_eq!(transfer.progress_interval(), Duration::from_millis(100));
        transfer.progress_interval_ms = 40;
        assert_eq!(transfer.progress_interval(), Duration::from_millis(100));
        transfer.progress_interval_ms = 250;
        assert_eq!(transfer.progress_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_saved_address_needs_auto_connect() {
        let mut connection = ConnectionConfig {
            network_path: "sftp://deck@nas/roms".to_string(),
            ..ConnectionConfig::default()
        };
        assert_eq!(connection.saved_address(), None);

        connection.auto_connect = true;
        assert_eq!(connection.saved_address(), Some("sftp://deck@nas/roms"));

        connection.network_path = "   ".to_string();
        assert_eq!(connection.saved_address(), None);
    }

    #[test]
    fn test_recent_connections_dedup_and_cap() {
        let mut config = AppConfig::default();
        for i in 0..12 {
            config.add_recent_connection(&format!("sftp://host{}", i));
        }
        config.add_recent_connection("sftp://host5");
        config.add_recent_connection("  ");

        let recent = &config.connection.recent_connections;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], "sftp://host5");
        assert_eq!(recent[1], "sftp://host11");
        assert_eq!(recent.iter().filter(|a| *a == "sftp://host5").count(), 1);
    }
}
