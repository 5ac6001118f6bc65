use crate::connection::ConnectionManager;
use crate::coordinator::TransferCoordinator;
use parking_lot::Mutex;
use romfetch_core::models::artwork_path;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkResult {
    /// Not attempted because a batch is using the session.
    Skipped,
    NotFound,
    Loaded(Arc<Vec<u8>>),
}

/// Fetches preview images from the `.metadata` tree next to the browsed files.
pub struct ArtworkLoader {
    conn: Arc<ConnectionManager>,
    transfers: TransferCoordinator,
    cache: Mutex<HashMap<String, Option<Arc<Vec<u8>>>>>,
}

impl ArtworkLoader {
    pub fn new(conn: Arc<ConnectionManager>, transfers: TransferCoordinator) -> Self {
        Self {
            conn,
            transfers,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load the image for `item_name` shown in `current_dir`.
    ///
    /// Declines while a batch is downloading. The check is not atomic with
    /// the read; a batch starting meanwhile only waits for the session lock.
    pub async fn load(&self, current_dir: &str, item_name: &str, is_dir: bool) -> ArtworkResult {
        let Some(connection) = self.conn.connection() else {
            return ArtworkResult::NotFound;
        };
        let path = artwork_path(
            connection.backend,
            &connection.root_path,
            current_dir,
            item_name,
            is_dir,
        );

        let cached = self.cache.lock().get(&path).cloned();
        if let Some(cached) = cached {
            return match cached {
                Some(data) => ArtworkResult::Loaded(data),
                None => ArtworkResult::NotFound,
            };
        }
        if self.transfers.is_downloading() {
            return ArtworkResult::Skipped;
        }

        let loaded = self.read(&path).await.map(Arc::new);
        self.cache.lock().insert(path, loaded.clone());
        match loaded {
            Some(data) => ArtworkResult::Loaded(data),
            None => ArtworkResult::NotFound,
        }
    }

    async fn read(&self, path: &str) -> Option<Vec<u8>> {
        let mut session = match self.conn.ensure_live().await {
            Ok(session) => session,
            Err(e) => {
                debug!("No artwork for {}: {}", path, e);
                return None;
            }
        };
        let mut stream = match session.open_read(path).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("No artwork at {}: {}", path, e);
                return None;
            }
        };
        let mut data = Vec::new();
        match stream.read_to_end(&mut data).await {
            Ok(_) => {
                debug!("Loaded artwork {} ({} bytes)", path, data.len());
                Some(data)
            }
            Err(e) => {
                debug!("Reading artwork {} failed: {}", path, e);
                None
            }
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::TransferSettings;
    use crate::test_support::FakeRemote;
    use romfetch_core::config::HistoryLog;
    use romfetch_core::models::TransferJob;
    use std::time::Duration;

    async fn loader(remote: &FakeRemote, dir: &std::path::Path) -> ArtworkLoader {
        let conn = Arc::new(ConnectionManager::new(
            remote.connector(),
            Duration::from_secs(5),
        ));
        conn.connect(remote.target(), None).await.unwrap();
        let history = Arc::new(HistoryLog::open(dir.join("history.json")));
        let transfers = TransferCoordinator::new(conn.clone(), history, TransferSettings::default());
        ArtworkLoader::new(conn, transfers)
    }

    #[tokio::test]
    async fn test_loads_image_named_after_item() {
        let remote = FakeRemote::new();
        remote.add_file("/psx/crash.zip", vec![0; 10]);
        remote.add_file("/.metadata/psx/crash.png", vec![0x89, b'P', b'N', b'G']);
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(&remote, dir.path()).await;

        let result = loader.load("/psx", "crash.zip", false).await;
        assert_eq!(
            result,
            ArtworkResult::Loaded(Arc::new(vec![0x89, b'P', b'N', b'G']))
        );
        assert_eq!(loader.load("/psx", "spyro.zip", false).await, ArtworkResult::NotFound);
    }

    #[tokio::test]
    async fn test_cached_result_survives_drop() {
        let remote = FakeRemote::new();
        remote.add_file("/.metadata/snes.png", vec![1, 2, 3]);
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(&remote, dir.path()).await;

        assert!(matches!(loader.load("/", "snes", true).await, ArtworkResult::Loaded(_)));
        remote.refuse_connections(true);
        remote.drop_connection();
        assert!(matches!(loader.load("/", "snes", true).await, ArtworkResult::Loaded(_)));

        loader.clear_cache();
        assert_eq!(loader.load("/", "snes", true).await, ArtworkResult::NotFound);
    }

    #[tokio::test]
    async fn test_skipped_while_downloading() {
        let remote = FakeRemote::new();
        remote.add_file("/roms/big.bin", vec![0; 2 * 1024 * 1024]);
        remote.add_file("/.metadata/roms/big.png", vec![1]);
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(&remote, dir.path()).await;

        let job = TransferJob::file("/roms/big.bin", "big.bin", dir.path().to_path_buf());
        let handle = loader.transfers.start_batch(vec![job]).unwrap();
        assert_eq!(loader.load("/roms", "big.bin", false).await, ArtworkResult::Skipped);

        handle.task.await.unwrap();
        assert!(matches!(
            loader.load("/roms", "big.bin", false).await,
            ArtworkResult::Loaded(_)
        ));
    }
}
