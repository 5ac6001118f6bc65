use crate::connection::ConnectionManager;
use crate::error::ListingError;
use parking_lot::RwLock;
use romfetch_core::models::{sort_entries, DirectoryEntry, SortOrder};
use std::sync::Arc;
use tracing::{info, warn};

/// Lists directories through the active connection and keeps the last
/// listing for filtering and re-sorting.
pub struct DirectoryLister {
    conn: Arc<ConnectionManager>,
    cache: RwLock<Listing>,
}

#[derive(Default)]
struct Listing {
    path: Option<String>,
    entries: Vec<DirectoryEntry>,
}

impl DirectoryLister {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self {
            conn,
            cache: RwLock::new(Listing::default()),
        }
    }

    /// List `path`, directories first. Entries whose attributes cannot be
    /// read are skipped. On failure the cache is emptied.
    pub async fn list(
        &self,
        path: &str,
        order: SortOrder,
    ) -> Result<Vec<DirectoryEntry>, ListingError> {
        match self.read(path).await {
            Ok(mut entries) => {
                sort_entries(&mut entries, order);
                info!("Listed {} entries in {}", entries.len(), path);
                *self.cache.write() = Listing {
                    path: Some(path.to_string()),
                    entries: entries.clone(),
                };
                Ok(entries)
            }
            Err(e) => {
                warn!("Listing {} failed: {}", path, e);
                *self.cache.write() = Listing::default();
                Err(e)
            }
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<DirectoryEntry>, ListingError> {
        let mut session = self.conn.ensure_live().await?;
        let raw = session
            .read_dir(path)
            .await
            .map_err(|e| ListingError::Unreadable {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let mut entries = Vec::with_capacity(raw.len());
        for entry in raw {
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            let Some(meta) = entry.meta else {
                warn!("Skipping {} in {}: no attributes", entry.name, path);
                continue;
            };
            entries.push(DirectoryEntry {
                absolute_path: session.join(path, &entry.name),
                name: entry.name,
                is_dir: meta.is_dir,
                size_bytes: if meta.is_dir { 0 } else { meta.size },
            });
        }
        Ok(entries)
    }

    /// Look up a single path. Does not touch the cached listing.
    pub async fn stat(&self, path: &str) -> Result<DirectoryEntry, ListingError> {
        let mut session = self.conn.ensure_live().await?;
        let meta = session
            .stat(path)
            .await
            .map_err(|e| ListingError::Unreadable {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        let name = path
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path)
            .to_string();
        Ok(DirectoryEntry {
            name,
            is_dir: meta.is_dir,
            size_bytes: if meta.is_dir { 0 } else { meta.size },
            absolute_path: path.to_string(),
        })
    }

    /// The last successful listing.
    pub fn cached(&self) -> Vec<DirectoryEntry> {
        self.cache.read().entries.clone()
    }

    /// Path of the last successful listing.
    pub fn current_path(&self) -> Option<String> {
        self.cache.read().path.clone()
    }

    /// Cached entries whose name contains `query` (case-insensitive).
    pub fn filtered(&self, query: &str, order: SortOrder) -> Vec<DirectoryEntry> {
        let needle = query.trim().to_lowercase();
        let mut entries: Vec<DirectoryEntry> = self
            .cache
            .read()
            .entries
            .iter()
            .filter(|e| needle.is_empty() || e.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        sort_entries(&mut entries, order);
        entries
    }
}
