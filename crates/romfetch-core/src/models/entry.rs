use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    pub size_bytes: u64,
    pub absolute_path: String,
}

impl DirectoryEntry {
    /// Human-readable size; directories show a dash.
    pub fn size_display(&self) -> String {
        if self.is_dir {
            return "-".to_string();
        }
        format_size(self.size_bytes)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    /// Directories first, then case-insensitive name.
    #[default]
    Name,
    /// Directories first, then largest first.
    Size,
}

/// Sort entries in place. Directories always come before files.
pub fn sort_entries(entries: &mut [DirectoryEntry], order: SortOrder) {
    entries.sort_by(|a, b| {
        if a.is_dir != b.is_dir {
            return b.is_dir.cmp(&a.is_dir);
        }
        match order {
            SortOrder::Name => compare_names(&a.name, &b.name),
            SortOrder::Size => b
                .size_bytes
                .cmp(&a.size_bytes)
                .then_with(|| compare_names(&a.name, &b.name)),
        }
    });
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Format a byte count with one decimal (`1.5 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}
