//! Free space on the download disk.

use std::fmt;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// How worried to be about the remaining space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskLevel {
    Plenty,
    Low,
    Critical,
}

impl DiskSpace {
    pub fn percent_free(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    /// Above 20% free is plenty, above 10% is low.
    pub fn level(&self) -> DiskLevel {
        let percent = self.percent_free();
        if percent > 20.0 {
            DiskLevel::Plenty
        } else if percent > 10.0 {
            DiskLevel::Low
        } else {
            DiskLevel::Critical
        }
    }

    pub fn fits(&self, bytes: u64) -> bool {
        bytes <= self.free_bytes
    }
}

impl fmt::Display for DiskSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}/{:.1} GB free",
            self.free_bytes as f64 / GIB,
            self.total_bytes as f64 / GIB
        )
    }
}

/// Space on the disk holding `path`, or its nearest existing ancestor.
///
/// `None` when no mounted disk contains the path.
pub fn disk_space(path: &Path) -> Option<DiskSpace> {
    let target = existing_ancestor(path)?;
    let disks = Disks::new_with_refreshed_list();
    let mounts: Vec<_> = disks
        .list()
        .iter()
        .map(|disk| {
            (
                disk.mount_point().to_path_buf(),
                DiskSpace {
                    free_bytes: disk.available_space(),
                    total_bytes: disk.total_space(),
                },
            )
        })
        .collect();
    let space = containing_mount(&mounts, &target);
    if space.is_none() {
        debug!("No disk found for {}", target.display());
    }
    space
}

/// The entry with the longest mount point that contains `path`.
fn containing_mount(mounts: &[(PathBuf, DiskSpace)], path: &Path) -> Option<DiskSpace> {
    mounts
        .iter()
        .filter(|(mount, _)| path.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, space)| *space)
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .or_else(|| path.is_relative().then_some(Path::new(".")))
        .and_then(|p| p.canonicalize().ok())
}
