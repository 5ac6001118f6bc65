use std::path::{Path, PathBuf};

/// Alternative folder names used by common frontends for the same console.
const CONSOLE_ALIASES: &[(&str, &[&str])] = &[
    ("PS1", &["psx", "playstation", "ps1"]),
    ("PSX", &["PS1", "playstation", "ps1"]),
    ("PS2", &["playstation2", "ps2"]),
    ("PS3", &["playstation3", "ps3"]),
    ("PS4", &["playstation4", "ps4"]),
    ("PS5", &["playstation5", "ps5"]),
];

/// Pick the download folder for items browsed in `browsed_folder`.
///
/// Returns the subfolder of `dest_root` that matches the browsed folder's
/// name (exact, then case-insensitive, then a known console alias). Falls
/// back to `dest_root` itself.
pub fn resolve_destination(dest_root: &Path, browsed_folder: &str) -> PathBuf {
    match find_console_folder(dest_root, browsed_folder) {
        Some(found) => found,
        None => dest_root.to_path_buf(),
    }
}

/// The matching subfolder, if any.
pub fn find_console_folder(dest_root: &Path, browsed_folder: &str) -> Option<PathBuf> {
    let folder_name = browsed_folder
        .trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("");
    if folder_name.is_empty() || !dest_root.is_dir() {
        return None;
    }

    let exact = dest_root.join(folder_name);
    if exact.is_dir() {
        return Some(exact);
    }

    let subdirs: Vec<String> = match std::fs::read_dir(dest_root) {
        Ok(rd) => rd
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", dest_root.display(), e);
            return None;
        }
    };

    let find_ci = |wanted: &str| {
        subdirs
            .iter()
            .find(|name| name.eq_ignore_ascii_case(wanted))
            .map(|name| dest_root.join(name))
    };

    if let Some(found) = find_ci(folder_name) {
        return Some(found);
    }

    let upper = folder_name.to_ascii_uppercase();
    CONSOLE_ALIASES
        .iter()
        .find(|(key, _)| *key == upper)
        .and_then(|(_, aliases)| aliases.iter().find_map(|alias| find_ci(alias)))
}
