use super::connection::BackendKind;
use std::path::Path;

pub const METADATA_DIR: &str = ".metadata";
pub const ARTWORK_EXTENSION: &str = "png";

/// Name the artwork image is stored under: files drop their last extension,
/// folders keep the full name.
pub fn artwork_base_name(item_name: &str, is_dir: bool) -> String {
    if is_dir {
        return item_name.to_string();
    }
    Path::new(item_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| item_name.to_string())
}

/// Candidate artwork path for an item shown in `current_dir`.
///
/// Images live under `<root>/.metadata/<current_dir relative to root>/`.
/// Remote paths always use `/`; local paths use the platform separator.
/// A `current_dir` outside `root` maps to the top of `.metadata`.
pub fn artwork_path(
    backend: BackendKind,
    root: &str,
    current_dir: &str,
    item_name: &str,
    is_dir: bool,
) -> String {
    let file_name = format!(
        "{}.{}",
        artwork_base_name(item_name, is_dir),
        ARTWORK_EXTENSION
    );

    match backend {
        BackendKind::Remote => {
            let root = root.trim_end_matches('/');
            let current = current_dir.trim_end_matches('/');
            let rel = current
                .strip_prefix(root)
                .map(|r| r.trim_matches('/'))
                .unwrap_or("");
            if rel.is_empty() {
                format!("{}/{}/{}", root, METADATA_DIR, file_name)
            } else {
                format!("{}/{}/{}/{}", root, METADATA_DIR, rel, file_name)
            }
        }
        BackendKind::Local => {
            let root_path = Path::new(root);
            let mut path = root_path.join(METADATA_DIR);
            if let Ok(rel) = Path::new(current_dir).strip_prefix(root_path) {
                path.push(rel);
            }
            path.push(file_name);
            path.to_string_lossy().into_owned()
        }
    }
}
