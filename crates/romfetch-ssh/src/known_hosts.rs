use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Result of checking a server key against known_hosts.
#[derive(Debug, PartialEq, Eq)]
pub enum KnownHostResult {
    /// Key matches an existing entry.
    Match,
    /// Host exists in known_hosts but the key is different (possible MITM).
    Mismatch,
    /// Host not found in known_hosts (new host, TOFU).
    NotFound,
}

/// Get the path to ~/.ssh/known_hosts.
pub fn default_known_hosts_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
    PathBuf::from(home).join(".ssh").join("known_hosts")
}

/// Standard SSH uses the bare hostname for port 22, `[hostname]:port` otherwise.
fn host_pattern(hostname: &str, port: u16) -> String {
    if port == 22 {
        hostname.to_string()
    } else {
        format!("[{}]:{}", hostname, port)
    }
}

/// Check a server key against the known_hosts file at `path`.
///
/// `key_type` is e.g. "ssh-ed25519", "ssh-rsa", etc.
/// `key_base64` is the base64-encoded public key data.
pub fn check_known_host(
    path: &Path,
    hostname: &str,
    port: u16,
    key_type: &str,
    key_base64: &str,
) -> KnownHostResult {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return KnownHostResult::NotFound,
    };

    let pattern = host_pattern(hostname, port);
    let mut host_seen = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Hashed entries (|1|...) need the salt to check; skip them.
        if line.starts_with('|') {
            continue;
        }

        // Format: hostnames keytype base64key [comment]
        let mut parts = line.split_whitespace();
        let (hosts_field, line_key_type, line_key_data) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(kt), Some(kd)) => (h, kt, kd),
                _ => continue,
            };

        let host_matches = hosts_field
            .split(',')
            .any(|h| h == pattern || (port == 22 && h == hostname));

        if !host_matches {
            continue;
        }

        host_seen = true;

        if line_key_type == key_type && line_key_data == key_base64 {
            return KnownHostResult::Match;
        }
    }

    if host_seen {
        KnownHostResult::Mismatch
    } else {
        KnownHostResult::NotFound
    }
}

/// Append a new entry to the known_hosts file at `path` (TOFU).
pub fn add_known_host(path: &Path, hostname: &str, port: u16, key_type: &str, key_base64: &str) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let host_entry = host_pattern(hostname, port);
    let line = format!("{} {} {}\n", host_entry, key_type, key_base64);

    match fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(mut file) => {
            if let Err(e) = file.write_all(line.as_bytes()) {
                tracing::warn!("Failed to write to known_hosts: {}", e);
            } else {
                tracing::info!("Added {} to known_hosts (TOFU)", host_entry);
            }
        }
        Err(e) => {
            tracing::warn!("Failed to open known_hosts for writing: {}", e);
        }
    }
}
