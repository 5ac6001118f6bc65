//! Saved SFTP passwords.
//!
//! Passwords are XORed against a per-machine key and base64-encoded. This is
//! obfuscation only: anyone who can read the key file can read the passwords.

use crate::error::{CoreError, Result};
use crate::models::{credential_key, Secret};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const KEY_FILE: &str = "machine.key";
pub const PASSWORDS_FILE: &str = "passwords.json";

/// Symmetric key used to obfuscate stored passwords.
#[derive(Clone, PartialEq, Eq)]
pub struct MachineKey(Vec<u8>);

impl std::fmt::Debug for MachineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MachineKey({} bytes)", self.0.len())
    }
}

impl MachineKey {
    /// SHA-256 of `"{node}-{login}"`.
    pub fn derive(node: &str, login: &str) -> Self {
        let digest = Sha256::digest(format!("{}-{}", node, login).as_bytes());
        Self(digest.to_vec())
    }

    /// Key derived from this machine's host name and the current account.
    pub fn for_this_machine() -> Self {
        let node = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        let login = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "user".to_string());
        Self::derive(&node, &login)
    }

    /// Read the key file, or derive a key for this machine and write it.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) if !bytes.is_empty() => return Ok(Self(bytes)),
            Ok(_) => warn!("Key file {} is empty, regenerating", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CoreError::Credential(format!(
                    "Failed to read key file at {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        let key = Self::for_this_machine();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, &key.0)?;
        restrict_permissions(path)?;
        info!("Created machine key at {}", path.display());
        Ok(key)
    }

    fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .zip(self.0.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect()
    }

    pub fn encrypt(&self, plain: &[u8]) -> String {
        STANDARD.encode(self.apply(plain))
    }

    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| CoreError::Credential(format!("Malformed ciphertext: {}", e)))?;
        Ok(self.apply(&raw))
    }
}

/// `user@host` → ciphertext map, written out in full on every change.
pub struct CredentialStore {
    key: MachineKey,
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl CredentialStore {
    /// Open the store in `dir`, creating the key file if needed.
    pub fn open(dir: &Path) -> Result<Self> {
        let key = MachineKey::load_or_create(&dir.join(KEY_FILE))?;
        Self::with_key(key, dir.join(PASSWORDS_FILE))
    }

    pub fn with_key(key: MachineKey, path: PathBuf) -> Result<Self> {
        let entries = Self::load(&path);
        Ok(Self {
            key,
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Read the saved map. A missing, unreadable or corrupt file starts the
    /// store empty; the next save replaces it.
    fn load(path: &Path) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Could not read saved passwords at {}: {}", path.display(), e);
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Ignoring corrupt saved passwords at {}: {}",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    pub fn save_password(&self, user: &str, host: &str, password: &Secret) -> Result<()> {
        let key = credential_key(user, host);
        let blob = self.key.encrypt(password.expose().as_bytes());
        let mut entries = self.entries.write();
        entries.insert(key.clone(), blob);
        self.persist(&entries)?;
        debug!("Saved password for {}", key);
        Ok(())
    }

    /// Look up a saved password. A value that does not decrypt is returned
    /// as-is, so hand-edited plaintext entries keep working.
    pub fn get_password(&self, user: &str, host: &str) -> Option<Secret> {
        let key = credential_key(user, host);
        let entries = self.entries.read();
        let blob = entries.get(&key)?;
        let plain = match self.key.decrypt(blob).map(String::from_utf8) {
            Ok(Ok(plain)) => plain,
            Ok(Err(_)) => {
                warn!("Saved password for {} is not valid UTF-8, using raw value", key);
                blob.clone()
            }
            Err(e) => {
                warn!("{} for {}, using raw value", e, key);
                blob.clone()
            }
        };
        Some(Secret::new(plain))
    }

    /// Remove a saved password. Returns true if one was stored.
    pub fn forget(&self, user: &str, host: &str) -> Result<bool> {
        let key = credential_key(user, host);
        let mut entries = self.entries.write();
        if entries.remove(&key).is_none() {
            return Ok(false);
        }
        self.persist(&entries)?;
        debug!("Forgot password for {}", key);
        Ok(true)
    }

    /// Saved `user@host` keys.
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(entries).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize passwords: {}", e))
        })?;
        std::fs::write(&self.path, content)?;
        restrict_permissions(&self.path)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
