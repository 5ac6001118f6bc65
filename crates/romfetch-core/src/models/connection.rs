use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_REMOTE_PATH: &str = "/";
const SFTP_SCHEME: &str = "sftp";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

/// A password held in memory. Never printed and never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Parsed form of `sftp://[user[:password]@]host[:port][/path]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<Secret>,
    pub path: String,
}

impl RemoteAddress {
    /// Key under which a password for this address is saved.
    pub fn credential_key(&self) -> String {
        credential_key(&self.user, &self.host)
    }
}

/// Where a connection points: a remote SFTP server or a local (possibly
/// network-mounted) directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Local { root: PathBuf },
    Remote(RemoteAddress),
}

impl ConnectTarget {
    /// Parse an address typed by the user.
    ///
    /// Anything carrying a `scheme://` prefix must be an `sftp://` URL; any
    /// other non-empty string is treated as a local path.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(CoreError::InvalidAddress("empty address".into()));
        }

        match address.split_once("://") {
            Some((scheme, rest)) => {
                if !scheme.eq_ignore_ascii_case(SFTP_SCHEME) {
                    return Err(CoreError::InvalidAddress(format!(
                        "unsupported scheme '{}' in '{}'",
                        scheme, address
                    )));
                }
                parse_remote(rest, address).map(ConnectTarget::Remote)
            }
            None => Ok(ConnectTarget::Local {
                root: PathBuf::from(address),
            }),
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            ConnectTarget::Local { .. } => BackendKind::Local,
            ConnectTarget::Remote(_) => BackendKind::Remote,
        }
    }

    /// The folder browsing starts from.
    pub fn root_path(&self) -> String {
        match self {
            ConnectTarget::Local { root } => root.to_string_lossy().into_owned(),
            ConnectTarget::Remote(remote) => remote.path.clone(),
        }
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectTarget::Local { root } => write!(f, "{}", root.display()),
            ConnectTarget::Remote(r) => {
                write!(f, "sftp://{}@{}:{}{}", r.user, r.host, r.port, r.path)
            }
        }
    }
}

/// Split `[user[:password]@]` off the front of `rest`.
///
/// The password may contain `/` and `:` but not `@`. The user part may
/// contain neither `/` nor `:`, so an `@` inside the path is not userinfo.
fn split_userinfo(rest: &str) -> (Option<&str>, &str) {
    let Some(at_idx) = rest.find('@') else {
        return (None, rest);
    };
    let userinfo = &rest[..at_idx];
    let user = userinfo.split(':').next().unwrap_or_default();
    if user.contains('/') {
        (None, rest)
    } else {
        (Some(userinfo), &rest[at_idx + 1..])
    }
}

fn parse_remote(rest: &str, original: &str) -> Result<RemoteAddress> {
    let (userinfo, after) = split_userinfo(rest);
    let (host_port, path) = match after.find('/') {
        Some(idx) => (&after[..idx], &after[idx..]),
        None => (after, DEFAULT_REMOTE_PATH),
    };

    let (user, password) = match userinfo {
        Some(userinfo) => match userinfo.split_once(':') {
            Some((u, p)) => (u, Some(p)),
            None => (userinfo, None),
        },
        None => ("", None),
    };

    let (host, port) = match host_port.split_once(':') {
        Some((host, port_str)) => {
            let port = port_str.parse::<u16>().map_err(|_| {
                CoreError::InvalidAddress(format!(
                    "invalid port '{}' in '{}'",
                    port_str, original
                ))
            })?;
            (host, port)
        }
        None => (host_port, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(CoreError::InvalidAddress(format!(
            "empty hostname in '{}'",
            original
        )));
    }

    Ok(RemoteAddress {
        host: host.to_string(),
        port,
        user: if user.is_empty() {
            DEFAULT_USER.to_string()
        } else {
            user.to_string()
        },
        password: password.filter(|p| !p.is_empty()).map(Secret::new),
        path: path.to_string(),
    })
}

/// Build the `user@host` key used by the credential store.
pub fn credential_key(user: &str, host: &str) -> String {
    format!("{}@{}", user, host)
}

/// A live (or last known) session as seen by the rest of the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub backend: BackendKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip)]
    pub credential: Option<Secret>,
    pub root_path: String,
    pub live: bool,
}

impl Connection {
    pub fn from_target(target: &ConnectTarget, credential: Option<Secret>) -> Self {
        let (host, port, user) = match target {
            ConnectTarget::Local { .. } => ("localhost".to_string(), 0, String::new()),
            ConnectTarget::Remote(r) => (r.host.clone(), r.port, r.user.clone()),
        };
        Self {
            id: Uuid::new_v4(),
            backend: target.backend(),
            host,
            port,
            user,
            credential,
            root_path: target.root_path(),
            live: true,
        }
    }

    pub fn connection_string(&self) -> String {
        match self.backend {
            BackendKind::Local => self.root_path.clone(),
            BackendKind::Remote => format!("{}@{}:{}", self.user, self.host, self.port),
        }
    }
}
