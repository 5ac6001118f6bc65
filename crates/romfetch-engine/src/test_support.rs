//! In-memory SFTP stand-in for tests: a file tree plus switches to drop the
//! session, refuse reconnects and cut reads short.

use crate::backend::remote::join_remote;
use crate::backend::{Backend, ByteStream, Connector, EntryMeta, RawEntry};
use crate::error::{BackendError, ConnectionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use romfetch_core::models::{BackendKind, ConnectTarget, RemoteAddress, Secret};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Default)]
struct FakeState {
    files: BTreeMap<String, Arc<Vec<u8>>>,
    dirs: BTreeSet<String>,
    unreadable: BTreeSet<String>,
    missing_meta: BTreeSet<String>,
    generation: u64,
    alive: bool,
    refuse: bool,
    connect_delay: Option<Duration>,
    connects: usize,
    open_sessions: usize,
    last_secret: Option<String>,
    drop_after: Option<(String, u64)>,
    bytes_served: u64,
}

#[derive(Clone)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeState>>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/')?;
    Some(if idx == 0 {
        "/".to_string()
    } else {
        path[..idx].to_string()
    })
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

impl FakeRemote {
    pub fn new() -> Self {
        let mut state = FakeState::default();
        state.dirs.insert("/".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn target(&self) -> ConnectTarget {
        ConnectTarget::Remote(RemoteAddress {
            host: "fake.local".to_string(),
            port: 22,
            user: "root".to_string(),
            password: None,
            path: "/".to_string(),
        })
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            remote: self.clone(),
        })
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock();
        let mut current = Some(normalize(path));
        while let Some(dir) = current {
            current = parent_of(&dir);
            state.dirs.insert(dir);
        }
    }

    pub fn add_file(&self, path: &str, data: Vec<u8>) {
        let path = normalize(path);
        if let Some(parent) = parent_of(&path) {
            self.add_dir(&parent);
        }
        self.state.lock().files.insert(path, Arc::new(data));
    }

    /// Listing this directory, or opening this file, fails.
    pub fn make_unreadable(&self, path: &str) {
        self.state.lock().unreadable.insert(normalize(path));
    }

    /// This entry is listed without attributes.
    pub fn hide_metadata(&self, path: &str) {
        self.state.lock().missing_meta.insert(normalize(path));
    }

    /// Kill the current session; the next call on it fails.
    pub fn drop_connection(&self) {
        self.state.lock().alive = false;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    /// Drop the session once `bytes` of `path` have been served.
    pub fn drop_after(&self, path: &str, bytes: u64) {
        self.state.lock().drop_after = Some((normalize(path), bytes));
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().open_sessions
    }

    pub fn last_secret(&self) -> Option<String> {
        self.state.lock().last_secret.clone()
    }

    pub fn bytes_served(&self) -> u64 {
        self.state.lock().bytes_served
    }
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

struct FakeConnector {
    remote: FakeRemote,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _target: &ConnectTarget,
        secret: Option<&Secret>,
    ) -> Result<Box<dyn Backend>, ConnectionError> {
        let delay = self.remote.state.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.remote.state.lock();
        if state.refuse {
            return Err(ConnectionError::NetworkUnreachable(
                "connection refused".into(),
            ));
        }
        state.generation += 1;
        state.alive = true;
        state.connects += 1;
        state.open_sessions += 1;
        state.last_secret = secret.map(|s| s.expose().to_string());

        Ok(Box::new(FakeBackend {
            state: self.remote.state.clone(),
            generation: state.generation,
            closed: false,
        }))
    }
}

struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
    generation: u64,
    closed: bool,
}

impl FakeBackend {
    fn check(&self, state: &FakeState) -> Result<(), BackendError> {
        if self.closed || !state.alive || state.generation != self.generation {
            return Err(BackendError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn probe(&mut self) -> Result<(), BackendError> {
        let state = self.state.lock();
        self.check(&state)
    }

    async fn read_dir(&mut self, path: &str) -> Result<Vec<RawEntry>, BackendError> {
        let state = self.state.lock();
        self.check(&state)?;
        let path = normalize(path);
        if !state.dirs.contains(&path) {
            return Err(BackendError::NotFound(path));
        }
        if state.unreadable.contains(&path) {
            return Err(BackendError::Io(format!("{}: permission denied", path)));
        }

        let dir_meta = Some(EntryMeta {
            is_dir: true,
            size: 0,
        });
        let mut entries = vec![
            RawEntry {
                name: ".".to_string(),
                meta: dir_meta,
            },
            RawEntry {
                name: "..".to_string(),
                meta: dir_meta,
            },
        ];
        let children_dirs = state
            .dirs
            .iter()
            .filter(|d| parent_of(d).as_deref() == Some(path.as_str()))
            .map(|d| (d, dir_meta));
        let children_files = state
            .files
            .iter()
            .filter(|(f, _)| parent_of(f).as_deref() == Some(path.as_str()))
            .map(|(f, data)| {
                (
                    f,
                    Some(EntryMeta {
                        is_dir: false,
                        size: data.len() as u64,
                    }),
                )
            });
        for (full, meta) in children_dirs.chain(children_files) {
            let meta = if state.missing_meta.contains(full) {
                None
            } else {
                meta
            };
            entries.push(RawEntry {
                name: name_of(full).to_string(),
                meta,
            });
        }
        Ok(entries)
    }

    async fn stat(&mut self, path: &str) -> Result<EntryMeta, BackendError> {
        let state = self.state.lock();
        self.check(&state)?;
        let path = normalize(path);
        if let Some(data) = state.files.get(&path) {
            return Ok(EntryMeta {
                is_dir: false,
                size: data.len() as u64,
            });
        }
        if state.dirs.contains(&path) {
            return Ok(EntryMeta {
                is_dir: true,
                size: 0,
            });
        }
        Err(BackendError::NotFound(path))
    }

    async fn open_read(&mut self, path: &str) -> Result<ByteStream, BackendError> {
        let state = self.state.lock();
        self.check(&state)?;
        let path = normalize(path);
        if state.unreadable.contains(&path) {
            return Err(BackendError::Io(format!("{}: permission denied", path)));
        }
        let data = state
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(path.clone()))?;
        Ok(Box::new(FakeReader {
            state: self.state.clone(),
            generation: self.generation,
            path,
            data,
            pos: 0,
        }))
    }

    fn join(&self, dir: &str, name: &str) -> String {
        join_remote(dir, name)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().open_sessions -= 1;
        }
    }
}

struct FakeReader {
    state: Arc<Mutex<FakeState>>,
    generation: u64,
    path: String,
    data: Arc<Vec<u8>>,
    pos: usize,
}

impl AsyncRead for FakeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let mut state = this.state.lock();
        if !state.alive || state.generation != this.generation {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "session closed",
            )));
        }

        let mut limit = this.data.len();
        if let Some((path, after)) = &state.drop_after {
            if *path == this.path {
                let after = *after as usize;
                if this.pos >= after {
                    state.alive = false;
                    state.drop_after = None;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection dropped",
                    )));
                }
                limit = limit.min(after);
            }
        }

        let n = buf.remaining().min(limit - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        state.bytes_served += n as u64;
        Poll::Ready(Ok(()))
    }
}
