// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-memory 9P2000 server used to exercise the client without a running wmii.
// Author: Lukas Bower

//! In-process 9P server.
//!
//! The server keeps an in-memory node tree, tracks live fids, records every
//! request it receives and can be told to fail the next request of a given
//! kind. Handles are cheap clones sharing one server state, so a test can keep
//! one to inspect what a [`super::Client`] did through the transport.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::trace;
use thiserror::Error;
use wmii9p_codec::{
    Codec, OpenMode, Perm, Qid, QidType, Request, RequestBody, Response, ResponseBody, Stat,
    DEFAULT_MSIZE, DMDIR, VERSION,
};

use super::{Transport, TransportError};

/// Failure injected into the next matching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer the next request with this name (`"Twrite"`, ...) with `Rerror`.
    Reject(&'static str),
    /// Fail the transport on the next request with this name; the request is
    /// not processed.
    Drop(&'static str),
}

/// Problems seeding the tree from test code.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    /// A path component names an existing file.
    #[error("{0} is not a directory")]
    NotADirectory(String),
    /// The path names the root or is empty.
    #[error("invalid seed path {0:?}")]
    InvalidPath(String),
}

#[derive(Debug, Clone)]
enum NodeKind {
    Directory,
    File(Vec<u8>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    qid_path: u64,
    version: u32,
}

impl Node {
    fn qid(&self) -> Qid {
        let ty = match self.kind {
            NodeKind::Directory => QidType::DIRECTORY,
            NodeKind::File(_) => QidType::FILE,
        };
        Qid::new(ty, self.version, self.qid_path)
    }
}

#[derive(Debug, Clone)]
struct FidEntry {
    path: String,
    open: Option<OpenMode>,
}

struct ServerState {
    nodes: BTreeMap<String, Node>,
    fids: HashMap<u32, FidEntry>,
    sessions: HashMap<u64, HashMap<u32, FidEntry>>,
    next_connection: u64,
    requests: Vec<Request>,
    writes: Vec<(String, Vec<u8>)>,
    faults: VecDeque<Fault>,
    next_qid: u64,
    version: String,
}

type Reply = Result<ResponseBody, String>;

/// Shared handle to an in-memory 9P server.
#[derive(Clone)]
pub struct InProcessServer {
    state: Arc<Mutex<ServerState>>,
}

impl fmt::Debug for InProcessServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InProcessServer")
            .field("nodes", &state.nodes.len())
            .field("connections", &state.sessions.len())
            .field("requests", &state.requests.len())
            .finish()
    }
}

impl Default for InProcessServer {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessServer {
    /// Create a server holding only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_owned(),
            Node {
                kind: NodeKind::Directory,
                qid_path: 0,
                version: 0,
            },
        );
        Self {
            state: Arc::new(Mutex::new(ServerState {
                nodes,
                fids: HashMap::new(),
                sessions: HashMap::new(),
                next_connection: 0,
                requests: Vec::new(),
                writes: Vec::new(),
                faults: VecDeque::new(),
                next_qid: 1,
                version: VERSION.to_owned(),
            })),
        }
    }

    /// Answer `Tversion` with `version` instead of `9P2000`.
    #[must_use]
    pub fn with_version(self, version: &str) -> Self {
        self.lock().version = version.to_owned();
        self
    }

    /// Open a new connection to this server. Each connection has its own fid table.
    #[must_use]
    pub fn transport(&self) -> InProcessTransport {
        let connection = {
            let mut state = self.lock();
            state.next_connection += 1;
            state.next_connection
        };
        InProcessTransport {
            state: Arc::clone(&self.state),
            codec: Codec,
            connection,
        }
    }

    /// Create directory `path` and any missing parents.
    pub fn mkdir(&self, path: &str) -> Result<(), SeedError> {
        let mut state = self.lock();
        let path = normalize(path);
        state.ensure_dirs(&path)
    }

    /// Create or replace file `path`, creating missing parent directories.
    pub fn put(&self, path: &str, contents: &str) -> Result<(), SeedError> {
        let mut state = self.lock();
        let path = normalize(path);
        let parent = parent_of(&path).ok_or_else(|| SeedError::InvalidPath(path.clone()))?;
        state.ensure_dirs(parent)?;
        if let Some(Node {
            kind: NodeKind::Directory,
            ..
        }) = state.nodes.get(&path)
        {
            return Err(SeedError::InvalidPath(path));
        }
        state.insert(path, NodeKind::File(contents.as_bytes().to_vec()));
        Ok(())
    }

    /// Contents of file `path`, `None` when it does not exist or is a directory.
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<String> {
        match &self.lock().nodes.get(&normalize(path))?.kind {
            NodeKind::File(data) => Some(String::from_utf8_lossy(data).into_owned()),
            NodeKind::Directory => None,
        }
    }

    /// Whether `path` exists.
    #[must_use]
    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(&normalize(path))
    }

    /// Names of the direct children of `path`, sorted.
    #[must_use]
    pub fn children(&self, path: &str) -> Vec<String> {
        let state = self.lock();
        state
            .children(&normalize(path))
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Payloads of every successful `Twrite` to `path`, in order.
    #[must_use]
    pub fn writes(&self, path: &str) -> Vec<String> {
        let path = normalize(path);
        self.lock()
            .writes
            .iter()
            .filter(|(target, _)| *target == path)
            .map(|(_, data)| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    /// Paths of every successful `Twrite`, in order.
    #[must_use]
    pub fn written_paths(&self) -> Vec<String> {
        self.lock()
            .writes
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Forget recorded requests and writes.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.requests.clear();
        state.writes.clear();
    }

    /// Fids currently bound on any connection, sorted.
    #[must_use]
    pub fn live_fids(&self) -> Vec<u32> {
        let mut fids: Vec<u32> = self
            .lock()
            .sessions
            .values()
            .flat_map(|fids| fids.keys().copied())
            .collect();
        fids.sort_unstable();
        fids
    }

    /// Queue a failure for a later request.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client-side transport bound to an [`InProcessServer`].
pub struct InProcessTransport {
    state: Arc<Mutex<ServerState>>,
    codec: Codec,
    connection: u64,
}

impl Transport for InProcessTransport {
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        let request = self.codec.decode_request(frame)?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.requests.push(request.clone());
        let name = request.body.name();
        let fault = state
            .faults
            .iter()
            .position(|fault| match fault {
                Fault::Reject(target) | Fault::Drop(target) => *target == name,
            })
            .and_then(|index| state.faults.remove(index));
        let body = match fault {
            Some(Fault::Drop(_)) => {
                trace!("dropping {name} (tag {})", request.tag);
                return Err(TransportError::Closed);
            }
            Some(Fault::Reject(_)) => {
                // Tclunk and Tremove release the fid even when they fail.
                if let RequestBody::Clunk { fid } | RequestBody::Remove { fid } = &request.body {
                    if let Some(fids) = state.sessions.get_mut(&self.connection) {
                        fids.remove(fid);
                    }
                }
                ResponseBody::Error {
                    message: "injected failure".to_owned(),
                }
            }
            None => {
                state.fids = state.sessions.remove(&self.connection).unwrap_or_default();
                let reply = state.dispatch(&request.body);
                let fids = std::mem::take(&mut state.fids);
                state.sessions.insert(self.connection, fids);
                reply.unwrap_or_else(|message| ResponseBody::Error { message })
            }
        };
        drop(state);
        let response = Response {
            tag: request.tag,
            body,
        };
        Ok(self.codec.encode_response(&response)?)
    }
}

impl ServerState {
    fn dispatch(&mut self, body: &RequestBody) -> Reply {
        match body {
            RequestBody::Version { msize, .. } => {
                self.fids.clear();
                Ok(ResponseBody::Version {
                    msize: (*msize).min(DEFAULT_MSIZE),
                    version: self.version.clone(),
                })
            }
            RequestBody::Attach { fid, .. } => {
                if self.fids.contains_key(fid) {
                    return Err(format!("fid {fid} in use"));
                }
                self.fids.insert(
                    *fid,
                    FidEntry {
                        path: "/".to_owned(),
                        open: None,
                    },
                );
                Ok(ResponseBody::Attach {
                    qid: self.node("/")?.qid(),
                })
            }
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => self.walk(*fid, *newfid, wnames),
            RequestBody::Open { fid, mode } => self.open(*fid, *mode),
            RequestBody::Create {
                fid,
                name,
                perm,
                mode,
            } => self.create(*fid, name, *perm, *mode),
            RequestBody::Read { fid, offset, count } => self.read(*fid, *offset, *count),
            RequestBody::Write { fid, offset, data } => self.write(*fid, *offset, data),
            RequestBody::Clunk { fid } => match self.fids.remove(fid) {
                Some(_) => Ok(ResponseBody::Clunk),
                None => Err(format!("unknown fid {fid}")),
            },
            RequestBody::Remove { fid } => {
                let entry = self
                    .fids
                    .remove(fid)
                    .ok_or_else(|| format!("unknown fid {fid}"))?;
                if entry.path == "/" {
                    return Err("cannot remove root".to_owned());
                }
                if !self.children(&entry.path).is_empty() {
                    return Err("directory not empty".to_owned());
                }
                self.nodes.remove(&entry.path);
                Ok(ResponseBody::Remove)
            }
        }
    }

    fn walk(&mut self, fid: u32, newfid: u32, wnames: &[String]) -> Reply {
        let start = self.fid(fid)?;
        if start.open.is_some() {
            return Err("cannot walk an open fid".to_owned());
        }
        if newfid != fid && self.fids.contains_key(&newfid) {
            return Err(format!("fid {newfid} in use"));
        }
        let mut path = start.path;
        let mut qids = Vec::with_capacity(wnames.len());
        for name in wnames {
            if !matches!(self.nodes.get(&path), Some(node) if matches!(node.kind, NodeKind::Directory))
            {
                break;
            }
            let next = if name == ".." {
                parent_of(&path).unwrap_or("/").to_owned()
            } else {
                join(&path, name)
            };
            let Some(node) = self.nodes.get(&next) else {
                break;
            };
            qids.push(node.qid());
            path = next;
        }
        if qids.is_empty() && !wnames.is_empty() {
            return Err("file not found".to_owned());
        }
        if qids.len() == wnames.len() {
            self.fids.insert(newfid, FidEntry { path, open: None });
        }
        Ok(ResponseBody::Walk { qids })
    }

    fn open(&mut self, fid: u32, mode: OpenMode) -> Reply {
        let entry = self.fid(fid)?;
        if entry.open.is_some() {
            return Err("fid already open".to_owned());
        }
        let node = self.nodes.get_mut(&entry.path).ok_or("file not found")?;
        match &mut node.kind {
            NodeKind::Directory if mode.allows_write() || mode.truncates() => {
                return Err("is a directory".to_owned())
            }
            NodeKind::File(data) if mode.truncates() => {
                data.clear();
                node.version = node.version.wrapping_add(1);
            }
            _ => {}
        }
        let qid = node.qid();
        self.bind_open(fid, mode);
        Ok(ResponseBody::Open { qid, iounit: 0 })
    }

    fn create(&mut self, fid: u32, name: &str, perm: Perm, mode: OpenMode) -> Reply {
        let entry = self.fid(fid)?;
        if entry.open.is_some() {
            return Err("fid already open".to_owned());
        }
        match self.nodes.get(&entry.path) {
            Some(Node {
                kind: NodeKind::Directory,
                ..
            }) => {}
            _ => return Err("not a directory".to_owned()),
        }
        let path = join(&entry.path, name);
        if self.nodes.contains_key(&path) {
            return Err("file exists".to_owned());
        }
        let kind = if perm.is_directory() {
            NodeKind::Directory
        } else {
            NodeKind::File(Vec::new())
        };
        let qid = self.insert(path.clone(), kind);
        self.fids.insert(
            fid,
            FidEntry {
                path,
                open: Some(mode),
            },
        );
        Ok(ResponseBody::Create { qid, iounit: 0 })
    }

    fn read(&mut self, fid: u32, offset: u64, count: u32) -> Reply {
        let entry = self.fid(fid)?;
        let mode = entry.open.ok_or("fid not open")?;
        if !mode.allows_read() {
            return Err("fid not open for reading".to_owned());
        }
        let bytes = match &self.node(&entry.path)?.kind {
            NodeKind::File(data) => data.clone(),
            NodeKind::Directory => self.directory_listing(&entry.path)?,
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
        let end = start.saturating_add(count as usize).min(bytes.len());
        Ok(ResponseBody::Read {
            data: bytes[start..end].to_vec(),
        })
    }

    fn write(&mut self, fid: u32, offset: u64, data: &[u8]) -> Reply {
        let entry = self.fid(fid)?;
        let mode = entry.open.ok_or("fid not open")?;
        if !mode.allows_write() {
            return Err("fid not open for writing".to_owned());
        }
        let node = self.nodes.get_mut(&entry.path).ok_or("file not found")?;
        let NodeKind::File(contents) = &mut node.kind else {
            return Err("is a directory".to_owned());
        };
        let start = usize::try_from(offset).map_err(|_| "offset out of range".to_owned())?;
        if contents.len() < start {
            contents.resize(start, 0);
        }
        let overlap = (contents.len() - start).min(data.len());
        contents[start..start + overlap].copy_from_slice(&data[..overlap]);
        contents.extend_from_slice(&data[overlap..]);
        node.version = node.version.wrapping_add(1);
        self.writes.push((entry.path, data.to_vec()));
        Ok(ResponseBody::Write {
            count: data.len() as u32,
        })
    }

    fn directory_listing(&self, path: &str) -> Result<Vec<u8>, String> {
        let mut buffer = Vec::new();
        for (name, node) in self.children(path) {
            let (mode, length) = match &node.kind {
                NodeKind::Directory => (DMDIR | 0o755, 0),
                NodeKind::File(data) => (0o644, data.len() as u64),
            };
            let stat = Stat {
                ty: 0,
                dev: 0,
                qid: node.qid(),
                mode,
                atime: 0,
                mtime: 0,
                length,
                name,
                uid: "wmii".to_owned(),
                gid: "wmii".to_owned(),
                muid: "wmii".to_owned(),
            };
            stat.encode(&mut buffer).map_err(|err| err.to_string())?;
        }
        Ok(buffer)
    }

    fn children(&self, path: &str) -> Vec<(String, Node)> {
        self.nodes
            .iter()
            .filter(|(candidate, _)| candidate.as_str() != "/" && parent_of(candidate) == Some(path))
            .filter_map(|(candidate, node)| {
                candidate
                    .rsplit('/')
                    .next()
                    .map(|name| (name.to_owned(), node.clone()))
            })
            .collect()
    }

    fn ensure_dirs(&mut self, path: &str) -> Result<(), SeedError> {
        let mut current = String::from("/");
        for component in path.split('/').filter(|part| !part.is_empty()) {
            current = join(&current, component);
            match self.nodes.get(&current) {
                Some(Node {
                    kind: NodeKind::Directory,
                    ..
                }) => {}
                Some(_) => return Err(SeedError::NotADirectory(current)),
                None => {
                    self.insert(current.clone(), NodeKind::Directory);
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, path: String, kind: NodeKind) -> Qid {
        let node = Node {
            kind,
            qid_path: self.next_qid,
            version: 0,
        };
        self.next_qid += 1;
        let qid = node.qid();
        self.nodes.insert(path, node);
        qid
    }

    fn bind_open(&mut self, fid: u32, mode: OpenMode) {
        if let Some(entry) = self.fids.get_mut(&fid) {
            entry.open = Some(mode);
        }
    }

    fn fid(&self, fid: u32) -> Result<FidEntry, String> {
        self.fids
            .get(&fid)
            .cloned()
            .ok_or_else(|| format!("unknown fid {fid}"))
    }

    fn node(&self, path: &str) -> Result<&Node, String> {
        self.nodes
            .get(path)
            .ok_or_else(|| "file not found".to_owned())
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rfind('/')? {
        0 if path.len() > 1 => Some("/"),
        0 => None,
        index => Some(&path[..index]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_builds_parent_directories() {
        let server = InProcessServer::new();
        server.put("/client/sel/tags", "1+mail").unwrap();
        assert!(server.exists("/client/sel"));
        assert_eq!(server.children("/client"), vec!["sel"]);
        assert_eq!(
            server.put("/client/sel/tags/x", ""),
            Err(SeedError::NotADirectory("/client/sel/tags".to_owned()))
        );
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("/lbar"), Some("/"));
        assert_eq!(parent_of("/lbar/1"), Some("/lbar"));
        assert_eq!(normalize("lbar//1/"), "/lbar/1");
    }

    #[test]
    fn drop_fault_fails_the_exchange() {
        let server = InProcessServer::new();
        server.inject(Fault::Drop("Tversion"));
        let mut transport = server.transport();
        let frame = wmii9p_codec::encode_request(&Request {
            tag: wmii9p_codec::NOTAG,
            body: RequestBody::Version {
                msize: DEFAULT_MSIZE,
                version: VERSION.to_owned(),
            },
        })
        .unwrap();
        assert!(matches!(
            transport.exchange(&frame),
            Err(TransportError::Closed)
        ));
        assert!(transport.exchange(&frame).is_ok());
    }
}
