// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide the wmii node operations on top of a serialized 9P session.
// Author: Lukas Bower

//! High-level 9P client for the wmii control filesystem.
//!
//! Every operation runs a complete walk/open/io/clunk sequence on a freshly
//! allocated fid while holding the session lock, so no two operations ever
//! interleave on the wire.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, trace};
use wmii9p_codec::{
    decode_stats, Codec, OpenMode, Perm, Qid, Request, RequestBody, ResponseBody, DEFAULT_MSIZE,
    IOHDRSZ, MAXWELEM, NOFID, NOTAG, VERSION,
};

use super::{Address, ProtocolError, StreamTransport, Transport, TransportError};

/// Fid bound to the root of the tree for the life of the connection.
pub const ROOT_FID: u32 = 1;

const READ_CHUNK: u32 = 4096;
const WRITE_CHUNK: u32 = 1024;

/// Thread-safe client owning one connection to the manager.
pub struct Client {
    session: Mutex<Session>,
}

impl Client {
    /// Negotiate the protocol version and attach the root fid.
    pub fn connect<T: Transport + 'static>(transport: T) -> Result<Self, TransportError> {
        let mut session = Session {
            transport: Box::new(transport),
            codec: Codec,
            msize: DEFAULT_MSIZE,
            next_fid: ROOT_FID + 1,
            next_tag: 1,
        };
        session.version()?;
        session.attach()?;
        info!("attached to wmii (msize {})", session.msize);
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Dial `address` and attach.
    pub fn dial(address: &Address) -> Result<Self, TransportError> {
        Self::connect(StreamTransport::connect(address)?)
    }

    /// Maximum message size agreed with the server.
    #[must_use]
    pub fn msize(&self) -> u32 {
        self.lock().msize
    }

    /// Replace the contents of `path` with `value` followed by a newline.
    pub fn write(&self, path: &str, value: &str) -> Result<(), ProtocolError> {
        self.write_lines(path, &[value])
    }

    /// Replace the contents of `path` with `lines`, one per line.
    pub fn write_lines<S: AsRef<str>>(&self, path: &str, lines: &[S]) -> Result<(), ProtocolError> {
        let mut payload = join_lines(lines);
        payload.push('\n');
        let wnames = split_path("write", path)?;
        self.lock().run("write", path, |session, fid| {
            session.walk("write", path, fid, &wnames)?;
            session.open("write", path, fid, OpenMode::write_truncate())?;
            session.write_all("write", path, fid, payload.as_bytes())
        })
    }

    /// Read `path` and split it on newlines.
    ///
    /// A trailing newline leaves an empty last element.
    pub fn read(&self, path: &str) -> Result<Vec<String>, ProtocolError> {
        let wnames = split_path("read", path)?;
        let data = self.lock().run("read", path, |session, fid| {
            session.walk("read", path, fid, &wnames)?;
            session.open("read", path, fid, OpenMode::read_only())?;
            session.read_all("read", path, fid)
        })?;
        Ok(String::from_utf8_lossy(&data)
            .split('\n')
            .map(str::to_owned)
            .collect())
    }

    /// Create the file `path` and optionally fill it with `value`.
    pub fn create(&self, path: &str, value: Option<&str>) -> Result<(), ProtocolError> {
        let (parent, name) = match path.trim_end_matches('/').rsplit_once('/') {
            Some((parent, name)) if !name.is_empty() => (parent, name),
            _ => {
                return Err(ProtocolError::InvalidPath {
                    op: "create",
                    path: path.to_owned(),
                    reason: "no file name",
                })
            }
        };
        let wnames = split_path("create", parent)?;
        self.lock().run("create", path, |session, fid| {
            session.walk("create", path, fid, &wnames)?;
            session.create("create", path, fid, name)?;
            match value {
                Some(value) => session.write_all("create", path, fid, value.as_bytes()),
                None => Ok(()),
            }
        })
    }

    /// Remove `path`.
    pub fn remove(&self, path: &str) -> Result<(), ProtocolError> {
        let wnames = split_path("remove", path)?;
        let mut session = self.lock();
        let fid = session.allocate_fid();
        debug!("remove {path} (fid {fid})");
        let opened = session
            .walk("remove", path, fid, &wnames)
            .and_then(|()| session.open("remove", path, fid, OpenMode::read_only()));
        if let Err(err) = opened {
            session.clunk_quietly(fid);
            return Err(err);
        }
        // Tremove releases the fid whatever the outcome.
        session
            .transact(RequestBody::Remove { fid })
            .map_err(|err| ProtocolError::wrap("remove", path, err))
            .and_then(|body| match body {
                ResponseBody::Remove => Ok(()),
                _ => Err(ProtocolError::wrap(
                    "remove",
                    path,
                    TransportError::UnexpectedResponse("Rremove"),
                )),
            })
    }

    /// List the entries of directory `path`; subdirectories carry a trailing `/`.
    pub fn list(&self, path: &str) -> Result<Vec<String>, ProtocolError> {
        let wnames = split_path("list", path)?;
        let data = self.lock().run("list", path, |session, fid| {
            session.walk("list", path, fid, &wnames)?;
            session.open("list", path, fid, OpenMode::read_only())?;
            session.read_all("list", path, fid)
        })?;
        let stats = decode_stats(&data)
            .map_err(|err| ProtocolError::wrap("list", path, TransportError::Codec(err)))?;
        Ok(stats
            .into_iter()
            .map(|stat| {
                if stat.is_dir() {
                    format!("{}/", stat.name)
                } else {
                    stat.name
                }
            })
            .collect())
    }

    /// Stream `path` line by line into `callback` until it returns `false`
    /// or the stream ends.
    ///
    /// The session lock is held for the whole stream, so long-lived streams
    /// such as `/event` belong on a dedicated connection.
    pub fn process<F>(&self, path: &str, mut callback: F) -> Result<(), ProtocolError>
    where
        F: FnMut(&str) -> bool,
    {
        let wnames = split_path("process", path)?;
        self.lock().run("process", path, |session, fid| {
            session.walk("process", path, fid, &wnames)?;
            session.open("process", path, fid, OpenMode::read_only())?;
            let count = session.read_chunk();
            let mut offset = 0u64;
            let mut pending: Vec<u8> = Vec::new();
            loop {
                let chunk = session.read_at("process", path, fid, offset, count)?;
                if chunk.is_empty() {
                    break;
                }
                offset += chunk.len() as u64;
                pending.extend_from_slice(&chunk);
                while let Some(pos) = pending.iter().position(|byte| *byte == b'\n') {
                    let line: Vec<u8> = pending.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line[..pos]);
                    if !callback(text.trim()) {
                        return Ok(());
                    }
                }
            }
            let rest = String::from_utf8_lossy(&pending);
            let rest = rest.trim();
            if !rest.is_empty() {
                callback(rest);
            }
            Ok(())
        })
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Session {
    transport: Box<dyn Transport>,
    codec: Codec,
    msize: u32,
    next_fid: u32,
    next_tag: u16,
}

impl Session {
    fn version(&mut self) -> Result<(), TransportError> {
        let request = Request {
            tag: NOTAG,
            body: RequestBody::Version {
                msize: DEFAULT_MSIZE,
                version: VERSION.to_owned(),
            },
        };
        let ResponseBody::Version { msize, version } = self.exchange(request)? else {
            return Err(TransportError::UnexpectedResponse("Rversion"));
        };
        if version != VERSION {
            return Err(TransportError::VersionMismatch(version));
        }
        if msize <= IOHDRSZ {
            return Err(TransportError::FrameSize(msize));
        }
        self.msize = msize.min(DEFAULT_MSIZE);
        Ok(())
    }

    fn attach(&mut self) -> Result<Qid, TransportError> {
        let ResponseBody::Attach { qid } = self.transact(RequestBody::Attach {
            fid: ROOT_FID,
            afid: NOFID,
            uname: String::new(),
            aname: String::new(),
        })?
        else {
            return Err(TransportError::UnexpectedResponse("Rattach"));
        };
        Ok(qid)
    }

    /// Run `steps` on a fresh fid and clunk it exactly once afterwards.
    fn run<T>(
        &mut self,
        op: &'static str,
        path: &str,
        steps: impl FnOnce(&mut Self, u32) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let fid = self.allocate_fid();
        debug!("{op} {path} (fid {fid})");
        match steps(self, fid) {
            Ok(value) => {
                self.clunk(fid)
                    .map_err(|err| ProtocolError::wrap(op, path, err))?;
                Ok(value)
            }
            Err(err) => {
                self.clunk_quietly(fid);
                Err(err)
            }
        }
    }

    fn allocate_fid(&mut self) -> u32 {
        let fid = self.next_fid;
        self.next_fid = match self.next_fid.wrapping_add(1) {
            NOFID | 0 | ROOT_FID => ROOT_FID + 1,
            next => next,
        };
        fid
    }

    fn next_tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = match self.next_tag.wrapping_add(1) {
            NOTAG => 1,
            next => next,
        };
        tag
    }

    fn read_chunk(&self) -> u32 {
        READ_CHUNK.min(self.msize - IOHDRSZ)
    }

    fn walk(
        &mut self,
        op: &'static str,
        path: &str,
        fid: u32,
        wnames: &[String],
    ) -> Result<(), ProtocolError> {
        let body = self
            .transact(RequestBody::Walk {
                fid: ROOT_FID,
                newfid: fid,
                wnames: wnames.to_vec(),
            })
            .map_err(|err| ProtocolError::wrap(op, path, err))?;
        let ResponseBody::Walk { qids } = body else {
            return Err(ProtocolError::wrap(
                op,
                path,
                TransportError::UnexpectedResponse("Rwalk"),
            ));
        };
        if qids.len() < wnames.len() {
            return Err(ProtocolError::NotFound {
                op,
                path: path.to_owned(),
                resolved: qids.len(),
                requested: wnames.len(),
            });
        }
        Ok(())
    }

    fn open(
        &mut self,
        op: &'static str,
        path: &str,
        fid: u32,
        mode: OpenMode,
    ) -> Result<(), ProtocolError> {
        match self.transact(RequestBody::Open { fid, mode }) {
            Ok(ResponseBody::Open { .. }) => Ok(()),
            Ok(_) => Err(ProtocolError::wrap(
                op,
                path,
                TransportError::UnexpectedResponse("Ropen"),
            )),
            Err(err) => Err(ProtocolError::wrap(op, path, err)),
        }
    }

    fn create(
        &mut self,
        op: &'static str,
        path: &str,
        fid: u32,
        name: &str,
    ) -> Result<(), ProtocolError> {
        match self.transact(RequestBody::Create {
            fid,
            name: name.to_owned(),
            perm: Perm::FILE,
            mode: OpenMode::write_only(),
        }) {
            Ok(ResponseBody::Create { .. }) => Ok(()),
            Ok(_) => Err(ProtocolError::wrap(
                op,
                path,
                TransportError::UnexpectedResponse("Rcreate"),
            )),
            Err(err) => Err(ProtocolError::wrap(op, path, err)),
        }
    }

    fn read_at(
        &mut self,
        op: &'static str,
        path: &str,
        fid: u32,
        offset: u64,
        count: u32,
    ) -> Result<Vec<u8>, ProtocolError> {
        match self.transact(RequestBody::Read { fid, offset, count }) {
            Ok(ResponseBody::Read { data }) => Ok(data),
            Ok(_) => Err(ProtocolError::wrap(
                op,
                path,
                TransportError::UnexpectedResponse("Rread"),
            )),
            Err(err) => Err(ProtocolError::wrap(op, path, err)),
        }
    }

    fn read_all(&mut self, op: &'static str, path: &str, fid: u32) -> Result<Vec<u8>, ProtocolError> {
        let count = self.read_chunk();
        let mut data = Vec::new();
        loop {
            let chunk = self.read_at(op, path, fid, data.len() as u64, count)?;
            if chunk.is_empty() {
                break;
            }
            data.extend_from_slice(&chunk);
        }
        trace!("{op} {path}: read {} bytes", data.len());
        Ok(data)
    }

    fn write_all(
        &mut self,
        op: &'static str,
        path: &str,
        fid: u32,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        let chunk = WRITE_CHUNK.min(self.msize - IOHDRSZ) as usize;
        let mut offset = 0usize;
        while offset < payload.len() {
            let end = payload.len().min(offset + chunk);
            let body = self
                .transact(RequestBody::Write {
                    fid,
                    offset: offset as u64,
                    data: payload[offset..end].to_vec(),
                })
                .map_err(|err| ProtocolError::wrap(op, path, err))?;
            let ResponseBody::Write { count } = body else {
                return Err(ProtocolError::wrap(
                    op,
                    path,
                    TransportError::UnexpectedResponse("Rwrite"),
                ));
            };
            if count == 0 {
                return Err(ProtocolError::ShortWrite {
                    op,
                    path: path.to_owned(),
                    offset: offset as u64,
                });
            }
            offset += (count as usize).min(end - offset);
        }
        Ok(())
    }

    fn clunk(&mut self, fid: u32) -> Result<(), TransportError> {
        let ResponseBody::Clunk = self.transact(RequestBody::Clunk { fid })? else {
            return Err(TransportError::UnexpectedResponse("Rclunk"));
        };
        Ok(())
    }

    fn clunk_quietly(&mut self, fid: u32) {
        if let Err(err) = self.clunk(fid) {
            trace!("ignoring clunk failure for fid {fid}: {err}");
        }
    }

    fn transact(&mut self, body: RequestBody) -> Result<ResponseBody, TransportError> {
        let tag = self.next_tag();
        self.exchange(Request { tag, body })
    }

    fn exchange(&mut self, request: Request) -> Result<ResponseBody, TransportError> {
        let name = request.body.name();
        let frame = self.codec.encode_request(&request)?;
        let reply = self.transport.exchange(&frame)?;
        let response = self.codec.decode_response(&reply)?;
        if response.tag != request.tag {
            return Err(TransportError::UnexpectedTag {
                expected: request.tag,
                got: response.tag,
            });
        }
        match response.body {
            ResponseBody::Error { message } => Err(TransportError::Rejected {
                request: name,
                message,
            }),
            other => Ok(other),
        }
    }
}

fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n")
}

fn split_path(op: &'static str, path: &str) -> Result<Vec<String>, ProtocolError> {
    let wnames: Vec<String> = path
        .split('/')
        .filter(|component| !component.is_empty())
        .map(str::to_owned)
        .collect();
    if wnames.len() > MAXWELEM {
        return Err(ProtocolError::InvalidPath {
            op,
            path: path.to_owned(),
            reason: "too many components",
        });
    }
    Ok(wnames)
}

#[cfg(all(test, feature = "inprocess"))]
mod tests {
    use super::*;
    use crate::p9::inprocess::{Fault, InProcessServer};

    fn attached() -> (Client, InProcessServer) {
        let server = InProcessServer::new();
        server.mkdir("/lbar").unwrap();
        server.mkdir("/client/sel").unwrap();
        server.put("/ctl", "view 1\n").unwrap();
        let client = Client::connect(server.transport()).unwrap();
        (client, server)
    }

    #[test]
    fn write_appends_newline_and_truncates() {
        let (client, server) = attached();
        client.write("/ctl", "view 2").unwrap();
        assert_eq!(server.contents("/ctl").unwrap(), "view 2\n");
        client.write_lines("/ctl", &["a", "b"]).unwrap();
        assert_eq!(server.contents("/ctl").unwrap(), "a\nb\n");
    }

    #[test]
    fn read_splits_on_newlines() {
        let (client, _server) = attached();
        assert_eq!(client.read("/ctl").unwrap(), vec!["view 1", ""]);
    }

    #[test]
    fn create_without_value_writes_nothing() {
        let (client, server) = attached();
        client.create("/lbar/1", None).unwrap();
        assert_eq!(server.contents("/lbar/1").unwrap(), "");
        assert!(!server
            .requests()
            .iter()
            .any(|request| matches!(request.body, RequestBody::Write { .. })));
    }

    #[test]
    fn list_marks_directories() {
        let (client, _server) = attached();
        let mut entries = client.list("/").unwrap();
        entries.sort();
        assert_eq!(entries, vec!["client/", "ctl", "lbar/"]);
    }

    #[test]
    fn process_stops_when_callback_declines() {
        let (client, server) = attached();
        server
            .put("/event", "CreateTag 1\nFocusTag 1\nUrgent 3\n")
            .unwrap();
        let mut seen = Vec::new();
        client
            .process("/event", |line| {
                seen.push(line.to_owned());
                seen.len() < 2
            })
            .unwrap();
        assert_eq!(seen, vec!["CreateTag 1", "FocusTag 1"]);
        assert_eq!(server.live_fids(), vec![ROOT_FID]);
    }

    #[test]
    fn process_delivers_final_partial_line() {
        let (client, server) = attached();
        server.put("/event", "  Start wmiirc  \nLeftBarClick 1 mail").unwrap();
        let mut seen = Vec::new();
        client
            .process("/event", |line| {
                seen.push(line.to_owned());
                true
            })
            .unwrap();
        assert_eq!(seen, vec!["Start wmiirc", "LeftBarClick 1 mail"]);
    }

    #[test]
    fn large_payloads_are_chunked() {
        let (client, server) = attached();
        let big = "x".repeat(5000);
        client.write("/ctl", &big).unwrap();
        let writes = server
            .requests()
            .iter()
            .filter(|request| matches!(request.body, RequestBody::Write { .. }))
            .count();
        assert_eq!(writes, 5);
        assert_eq!(client.read("/ctl").unwrap()[0].len(), 5000);
    }

    #[test]
    fn fids_increase_even_after_failures() {
        let (client, server) = attached();
        assert!(client.read("/missing").is_err());
        client.read("/ctl").unwrap();
        let walked: Vec<u32> = server
            .requests()
            .iter()
            .filter_map(|request| match request.body {
                RequestBody::Walk { newfid, .. } => Some(newfid),
                _ => None,
            })
            .collect();
        assert_eq!(walked, vec![2, 3]);
    }

    #[test]
    fn remove_never_clunks() {
        let (client, server) = attached();
        server.put("/lbar/1", "").unwrap();
        client.remove("/lbar/1").unwrap();
        assert!(server.contents("/lbar/1").is_none());
        assert!(!server
            .requests()
            .iter()
            .any(|request| matches!(request.body, RequestBody::Clunk { .. })));
        assert_eq!(server.live_fids(), vec![ROOT_FID]);
    }

    #[test]
    fn rejected_open_is_reported_and_clunked() {
        let (client, server) = attached();
        server.inject(Fault::Reject("Topen"));
        let err = client.read("/ctl").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Rejected {
                request: "Topen",
                ..
            }
        ));
        assert_eq!(server.live_fids(), vec![ROOT_FID]);
    }

    #[test]
    fn deep_paths_are_refused_before_touching_the_wire() {
        let (client, server) = attached();
        let before = server.requests().len();
        let path = "/a".repeat(MAXWELEM + 1);
        assert!(matches!(
            client.read(&path),
            Err(ProtocolError::InvalidPath { .. })
        ));
        assert_eq!(server.requests().len(), before);
    }

    #[test]
    fn fid_counter_skips_reserved_values() {
        let (client, _server) = attached();
        let mut session = client.lock();
        session.next_fid = u32::MAX - 1;
        assert_eq!(session.allocate_fid(), u32::MAX - 1);
        assert_eq!(session.allocate_fid(), ROOT_FID + 1);
    }
}
