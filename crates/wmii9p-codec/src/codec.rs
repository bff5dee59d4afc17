// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode 9P2000 wire messages without std dependencies.
// Author: Lukas Bower

//! Encode/decode helpers for 9P2000 wire messages.
//!
//! Every frame is `size[4] type[1] tag[2] payload`, little-endian, where
//! `size` counts the whole frame including itself.

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::str;

use crate::types::*;

/// 9P message opcodes used by the control client.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Tversion = 100,
    Rversion = 101,
    Tattach = 104,
    Rattach = 105,
    Rerror = 107,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tcreate = 114,
    Rcreate = 115,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            100 => Tversion,
            101 => Rversion,
            104 => Tattach,
            105 => Rattach,
            107 => Rerror,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            114 => Tcreate,
            115 => Rcreate,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            other => return Err(CodecError::Unsupported(other)),
        })
    }
}

/// Stateless 9P2000 encoder/decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec;

impl Codec {
    /// Encode a request into its wire representation.
    pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&request.tag.to_le_bytes());
        let ty = match &request.body {
            RequestBody::Version { msize, version } => {
                payload.extend_from_slice(&msize.to_le_bytes());
                put_string(&mut payload, version)?;
                MessageType::Tversion
            }
            RequestBody::Attach {
                fid,
                afid,
                uname,
                aname,
            } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&afid.to_le_bytes());
                put_string(&mut payload, uname)?;
                put_string(&mut payload, aname)?;
                MessageType::Tattach
            }
            RequestBody::Walk {
                fid,
                newfid,
                wnames,
            } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&newfid.to_le_bytes());
                if wnames.len() > MAXWELEM {
                    return Err(CodecError::InvalidPath);
                }
                payload.extend_from_slice(&(wnames.len() as u16).to_le_bytes());
                for name in wnames {
                    validate_component(name)?;
                    put_string(&mut payload, name)?;
                }
                MessageType::Twalk
            }
            RequestBody::Open { fid, mode } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.push((*mode).into());
                MessageType::Topen
            }
            RequestBody::Create {
                fid,
                name,
                perm,
                mode,
            } => {
                validate_component(name)?;
                payload.extend_from_slice(&fid.to_le_bytes());
                put_string(&mut payload, name)?;
                payload.extend_from_slice(&perm.raw().to_le_bytes());
                payload.push((*mode).into());
                MessageType::Tcreate
            }
            RequestBody::Read { fid, offset, count } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&offset.to_le_bytes());
                payload.extend_from_slice(&count.to_le_bytes());
                MessageType::Tread
            }
            RequestBody::Write { fid, offset, data } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                payload.extend_from_slice(&offset.to_le_bytes());
                put_data(&mut payload, data)?;
                MessageType::Twrite
            }
            RequestBody::Clunk { fid } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                MessageType::Tclunk
            }
            RequestBody::Remove { fid } => {
                payload.extend_from_slice(&fid.to_le_bytes());
                MessageType::Tremove
            }
        };
        finish(ty, &payload)
    }

    /// Encode a response into its wire representation.
    pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&response.tag.to_le_bytes());
        let ty = match &response.body {
            ResponseBody::Version { msize, version } => {
                payload.extend_from_slice(&msize.to_le_bytes());
                put_string(&mut payload, version)?;
                MessageType::Rversion
            }
            ResponseBody::Attach { qid } => {
                put_qid(&mut payload, qid);
                MessageType::Rattach
            }
            ResponseBody::Walk { qids } => {
                if qids.len() > MAXWELEM {
                    return Err(CodecError::InvalidPath);
                }
                payload.extend_from_slice(&(qids.len() as u16).to_le_bytes());
                for qid in qids {
                    put_qid(&mut payload, qid);
                }
                MessageType::Rwalk
            }
            ResponseBody::Open { qid, iounit } => {
                put_qid(&mut payload, qid);
                payload.extend_from_slice(&iounit.to_le_bytes());
                MessageType::Ropen
            }
            ResponseBody::Create { qid, iounit } => {
                put_qid(&mut payload, qid);
                payload.extend_from_slice(&iounit.to_le_bytes());
                MessageType::Rcreate
            }
            ResponseBody::Read { data } => {
                put_data(&mut payload, data)?;
                MessageType::Rread
            }
            ResponseBody::Write { count } => {
                payload.extend_from_slice(&count.to_le_bytes());
                MessageType::Rwrite
            }
            ResponseBody::Clunk => MessageType::Rclunk,
            ResponseBody::Remove => MessageType::Rremove,
            ResponseBody::Error { message } => {
                put_string(&mut payload, message)?;
                MessageType::Rerror
            }
        };
        finish(ty, &payload)
    }

    /// Decode a request from the wire representation.
    pub fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        let (ty, payload) = decode_message(bytes)?;
        let mut cursor = Cursor::new(payload);
        let tag = cursor.read_u16()?;
        let body = match ty {
            MessageType::Tversion => {
                let msize = cursor.read_u32()?;
                let version = cursor.read_string()?;
                RequestBody::Version { msize, version }
            }
            MessageType::Tattach => {
                let fid = cursor.read_u32()?;
                let afid = cursor.read_u32()?;
                let uname = cursor.read_string()?;
                let aname = cursor.read_string()?;
                RequestBody::Attach {
                    fid,
                    afid,
                    uname,
                    aname,
                }
            }
            MessageType::Twalk => {
                let fid = cursor.read_u32()?;
                let newfid = cursor.read_u32()?;
                let nwname = cursor.read_u16()? as usize;
                if nwname > MAXWELEM {
                    return Err(CodecError::InvalidPath);
                }
                let mut wnames = Vec::with_capacity(nwname);
                for _ in 0..nwname {
                    let name = cursor.read_string()?;
                    validate_component(&name)?;
                    wnames.push(name);
                }
                RequestBody::Walk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            MessageType::Topen => {
                let fid = cursor.read_u32()?;
                let mode = OpenMode::from_bits(cursor.read_u8()?)?;
                RequestBody::Open { fid, mode }
            }
            MessageType::Tcreate => {
                let fid = cursor.read_u32()?;
                let name = cursor.read_string()?;
                validate_component(&name)?;
                let perm = Perm::from_raw(cursor.read_u32()?);
                let mode = OpenMode::from_bits(cursor.read_u8()?)?;
                RequestBody::Create {
                    fid,
                    name,
                    perm,
                    mode,
                }
            }
            MessageType::Tread => {
                let fid = cursor.read_u32()?;
                let offset = cursor.read_u64()?;
                let count = cursor.read_u32()?;
                RequestBody::Read { fid, offset, count }
            }
            MessageType::Twrite => {
                let fid = cursor.read_u32()?;
                let offset = cursor.read_u64()?;
                let data = cursor.read_data()?;
                RequestBody::Write { fid, offset, data }
            }
            MessageType::Tclunk => RequestBody::Clunk {
                fid: cursor.read_u32()?,
            },
            MessageType::Tremove => RequestBody::Remove {
                fid: cursor.read_u32()?,
            },
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        Ok(Request { tag, body })
    }

    /// Decode a response from the wire representation.
    pub fn decode_response(&self, bytes: &[u8]) -> Result<Response, CodecError> {
        let (ty, payload) = decode_message(bytes)?;
        let mut cursor = Cursor::new(payload);
        let tag = cursor.read_u16()?;
        let body = match ty {
            MessageType::Rversion => {
                let msize = cursor.read_u32()?;
                let version = cursor.read_string()?;
                ResponseBody::Version { msize, version }
            }
            MessageType::Rattach => ResponseBody::Attach {
                qid: cursor.read_qid()?,
            },
            MessageType::Rwalk => {
                let count = cursor.read_u16()? as usize;
                if count > MAXWELEM {
                    return Err(CodecError::InvalidPath);
                }
                let mut qids = Vec::with_capacity(count);
                for _ in 0..count {
                    qids.push(cursor.read_qid()?);
                }
                ResponseBody::Walk { qids }
            }
            MessageType::Ropen => {
                let qid = cursor.read_qid()?;
                let iounit = cursor.read_u32()?;
                ResponseBody::Open { qid, iounit }
            }
            MessageType::Rcreate => {
                let qid = cursor.read_qid()?;
                let iounit = cursor.read_u32()?;
                ResponseBody::Create { qid, iounit }
            }
            MessageType::Rread => ResponseBody::Read {
                data: cursor.read_data()?,
            },
            MessageType::Rwrite => ResponseBody::Write {
                count: cursor.read_u32()?,
            },
            MessageType::Rclunk => ResponseBody::Clunk,
            MessageType::Rremove => ResponseBody::Remove,
            MessageType::Rerror => ResponseBody::Error {
                message: cursor.read_string()?,
            },
            other => return Err(CodecError::Unsupported(other as u8)),
        };
        Ok(Response { tag, body })
    }
}

/// Encode a request into a 9P wire frame using the default codec.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, CodecError> {
    Codec.encode_request(req)
}

/// Encode a response into a 9P wire frame using the default codec.
pub fn encode_response(res: &Response) -> Result<Vec<u8>, CodecError> {
    Codec.encode_response(res)
}

/// Decode a request from a 9P wire frame using the default codec.
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    Codec.decode_request(bytes)
}

/// Decode a response from a 9P wire frame using the default codec.
pub fn decode_response(bytes: &[u8]) -> Result<Response, CodecError> {
    Codec.decode_response(bytes)
}

fn finish(ty: MessageType, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let size = payload.len() + 5;
    let declared: u32 = size.try_into().map_err(|_| CodecError::LengthMismatch {
        declared: u32::MAX,
        actual: size,
    })?;
    let mut buffer = Vec::with_capacity(size);
    buffer.extend_from_slice(&declared.to_le_bytes());
    buffer.push(ty as u8);
    buffer.extend_from_slice(payload);
    Ok(buffer)
}

fn decode_message(bytes: &[u8]) -> Result<(MessageType, &[u8]), CodecError> {
    if bytes.len() < 7 {
        return Err(CodecError::Truncated);
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if declared as usize != bytes.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    let ty = MessageType::try_from(bytes[4])?;
    Ok((ty, &bytes[5..]))
}

pub(crate) fn validate_component(component: &str) -> Result<(), CodecError> {
    if component.is_empty() || component.contains('/') || component.contains('\0') {
        return Err(CodecError::InvalidPath);
    }
    Ok(())
}

pub(crate) fn put_qid(buffer: &mut Vec<u8>, qid: &Qid) {
    buffer.push(qid.ty().into());
    buffer.extend_from_slice(&qid.version().to_le_bytes());
    buffer.extend_from_slice(&qid.path().to_le_bytes());
}

pub(crate) fn put_string(buffer: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let len: u16 = value
        .len()
        .try_into()
        .map_err(|_| CodecError::StringTooLong(value.len()))?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_data(buffer: &mut Vec<u8>, data: &[u8]) -> Result<(), CodecError> {
    let count: u32 = data
        .len()
        .try_into()
        .map_err(|_| CodecError::LengthMismatch {
            declared: u32::MAX,
            actual: data.len(),
        })?;
    buffer.extend_from_slice(&count.to_le_bytes());
    buffer.extend_from_slice(data);
    Ok(())
}

pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.take_array().map(u64::from_le_bytes)
    }

    pub(crate) fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        let text = str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(text.to_owned())
    }

    pub(crate) fn read_qid(&mut self) -> Result<Qid, CodecError> {
        let ty = QidType::from_raw(self.read_u8()?);
        let version = self.read_u32()?;
        let path = self.read_u64()?;
        Ok(Qid::new(ty, version, path))
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }

    fn read_data(&mut self) -> Result<Vec<u8>, CodecError> {
        let count = self.read_u32()? as usize;
        let mut data = vec![0u8; count];
        data.copy_from_slice(self.take(count)?);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn reject_invalid_paths_during_encoding() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Walk {
                fid: 1,
                newfid: 2,
                wnames: vec!["invalid/component".to_string()],
            },
        };
        assert_eq!(codec.encode_request(&req), Err(CodecError::InvalidPath));
    }

    #[test]
    fn reject_walks_deeper_than_maxwelem() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Walk {
                fid: 1,
                newfid: 2,
                wnames: (0..=MAXWELEM).map(|i| i.to_string()).collect(),
            },
        };
        assert_eq!(codec.encode_request(&req), Err(CodecError::InvalidPath));
    }

    #[test]
    fn reject_invalid_walk_count_during_decoding() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Walk {
                fid: 1,
                newfid: 2,
                wnames: vec!["valid".to_string()],
            },
        };
        let mut frame = codec.encode_request(&req).expect("encode frame");
        // size[4] type[1] tag[2] fid[4] newfid[4] -> nwname at 15
        frame[15] = 17;
        frame[16] = 0;
        assert_eq!(codec.decode_request(&frame), Err(CodecError::InvalidPath));
    }

    #[test]
    fn detect_truncated_frames() {
        let codec = Codec;
        let req = Request {
            tag: 1,
            body: RequestBody::Open {
                fid: 1,
                mode: OpenMode::read_only(),
            },
        };
        let mut frame = codec.encode_request(&req).expect("encode frame");
        frame.truncate(3);
        assert_eq!(codec.decode_request(&frame), Err(CodecError::Truncated));
    }

    #[test]
    fn detect_invalid_utf8() {
        let codec = Codec;
        let response = Response {
            tag: 1,
            body: ResponseBody::Error {
                message: "invalid".to_owned(),
            },
        };
        let mut frame = codec.encode_response(&response).expect("encode frame");
        let len = frame.len();
        frame[len - 2] = 0xfe;
        frame[len - 1] = 0xff;
        assert_eq!(codec.decode_response(&frame), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn open_mode_carries_truncate_bit() {
        assert_eq!(OpenMode::write_truncate().raw(), 0x11);
        assert_eq!(OpenMode::read_only().raw(), 0x00);
        assert_eq!(
            OpenMode::from_bits(0x80),
            Err(CodecError::InvalidOpenMode(0x80))
        );
    }

    #[test]
    fn version_frame_layout_is_little_endian() {
        let frame = encode_request(&Request {
            tag: NOTAG,
            body: RequestBody::Version {
                msize: DEFAULT_MSIZE,
                version: VERSION.to_string(),
            },
        })
        .expect("encode version");
        assert_eq!(&frame[..4], &(frame.len() as u32).to_le_bytes());
        assert_eq!(frame[4], 100);
        assert_eq!(&frame[5..7], &[0xff, 0xff]);
        assert_eq!(&frame[7..11], &DEFAULT_MSIZE.to_le_bytes());
        assert_eq!(&frame[11..13], &6u16.to_le_bytes());
        assert_eq!(&frame[13..], b"9P2000");
    }
}
