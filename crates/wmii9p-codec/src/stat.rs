// Author: Lukas Bower
// Purpose: Encode and decode 9P2000 stat records returned by directory reads.

//! Stat records as carried by directory reads.

use alloc::string::String;
use alloc::vec::Vec;

use crate::codec::{put_qid, put_string, Cursor};
use crate::types::{CodecError, Qid, DMDIR};

/// Directory entry description in 9P2000 `stat` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Server type (kernel use).
    pub ty: u16,
    /// Server subtype (kernel use).
    pub dev: u32,
    /// Unique identity of the node.
    pub qid: Qid,
    /// Permissions and [`DMDIR`] flag.
    pub mode: u32,
    /// Last access time.
    pub atime: u32,
    /// Last modification time.
    pub mtime: u32,
    /// File length in bytes.
    pub length: u64,
    /// Final path component.
    pub name: String,
    /// Owner name.
    pub uid: String,
    /// Group name.
    pub gid: String,
    /// Name of the last modifier.
    pub muid: String,
}

impl Stat {
    /// Whether the entry describes a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & DMDIR != 0
    }

    /// Append the encoded record (including its size prefix) to `buffer`.
    pub fn encode(&self, buffer: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.ty.to_le_bytes());
        body.extend_from_slice(&self.dev.to_le_bytes());
        put_qid(&mut body, &self.qid);
        body.extend_from_slice(&self.mode.to_le_bytes());
        body.extend_from_slice(&self.atime.to_le_bytes());
        body.extend_from_slice(&self.mtime.to_le_bytes());
        body.extend_from_slice(&self.length.to_le_bytes());
        put_string(&mut body, &self.name)?;
        put_string(&mut body, &self.uid)?;
        put_string(&mut body, &self.gid)?;
        put_string(&mut body, &self.muid)?;
        let size: u16 = body
            .len()
            .try_into()
            .map_err(|_| CodecError::StringTooLong(body.len()))?;
        buffer.extend_from_slice(&size.to_le_bytes());
        buffer.extend_from_slice(&body);
        Ok(())
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let size = cursor.read_u16()? as usize;
        let mut record = Cursor::new(cursor.read_bytes(size)?);
        let stat = Self {
            ty: record.read_u16()?,
            dev: record.read_u32()?,
            qid: record.read_qid()?,
            mode: record.read_u32()?,
            atime: record.read_u32()?,
            mtime: record.read_u32()?,
            length: record.read_u64()?,
            name: record.read_string()?,
            uid: record.read_string()?,
            gid: record.read_string()?,
            muid: record.read_string()?,
        };
        if record.remaining() != 0 {
            return Err(CodecError::LengthMismatch {
                declared: size as u32,
                actual: size - record.remaining(),
            });
        }
        Ok(stat)
    }
}

/// Decode the concatenated stat records of a directory read.
pub fn decode_stats(bytes: &[u8]) -> Result<Vec<Stat>, CodecError> {
    let mut cursor = Cursor::new(bytes);
    let mut stats = Vec::new();
    while cursor.remaining() > 0 {
        stats.push(Stat::decode(&mut cursor)?);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QidType;
    use alloc::string::ToString;

    fn entry(name: &str, mode: u32) -> Stat {
        let ty = if mode & DMDIR != 0 {
            QidType::DIRECTORY
        } else {
            QidType::FILE
        };
        Stat {
            ty: 0,
            dev: 0,
            qid: Qid::new(ty, 0, 7),
            mode,
            atime: 0,
            mtime: 0,
            length: 0,
            name: name.to_string(),
            uid: "wmii".to_string(),
            gid: "wmii".to_string(),
            muid: String::new(),
        }
    }

    #[test]
    fn decodes_concatenated_entries() {
        let mut buffer = Vec::new();
        entry("ctl", 0o644).encode(&mut buffer).unwrap();
        entry("sel", DMDIR | 0o755).encode(&mut buffer).unwrap();
        let stats = decode_stats(&buffer).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].name, "ctl");
        assert!(!stats[0].is_dir());
        assert!(stats[1].is_dir());
    }

    #[test]
    fn empty_directory_yields_no_entries() {
        assert!(decode_stats(&[]).unwrap().is_empty());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut buffer = Vec::new();
        entry("ctl", 0o644).encode(&mut buffer).unwrap();
        buffer.pop();
        assert_eq!(decode_stats(&buffer), Err(CodecError::Truncated));
    }
}
