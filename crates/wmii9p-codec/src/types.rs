// Author: Lukas Bower
// Purpose: Define 9P2000 wire types and constants shared by the codec and client.
#![allow(clippy::module_name_repetitions)]

//! 9P2000 data model definitions.

use alloc::string::String;
use alloc::vec::Vec;

/// Maximum message size proposed during version negotiation.
pub const DEFAULT_MSIZE: u32 = 16 * 1024;

/// Protocol version string spoken by wmii.
pub const VERSION: &str = "9P2000";

/// Tag reserved for `Tversion`.
pub const NOTAG: u16 = u16::MAX;

/// Fid value meaning "no fid" (used for the attach auth fid).
pub const NOFID: u32 = u32::MAX;

/// Overhead of a `Tread`/`Twrite` header that must fit inside msize.
pub const IOHDRSZ: u32 = 24;

/// Maximum number of path components in a single walk.
pub const MAXWELEM: usize = 16;

/// Directory bit in the stat `mode` and create `perm` fields.
pub const DMDIR: u32 = 0x8000_0000;

/// Possible errors produced while encoding or decoding 9P messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// Input buffer was shorter than the declared frame length.
    #[error("truncated frame")]
    Truncated,
    /// Encountered an unknown message type.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    /// Encountered malformed UTF-8 data.
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// Declared message size does not match the actual payload length.
    #[error("length mismatch: declared {declared} actual {actual}")]
    LengthMismatch {
        /// Message length declared in the frame header.
        declared: u32,
        /// Actual byte length observed in the payload.
        actual: usize,
    },
    /// Detected an invalid path component or walk depth beyond the limit.
    #[error("invalid path component")]
    InvalidPath,
    /// Invalid open mode flags were provided.
    #[error("invalid open mode {0}")]
    InvalidOpenMode(u8),
    /// String field exceeds the 16-bit length prefix.
    #[error("string of {0} bytes exceeds protocol limit")]
    StringTooLong(usize),
}

/// Qid type bitflags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QidType(u8);

impl QidType {
    /// Directory bit.
    pub const DIRECTORY: Self = Self(0x80);
    /// Append-only bit.
    pub const APPEND_ONLY: Self = Self(0x40);
    /// Regular file.
    pub const FILE: Self = Self(0x00);

    pub(crate) fn from_raw(value: u8) -> Self {
        Self(value)
    }

    /// Check whether the Qid represents a directory.
    #[must_use]
    pub fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY.0 != 0
    }
}

impl From<QidType> for u8 {
    fn from(value: QidType) -> Self {
        value.0
    }
}

/// 9P Qid descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qid {
    ty: QidType,
    version: u32,
    path: u64,
}

impl Qid {
    /// Construct a new Qid.
    #[must_use]
    pub fn new(ty: QidType, version: u32, path: u64) -> Self {
        Self { ty, version, path }
    }

    /// Return the Qid type flags.
    #[must_use]
    pub fn ty(&self) -> QidType {
        self.ty
    }

    /// Return the Qid version field.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Return the Qid path field.
    #[must_use]
    pub fn path(&self) -> u64 {
        self.path
    }
}

/// Base open mode encoded in the low bits of the open mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpenModeBase {
    /// Open for reading.
    ReadOnly = 0,
    /// Open for writing.
    WriteOnly = 1,
    /// Open for reading and writing.
    ReadWrite = 2,
    /// Execute traversal.
    Execute = 3,
}

/// 9P open mode flags as a structured representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    base: OpenModeBase,
    truncate: bool,
}

impl OpenMode {
    const OTRUNC: u8 = 0x10;

    /// Construct a read-only mode descriptor.
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            base: OpenModeBase::ReadOnly,
            truncate: false,
        }
    }

    /// Construct a write-only mode descriptor.
    #[must_use]
    pub fn write_only() -> Self {
        Self {
            base: OpenModeBase::WriteOnly,
            truncate: false,
        }
    }

    /// Construct a write-only descriptor that truncates the node on open.
    #[must_use]
    pub fn write_truncate() -> Self {
        Self {
            base: OpenModeBase::WriteOnly,
            truncate: true,
        }
    }

    pub(crate) fn from_bits(value: u8) -> Result<Self, CodecError> {
        if value & !(0x03 | Self::OTRUNC) != 0 {
            return Err(CodecError::InvalidOpenMode(value));
        }
        let base = match value & 0x03 {
            0 => OpenModeBase::ReadOnly,
            1 => OpenModeBase::WriteOnly,
            2 => OpenModeBase::ReadWrite,
            _ => OpenModeBase::Execute,
        };
        Ok(Self {
            base,
            truncate: value & Self::OTRUNC != 0,
        })
    }

    /// Determine if the mode permits reading.
    #[must_use]
    pub fn allows_read(self) -> bool {
        matches!(
            self.base,
            OpenModeBase::ReadOnly | OpenModeBase::ReadWrite | OpenModeBase::Execute
        )
    }

    /// Determine if the mode permits writing.
    #[must_use]
    pub fn allows_write(self) -> bool {
        matches!(self.base, OpenModeBase::WriteOnly | OpenModeBase::ReadWrite)
    }

    /// Check whether the node is truncated on open.
    #[must_use]
    pub fn truncates(self) -> bool {
        self.truncate
    }

    /// Expose the raw flag representation used on the wire.
    #[must_use]
    pub fn raw(self) -> u8 {
        let mut bits = self.base as u8;
        if self.truncate {
            bits |= Self::OTRUNC;
        }
        bits
    }
}

impl From<OpenMode> for u8 {
    fn from(value: OpenMode) -> Self {
        value.raw()
    }
}

/// Permission bits supplied to `Tcreate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Perm(u32);

impl Perm {
    /// `rw-r--r--` regular file.
    pub const FILE: Self = Self(0o644);
    /// `rwxr-xr-x` directory.
    pub const DIRECTORY: Self = Self(DMDIR | 0o755);

    /// Wrap raw permission bits.
    #[must_use]
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Return the raw permission bits.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Check whether the directory bit is set.
    #[must_use]
    pub fn is_directory(self) -> bool {
        self.0 & DMDIR != 0
    }
}

/// Request envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request identifier, echoed back by responses.
    pub tag: u16,
    /// The concrete request payload.
    pub body: RequestBody,
}

/// Response envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response identifier (mirrors the request tag).
    pub tag: u16,
    /// The concrete response payload.
    pub body: ResponseBody,
}

/// Request variants used by the control client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// `Tversion` negotiates the message size and version string.
    Version {
        /// Requested maximum message size.
        msize: u32,
        /// Protocol version string supplied by the client.
        version: String,
    },
    /// `Tattach` binds a fid to the root of the served tree.
    Attach {
        /// Fid identifier associated with the root.
        fid: u32,
        /// Authentication fid, [`NOFID`] when unauthenticated.
        afid: u32,
        /// User name string provided by the client.
        uname: String,
        /// Attachment name (tree selector) supplied by the client.
        aname: String,
    },
    /// `Twalk` traverses the tree to produce a new fid.
    Walk {
        /// Source fid for the walk operation.
        fid: u32,
        /// Destination fid receiving the walk result.
        newfid: u32,
        /// Path components supplied by the client.
        wnames: Vec<String>,
    },
    /// `Topen` opens a fid for subsequent I/O operations.
    Open {
        /// Fid to open.
        fid: u32,
        /// Requested open mode.
        mode: OpenMode,
    },
    /// `Tcreate` creates `name` inside the directory bound to `fid`.
    Create {
        /// Directory fid; afterwards bound to the new node.
        fid: u32,
        /// Name of the node to create.
        name: String,
        /// Permission bits of the new node.
        perm: Perm,
        /// Mode the new node is opened with.
        mode: OpenMode,
    },
    /// `Tread` reads a range of bytes from a fid.
    Read {
        /// Fid to read from.
        fid: u32,
        /// Offset into the file.
        offset: u64,
        /// Number of bytes requested.
        count: u32,
    },
    /// `Twrite` writes bytes to a fid.
    Write {
        /// Fid to write to.
        fid: u32,
        /// Offset within the file.
        offset: u64,
        /// Payload bytes supplied by the client.
        data: Vec<u8>,
    },
    /// `Tclunk` releases a fid.
    Clunk {
        /// Fid identifier to release.
        fid: u32,
    },
    /// `Tremove` removes the node and releases the fid.
    Remove {
        /// Fid bound to the node to remove.
        fid: u32,
    },
}

impl RequestBody {
    /// Short message name used in logs and error reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Version { .. } => "Tversion",
            Self::Attach { .. } => "Tattach",
            Self::Walk { .. } => "Twalk",
            Self::Open { .. } => "Topen",
            Self::Create { .. } => "Tcreate",
            Self::Read { .. } => "Tread",
            Self::Write { .. } => "Twrite",
            Self::Clunk { .. } => "Tclunk",
            Self::Remove { .. } => "Tremove",
        }
    }
}

/// Response variants surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Response to `Tversion` carrying the negotiated size and version.
    Version {
        /// Negotiated maximum message size.
        msize: u32,
        /// Protocol version string.
        version: String,
    },
    /// Response to `Tattach` containing the root Qid.
    Attach {
        /// Qid associated with the root.
        qid: Qid,
    },
    /// Response to `Twalk` containing the traversed Qids.
    Walk {
        /// Qids encountered during the walk.
        qids: Vec<Qid>,
    },
    /// Response to `Topen` containing the opened Qid and I/O unit size.
    Open {
        /// Qid associated with the opened fid.
        qid: Qid,
        /// Maximum I/O payload size, zero when unspecified.
        iounit: u32,
    },
    /// Response to `Tcreate` containing the created Qid and I/O unit size.
    Create {
        /// Qid of the created node.
        qid: Qid,
        /// Maximum I/O payload size, zero when unspecified.
        iounit: u32,
    },
    /// Response to `Tread` containing the payload bytes.
    Read {
        /// Data payload read from the fid.
        data: Vec<u8>,
    },
    /// Response to `Twrite` containing the write count.
    Write {
        /// Number of bytes written.
        count: u32,
    },
    /// Response to `Tclunk`.
    Clunk,
    /// Response to `Tremove`.
    Remove,
    /// `Rerror` carrying the server's error string.
    Error {
        /// Human-readable message describing the error.
        message: String,
    },
}
