// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error taxonomy for the wmii 9P address, transport and client layers.
// Author: Lukas Bower

use std::io;

use thiserror::Error;
use wmii9p_codec::CodecError;

/// Problems with the connection address read at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// No address was configured.
    #[error("WMII_ADDRESS is not set")]
    Missing,
    /// The address does not follow `unix!<path>` or `tcp!<host>!<port>`.
    #[error("malformed address {0:?}: expected unix!<path> or tcp!<host>!<port>")]
    Malformed(String),
    /// The transport kind before the first `!` is unknown.
    #[error("unsupported transport {kind:?} in address {address:?}")]
    UnsupportedKind {
        /// Transport kind as written.
        kind: String,
        /// Full address text.
        address: String,
    },
    /// The TCP port is not a valid port number.
    #[error("invalid port {port:?} in address {address:?}")]
    InvalidPort {
        /// Port text as written.
        port: String,
        /// Full address text.
        address: String,
    },
}

/// Connection-level failures.
///
/// Fatal when raised while connecting; once attached every operation wraps
/// them into a [`ProtocolError`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Establishing the socket failed.
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        /// Address being dialled.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Socket read or write failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    /// The server answered `Tversion` with another protocol.
    #[error("version mismatch: server speaks {0:?}")]
    VersionMismatch(String),
    /// A reply carried another tag than the request.
    #[error("unexpected response tag {got} (expected {expected})")]
    UnexpectedTag {
        /// Tag sent with the request.
        expected: u16,
        /// Tag found on the reply.
        got: u16,
    },
    /// A reply of the wrong kind arrived.
    #[error("unexpected response, wanted {0}")]
    UnexpectedResponse(&'static str),
    /// The server declared a frame that cannot be valid.
    #[error("invalid frame size {0}")]
    FrameSize(u32),
    /// The server answered with `Rerror`.
    #[error("{request} rejected: {message}")]
    Rejected {
        /// Request kind, such as `Twalk`.
        request: &'static str,
        /// Error string sent by the server.
        message: String,
    },
    /// The peer is gone (injected failures and closed in-process servers).
    #[error("transport closed")]
    Closed,
}

/// Failure of one high-level node operation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Walk resolved fewer components than the path holds.
    #[error("{op} {path}: not found (resolved {resolved} of {requested} components)")]
    NotFound {
        /// Operation name.
        op: &'static str,
        /// Path being resolved.
        path: String,
        /// Components resolved by the server.
        resolved: usize,
        /// Components requested.
        requested: usize,
    },
    /// The path cannot be walked at all.
    #[error("{op} {path}: invalid path: {reason}")]
    InvalidPath {
        /// Operation name.
        op: &'static str,
        /// Offending path.
        path: String,
        /// Short reason.
        reason: &'static str,
    },
    /// The server refused one step of the operation.
    #[error("{op} {path}: {request} rejected: {message}")]
    Rejected {
        /// Operation name.
        op: &'static str,
        /// Path of the operation.
        path: String,
        /// Request kind that was refused.
        request: &'static str,
        /// Error string sent by the server.
        message: String,
    },
    /// A write made no progress.
    #[error("{op} {path}: short write at offset {offset}")]
    ShortWrite {
        /// Operation name.
        op: &'static str,
        /// Path of the operation.
        path: String,
        /// Bytes acknowledged before the stall.
        offset: u64,
    },
    /// The connection failed mid-operation.
    #[error("{op} {path}: {source}")]
    Transport {
        /// Operation name.
        op: &'static str,
        /// Path of the operation.
        path: String,
        /// Original transport failure.
        #[source]
        source: TransportError,
    },
}

impl ProtocolError {
    pub(crate) fn wrap(op: &'static str, path: &str, err: TransportError) -> Self {
        match err {
            TransportError::Rejected { request, message } => Self::Rejected {
                op,
                path: path.to_owned(),
                request,
                message,
            },
            source => Self::Transport {
                op,
                path: path.to_owned(),
                source,
            },
        }
    }

    /// Whether the failure means the node does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Rejected {
                request: "Twalk",
                ..
            } => true,
            _ => false,
        }
    }
}
