// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide 9P2000 wire types and codec primitives for the wmii control client.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![no_std]

//! 9P2000 wire types and codec primitives for talking to the wmii control
//! filesystem.
//!
//! Only the operation subset needed by a control client is covered: version,
//! attach, walk, open, create, read, write, clunk and remove, together with
//! the stat records returned when reading a directory.

extern crate alloc;

#[cfg(test)]
extern crate std;

mod codec;
mod stat;
mod types;

pub use codec::{decode_request, decode_response, encode_request, encode_response, Codec};
pub use stat::{decode_stats, Stat};
pub use types::*;
