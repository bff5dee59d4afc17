// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Minimal 9P2000 client for the wmii control filesystem.
// Author: Lukas Bower

//! 9P plumbing: connection address, socket transport, the serialized client
//! and, behind the `inprocess` feature, an in-memory server for tests.

mod address;
mod client;
mod error;
#[cfg(feature = "inprocess")]
pub mod inprocess;
mod transport;

pub use address::{Address, ADDRESS_ENV};
pub use client::{Client, ROOT_FID};
pub use error::{AddressError, ProtocolError, TransportError};
pub use transport::{StreamTransport, Transport};
