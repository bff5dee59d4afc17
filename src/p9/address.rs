// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Parse the wmii connection address from WMII_ADDRESS or the command line.
// Author: Lukas Bower

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::AddressError;

/// Environment variable carrying the manager's 9P address.
pub const ADDRESS_ENV: &str = "WMII_ADDRESS";

/// Where the manager's 9P server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Unix domain socket, `unix!<path>`.
    Unix {
        /// Socket path.
        path: PathBuf,
    },
    /// TCP endpoint, `tcp!<host>!<port>`.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl Address {
    /// Read and parse [`ADDRESS_ENV`].
    pub fn from_env() -> Result<Self, AddressError> {
        match std::env::var(ADDRESS_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Err(AddressError::Missing),
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let address = value.trim();
        let mut fields = address.split('!');
        let kind = fields.next().unwrap_or_default();
        match (kind, fields.next(), fields.next(), fields.next()) {
            ("unix", Some(path), None, None) if !path.is_empty() => Ok(Self::Unix {
                path: PathBuf::from(path),
            }),
            ("tcp", Some(host), Some(port), None) if !host.is_empty() => {
                let port = port.parse().map_err(|_| AddressError::InvalidPort {
                    port: port.to_owned(),
                    address: address.to_owned(),
                })?;
                Ok(Self::Tcp {
                    host: host.to_owned(),
                    port,
                })
            }
            ("unix" | "tcp", ..) => Err(AddressError::Malformed(address.to_owned())),
            (_, Some(_), ..) => Err(AddressError::UnsupportedKind {
                kind: kind.to_owned(),
                address: address.to_owned(),
            }),
            _ => Err(AddressError::Malformed(address.to_owned())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(f, "unix!{}", path.display()),
            Self::Tcp { host, port } => write!(f, "tcp!{host}!{port}"),
        }
    }
}
