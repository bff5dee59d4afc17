// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Exchange 9P frames with the window manager over a stream socket.
// Author: Lukas Bower

//! Socket transport for the 9P client.
//!
//! A transport moves one encoded request frame to the server and returns the
//! complete reply frame. It knows nothing about message contents beyond the
//! leading size field.

use std::io::{self, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use log::debug;
use wmii9p_codec::DEFAULT_MSIZE;

use super::{Address, TransportError};

/// Frame exchange used by [`super::Client`].
pub trait Transport: Send {
    /// Send a request frame and return the reply frame.
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(frame)
    }
}

enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Blocking transport over a TCP or Unix stream socket.
pub struct StreamTransport {
    connection: Connection,
    max_frame: u32,
}

impl StreamTransport {
    /// Dial the manager at `address`.
    pub fn connect(address: &Address) -> Result<Self, TransportError> {
        let connect_error = |source| TransportError::Connect {
            endpoint: address.to_string(),
            source,
        };
        let connection = match address {
            Address::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).map_err(connect_error)?;
                stream.set_nodelay(true).map_err(connect_error)?;
                Connection::Tcp(stream)
            }
            #[cfg(unix)]
            Address::Unix { path } => {
                Connection::Unix(UnixStream::connect(path).map_err(connect_error)?)
            }
            #[cfg(not(unix))]
            Address::Unix { .. } => {
                return Err(connect_error(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "unix sockets are not available on this platform",
                )))
            }
        };
        debug!("connected to {address}");
        Ok(Self {
            connection,
            max_frame: DEFAULT_MSIZE,
        })
    }
}

impl Transport for StreamTransport {
    fn exchange(&mut self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.connection.write_all(frame)?;
        self.connection.flush()?;

        let mut header = [0u8; 4];
        self.connection.read_exact(&mut header)?;
        let size = u32::from_le_bytes(header);
        if size < 7 || size > self.max_frame {
            return Err(TransportError::FrameSize(size));
        }
        let mut reply = vec![0u8; size as usize];
        reply[..4].copy_from_slice(&header);
        self.connection.read_exact(&mut reply[4..])?;
        Ok(reply)
    }
}
