// SPDX-License-Identifier: MIT

//! The named duplex channel between the launcher and the simulation.
//!
//! The launcher owns the listening end ([`Channel`]): it creates it under a
//! well-known name, accepts one peer, writes the request, reads the response
//! and disconnects.  The simulation side opens the same name with
//! [`connect`].  Dropping a `Channel` releases the OS endpoint, so the name
//! becomes free again on every exit path.
//!
//! On Linux the channel is an abstract-namespace `SOCK_SEQPACKET` socket.  On
//! Windows it is a message-mode named pipe under `\\.\pipe\`.

use std::{
    fmt::Display,
    io::{Read, Write},
    time::Instant,
};

use crate::{
    comm::payload::MAX_RESPONSE_LEN,
    runtime::{
        cancel::{CancelToken, WaitOutcome},
        error::{LaunchError, ReadDegraded},
    },
};

#[cfg(target_os = "linux")]
use super::channel_linux as platform;
#[cfg(target_os = "windows")]
use super::channel_windows as platform;

/// Name of the channel used when none is configured.
pub const DEFAULT_CHANNEL_NAME: &str = "Pipe";

/// Longest accepted name.  Bounded by the Linux abstract socket address size.
const MAX_NAME_LEN: usize = 100;

/// A validated channel name.
///
/// Displays as the OS-level address: `@name` on Linux, `\\.\pipe\name` on
/// Windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Result<Self, LaunchError> {
        let name = name.into();
        if name.is_empty() {
            return Err(LaunchError::Config("channel name is empty".to_string()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(LaunchError::Config(format!(
                "channel name longer than {MAX_NAME_LEN} bytes"
            )));
        }
        if name.contains(['\0', '/', '\\']) {
            return Err(LaunchError::Config(format!(
                "channel name {name:?} contains a NUL or path separator"
            )));
        }
        Ok(ChannelName(name))
    }

    /// The bare name, as passed to the simulation with `-p`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChannelName {
    fn default() -> Self {
        ChannelName(DEFAULT_CHANNEL_NAME.to_string())
    }
}

impl Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&platform::address(&self.0))
    }
}

/// Listening end of the channel, owned by the launcher.
pub struct Channel {
    name: ChannelName,
    endpoint: platform::Endpoint,
}

impl Channel {
    /// Create the endpoint.  Fails if the name is already taken.
    pub fn create(name: &ChannelName) -> Result<Self, LaunchError> {
        let endpoint =
            platform::Endpoint::create(name.as_str()).map_err(|source| {
                LaunchError::ChannelCreation {
                    name: name.to_string(),
                    source,
                }
            })?;
        log::debug!("created channel {name}");
        Ok(Channel {
            name: name.clone(),
            endpoint,
        })
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_connected()
    }

    /// Wait for one peer to connect.
    ///
    /// An OS failure comes back as [`LaunchError::Io`]; the caller decides
    /// whether to continue without a peer.
    pub fn accept(
        &mut self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<(), LaunchError> {
        let started = Instant::now();
        match self.endpoint.accept(deadline, cancel)? {
            WaitOutcome::Ready => {
                log::debug!("peer connected to {}", self.name);
                Ok(())
            }
            WaitOutcome::TimedOut => Err(LaunchError::ConnectTimeout {
                name: self.name.to_string(),
                waited: started.elapsed(),
            }),
            WaitOutcome::Cancelled => Err(LaunchError::Cancelled),
        }
    }

    /// Write one payload to the connected peer.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), std::io::Error> {
        let written = self.endpoint.write(payload)?;
        log::debug!("wrote {written} bytes to {}", self.name);
        Ok(())
    }

    /// Read the peer's single response, at most [`MAX_RESPONSE_LEN`] bytes.
    pub fn receive(
        &mut self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, ReadDegraded> {
        if !self.endpoint.is_connected() {
            return Err(ReadDegraded::NotConnected);
        }
        let started = Instant::now();
        let mut buf = [0u8; MAX_RESPONSE_LEN];
        match self.endpoint.read(&mut buf, deadline, cancel)? {
            (WaitOutcome::Ready, 0) => Err(ReadDegraded::Empty),
            (WaitOutcome::Ready, n) => {
                log::debug!("read {n} bytes from {}", self.name);
                Ok(buf[..n].to_vec())
            }
            (WaitOutcome::TimedOut, _) => Err(ReadDegraded::TimedOut(started.elapsed())),
            (WaitOutcome::Cancelled, _) => Err(ReadDegraded::Cancelled),
        }
    }

    /// Disconnect the peer.  The endpoint itself stays allocated until drop.
    pub fn disconnect(&mut self) -> Result<(), std::io::Error> {
        self.endpoint.disconnect()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        log::debug!("releasing channel {}", self.name);
    }
}

/// Connection opened by the simulation side of the channel.
pub struct PeerConnection {
    stream: platform::PeerStream,
}

/// Open the channel with the given name as a peer.
pub fn connect(name: &ChannelName) -> Result<PeerConnection, std::io::Error> {
    let stream = platform::connect(name.as_str())?;
    Ok(PeerConnection { stream })
}

impl Read for PeerConnection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for PeerConnection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
