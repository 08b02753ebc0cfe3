// SPDX-License-Identifier: MIT

//! Channel endpoint on Linux: a `SOCK_SEQPACKET` Unix domain socket in the
//! abstract namespace.
//!
//! Sequenced packets keep message boundaries.  Each write is one message,
//! and a read returns at most one message, cut to the buffer length.
//!
//! Abstract addresses have no file system entry, so the name is freed as
//! soon as the listening socket closes, and binding a name that is still
//! held fails with `EADDRINUSE`.
//!
//! The sockets are created with nix and then handed to the std Unix socket
//! types, which only accept, read, write and shut them down.

use std::{
    io::{Read, Write},
    net::Shutdown,
    os::{
        fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd},
        unix::net::{UnixListener, UnixStream},
    },
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout, poll},
    sys::socket::{
        AddressFamily, Backlog, SockFlag, SockType, UnixAddr, bind, connect as connect_addr,
        listen, socket,
    },
};

use crate::runtime::cancel::{CancelToken, WaitOutcome, wait_for};

pub(crate) type PeerStream = UnixStream;

pub(crate) fn address(name: &str) -> String {
    format!("@{name}")
}

pub(crate) struct Endpoint {
    listener: UnixListener,
    stream: Option<UnixStream>,
}

impl Endpoint {
    pub(crate) fn create(name: &str) -> Result<Self, std::io::Error> {
        let addr = UnixAddr::new_abstract(name.as_bytes())?;
        let fd = seqpacket_socket()?;
        bind(fd.as_raw_fd(), &addr)?;
        // Only one peer is ever accepted.
        listen(&fd, Backlog::new(1)?)?;
        Ok(Endpoint {
            listener: UnixListener::from(fd),
            stream: None,
        })
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn accept(
        &mut self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<WaitOutcome, std::io::Error> {
        let listener = &self.listener;
        let outcome = wait_for(deadline, cancel, |slice| {
            poll_readable(listener.as_fd(), slice)
        })?;
        if outcome == WaitOutcome::Ready {
            let (stream, _addr) = self.listener.accept()?;
            self.stream = Some(stream);
        }
        Ok(outcome)
    }

    /// Send `buf` as one message.
    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        let stream = self.connected()?;
        stream.write_all(buf)?;
        Ok(buf.len())
    }

    pub(crate) fn read(
        &mut self,
        buf: &mut [u8],
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<(WaitOutcome, usize), std::io::Error> {
        let stream = self.connected()?;
        let outcome = wait_for(deadline, cancel, |slice| {
            poll_readable(stream.as_fd(), slice)
        })?;
        if outcome != WaitOutcome::Ready {
            return Ok((outcome, 0));
        }
        let count = stream.read(buf)?;
        Ok((outcome, count))
    }

    pub(crate) fn disconnect(&mut self) -> Result<(), std::io::Error> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.shutdown(Shutdown::Both) {
            // The peer already went away.
            Err(e) if e.raw_os_error() == Some(Errno::ENOTCONN as i32) => Ok(()),
            r => r,
        }
    }

    fn connected(&mut self) -> Result<&mut UnixStream, std::io::Error> {
        self.stream.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "no peer connected")
        })
    }
}

pub(crate) fn connect(name: &str) -> Result<PeerStream, std::io::Error> {
    let addr = UnixAddr::new_abstract(name.as_bytes())?;
    let fd = seqpacket_socket()?;
    connect_addr(fd.as_raw_fd(), &addr)?;
    Ok(UnixStream::from(fd))
}

fn seqpacket_socket() -> Result<OwnedFd, std::io::Error> {
    let fd = socket(
        AddressFamily::Unix,
        SockType::SeqPacket,
        SockFlag::SOCK_CLOEXEC,
        None,
    )?;
    Ok(fd)
}

/// Wait up to `slice` for the descriptor to become readable (or hung up).
fn poll_readable(fd: BorrowedFd<'_>, slice: Duration) -> Result<bool, std::io::Error> {
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let millis = u16::try_from(slice.as_millis()).unwrap_or(u16::MAX);
    match poll(&mut fds, PollTimeout::from(millis)) {
        Ok(n) => Ok(n > 0),
        Err(Errno::EINTR) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
