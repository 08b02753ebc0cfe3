// SPDX-License-Identifier: MIT

//! Channel endpoint on Windows: a duplex, message-mode named pipe.
//!
//! The pipe is opened for overlapped I/O so the connect and read waits can
//! observe a deadline and the cancel token.  Without either, the waits behave
//! like the blocking calls.

use std::{fs::File, time::Instant};

use windows::{
    Win32::{
        Foundation::{
            CloseHandle, ERROR_IO_PENDING, ERROR_MORE_DATA, ERROR_PIPE_CONNECTED, HANDLE,
            INVALID_HANDLE_VALUE, WAIT_OBJECT_0,
        },
        Storage::FileSystem::{
            FILE_FLAG_FIRST_PIPE_INSTANCE, FILE_FLAG_OVERLAPPED, PIPE_ACCESS_DUPLEX, ReadFile,
            WriteFile,
        },
        System::{
            IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED},
            Pipes::{
                ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, PIPE_READMODE_MESSAGE,
                PIPE_TYPE_MESSAGE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
            },
            Threading::{CreateEventW, ResetEvent, WaitForSingleObject},
        },
    },
    core::{HSTRING, PCWSTR},
};

use crate::runtime::cancel::{CancelToken, WaitOutcome, wait_for};

/// Pipe buffer sizes, in bytes.
const BUFFER_SIZE: u32 = 512;

pub(crate) type PeerStream = File;

pub(crate) fn address(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

pub(crate) struct Endpoint {
    pipe: HANDLE,
    event: HANDLE,
    connected: bool,
}

impl Endpoint {
    pub(crate) fn create(name: &str) -> Result<Self, std::io::Error> {
        let path = HSTRING::from(address(name));
        let pipe = unsafe {
            CreateNamedPipeW(
                &path,
                PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED | FILE_FLAG_FIRST_PIPE_INSTANCE,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                PIPE_UNLIMITED_INSTANCES,
                BUFFER_SIZE, // output buffer size
                BUFFER_SIZE, // input buffer size
                0, // default client time-out
                None, // no security attribute
            )
        };
        if pipe == INVALID_HANDLE_VALUE {
            return Err(std::io::Error::last_os_error());
        }
        let event = match unsafe { CreateEventW(None, true, false, PCWSTR::null()) } {
            Ok(event) => event,
            Err(e) => {
                let _ = unsafe { CloseHandle(pipe) };
                return Err(e.into());
            }
        };
        Ok(Endpoint {
            pipe,
            event,
            connected: false,
        })
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn accept(
        &mut self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<WaitOutcome, std::io::Error> {
        let pipe = self.pipe;
        let (outcome, _) = self.overlapped(deadline, cancel, |ov| unsafe {
            ConnectNamedPipe(pipe, Some(ov))
        })?;
        if outcome == WaitOutcome::Ready {
            self.connected = true;
        }
        Ok(outcome)
    }

    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<usize, std::io::Error> {
        if !self.connected {
            return Err(not_connected());
        }
        let pipe = self.pipe;
        let (_, count) = self.overlapped(None, &CancelToken::new(), |ov| unsafe {
            WriteFile(pipe, Some(buf), None, Some(ov))
        })?;
        Ok(count as usize)
    }

    pub(crate) fn read(
        &mut self,
        buf: &mut [u8],
        deadline: Option<Instant>,
        cancel: &CancelToken,
    ) -> Result<(WaitOutcome, usize), std::io::Error> {
        if !self.connected {
            return Err(not_connected());
        }
        let pipe = self.pipe;
        let (outcome, count) = self.overlapped(deadline, cancel, |ov| unsafe {
            ReadFile(pipe, Some(buf), None, Some(ov))
        })?;
        Ok((outcome, count as usize))
    }

    pub(crate) fn disconnect(&mut self) -> Result<(), std::io::Error> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        unsafe { DisconnectNamedPipe(self.pipe) }?;
        Ok(())
    }

    /// Start one overlapped operation and wait for it to finish.
    ///
    /// When the wait ends early the operation is cancelled, and the returned
    /// count is zero.
    fn overlapped<F>(
        &self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
        start: F,
    ) -> Result<(WaitOutcome, u32), std::io::Error>
    where
        F: FnOnce(*mut OVERLAPPED) -> windows::core::Result<()>,
    {
        unsafe { ResetEvent(self.event) }?;
        let mut ov = OVERLAPPED::default();
        ov.hEvent = self.event;

        if let Err(e) = start(&mut ov) {
            let code = e.code();
            if code == ERROR_PIPE_CONNECTED.to_hresult() {
                // The peer connected between creation and this call.
                return Ok((WaitOutcome::Ready, 0));
            }
            if code == ERROR_MORE_DATA.to_hresult() {
                // Completed at once with part of a long message.  The
                // result below reports how much of it fit.
                return self.finish(&ov);
            }
            if code != ERROR_IO_PENDING.to_hresult() {
                return Err(e.into());
            }
            let event = self.event;
            let outcome = wait_for(deadline, cancel, |slice| {
                let millis = u32::try_from(slice.as_millis()).unwrap_or(u32::MAX);
                Ok(unsafe { WaitForSingleObject(event, millis) } == WAIT_OBJECT_0)
            })?;
            if outcome != WaitOutcome::Ready {
                unsafe {
                    let _ = CancelIoEx(self.pipe, Some(&ov as *const OVERLAPPED));
                    // The OVERLAPPED must outlive the cancelled operation.
                    let mut transferred = 0u32;
                    let _ = GetOverlappedResult(self.pipe, &ov, &mut transferred, true);
                }
                return Ok((outcome, 0));
            }
        }

        self.finish(&ov)
    }

    /// Collect the result of an operation that has completed.
    fn finish(&self, ov: &OVERLAPPED) -> Result<(WaitOutcome, u32), std::io::Error> {
        let mut transferred = 0u32;
        match unsafe { GetOverlappedResult(self.pipe, ov, &mut transferred, false) } {
            Ok(()) => Ok((WaitOutcome::Ready, transferred)),
            // Message longer than the buffer: keep the part that fit.
            Err(e) if e.code() == ERROR_MORE_DATA.to_hresult() => {
                Ok((WaitOutcome::Ready, transferred))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        // Note: ignoring errors inside the drop.
        unsafe {
            if self.connected {
                let _ = DisconnectNamedPipe(self.pipe);
            }
            let _ = CloseHandle(self.event);
            let _ = CloseHandle(self.pipe);
        }
    }
}

pub(crate) fn connect(name: &str) -> Result<PeerStream, std::io::Error> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(address(name))
}

fn not_connected() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "no peer connected")
}
