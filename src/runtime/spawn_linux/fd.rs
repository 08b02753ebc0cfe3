// SPDX-License-Identifier: MIT

//! Reports an exec failure from the forked child back to the parent.
//!
//! The parent creates a close-on-exec pipe before the fork.  A successful
//! exec closes the child's write end, so the parent reads end-of-file.  A
//! failed exec writes the errno into the pipe before the child exits, so the
//! parent learns the start failed without waiting on the channel.

use std::{
    fs::File,
    io::Read,
    os::fd::{AsRawFd, OwnedFd},
};

use nix::{fcntl::OFlag, unistd::pipe2};

const ERRNO_LEN: usize = size_of::<i32>();

pub struct ExecStatusPipe {
    read_fd: OwnedFd,
    write_fd: OwnedFd,
}

impl ExecStatusPipe {
    pub fn new() -> Result<Self, std::io::Error> {
        let (read_fd, write_fd) = pipe2(OFlag::O_CLOEXEC)?;
        Ok(ExecStatusPipe { read_fd, write_fd })
    }

    /// Called by the child process when the exec (or the setup before it)
    /// failed.  Runs after the fork, so it must not allocate memory; errors
    /// are ignored because the exit code still signals a failure.
    pub fn child_report(&self, errno: i32) {
        let buf = errno.to_be_bytes();
        let _ = unsafe {
            nix::libc::write(
                self.write_fd.as_raw_fd(),
                buf.as_ptr().cast(),
                buf.len(),
            )
        };
    }

    /// Called by the parent process after fork.  Drops the child's end, then
    /// blocks until the child either execs (returns `None`) or reports the
    /// errno of its failure.
    pub fn parent_after_fork(self) -> Result<Option<i32>, std::io::Error> {
        drop(self.write_fd);
        let mut reader = File::from(self.read_fd);
        let mut buf = Vec::with_capacity(ERRNO_LEN);
        reader.read_to_end(&mut buf)?;
        if buf.len() < ERRNO_LEN {
            return Ok(None);
        }
        let mut errno = [0u8; ERRNO_LEN];
        errno.copy_from_slice(&buf[0..ERRNO_LEN]);
        Ok(Some(i32::from_be_bytes(errno)))
    }
}
