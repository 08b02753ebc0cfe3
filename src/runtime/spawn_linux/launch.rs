// SPDX-License-Identifier: MIT

//! Launch the child process.

use std::{ffi::CString, os::unix::ffi::OsStrExt as _, time::Duration};

use nix::{
    errno::Errno,
    sys::{
        signal::{Signal, kill},
        wait::{WaitPidFlag, WaitStatus, waitpid},
    },
    unistd::Pid,
};

use crate::runtime::{
    error::invalid_input,
    spawn::{Child, ExitState, SpawnRequest},
    spawn_linux::fd::ExecStatusPipe,
};

/// Exit code of a forked child that never reached its executable.
const EXEC_FAILED: i32 = 127;

pub struct LinuxChild {
    pid: Pid,
    exit: Option<ExitState>,
}

/// Handle the child process launching.
///
/// Returns only after the child has either started the executable or failed
/// to; a failure comes back as the OS error of the failed call.
pub fn launch_child(req: &SpawnRequest) -> Result<LinuxChild, std::io::Error> {
    // As much as possible is performed before the fork.
    // That's because, according to the fork docs:
    //
    // > In a multithreaded program, only [async-signal-safe] functions like `pause`
    // > and `_exit` may be called by the child (the parent isn't restricted) until
    // > a call of `execve(2)`. Note that memory allocation may **not** be
    // > async-signal-safe and thus must be prevented.
    let exec_path = req.resolve_program()?;
    let exec_path = CString::new(exec_path.as_os_str().as_bytes()).map_err(invalid_input)?;
    let exec_path = exec_path.as_c_str();
    let cwd = match &req.cwd {
        Some(dir) => Some(CString::new(dir.as_os_str().as_bytes()).map_err(invalid_input)?),
        None => None,
    };
    let mut args = vec![CString::new(req.cmd.as_os_str().as_bytes()).map_err(invalid_input)?];
    for arg in req.args.iter() {
        args.push(CString::new(arg.as_bytes()).map_err(invalid_input)?);
    }
    let args = args.as_slice();
    let mut environ = Vec::new();
    for (key, val) in req.environment() {
        let mut entry = key;
        entry.push("=");
        entry.push(val);
        environ.push(CString::new(entry.as_bytes()).map_err(invalid_input)?);
    }
    let environ = environ.as_slice();
    let status = ExecStatusPipe::new()?;

    match unsafe { nix::unistd::fork() } {
        Err(e) => Err(e.into()),
        Ok(nix::unistd::ForkResult::Child) => {
            // Any errors in here must trigger an immediate exit.
            // Anything that runs here can't allocate memory.
            if let Some(cwd) = &cwd {
                if let Err(e) = nix::unistd::chdir(cwd.as_c_str()) {
                    status.child_report(e as i32);
                    unsafe { nix::libc::_exit(EXEC_FAILED) };
                }
            }

            // Run the executable.
            let err = match nix::unistd::execve(exec_path, args, environ) {
                Err(e) => e,
                Ok(never) => match never {},
            };
            // To reach here means the exec failed.
            status.child_report(err as i32);
            unsafe { nix::libc::_exit(EXEC_FAILED) }
        }
        Ok(nix::unistd::ForkResult::Parent { child }) => {
            match status.parent_after_fork()? {
                None => {
                    log::debug!("started {:?} as pid {}", req.cmd, child);
                    Ok(LinuxChild { pid: child, exit: None })
                }
                Some(errno) => {
                    // Reap the failed child so it doesn't linger as a zombie.
                    let _ = waitpid(child, None);
                    Err(std::io::Error::from_raw_os_error(errno))
                }
            }
        }
    }
}

impl LinuxChild {
    fn try_reap(&mut self) -> Result<Option<ExitState>, std::io::Error> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_pid, code)) => {
                self.exit = Some(ExitState::Code(code));
            }
            Ok(WaitStatus::Signaled(_pid, signal, _core)) => {
                self.exit = Some(ExitState::Signal(signal as i32));
            }
            // Still alive, or stopped.
            Ok(_) => (),
            Err(Errno::EINTR) => (),
            Err(e) => return Err(e.into()),
        }
        Ok(self.exit)
    }
}

impl Child for LinuxChild {
    fn id(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    fn wait_slice(&mut self, slice: Duration) -> Result<Option<ExitState>, std::io::Error> {
        if let Some(state) = self.try_reap()? {
            return Ok(Some(state));
        }
        // waitpid has no timeout, so poll on either side of a short sleep.
        std::thread::sleep(slice);
        self.try_reap()
    }

    fn terminate(&mut self) -> Result<(), std::io::Error> {
        if self.exit.is_some() {
            return Ok(());
        }
        match kill(self.pid, Signal::SIGKILL) {
            Ok(()) => Ok(()),
            // Already gone; it only needs reaping.
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(std::io::Error::other(format!(
                "failed terminating child {}: {:?}",
                self.pid, e
            ))),
        }
    }
}

impl Drop for LinuxChild {
    fn drop(&mut self) {
        // Note: ignoring errors inside the drop.
        if self.exit.is_some() {
            return;
        }
        if self.terminate().is_ok() {
            match waitpid(self.pid, None) {
                Ok(status) => log::debug!("reaped child {}: {:?}", self.pid, status),
                Err(e) => log::warn!("failed reaping child {}: {}", self.pid, e),
            }
        }
    }
}
