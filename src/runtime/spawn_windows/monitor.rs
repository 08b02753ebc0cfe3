// SPDX-License-Identifier: MIT

//! Process and thread handles of the launched simulation.

use std::time::Duration;

use windows::Win32::{
    Foundation::{CloseHandle, HANDLE, STILL_ACTIVE, WAIT_OBJECT_0, WAIT_TIMEOUT},
    System::Threading::{GetExitCodeProcess, TerminateProcess, WaitForSingleObject},
};

use crate::runtime::spawn::ExitState;

/// Owns the handles returned by CreateProcessW.
pub struct ProcessState {
    process: HANDLE,
    thread: HANDLE,
    pid: u32,
    exit_code: Option<u32>,
}

impl ProcessState {
    pub fn new(process: HANDLE, thread: HANDLE, pid: u32) -> Self {
        Self { process, thread, pid, exit_code: None }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Block for at most `slice` waiting on the process handle.
    pub fn wait(&mut self, slice: Duration) -> Result<Option<ExitState>, std::io::Error> {
        if let Some(c) = self.exit_code {
            return Ok(Some(ExitState::Code(c as i32)));
        }
        let millis = u32::try_from(slice.as_millis()).unwrap_or(u32::MAX);
        let res = unsafe { WaitForSingleObject(self.process, millis) };
        if res == WAIT_TIMEOUT {
            return Ok(None);
        }
        if res != WAIT_OBJECT_0 {
            return Err(std::io::Error::last_os_error());
        }
        let code = self.inner_exit_code()?;
        self.exit_code = code;
        Ok(code.map(|c| ExitState::Code(c as i32)))
    }

    /// Terminate the process.
    /// This will only send the termination once the process is known to be running.
    pub fn terminate(&mut self, exit_code: u32) -> Result<(), std::io::Error> {
        if self.exit_code.is_some() {
            return Ok(());
        }
        unsafe { TerminateProcess(self.process, exit_code) }?;
        Ok(())
    }

    fn inner_exit_code(&self) -> Result<Option<u32>, std::io::Error> {
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(self.process, &mut code) }?;
        if code == STILL_ACTIVE.0 as u32 {
            Ok(None)
        } else {
            Ok(Some(code))
        }
    }
}

impl Drop for ProcessState {
    fn drop(&mut self) {
        // Note: ignoring errors inside the drop.
        if self.exit_code.is_none() {
            let _ = self.terminate(255);
            let _ = unsafe { WaitForSingleObject(self.process, 5_000) };
        }

        unsafe {
            if !self.thread.is_invalid() {
                let _ = CloseHandle(self.thread);
                self.thread = HANDLE::default();
            }
            if !self.process.is_invalid() {
                let _ = CloseHandle(self.process);
                self.process = HANDLE::default();
            }
        }
    }
}
