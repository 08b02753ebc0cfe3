// SPDX-License-Identifier: MIT

//! Run the simulation process on Windows.

use std::{ffi::OsStr, os::windows::ffi::OsStrExt, time::Duration};

use windows::{
    Win32::System::Threading::{
        CREATE_UNICODE_ENVIRONMENT, CreateProcessW, NORMAL_PRIORITY_CLASS, PROCESS_INFORMATION,
        STARTUPINFOW,
    },
    core::{PCWSTR, PWSTR},
};

use crate::runtime::{
    spawn::{Child, ExitState, SpawnRequest},
    spawn_windows::{launch_quote, monitor::ProcessState},
};

pub struct WindowsChild {
    state: ProcessState,
}

/// Handle the child process launching.
pub fn launch_child(req: &SpawnRequest) -> Result<WindowsChild, std::io::Error> {
    let exec_path = req.resolve_program()?;
    let app = widestr(exec_path.as_os_str());
    let mut cmdline = launch_quote::command_line(req.cmd.as_os_str(), &req.args)?;
    let environ = launch_quote::encode_env_block(&req.environment())?;
    let cwd = req.cwd.as_ref().map(|dir| widestr(dir.as_os_str()));

    let mut si = STARTUPINFOW::default();
    si.cb = size_of::<STARTUPINFOW>() as u32;
    let mut pi = PROCESS_INFORMATION::default();

    unsafe {
        CreateProcessW(
            PCWSTR(app.as_ptr()), // application name
            Some(PWSTR(cmdline.as_mut_ptr())), // command line
            None, // process attributes
            None, // thread attributes
            false, // the channel handle must not leak into the child
            NORMAL_PRIORITY_CLASS | CREATE_UNICODE_ENVIRONMENT,
            Some(environ.as_ptr().cast()),
            match &cwd {
                Some(dir) => PCWSTR(dir.as_ptr()),
                None => PCWSTR::null(), // inherit from the parent.
            },
            &si,
            &mut pi,
        )
    }?;
    log::debug!("started {:?} as pid {}", req.cmd, pi.dwProcessId);

    Ok(WindowsChild {
        state: ProcessState::new(pi.hProcess, pi.hThread, pi.dwProcessId),
    })
}

impl Child for WindowsChild {
    fn id(&self) -> u32 {
        self.state.pid()
    }

    fn wait_slice(&mut self, slice: Duration) -> Result<Option<ExitState>, std::io::Error> {
        self.state.wait(slice)
    }

    fn terminate(&mut self) -> Result<(), std::io::Error> {
        self.state.terminate(255)
    }
}

fn widestr(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}
