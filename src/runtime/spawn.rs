// SPDX-License-Identifier: MIT

//! General model for spawning the simulation process and managing its state.

use std::{
    collections::HashMap,
    ffi::{OsStr, OsString},
    fmt::Display,
    path::PathBuf,
    time::Duration,
};

use crate::runtime::error::not_found;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal exit with the process's exit code.
    Code(i32),
    /// Killed by the given signal number.  Linux only.
    Signal(i32),
}

impl Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(c) => write!(f, "exit code {c}"),
            Self::Signal(s) => write!(f, "signal {s}"),
        }
    }
}

/// A launched child process.
///
/// Dropping the child releases its OS handles.  If the process has not been
/// observed to exit, dropping it first terminates it.
pub trait Child {
    /// OS process identifier.
    fn id(&self) -> u32;

    /// Block for at most `slice`, waiting for the process to exit.
    /// Returns the exit state once the process is gone.
    fn wait_slice(&mut self, slice: Duration) -> Result<Option<ExitState>, std::io::Error>;

    /// Request a hard termination of the child process.
    fn terminate(&mut self) -> Result<(), std::io::Error>;
}

/// Describes how to launch the child process.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Executable to run.  See [`SpawnRequest::resolve_program`].
    pub cmd: PathBuf,
    pub args: Vec<OsString>,
    /// Working directory for the child; `None` inherits the parent's.
    pub cwd: Option<PathBuf>,
    /// Variables added to (or replacing) the inherited environment.
    pub env: HashMap<OsString, OsString>,
}

impl SpawnRequest {
    /// The full environment handed to the child: the parent's, overlaid with
    /// the request's own variables.
    pub fn environment(&self) -> Vec<(OsString, OsString)> {
        let mut merged: HashMap<OsString, OsString> = std::env::vars_os().collect();
        for (key, val) in self.env.iter() {
            merged.insert(key.clone(), val.clone());
        }
        merged.into_iter().collect()
    }

    /// Locate the executable before anything is started.
    ///
    /// A relative path with a directory part is taken relative to `cwd` when
    /// one is set, because that is where the child runs.  Otherwise the
    /// parent's directory and `PATH` are searched.  The result is absolute,
    /// so it still names the same file after the child changes directory.
    pub fn resolve_program(&self) -> Result<PathBuf, std::io::Error> {
        let found = match &self.cwd {
            Some(dir) if self.cmd.is_relative() && self.cmd.components().count() > 1 => {
                which::which_in(&self.cmd, None::<&OsStr>, dir)
            }
            _ => which::which(&self.cmd),
        }
        .map_err(not_found)?;
        std::path::absolute(found)
    }
}
