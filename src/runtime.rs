// SPDX-License-Identifier: MIT

//! Manages the simulation child process: launching it, waiting for it to
//! exit, and releasing it.
//!
//! The `spawn_child` function is the entry point to launch the process from a
//! `SpawnRequest`.  The returned `Child` is waited on with `wait_child`, which
//! honors an optional deadline and a `CancelToken`.  Dropping the `Child`
//! releases its handles, terminating the process first if it is still running.

pub mod cancel;
pub mod error;
pub mod spawn;

use std::time::Instant;

pub use cancel::{CancelToken, WaitOutcome};
pub use spawn::{Child, ExitState, SpawnRequest};

use error::LaunchError;

#[cfg(target_os = "linux")]
mod spawn_linux;

#[cfg(target_os = "linux")]
pub fn spawn_child(req: &SpawnRequest) -> Result<Box<dyn Child>, LaunchError> {
    let child = spawn_linux::launch_child(req).map_err(|source| LaunchError::ProcessSpawn {
        program: req.cmd.clone(),
        source,
    })?;
    Ok(Box::new(child))
}

#[cfg(target_os = "windows")]
mod spawn_windows;

#[cfg(target_os = "windows")]
pub fn spawn_child(req: &SpawnRequest) -> Result<Box<dyn Child>, LaunchError> {
    let child = spawn_windows::launch_child(req).map_err(|source| LaunchError::ProcessSpawn {
        program: req.cmd.clone(),
        source,
    })?;
    Ok(Box::new(child))
}

/// Block until the child exits, the deadline passes, or the token is cancelled.
pub fn wait_child(
    child: &mut dyn Child,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Result<ExitState, LaunchError> {
    let started = Instant::now();
    let mut exit = None;
    let outcome = cancel::wait_for(deadline, cancel, |slice| {
        exit = child.wait_slice(slice)?;
        Ok(exit.is_some())
    })?;
    match (outcome, exit) {
        (WaitOutcome::Ready, Some(state)) => Ok(state),
        (WaitOutcome::Cancelled, _) => Err(LaunchError::Cancelled),
        _ => Err(LaunchError::ExitTimeout {
            pid: child.id(),
            waited: started.elapsed(),
        }),
    }
}
