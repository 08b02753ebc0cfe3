// SPDX-License-Identifier: MIT

//! Common error types.
//!

use std::{ffi::NulError, path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors that end a launcher run with a non-zero exit status.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to create channel {name}: {source}")]
    ChannelCreation {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {}: {source}", program.display())]
    ProcessSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no peer connected to {name} within {waited:?}")]
    ConnectTimeout { name: String, waited: Duration },

    #[error("simulation process {pid} still running after {waited:?}")]
    ExitTimeout { pid: u32, waited: Duration },

    #[error("launch cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// The raw OS error code behind the failure, when there is one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Self::ChannelCreation { source, .. } => source.raw_os_error(),
            Self::ProcessSpawn { source, .. } => source.raw_os_error(),
            Self::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Why the single response read produced nothing to show.
///
/// Never fatal: the launcher prints a placeholder and finishes normally.
#[derive(Debug, Error)]
pub enum ReadDegraded {
    #[error("peer sent no contents")]
    Empty,

    #[error("no peer was connected")]
    NotConnected,

    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("response read cancelled")]
    Cancelled,

    #[error("response read failed: {0}")]
    Failed(#[from] std::io::Error),
}

/// Maps an executable lookup failure onto the OS "file not found" code, so
/// it reports the same way a failed exec would.
pub(crate) fn not_found(e: which::Error) -> std::io::Error {
    log::debug!("executable lookup failed: {e}");
    // ENOENT on Linux, ERROR_FILE_NOT_FOUND on Windows.
    std::io::Error::from_raw_os_error(2)
}

pub(crate) fn invalid_input(e: NulError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
}
