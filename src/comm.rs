// SPDX-License-Identifier: MIT

//! # Communications Library
//!
//! The launcher and the simulation talk over one named local channel.  The
//! launcher writes a single JSON request and reads a single bounded response;
//! there is no framing beyond that one buffer in each direction.

pub mod channel;
pub mod payload;

#[cfg(target_os = "linux")]
mod channel_linux;

#[cfg(target_os = "windows")]
mod channel_windows;
