// SPDX-License-Identifier: MIT

//! Spawns the simulation process on Windows with CreateProcessW.

mod launch;
mod launch_quote;
mod monitor;

pub(crate) use launch::launch_child;
