// SPDX-License-Identifier: MIT

//! Spawns the simulation process on Linux with fork + execve.

mod fd;
mod launch;

pub(crate) use launch::launch_child;
