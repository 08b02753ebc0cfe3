//! # simlaunch
//!
//! Starts the creature simulation, hands it one prism description over a
//! named local channel, and prints what the simulation sends back.

pub mod comm;
pub mod config;
pub mod launcher;
pub mod logging;
pub mod runtime;

pub use comm::{
    channel::{Channel, ChannelName, PeerConnection, connect},
    payload::PrismTransform,
};
pub use config::{Deadlines, LauncherConfig, SimulationCommand};
pub use launcher::{Launcher, RunReport};
pub use runtime::{
    CancelToken, Child, ExitState, SpawnRequest,
    error::{LaunchError, ReadDegraded},
};
