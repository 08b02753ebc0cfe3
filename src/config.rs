// SPDX-License-Identifier: MIT

//! Launcher configuration.
//!
//! `LauncherConfig::default()` reproduces the fixed setup of the simulation
//! pipeline.  `from_env` overlays `SIMLAUNCH_*` environment variables on top
//! of it.

use std::{
    collections::HashMap,
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    comm::{channel::ChannelName, payload::PrismTransform},
    runtime::{error::LaunchError, spawn::SpawnRequest},
};

pub const ENV_SPAWN_CHILD: &str = "SIMLAUNCH_SPAWN_CHILD";
pub const ENV_CHANNEL: &str = "SIMLAUNCH_CHANNEL";
pub const ENV_EXECUTABLE: &str = "SIMLAUNCH_EXECUTABLE";
pub const ENV_LOG_FILE: &str = "SIMLAUNCH_LOG_FILE";
pub const ENV_WORKING_DIR: &str = "SIMLAUNCH_WORKING_DIR";
pub const ENV_REQUEST: &str = "SIMLAUNCH_REQUEST";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "SIMLAUNCH_CONNECT_TIMEOUT_MS";
pub const ENV_EXIT_TIMEOUT_MS: &str = "SIMLAUNCH_EXIT_TIMEOUT_MS";
pub const ENV_READ_TIMEOUT_MS: &str = "SIMLAUNCH_READ_TIMEOUT_MS";

/// Everything a launcher run needs.
#[derive(Debug, Clone, Default)]
pub struct LauncherConfig {
    /// Start the simulation process.  When false, an already running
    /// simulation (for example one in the editor) is expected to connect.
    pub spawn_child: bool,
    pub channel: ChannelName,
    pub simulation: SimulationCommand,
    pub request: PrismTransform,
    pub deadlines: Deadlines,
}

/// Optional limits on the three blocking waits.  `None` waits forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadlines {
    pub connect: Option<Duration>,
    pub exit: Option<Duration>,
    pub read: Option<Duration>,
}

/// The simulation executable and what it is started with.
#[derive(Debug, Clone)]
pub struct SimulationCommand {
    pub program: PathBuf,
    pub log_file: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// Extra environment for the simulation, on top of the inherited one.
    pub env: HashMap<OsString, OsString>,
}

impl Default for SimulationCommand {
    fn default() -> Self {
        SimulationCommand {
            program: Path::new("CreatureSimulation")
                .join("Builds")
                .join("08-27-2023_21-46")
                .join("CreatureSimulation"),
            log_file: PathBuf::from("output.log"),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

impl SimulationCommand {
    /// Arguments telling the simulation to run headless and where the
    /// channel is.
    pub fn args(&self, channel: &ChannelName) -> Vec<OsString> {
        vec![
            OsString::from("-batchmode"),
            OsString::from("-nographics"),
            OsString::from("-logFile"),
            self.log_file.clone().into_os_string(),
            OsString::from("-p"),
            OsString::from(channel.as_str()),
        ]
    }

    pub fn spawn_request(&self, channel: &ChannelName) -> SpawnRequest {
        SpawnRequest {
            cmd: self.program.clone(),
            args: self.args(channel),
            cwd: self.working_dir.clone(),
            env: self.env.clone(),
        }
    }
}

impl LauncherConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, LaunchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each
    /// `SIMLAUNCH_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LaunchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LauncherConfig::default();
        if let Some(v) = lookup(ENV_SPAWN_CHILD) {
            config.spawn_child = parse_bool(ENV_SPAWN_CHILD, &v)?;
        }
        if let Some(v) = lookup(ENV_CHANNEL) {
            config.channel = ChannelName::new(v)?;
        }
        if let Some(v) = lookup(ENV_EXECUTABLE) {
            config.simulation.program = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LOG_FILE) {
            config.simulation.log_file = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_WORKING_DIR) {
            config.simulation.working_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_REQUEST) {
            config.request = serde_json::from_str(&v)
                .map_err(|e| LaunchError::Config(format!("{ENV_REQUEST}: {e}")))?;
        }
        if let Some(v) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.deadlines.connect = Some(parse_millis(ENV_CONNECT_TIMEOUT_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_EXIT_TIMEOUT_MS) {
            config.deadlines.exit = Some(parse_millis(ENV_EXIT_TIMEOUT_MS, &v)?);
        }
        if let Some(v) = lookup(ENV_READ_TIMEOUT_MS) {
            config.deadlines.read = Some(parse_millis(ENV_READ_TIMEOUT_MS, &v)?);
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, LaunchError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(LaunchError::Config(format!(
            "{key}: expected a boolean, found {other:?}"
        ))),
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, LaunchError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| LaunchError::Config(format!("{key}: {e}")))
}
