// SPDX-License-Identifier: MIT

//! One launcher run: create the channel, optionally start the simulation,
//! exchange the request and response, and clean up.
//!
//! Progress goes to the writer handed to [`Launcher::run`] (standard output
//! for the binary) as plain lines.  Diagnostics go through `log`.

use std::{
    io::Write,
    process::ExitCode,
};

use crate::{
    comm::{channel::Channel, payload::response_text},
    config::LauncherConfig,
    runtime::{
        self,
        cancel::{CancelToken, deadline_after},
        error::{LaunchError, ReadDegraded},
        spawn::{Child, ExitState},
    },
};

const NO_CONTENTS: &str = "No Contents";

/// What a completed run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// How the spawned child ended.  `None` when no child was spawned.
    pub child_exit: Option<ExitState>,
    /// The response display text.  `None` when "No Contents" was printed.
    pub response: Option<String>,
}

pub struct Launcher {
    config: LauncherConfig,
    cancel: CancelToken,
}

impl Launcher {
    pub fn new(config: LauncherConfig) -> Self {
        Launcher {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Use an existing token, so another thread can abort the run.
    pub fn with_cancel(config: LauncherConfig, cancel: CancelToken) -> Self {
        Launcher { config, cancel }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the whole exchange once.
    ///
    /// Fatal failures print their line to `out` and return the error.  A
    /// missing or unreadable response is not fatal.
    pub fn run<W: Write>(&self, out: &mut W) -> Result<RunReport, LaunchError> {
        let config = &self.config;

        let mut channel = match Channel::create(&config.channel) {
            Ok(channel) => channel,
            Err(e) => {
                log::error!("{e}");
                writeln!(out, "Failed to create named pipe: {}", code_of(&e))?;
                return Err(e);
            }
        };
        log::info!("listening on {}", channel.name());

        let mut child = if config.spawn_child {
            Some(self.spawn(&channel, out)?)
        } else {
            log::info!("not spawning; waiting for an external simulation to connect");
            None
        };

        let connect_deadline = deadline_after(config.deadlines.connect);
        match channel.accept(connect_deadline, &self.cancel) {
            Ok(()) => {}
            Err(LaunchError::Io(e)) => {
                log::warn!("accepting the peer failed, continuing without it: {e}");
            }
            Err(e) => {
                log::error!("{e}");
                writeln!(out, "Failed to connect to pipe: {e}")?;
                return Err(e);
            }
        }
        writeln!(out, "Process connected to pipe.")?;

        if channel.is_connected() {
            match config.request.to_payload() {
                Ok(payload) => {
                    if let Err(e) = channel.send(&payload) {
                        log::warn!("writing the request failed: {e}");
                    }
                }
                Err(e) => log::warn!("encoding the request failed: {e}"),
            }
        }

        let child_exit = match child.as_deref_mut() {
            Some(c) => Some(self.wait_exit(c, out)?),
            None => None,
        };
        // Releases the process handles.
        drop(child);

        writeln!(out, "Process finished executing.")?;
        writeln!(out, "Contents:")?;
        let read_deadline = deadline_after(config.deadlines.read);
        let response = match channel.receive(read_deadline, &self.cancel) {
            Ok(bytes) => Some(response_text(&bytes)),
            Err(ReadDegraded::Cancelled) => {
                let e = LaunchError::Cancelled;
                log::error!("{e} while reading the response");
                writeln!(out, "Failed to read contents: {e}")?;
                return Err(e);
            }
            Err(e) => {
                log::warn!("{e}");
                None
            }
        };
        writeln!(out, "{}", response.as_deref().unwrap_or(NO_CONTENTS))?;

        if let Err(e) = channel.disconnect() {
            log::warn!("disconnecting the channel failed: {e}");
        }
        writeln!(out, "Closing.")?;
        out.flush()?;

        Ok(RunReport {
            child_exit,
            response,
        })
    }

    fn spawn<W: Write>(
        &self,
        channel: &Channel,
        out: &mut W,
    ) -> Result<Box<dyn Child>, LaunchError> {
        let req = self.config.simulation.spawn_request(channel.name());
        writeln!(out, "Creating process...")?;
        // The child may write to the same terminal as soon as it starts.
        out.flush()?;
        match runtime::spawn_child(&req) {
            Ok(child) => {
                log::info!("started {} as pid {}", req.cmd.display(), child.id());
                writeln!(out, "Finished creating process.")?;
                Ok(child)
            }
            Err(e) => {
                log::error!("{e}");
                writeln!(out, "Failed to create process: {}", code_of(&e))?;
                Err(e)
            }
        }
    }

    fn wait_exit<W: Write>(
        &self,
        child: &mut dyn Child,
        out: &mut W,
    ) -> Result<ExitState, LaunchError> {
        let deadline = deadline_after(self.config.deadlines.exit);
        match runtime::wait_child(child, deadline, &self.cancel) {
            Ok(state) => {
                match state {
                    ExitState::Code(0) => log::info!("simulation finished"),
                    other => log::warn!("simulation ended with {other}"),
                }
                Ok(state)
            }
            Err(e) => {
                log::error!("{e}");
                writeln!(out, "Failed waiting for process: {e}")?;
                Err(e)
            }
        }
    }
}

/// Run with `config`, printing progress to standard output.
///
/// A configuration that failed to load is reported the same way as a
/// failed run.
pub fn run(config: Result<LauncherConfig, LaunchError>) -> ExitCode {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_to(config, &mut out)
}

fn run_to<W: Write>(config: Result<LauncherConfig, LaunchError>, out: &mut W) -> ExitCode {
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            let _ = writeln!(out, "Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    match Launcher::new(config).run(out) {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

/// The OS code printed in a failure line, or -1 when the failure has none.
fn code_of(e: &LaunchError) -> i32 {
    e.os_code().unwrap_or(-1)
}
