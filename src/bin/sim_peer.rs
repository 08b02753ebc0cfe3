// SPDX-License-Identifier: MIT

//! Plays the simulation's side of the channel handshake.
//!
//! Takes the simulation command line, connects to the channel named by
//! `-p`, reads the prism request and answers it.  `SIM_PEER_REPLY` sets the
//! answer (default `OK`, empty sends nothing) and `SIM_PEER_LINGER_MS`
//! keeps the process alive for a while after answering.

use std::{
    io::{Read, Write},
    process::ExitCode,
    thread,
    time::{Duration, Instant},
};

use simlaunch::{ChannelName, PeerConnection, PrismTransform, connect, logging};

const CONNECT_PATIENCE: Duration = Duration::from_secs(10);
const CONNECT_RETRY: Duration = Duration::from_millis(20);
const REQUEST_BUFFER: usize = 512;

fn main() -> ExitCode {
    logging::init_logger();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let name = channel_arg(std::env::args().skip(1))?;
    let reply = std::env::var("SIM_PEER_REPLY").unwrap_or_else(|_| "OK".to_string());
    let linger = match std::env::var("SIM_PEER_LINGER_MS") {
        Ok(ms) => Duration::from_millis(ms.trim().parse()?),
        Err(_) => Duration::ZERO,
    };

    let mut conn = connect_with_retry(&name)?;
    log::info!("connected to {name}");

    let mut buf = [0u8; REQUEST_BUFFER];
    let n = conn.read(&mut buf)?;
    match PrismTransform::from_payload(&buf[..n]) {
        Ok(prism) => log::info!("received {prism:?}"),
        Err(e) => log::warn!("request is not a prism description: {e}"),
    }

    if !reply.is_empty() {
        conn.write_all(reply.as_bytes())?;
        conn.flush()?;
    }
    drop(conn);

    if !linger.is_zero() {
        thread::sleep(linger);
    }
    Ok(())
}

/// Pull the channel name out of the simulation's command line.
fn channel_arg<I>(mut args: I) -> Result<ChannelName, Box<dyn std::error::Error>>
where
    I: Iterator<Item = String>,
{
    let mut name = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-batchmode" | "-nographics" => {}
            "-logFile" => {
                args.next().ok_or("-logFile needs a path")?;
            }
            "-p" => name = Some(args.next().ok_or("-p needs a channel name")?),
            other => log::debug!("ignoring argument {other:?}"),
        }
    }
    let name = name.ok_or("missing -p <channel name>")?;
    Ok(ChannelName::new(name)?)
}

/// The launcher may not have created the channel yet.
fn connect_with_retry(name: &ChannelName) -> Result<PeerConnection, std::io::Error> {
    let started = Instant::now();
    loop {
        match connect(name) {
            Ok(conn) => return Ok(conn),
            Err(e) if started.elapsed() < CONNECT_PATIENCE => {
                log::debug!("channel {name} not ready: {e}");
                thread::sleep(CONNECT_RETRY);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn simulation_command_line() {
        let name = channel_arg(args(&[
            "-batchmode", "-nographics", "-logFile", "output.log", "-p", "Pipe",
        ]))
        .expect("parse");
        assert_eq!(name.as_str(), "Pipe");
    }

    #[test]
    fn missing_channel() {
        assert!(channel_arg(args(&["-batchmode"])).is_err());
        assert!(channel_arg(args(&["-p"])).is_err());
        assert!(channel_arg(args(&["-logFile"])).is_err());
    }
}
