// SPDX-License-Identifier: MIT

//! Runs the launcher against peers on the real channel.
//!
//! Peers are either threads in this process or the `sim-peer` binary.  Every
//! test uses its own channel name, so the tests can run in parallel.

#![cfg(target_os = "linux")]

use std::{
    ffi::OsString,
    io::{Read, Write},
    path::PathBuf,
    process::Command,
    sync::mpsc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use simlaunch::{
    CancelToken, Channel, ChannelName, ExitState, LaunchError, Launcher, LauncherConfig,
    PeerConnection, connect,
};

const WIRE_REQUEST: &[u8] =
    br#"{"XScale":1.0,"YScale":1.0,"ZScale":0.05,"XRot":0,"YRot":45,"ZRot":0}"#;

fn channel(tag: &str) -> ChannelName {
    ChannelName::new(format!("simlaunch-it-{tag}-{}", std::process::id())).expect("channel name")
}

fn config_for(name: &ChannelName) -> LauncherConfig {
    LauncherConfig {
        channel: name.clone(),
        ..LauncherConfig::default()
    }
}

fn sim_peer() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sim-peer"))
}

fn run_launcher(launcher: &Launcher) -> (Result<simlaunch::RunReport, LaunchError>, String) {
    let mut out = Vec::new();
    let result = launcher.run(&mut out);
    (result, String::from_utf8(out).expect("utf-8 output"))
}

fn connect_with_retry(name: &ChannelName) -> PeerConnection {
    let started = Instant::now();
    loop {
        match connect(name) {
            Ok(conn) => return conn,
            Err(e) => {
                assert!(
                    started.elapsed() < Duration::from_secs(10),
                    "could not connect to {name}: {e}"
                );
                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// A peer thread that reads the request, writes `reply` and hangs up.
/// Joining it returns the request bytes.
fn peer_thread(name: &ChannelName, reply: Vec<u8>) -> JoinHandle<Vec<u8>> {
    let name = name.clone();
    thread::spawn(move || {
        let mut conn = connect_with_retry(&name);
        let mut buf = [0u8; 512];
        let n = conn.read(&mut buf).expect("read request");
        if !reply.is_empty() {
            conn.write_all(&reply).expect("write reply");
        }
        buf[..n].to_vec()
    })
}

fn expected_output(contents: &str) -> String {
    format!(
        "Process connected to pipe.\nProcess finished executing.\nContents:\n{contents}\nClosing.\n"
    )
}

#[test]
fn second_channel_with_same_name_fails() {
    let name = channel("twice");
    let _held = Channel::create(&name).expect("first create");
    match Channel::create(&name) {
        Err(LaunchError::ChannelCreation { source, .. }) => {
            assert_eq!(source.raw_os_error(), Some(nix::libc::EADDRINUSE));
        }
        r => panic!("expected ChannelCreation, found {:?}", r.err()),
    }

    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    assert!(matches!(result, Err(LaunchError::ChannelCreation { .. })));
    assert_eq!(out, format!("Failed to create named pipe: {}\n", nix::libc::EADDRINUSE));
}

#[test]
fn missing_executable_fails_before_accept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let name = channel("missing");
    let mut config = config_for(&name);
    config.spawn_child = true;
    config.simulation.program = dir.path().join("no-such-simulation");

    // A spawn failure that fell through to the accept step would block.
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(run_launcher(&Launcher::new(config)));
    });
    let (result, out) = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("launcher blocked after a failed spawn");

    match result {
        Err(LaunchError::ProcessSpawn { program, source }) => {
            assert_eq!(program, dir.path().join("no-such-simulation"));
            assert_eq!(source.raw_os_error(), Some(nix::libc::ENOENT));
        }
        r => panic!("expected ProcessSpawn, found {r:?}"),
    }
    assert_eq!(
        out,
        format!("Creating process...\nFailed to create process: {}\n", nix::libc::ENOENT)
    );
}

#[test]
fn silent_peer_gives_no_contents() {
    let name = channel("silent");
    let peer = peer_thread(&name, Vec::new());
    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    peer.join().expect("peer");

    let report = result.expect("run succeeds");
    assert_eq!(report.response, None);
    assert_eq!(report.child_exit, None);
    assert_eq!(out, expected_output("No Contents"));
}

#[test]
fn full_size_reply_is_printed_exactly() {
    let name = channel("full");
    let reply = "x".repeat(200);
    let peer = peer_thread(&name, reply.clone().into_bytes());
    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    peer.join().expect("peer");

    assert_eq!(result.expect("run").response.as_deref(), Some(reply.as_str()));
    assert_eq!(out, expected_output(&reply));
}

#[test]
fn oversized_reply_is_cut_at_bound() {
    let name = channel("oversized");
    let peer = peer_thread(&name, "y".repeat(260).into_bytes());
    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    peer.join().expect("peer");

    result.expect("run");
    assert_eq!(out, expected_output(&"y".repeat(200)));
}

#[test]
fn reply_stops_at_nul() {
    let name = channel("nul");
    let peer = peer_thread(&name, b"done\0garbage".to_vec());
    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    peer.join().expect("peer");

    assert_eq!(result.expect("run").response.as_deref(), Some("done"));
    assert_eq!(out, expected_output("done"));
}

#[test]
fn only_first_peer_message_is_the_response() {
    let name = channel("two-messages");
    let peer_name = name.clone();
    let peer = thread::spawn(move || {
        let mut conn = connect_with_retry(&peer_name);
        let mut buf = [0u8; 512];
        conn.read(&mut buf).expect("read request");
        conn.write_all(b"first").expect("write first");
        // The launcher may already have hung up after the first message.
        let _ = conn.write_all(b"second");
    });
    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    peer.join().expect("peer");

    assert_eq!(result.expect("run").response.as_deref(), Some("first"));
    assert_eq!(out, expected_output("first"));
}

#[test]
fn request_is_identical_across_runs() {
    for round in 0..2 {
        let name = channel(&format!("request{round}"));
        let peer = peer_thread(&name, b"OK".to_vec());
        let (result, _) = run_launcher(&Launcher::new(config_for(&name)));
        result.expect("run");
        assert_eq!(peer.join().expect("peer"), WIRE_REQUEST);
    }
}

#[test]
fn external_sim_peer_process() {
    let name = channel("external");
    let mut peer = Command::new(sim_peer())
        .args(["-batchmode", "-nographics", "-logFile", "output.log", "-p"])
        .arg(name.as_str())
        .env("SIM_PEER_REPLY", "OK")
        .env_remove("SIM_PEER_LINGER_MS")
        .spawn()
        .expect("start sim-peer");

    let (result, out) = run_launcher(&Launcher::new(config_for(&name)));
    let status = peer.wait().expect("wait sim-peer");

    assert!(status.success(), "sim-peer failed: {status}");
    assert_eq!(result.expect("run").response.as_deref(), Some("OK"));
    assert_eq!(out, expected_output("OK"));
}

#[test]
fn spawned_sim_peer_child() {
    let name = channel("spawned");
    let mut config = config_for(&name);
    config.spawn_child = true;
    config.simulation.program = sim_peer();
    config
        .simulation
        .env
        .insert(OsString::from("SIM_PEER_REPLY"), OsString::from("spawned reply"));

    let (result, out) = run_launcher(&Launcher::new(config));
    let report = result.expect("run");

    assert_eq!(report.child_exit, Some(ExitState::Code(0)));
    assert_eq!(report.response.as_deref(), Some("spawned reply"));
    assert_eq!(
        out,
        format!(
            "Creating process...\nFinished creating process.\n{}",
            expected_output("spawned reply")
        )
    );
}

#[test]
fn connect_deadline_is_fatal() {
    let name = channel("connect-timeout");
    let mut config = config_for(&name);
    config.deadlines.connect = Some(Duration::from_millis(100));

    let (result, out) = run_launcher(&Launcher::new(config));
    match result {
        Err(LaunchError::ConnectTimeout { waited, .. }) => {
            assert!(waited >= Duration::from_millis(100), "waited only {waited:?}");
        }
        r => panic!("expected ConnectTimeout, found {r:?}"),
    }
    assert!(out.starts_with("Failed to connect to pipe: no peer connected to @"), "{out}");
    assert_eq!(out.lines().count(), 1);
}

#[test]
fn exit_deadline_terminates_lingering_child() {
    let name = channel("exit-timeout");
    let mut config = config_for(&name);
    config.spawn_child = true;
    config.simulation.program = sim_peer();
    config
        .simulation
        .env
        .insert(OsString::from("SIM_PEER_LINGER_MS"), OsString::from("30000"));
    config.deadlines.exit = Some(Duration::from_millis(300));

    let started = Instant::now();
    let (result, out) = run_launcher(&Launcher::new(config));
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "run took {:?}",
        started.elapsed()
    );
    assert!(matches!(result, Err(LaunchError::ExitTimeout { .. })), "{result:?}");
    let expected_start =
        "Creating process...\nFinished creating process.\nProcess connected to pipe.\n\
         Failed waiting for process: simulation process ";
    assert!(out.starts_with(expected_start), "{out}");
    assert!(!out.contains("Contents:"), "{out}");
}

#[test]
fn read_deadline_is_not_fatal() {
    let name = channel("read-timeout");
    let mut config = config_for(&name);
    config.deadlines.read = Some(Duration::from_millis(100));

    let (hold_tx, hold_rx) = mpsc::channel::<()>();
    let peer_name = name.clone();
    let peer = thread::spawn(move || {
        let mut conn = connect_with_retry(&peer_name);
        let mut buf = [0u8; 512];
        conn.read(&mut buf).expect("read request");
        // Stay connected without answering until the launcher is done.
        let _ = hold_rx.recv_timeout(Duration::from_secs(10));
    });

    let (result, out) = run_launcher(&Launcher::new(config));
    let _ = hold_tx.send(());
    peer.join().expect("peer");

    assert_eq!(result.expect("run").response, None);
    assert_eq!(out, expected_output("No Contents"));
}

#[test]
fn cancel_from_another_thread() {
    let name = channel("cancel");
    let cancel = CancelToken::new();
    let launcher = Launcher::with_cancel(config_for(&name), cancel.clone());

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });
    let (result, out) = run_launcher(&launcher);
    canceller.join().expect("canceller");

    assert!(matches!(result, Err(LaunchError::Cancelled)), "{result:?}");
    assert_eq!(out, "Failed to connect to pipe: launch cancelled\n");
    // The channel name is released after the run.
    Channel::create(&name).expect("name free again");
}
