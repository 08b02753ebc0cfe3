// SPDX-License-Identifier: MIT

//! Cancellation and deadlines for the blocking steps of a launch.
//!
//! Every wait in the launcher (peer connection, child exit, response read)
//! goes through [`wait_for`], which slices the time left before the deadline
//! into short steps and checks the [`CancelToken`] between them.  Without a
//! deadline the loop runs until the resource is ready, which keeps the
//! unbounded blocking behavior.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

/// Longest single blocking step between cancellation checks.
pub const POLL_SLICE: Duration = Duration::from_millis(50);

/// Shared flag that aborts the launcher's waits.
///
/// Clones share the same flag, so one can be handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that any current or future wait stops.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a deadline-bound wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

/// Turn an optional timeout into an optional deadline, starting now.
pub fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}

/// Repeatedly ask `ready` whether the awaited resource is available.
///
/// `ready` receives the longest time it may block for this step, and returns
/// `true` once the resource is ready.  The token is checked before each step
/// and the deadline after it.
pub fn wait_for<F>(
    deadline: Option<Instant>,
    cancel: &CancelToken,
    mut ready: F,
) -> std::io::Result<WaitOutcome>
where
    F: FnMut(Duration) -> std::io::Result<bool>,
{
    loop {
        if cancel.is_cancelled() {
            return Ok(WaitOutcome::Cancelled);
        }
        let slice = match deadline {
            None => POLL_SLICE,
            Some(d) => d.saturating_duration_since(Instant::now()).min(POLL_SLICE),
        };
        if ready(slice)? {
            return Ok(WaitOutcome::Ready);
        }
        if let Some(d) = deadline {
            if Instant::now() >= d {
                return Ok(WaitOutcome::TimedOut);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_on_first_step() {
        let token = CancelToken::new();
        let mut calls = 0;
        let res = wait_for(None, &token, |_| {
            calls += 1;
            Ok(true)
        })
        .expect("wait failed");
        assert_eq!(res, WaitOutcome::Ready);
        assert_eq!(calls, 1);
    }

    #[test]
    fn deadline_expires() {
        let token = CancelToken::new();
        let start = Instant::now();
        let res = wait_for(deadline_after(Some(Duration::from_millis(120))), &token, |slice| {
            assert!(slice <= POLL_SLICE, "slice too long: {slice:?}");
            std::thread::sleep(slice);
            Ok(false)
        })
        .expect("wait failed");
        assert_eq!(res, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn expired_deadline_still_checks_once() {
        // A zero timeout behaves like a non-blocking check.
        let token = CancelToken::new();
        let res = wait_for(deadline_after(Some(Duration::ZERO)), &token, |slice| {
            assert_eq!(slice, Duration::ZERO);
            Ok(true)
        })
        .expect("wait failed");
        assert_eq!(res, WaitOutcome::Ready);
    }

    #[test]
    fn cancel_from_another_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(80));
            remote.cancel();
        });
        let res = wait_for(None, &token, |slice| {
            std::thread::sleep(slice);
            Ok(false)
        })
        .expect("wait failed");
        handle.join().expect("cancel thread panicked");
        assert_eq!(res, WaitOutcome::Cancelled);
    }

    #[test]
    fn errors_propagate() {
        let token = CancelToken::new();
        let res = wait_for(None, &token, |_| {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
        });
        assert_eq!(res.unwrap_err().kind(), std::io::ErrorKind::BrokenPipe);
    }
}
