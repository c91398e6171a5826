//! Thread primitives (C7): real-time scheduling attributes and
//! cooperative, bounded-retry shutdown.
//!
//! Grounded on `original_source/system/src/thread.c`'s
//! `ThreadAttrInit`/`ThreadCreate`/`ThreadTryJoin`. Rust's `std::thread`
//! has no portable way to request `SCHED_FIFO` at spawn time, so this
//! applies the real-time policy from inside the new thread's entry point
//! via `pthread_setschedparam`, immediately after spawn — matching what
//! the C original does with `pthread_attr_setschedpolicy` before
//! `pthread_create`, just phrased as a post-spawn syscall instead of a
//! pre-spawn attribute object.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use libc::{sched_param, SCHED_FIFO};

use error::Result;

/// Highest FIFO priority this process will request a worker at.
const MAX_FIFO_PRIORITY: i32 = 99;

/// A per-thread cooperative shutdown flag: cleared by the main thread,
/// observed by the worker between poll iterations.
#[derive(Clone)]
pub struct ContinueFlag(Arc<AtomicBool>);

impl ContinueFlag {
    pub fn new() -> Self {
        ContinueFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn should_continue(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release)
    }
}

impl Default for ContinueFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies `SCHED_FIFO` at `priority = MAX_FIFO_PRIORITY - requested` to
/// the calling thread. Called from inside a freshly spawned worker, before
/// it enters its poll loop.
pub fn apply_fifo_priority(requested: i32) -> Result<()> {
    let priority = MAX_FIFO_PRIORITY - requested;
    let param = sched_param {
        sched_priority: priority,
    };
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(::nix::Error::from_errno(::nix::errno::Errno::from_i32(rc)).into());
    }
    Ok(())
}

/// Spawns a reader-thread-style worker at an explicit FIFO priority,
/// returning its `JoinHandle` and a linked `ContinueFlag` the caller
/// clears to request shutdown.
pub fn spawn_worker<F>(requested_priority: i32, body: F) -> (JoinHandle<()>, ContinueFlag)
where
    F: FnOnce(ContinueFlag) + Send + 'static,
{
    let flag = ContinueFlag::new();
    let flag_for_thread = flag.clone();
    let handle = std::thread::spawn(move || {
        if let Err(e) = apply_fifo_priority(requested_priority) {
            warn!("failed to apply SCHED_FIFO priority: {}", e);
        }
        body(flag_for_thread);
    });
    (handle, flag)
}

/// Joins `handle` with up to `max_attempts` retries spaced `interval`
/// apart, returning `true` if the thread had finished by the final
/// attempt. Mirrors `ThreadTryJoin`'s bounded-retry loop.
pub fn try_join_bounded(
    handle: JoinHandle<()>,
    max_attempts: u32,
    interval: Duration,
) -> bool {
    if handle.is_finished() {
        let _ = handle.join();
        return true;
    }
    for _ in 0..max_attempts {
        std::thread::sleep(interval);
        if handle.is_finished() {
            let _ = handle.join();
            return true;
        }
    }
    // Retry budget exhausted; detach rather than block shutdown forever.
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_flag_starts_true_and_stops() {
        let flag = ContinueFlag::new();
        assert!(flag.should_continue());
        flag.stop();
        assert!(!flag.should_continue());
    }

    #[test]
    fn spawn_worker_observes_stop() {
        let (handle, flag) = spawn_worker(0, |cf| {
            while cf.should_continue() {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        flag.stop();
        assert!(try_join_bounded(handle, 50, Duration::from_millis(20)));
    }
}
