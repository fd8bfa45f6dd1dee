// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Process-wide coordination state.
//!
//! Everything the supervisor and the server bootstrap share lives here with
//! an explicit lifecycle: the forked server's pid (read by the signal relay),
//! the server-exit flag, and the init barrier that holds unprivileged
//! listener threads back until privileges have been dropped.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::{Condvar, Mutex};

static SERVER_PID: AtomicI32 = AtomicI32::new(-1);
static SERVER_EXIT: AtomicBool = AtomicBool::new(false);
static INIT_BARRIER: InitBarrier = InitBarrier::new();

/// Records the forked server's pid for the supervisor's signal relay.
pub fn set_server_pid(pid: libc::pid_t) {
    SERVER_PID.store(pid, Ordering::Release);
}

/// Clears the recorded server pid after the child has been reaped.
pub fn clear_server_pid() {
    SERVER_PID.store(-1, Ordering::Release);
}

/// Returns the recorded server pid, or a negative value when none is set.
///
/// Async-signal-safe: a single atomic load.
pub fn server_pid() -> libc::pid_t {
    SERVER_PID.load(Ordering::Acquire)
}

/// Flags the server for shutdown and wakes every barrier waiter.
pub fn request_exit() {
    SERVER_EXIT.store(true, Ordering::Release);
    INIT_BARRIER.wake_all();
}

/// Whether shutdown has been requested.
pub fn server_exiting() -> bool {
    SERVER_EXIT.load(Ordering::Acquire)
}

/// Returns the process-wide init barrier.
pub fn init_barrier() -> &'static InitBarrier {
    &INIT_BARRIER
}

/// One-shot barrier between "sockets exist" and "privileges are dropped".
///
/// Waiters check the predicate under the mutex, wait, and re-check; the
/// releaser sets the predicate under the mutex and wakes all. Every effect
/// ordered before [`InitBarrier::release`] is therefore visible to a waiter
/// once [`InitBarrier::wait`] returns.
pub struct InitBarrier {
    released: Mutex<bool>,
    cond: Condvar,
}

impl InitBarrier {
    const fn new() -> Self {
        Self {
            released: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Releases the barrier, unblocking all current and future waiters.
    pub fn release(&self) {
        let mut released = self.released.lock();
        *released = true;
        self.cond.notify_all();
    }

    /// Blocks until the barrier is released or shutdown is requested.
    pub fn wait(&self) {
        let mut released = self.released.lock();
        while !*released && !server_exiting() {
            self.cond.wait(&mut released);
        }
    }

    fn wake_all(&self) {
        let _released = self.released.lock();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn barrier_orders_release_before_wait_return() {
        let barrier = Arc::new(InitBarrier::new());
        let observed = Arc::new(AtomicBool::new(false));

        let waiter = {
            let barrier = barrier.clone();
            let observed = observed.clone();
            std::thread::spawn(move || {
                barrier.wait();
                observed.load(Ordering::Acquire)
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        observed.store(true, Ordering::Release);
        barrier.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn release_before_wait_does_not_block() {
        let barrier = InitBarrier::new();
        barrier.release();
        barrier.wait();
    }

    #[test]
    fn server_pid_roundtrip() {
        set_server_pid(4242);
        assert_eq!(server_pid(), 4242);
        clear_server_pid();
        assert!(server_pid() < 0);
    }
}
