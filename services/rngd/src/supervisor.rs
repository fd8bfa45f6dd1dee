// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Supervisor process.
//!
//! The daemon splits in two: a forked child serves RPC and permanently
//! drops privileges; the parent keeps root for one purpose only, removing
//! the OS-visible resources the child created as root but can no longer
//! unlink itself. The parent never reads client data. Signals sent to the
//! supervisor are relayed to the child; all cleanup runs synchronously
//! after `waitpid` returns, never inside a signal handler.

use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process;

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult};

use crate::config::{Config, STATUS_SHM_PROJ_ID};
use crate::server::{self, ServerError};
use crate::state;

const RELAYED_SIGNALS: [Signal; 4] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
];

/// Starts the daemon: forks the server child and supervises it.
///
/// Must be called before any thread exists; the child assumes a
/// single-threaded address space at fork time. Returns once the child has
/// exited and cleanup has run.
pub fn init(config: &Config) -> Result<(), ServerError> {
    match unsafe { fork() }.map_err(ServerError::Fork)? {
        ForkResult::Child => {
            let code = match server::interfaces_init(config) {
                Ok(()) => 0,
                Err(err) => {
                    error!("rngd: server process failed: {err}");
                    1
                }
            };
            process::exit(code);
        }
        ForkResult::Parent { child } => {
            info!("rngd: supervising server process {child}");
            state::set_server_pid(child.as_raw());
            install_relay_handlers();

            loop {
                match waitpid(child, None) {
                    Ok(_) => break,
                    Err(Errno::EINTR) => continue,
                    Err(err) => {
                        warn!("rngd: waiting for server process failed: {err}");
                        break;
                    }
                }
            }

            state::clear_server_pid();
            restore_default_handlers();
            cleanup(config);
            Ok(())
        }
    }
}

/// Requests shutdown: stops the accept loops from spawning new handlers and
/// releases any thread still parked on the init barrier.
pub fn fini() {
    state::request_exit();
}

/// Relays a received signal to the server child.
///
/// Async-signal-safe: one atomic load and one `kill(2)`.
extern "C" fn relay_to_server(sig: libc::c_int) {
    let pid = state::server_pid();
    if pid > 0 {
        unsafe {
            libc::kill(pid, sig);
        }
    }
}

fn install_relay_handlers() {
    for sig in RELAYED_SIGNALS {
        if let Err(err) = unsafe { signal(sig, SigHandler::Handler(relay_to_server)) } {
            warn!("rngd: installing relay handler for {sig:?} failed: {err}");
        }
    }
}

fn restore_default_handlers() {
    for sig in RELAYED_SIGNALS {
        if let Err(err) = unsafe { signal(sig, SigHandler::SigDfl) } {
            warn!("rngd: restoring default handler for {sig:?} failed: {err}");
        }
    }
}

/// Removes everything the server created as root. Each step is
/// best-effort: a failure is logged and the remaining steps still run.
fn cleanup(config: &Config) {
    remove_socket(&config.unpriv_socket_path);
    remove_socket(&config.priv_socket_path);
    remove_status_shm(config);
    remove_status_sem(config);
}

fn remove_socket(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("rngd: socket {} deleted", path.display()),
        Err(err) => error!("rngd: socket {} cannot be deleted: {err}", path.display()),
    }
}

/// Removes the status shared-memory segment via its well-known key.
fn remove_status_shm(config: &Config) {
    let path = match CString::new(config.status_shm_path.as_os_str().as_bytes()) {
        Ok(path) => path,
        Err(_) => {
            warn!("rngd: status segment path contains a NUL byte");
            return;
        }
    };

    let key = unsafe { libc::ftok(path.as_ptr(), STATUS_SHM_PROJ_ID) };
    if key == -1 {
        error!(
            "rngd: deriving status segment key failed: {}",
            io::Error::last_os_error()
        );
        return;
    }

    let shmid = unsafe { libc::shmget(key, 0, 0) };
    if shmid == -1 {
        error!(
            "rngd: status shared-memory segment lookup failed: {}",
            io::Error::last_os_error()
        );
        return;
    }

    if unsafe { libc::shmctl(shmid, libc::IPC_RMID, std::ptr::null_mut()) } == -1 {
        error!(
            "rngd: status shared-memory segment cannot be deleted: {}",
            io::Error::last_os_error()
        );
    } else {
        debug!("rngd: status shared-memory segment deleted");
    }
}

fn remove_status_sem(config: &Config) {
    let name = match CString::new(config.status_sem_name.as_bytes()) {
        Ok(name) => name,
        Err(_) => {
            warn!("rngd: status semaphore name contains a NUL byte");
            return;
        }
    };

    if unsafe { libc::sem_unlink(name.as_ptr()) } == -1 {
        debug!(
            "rngd: status semaphore not unlinked: {}",
            io::Error::last_os_error()
        );
    } else {
        debug!("rngd: status semaphore deleted");
    }
}
