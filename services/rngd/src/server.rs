// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Server bootstrap and accept loops.
//!
//! The bootstrap is a straight line: create the privileged endpoint as
//! root, start the unprivileged listener thread, permanently drop
//! privileges, release the init barrier, then serve the privileged accept
//! loop on the current thread. The barrier guarantees that no unprivileged
//! connection is ever handled by a process that still holds root: the
//! listener thread binds and chmods its socket early, but does not accept
//! until the drop has happened.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use thiserror::Error;

use crate::backend::{Backend, BackendError};
use crate::config::Config;
use crate::connection;
use crate::listener::{ListenerError, RpcListener};
use crate::privileges::{self, PrivilegeError};
use crate::service::{PrivService, ServiceTable, UnprivService};
use crate::state;

/// Failures that end the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Creating an endpoint failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// The permanent privilege drop failed.
    #[error(transparent)]
    Privileges(#[from] PrivilegeError),
    /// The DRNG back-end could not be initialized.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A required thread could not be started.
    #[error("starting {name} thread: {source}")]
    ThreadSpawn {
        /// Name the thread would have carried.
        name: &'static str,
        /// Underlying OS error.
        source: io::Error,
    },
    /// Forking the server process failed.
    #[error("forking server process: {0}")]
    Fork(#[source] nix::Error),
    /// The accept loop died of resource exhaustion.
    #[error("accept loop terminated: {0}")]
    Accept(#[source] io::Error),
}

/// Server-child entry point: brings up both endpoints and serves forever.
///
/// Runs in the forked server process. Any error before the accept loops is
/// fatal and reported to the caller, which exits nonzero; the supervisor
/// cleans up whatever was created.
pub(crate) fn interfaces_init(config: &Config) -> Result<(), ServerError> {
    let backend = Arc::new(Backend::new()?);

    let priv_listener = RpcListener::bind(&config.priv_socket_path, 0o600)?;

    {
        let config = config.clone();
        let backend = backend.clone();
        thread::Builder::new()
            .name("rpc-unpriv-server".to_string())
            .spawn(move || unpriv_init(config, backend))
            .map_err(|source| ServerError::ThreadSpawn {
                name: "rpc-unpriv-server",
                source,
            })?;
    }

    // The drop must land before the barrier opens; a failure here aborts
    // with the unprivileged thread still parked.
    privileges::drop_permanent(&config.username)?;
    state::init_barrier().release();

    info!(
        "rngd: privileged endpoint {} ready",
        config.priv_socket_path.display()
    );
    run_with_listener(
        priv_listener,
        Arc::new(PrivService::new(backend)),
        config.read_timeout,
    )
}

/// Unprivileged listener thread: bind, wait for the drop, then accept.
fn unpriv_init(config: Config, backend: Arc<Backend>) {
    let listener = match RpcListener::bind(&config.unpriv_socket_path, 0o666) {
        Ok(listener) => listener,
        Err(err) => {
            error!("rngd: unprivileged endpoint setup failed: {err}");
            return;
        }
    };

    state::init_barrier().wait();
    if state::server_exiting() {
        return;
    }

    info!(
        "rngd: unprivileged endpoint {} ready",
        config.unpriv_socket_path.display()
    );
    if let Err(err) = run_with_listener(
        listener,
        Arc::new(UnprivService::new(backend)),
        config.read_timeout,
    ) {
        error!("rngd: unprivileged accept loop failed: {err}");
    }
}

/// Accepts connections on `listener` and hands each one to its own handler
/// thread; ownership of the descriptor moves with it.
///
/// Transient accept failures are logged and retried so a hostile peer
/// cannot wedge the loop; resource exhaustion ends it.
pub fn run_with_listener(
    listener: RpcListener,
    table: Arc<dyn ServiceTable>,
    read_timeout: Duration,
) -> Result<(), ServerError> {
    loop {
        if state::server_exiting() {
            return Ok(());
        }

        let stream = match listener.accept() {
            Ok(stream) => stream,
            Err(err) if err.kind() == io::ErrorKind::OutOfMemory => {
                return Err(ServerError::Accept(err));
            }
            Err(err) => {
                warn!("rngd: accepting incoming connection failed: {err}");
                continue;
            }
        };

        let table = table.clone();
        let name = format!("rpc-handler-{}", stream.as_raw_fd());
        if let Err(err) = thread::Builder::new()
            .name(name)
            .spawn(move || connection::serve(stream, table, read_timeout))
        {
            error!("rngd: starting connection handler thread failed: {err}");
        }
    }
}
