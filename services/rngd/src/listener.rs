// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Endpoint listener.
//!
//! One listener exists per trust tier. Binding reaps a stale socket file
//! first: if something still answers on the path, a second daemon instance
//! is running and binding fails; if nothing answers, the leftover file from
//! a crashed instance is unlinked. The listening descriptor is owned here;
//! closing it is the only way to stop accepting.

use std::fs;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};
use thiserror::Error;

/// Failures while creating an endpoint.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another instance is serving the path.
    #[error("endpoint {path} is already served by a running instance")]
    AlreadyActive {
        /// The contested socket path.
        path: PathBuf,
    },
    /// Probing the existing socket file failed.
    #[error("probing {path}: {source}")]
    Probe {
        /// The socket path being probed.
        path: PathBuf,
        /// Underlying OS error.
        source: nix::Error,
    },
    /// Binding or listening on the path failed.
    #[error("binding {path}: {source}")]
    Bind {
        /// The socket path being bound.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },
    /// The just-created socket could not be switched to the endpoint mode.
    #[error("setting mode on {path}: {source}")]
    Permissions {
        /// The socket path being chmodded.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },
}

/// A bound Unix-domain endpoint accepting RPC connections.
#[derive(Debug)]
pub struct RpcListener {
    listener: UnixListener,
    path: PathBuf,
}

impl RpcListener {
    /// Reaps a stale socket, binds `path`, and applies `mode` to it.
    pub fn bind(path: &Path, mode: u32) -> Result<Self, ListenerError> {
        reap_stale_socket(path)?;

        let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
            ListenerError::Permissions {
                path: path.to_path_buf(),
                source,
            }
        })?;
        debug!("rngd: listening on {} (mode {mode:o})", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Waits for and returns the next incoming connection.
    pub fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _addr) = self.listener.accept()?;
        Ok(stream)
    }

    /// Path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decides what to do about a pre-existing socket file.
///
/// A connect attempt that makes progress means a live instance owns the
/// path. Anything else (typically `ECONNREFUSED`) means the file is a
/// leftover and gets unlinked so the bind can proceed.
fn reap_stale_socket(path: &Path) -> Result<(), ListenerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };
    if !metadata.file_type().is_socket() {
        return Ok(());
    }

    let probe = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(|source| ListenerError::Probe {
        path: path.to_path_buf(),
        source,
    })?;
    let addr = UnixAddr::new(path).map_err(|source| ListenerError::Probe {
        path: path.to_path_buf(),
        source,
    })?;

    match connect(probe.as_raw_fd(), &addr) {
        Ok(()) | Err(Errno::EINPROGRESS) | Err(Errno::EAGAIN) => {
            Err(ListenerError::AlreadyActive {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {
            debug!("rngd: removing stale socket {}", path.display());
            if let Err(err) = fs::remove_file(path) {
                warn!(
                    "rngd: removing stale socket {} failed: {err}",
                    path.display()
                );
            }
            Ok(())
        }
    }
}
