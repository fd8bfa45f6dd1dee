// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Permanent privilege drop.
//!
//! The server process calls this exactly once, after the listening sockets
//! exist and before any unprivileged handler runs. The drop is verified:
//! a process that can still re-acquire uid 0 must not continue.

use log::{debug, info};
use nix::unistd::{setgid, setgroups, setuid, Uid, User};
use thiserror::Error;

/// Failures while switching to the unprivileged account.
#[derive(Debug, Error)]
pub enum PrivilegeError {
    /// The target account does not exist.
    #[error("unknown user {0:?}")]
    UnknownUser(String),
    /// The account database could not be read.
    #[error("looking up user {user:?}: {source}")]
    Lookup {
        /// Account that was being resolved.
        user: String,
        /// Underlying OS error.
        source: nix::Error,
    },
    /// Dropping supplementary groups failed.
    #[error("clearing supplementary groups: {0}")]
    SetGroups(#[source] nix::Error),
    /// Switching the gid failed.
    #[error("switching group id: {0}")]
    SetGid(#[source] nix::Error),
    /// Switching the uid failed.
    #[error("switching user id: {0}")]
    SetUid(#[source] nix::Error),
    /// The switch went through but root remains reachable.
    #[error("privilege drop did not stick")]
    DropIncomplete,
}

/// Irreversibly switches the process to `username`.
///
/// A process that is not root to begin with has nothing to drop; that case
/// succeeds so the daemon can run unprivileged in development setups. When
/// running as root, failure of any step is fatal to the caller.
pub fn drop_permanent(username: &str) -> Result<(), PrivilegeError> {
    let user = User::from_name(username)
        .map_err(|source| PrivilegeError::Lookup { user: username.to_string(), source })?
        .ok_or_else(|| PrivilegeError::UnknownUser(username.to_string()))?;

    if !Uid::effective().is_root() {
        debug!("rngd: not running as root, nothing to drop");
        return Ok(());
    }

    setgroups(&[user.gid]).map_err(PrivilegeError::SetGroups)?;
    setgid(user.gid).map_err(PrivilegeError::SetGid)?;
    setuid(user.uid).map_err(PrivilegeError::SetUid)?;

    // setuid(2) as root rewrites all three uids; regaining root must now be
    // impossible. Anything else means the drop was not permanent.
    if setuid(Uid::from_raw(0)).is_ok() || Uid::effective().is_root() {
        return Err(PrivilegeError::DropIncomplete);
    }

    info!("rngd: permanently dropped privileges to {username}");
    Ok(())
}
