// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Runtime configuration surface.
//!
//! Defaults match the deployed layout; every knob can be overridden through
//! an `RNGD_*` environment variable so tests and packaging do not have to
//! patch the binary.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the unprivileged socket path.
pub const ENV_UNPRIV_SOCKET: &str = "RNGD_RPC_UNPRIV_SOCKET";
/// Environment variable overriding the privileged socket path.
pub const ENV_PRIV_SOCKET: &str = "RNGD_RPC_PRIV_SOCKET";
/// Environment variable overriding the unprivileged account name.
pub const ENV_USER: &str = "RNGD_USER";
/// Environment variable overriding the per-read timeout in milliseconds.
pub const ENV_READ_TIMEOUT_MS: &str = "RNGD_READ_TIMEOUT_MS";

/// Project id feeding `ftok` for the status shared-memory key.
pub const STATUS_SHM_PROJ_ID: libc::c_int = b'r' as libc::c_int;

/// Runtime configuration of the daemon.
#[derive(Clone, Debug)]
pub struct Config {
    /// Path of the world-accessible endpoint (mode 0666).
    pub unpriv_socket_path: PathBuf,
    /// Path of the root-only endpoint (mode 0600).
    pub priv_socket_path: PathBuf,
    /// Account the server drops to after the listeners exist.
    pub username: String,
    /// Bounded wait applied to every connection read.
    pub read_timeout: Duration,
    /// Existing path the status shared-memory key is derived from.
    pub status_shm_path: PathBuf,
    /// Name of the status semaphore removed during supervisor cleanup.
    pub status_sem_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unpriv_socket_path: PathBuf::from("/var/run/rngd-rpc-unpriv.socket"),
            priv_socket_path: PathBuf::from("/var/run/rngd-rpc-priv.socket"),
            username: "nobody".to_string(),
            read_timeout: Duration::from_secs(2),
            status_shm_path: PathBuf::from("/"),
            status_sem_name: "rngd-shm-status-semaphore".to_string(),
        }
    }
}

impl Config {
    /// Builds the configuration from defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(ENV_UNPRIV_SOCKET) {
            config.unpriv_socket_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var(ENV_PRIV_SOCKET) {
            config.priv_socket_path = PathBuf::from(path);
        }
        if let Ok(user) = std::env::var(ENV_USER) {
            if !user.is_empty() {
                config.username = user;
            }
        }
        if let Ok(ms) = std::env::var(ENV_READ_TIMEOUT_MS) {
            if let Ok(ms) = ms.parse::<u64>() {
                if ms > 0 {
                    config.read_timeout = Duration::from_millis(ms);
                }
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_the_deployed_layout() {
        let config = Config::default();
        assert_eq!(
            config.unpriv_socket_path,
            PathBuf::from("/var/run/rngd-rpc-unpriv.socket")
        );
        assert_eq!(
            config.priv_socket_path,
            PathBuf::from("/var/run/rngd-rpc-priv.socket")
        );
        assert_eq!(config.username, "nobody");
        assert_eq!(config.read_timeout, Duration::from_secs(2));
    }

    #[test]
    fn environment_overrides_apply() {
        // One test owns all RNGD_* variables; the harness runs tests in
        // threads and the process environment is shared.
        std::env::set_var(ENV_UNPRIV_SOCKET, "/tmp/rngd-test-unpriv.socket");
        std::env::set_var(ENV_USER, "daemon");
        std::env::set_var(ENV_READ_TIMEOUT_MS, "250");
        let overridden = Config::from_env();

        std::env::set_var(ENV_READ_TIMEOUT_MS, "not-a-number");
        let malformed = Config::from_env();

        std::env::remove_var(ENV_UNPRIV_SOCKET);
        std::env::remove_var(ENV_USER);
        std::env::remove_var(ENV_READ_TIMEOUT_MS);

        assert_eq!(
            overridden.unpriv_socket_path,
            PathBuf::from("/tmp/rngd-test-unpriv.socket")
        );
        assert_eq!(overridden.username, "daemon");
        assert_eq!(overridden.read_timeout, Duration::from_millis(250));

        // A malformed timeout falls back to the default.
        assert_eq!(malformed.read_timeout, Duration::from_secs(2));
    }
}
