// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Peer credential guard.
//!
//! Privileged handlers ask the kernel who sits on the other end of the
//! connected socket instead of trusting anything the payload claims. The
//! socket file mode is the primary filter; this check catches a
//! misconfigured filesystem permission.

use std::os::unix::net::UnixStream;

use log::debug;
use nix::sys::socket::{getsockopt, sockopt};

/// Whether the peer of `stream` runs with effective uid 0.
///
/// Returns `false` when the credentials cannot be read; an unidentifiable
/// peer is never privileged.
pub fn is_privileged(stream: &UnixStream) -> bool {
    match getsockopt(stream, sockopt::PeerCredentials) {
        Ok(creds) => {
            let privileged = creds.uid() == 0;
            debug!("rngd: peer uid {} privileged={}", creds.uid(), privileged);
            privileged
        }
        Err(err) => {
            debug!("rngd: peer credential lookup failed: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Uid;

    #[test]
    fn socketpair_peer_is_ourselves() {
        let (a, _b) = UnixStream::pair().unwrap();
        // The peer of a socketpair is this process, so the verdict must match
        // our own effective uid.
        assert_eq!(is_privileged(&a), Uid::effective().is_root());
    }
}
