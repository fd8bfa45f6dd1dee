// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! CONTEXT: rngd RPC wire protocol (host-testable, side-effect free).
//!
//! This crate defines the byte-level contract between rngd and its local
//! clients: the length-framed request/response envelope and the per-method
//! message bodies. It is deliberately free of syscalls and I/O so both the
//! daemon and client sides can share it and host tests can validate framing
//! deterministically.
//!
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Internal (shared by the daemon, its client helper and tests)
//! TEST_COVERAGE: Unit tests (host)
//!
//! PUBLIC API:
//!   - `frame`: envelope headers, status codes, `MAX_MSG` bounds
//!   - `msg`: method indices and request/response body codecs
//!
//! INVARIANTS:
//!   - All multi-byte fields are little-endian on the wire
//!   - Never panics on malformed/truncated input
//!   - Declared payload lengths are clamped to `MAX_MSG` before use

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod frame;
pub mod msg;

pub use frame::{WireError, HEADROOM, MAX_MSG};
