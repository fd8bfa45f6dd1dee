// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![deny(clippy::all, missing_docs)]

//! CONTEXT: Privilege-separated random-number daemon.
//!
//! rngd serves cryptographically strong random bytes to local clients over
//! two Unix-domain endpoints: a world-accessible one for reads and queries,
//! and a root-only one for pool administration. A supervisor process forks
//! the server, which creates both endpoints as root, permanently drops to
//! an unprivileged account before handling any request, and serves one
//! thread per connection with bounded per-request memory. The supervisor
//! outlives the server and removes the root-created resources once the
//! server exits.
//!
//! OWNERS: @runtime
//! STATUS: Functional
//! TEST_COVERAGE: Unit tests per module + socket-level integration tests
//!
//! PUBLIC API:
//!   - `supervisor::init` / `supervisor::fini`: daemon lifecycle
//!   - `client::RpcClient`: blocking client helper
//!   - `server::run_with_listener`: serve a table on an injected listener

pub mod arena;
pub mod backend;
pub mod client;
pub mod config;
pub mod connection;
pub mod listener;
pub mod peer;
pub mod privileges;
pub mod server;
pub mod service;
pub mod state;
pub mod supervisor;
