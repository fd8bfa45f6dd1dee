// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Per-connection scratch arena.
//!
//! Each connection handler owns one fixed-capacity bump region that backs
//! request decoding and reply staging. Allocations beyond the capacity fail
//! explicitly, individual frees do not exist, and [`ScratchArena::reset`]
//! reclaims the whole region after a reply has been written. A hostile
//! client can therefore never grow the handler's footprint past the region,
//! no matter how its messages are shaped.

use thiserror::Error;
use zeroize::Zeroize;

use rngd_wire::{HEADROOM, MAX_MSG};

/// The arena cannot satisfy an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("scratch arena exhausted: requested {requested} bytes, {remaining} free")]
pub struct ArenaExhausted {
    /// Bytes the caller asked for.
    pub requested: usize,
    /// Bytes still unallocated in the region.
    pub remaining: usize,
}

/// Fixed-capacity bump region with wipe-on-reset semantics.
pub struct ScratchArena {
    buf: Box<[u8]>,
    cursor: usize,
    high_water: usize,
}

impl ScratchArena {
    /// Creates an arena with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            high_water: 0,
        }
    }

    /// Creates an arena sized for one maximum request plus decoder headroom.
    pub fn for_connection() -> Self {
        Self::new(MAX_MSG + HEADROOM)
    }

    /// Total capacity of the region in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes still available before the region is exhausted.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Hands out `len` zeroed bytes from the region.
    ///
    /// Fails when the remaining capacity cannot cover the request; the caller
    /// is expected to surface that as a failed request, not retry.
    pub fn alloc(&mut self, len: usize) -> Result<&mut [u8], ArenaExhausted> {
        let start = self.cursor;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(ArenaExhausted {
                requested: len,
                remaining: self.buf.len() - start,
            })?;
        self.cursor = end;
        self.high_water = self.high_water.max(end);
        Ok(&mut self.buf[start..end])
    }

    /// Reclaims the whole region, wiping every byte handed out since the
    /// last reset.
    pub fn reset(&mut self) {
        self.buf[..self.high_water].zeroize();
        self.cursor = 0;
        self.high_water = 0;
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_within_capacity_succeeds() {
        let mut arena = ScratchArena::new(64);
        let a = arena.alloc(16).unwrap();
        assert_eq!(a.len(), 16);
        a.fill(0xaa);
        let b = arena.alloc(48).unwrap();
        assert_eq!(b.len(), 48);
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn alloc_beyond_capacity_fails_explicitly() {
        let mut arena = ScratchArena::new(32);
        arena.alloc(20).unwrap();
        let err = arena.alloc(20).unwrap_err();
        assert_eq!(err, ArenaExhausted { requested: 20, remaining: 12 });
        // The failed allocation did not consume anything.
        assert_eq!(arena.remaining(), 12);
    }

    #[test]
    fn zero_length_alloc_is_fine() {
        let mut arena = ScratchArena::new(4);
        assert_eq!(arena.alloc(0).unwrap().len(), 0);
        assert_eq!(arena.remaining(), 4);
    }

    #[test]
    fn reset_wipes_up_to_the_high_water_mark() {
        let mut arena = ScratchArena::new(64);
        arena.alloc(32).unwrap().fill(0xff);
        arena.reset();
        assert_eq!(arena.remaining(), 64);
        // Freshly handed-out storage must not leak prior request contents.
        let again = arena.alloc(32).unwrap();
        assert!(again.iter().all(|b| *b == 0));
    }

    #[test]
    fn connection_arena_covers_a_maximum_message() {
        let mut arena = ScratchArena::for_connection();
        assert_eq!(arena.capacity(), MAX_MSG + HEADROOM);
        assert!(arena.alloc(MAX_MSG).is_ok());
        assert!(arena.alloc(HEADROOM).is_ok());
        assert!(arena.alloc(1).is_err());
    }
}
