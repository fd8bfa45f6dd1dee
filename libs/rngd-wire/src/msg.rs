// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Method indices and request/response body codecs.
//!
//! Method indices are dense small integers, independent per service table.
//! Every response body starts with `ret: i32` (0 or a positive byte count on
//! success, a negative errno-style value on failure); variable-length data
//! follows the fixed fields. Bodies never exceed [`MAX_MSG`](crate::MAX_MSG).

use crate::frame::{u32_at, WireError, MAX_MSG};

/// Methods served on the world-accessible endpoint.
pub mod unpriv {
    /// Human-readable daemon status text.
    pub const STATUS: u32 = 0;
    /// Whether at least one DRNG is seeded at full security strength.
    pub const IS_FULLY_SEEDED: u32 = 1;
    /// Whether the DRNG has reached its minimal seed level.
    pub const IS_MIN_SEEDED: u32 = 2;
    /// Available entropy of the auxiliary pool in bits.
    pub const AVAIL_ENTROPY: u32 = 3;
    /// Capacity of the auxiliary pool in bits.
    pub const AVAIL_POOLSIZE: u32 = 4;
    /// Random bytes from a fully seeded DRNG.
    pub const GET_RANDOM_BYTES_FULL: u32 = 5;
    /// Random bytes from an at least minimally seeded DRNG.
    pub const GET_RANDOM_BYTES_MIN: u32 = 6;
    /// Random bytes with prediction resistance; may return fewer bytes.
    pub const GET_RANDOM_BYTES_PR: u32 = 7;
    /// Random bytes without seed-level guarantees.
    pub const GET_RANDOM_BYTES: u32 = 8;
    /// Current write-wakeup threshold in bits.
    pub const GET_WRITE_WAKEUP_THRESH: u32 = 9;
    /// Current minimum reseed interval in seconds.
    pub const GET_MIN_RESEED_SECS: u32 = 10;
    /// Number of methods in this table.
    pub const METHOD_COUNT: u32 = 11;
}

/// Methods served on the root-only endpoint.
pub mod privileged {
    /// Mix caller data into the auxiliary pool, crediting entropy.
    pub const ADD_ENTROPY: u32 = 0;
    /// Raise the auxiliary pool entropy estimate without new data.
    pub const ADD_TO_ENT_COUNT: u32 = 1;
    /// Zero the auxiliary pool and its entropy estimate.
    pub const CLEAR_POOL: u32 = 2;
    /// Flag all DRNGs for a reseed on their next generate.
    pub const RESEED_CRNG: u32 = 3;
    /// Set the write-wakeup threshold in bits.
    pub const SET_WRITE_WAKEUP_THRESH: u32 = 4;
    /// Set the minimum reseed interval in seconds.
    pub const SET_MIN_RESEED_SECS: u32 = 5;
    /// Number of methods in this table.
    pub const METHOD_COUNT: u32 = 6;
}

fn expect_len(body: &[u8], want: usize) -> Result<(), WireError> {
    if body.len() < want {
        return Err(WireError::Truncated);
    }
    if body.len() > want {
        return Err(WireError::TrailingBytes);
    }
    Ok(())
}

/// Request body for methods that carry no parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmptyRequest;

impl EmptyRequest {
    /// Rejects any stray bytes; empty methods have empty bodies.
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, 0)?;
        Ok(Self)
    }

    /// Serializes the (empty) body.
    pub fn encode(&self) -> [u8; 0] {
        []
    }
}

/// Request body asking for `len` random bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LenRequest {
    /// Number of random bytes the caller wants.
    pub len: u32,
}

impl LenRequest {
    /// Encoded body length in bytes.
    pub const ENCODED_LEN: usize = 4;

    /// Serializes the body.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        self.len.to_le_bytes()
    }

    /// Parses the body, rejecting truncated or oversized input.
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::ENCODED_LEN)?;
        Ok(Self { len: u32_at(body, 0) })
    }
}

/// Request body carrying a single `u32` parameter (thresholds, counters).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueRequest {
    /// Method-specific parameter (bits or seconds).
    pub value: u32,
}

impl ValueRequest {
    /// Encoded body length in bytes.
    pub const ENCODED_LEN: usize = 4;

    /// Serializes the body.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        self.value.to_le_bytes()
    }

    /// Parses the body, rejecting truncated or oversized input.
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::ENCODED_LEN)?;
        Ok(Self { value: u32_at(body, 0) })
    }
}

/// Request body feeding entropy into the auxiliary pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddEntropyRequest<'a> {
    /// Entropy credit in bits claimed for `data`.
    pub entropy_bits: u32,
    /// Raw entropy input to condition into the pool.
    pub data: &'a [u8],
}

impl<'a> AddEntropyRequest<'a> {
    /// Encoded body length in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self.data.len()
    }

    /// Serializes the body into `out`, returning the bytes written.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize, WireError> {
        let len = self.encoded_len();
        if len > MAX_MSG {
            return Err(WireError::TooLarge { got: len, limit: MAX_MSG });
        }
        if out.len() < len {
            return Err(WireError::OutputTooSmall);
        }
        out[0..4].copy_from_slice(&self.entropy_bits.to_le_bytes());
        out[4..len].copy_from_slice(self.data);
        Ok(len)
    }

    /// Parses the body; everything after the credit field is entropy input.
    pub fn decode(body: &'a [u8]) -> Result<Self, WireError> {
        if body.len() < 4 {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            entropy_bits: u32_at(body, 0),
            data: &body[4..],
        })
    }
}

/// Response body carrying only a return code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetResponse {
    /// 0 on success, negative errno-style value on failure.
    pub ret: i32,
}

impl RetResponse {
    /// Encoded body length in bytes.
    pub const ENCODED_LEN: usize = 4;

    /// Serializes the body.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        self.ret.to_le_bytes()
    }

    /// Parses the body, rejecting truncated or oversized input.
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::ENCODED_LEN)?;
        Ok(Self {
            ret: i32::from_le_bytes([body[0], body[1], body[2], body[3]]),
        })
    }
}

/// Response body carrying a return code and one `u32` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueResponse {
    /// 0 on success, negative errno-style value on failure.
    pub ret: i32,
    /// Method-specific value (bits, seconds, or a boolean as 0/1).
    pub value: u32,
}

impl ValueResponse {
    /// Encoded body length in bytes.
    pub const ENCODED_LEN: usize = 8;

    /// Serializes the body.
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.ret.to_le_bytes());
        out[4..8].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    /// Parses the body, rejecting truncated or oversized input.
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        expect_len(body, Self::ENCODED_LEN)?;
        Ok(Self {
            ret: i32::from_le_bytes([body[0], body[1], body[2], body[3]]),
            value: u32_at(body, 4),
        })
    }
}

/// Response body carrying a return code and variable-length data.
///
/// Used for random-bytes replies (the code doubles as the produced byte
/// count) and for status text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BytesResponse<'a> {
    /// Produced byte count on success, negative errno-style value on failure.
    pub ret: i32,
    /// Payload bytes; empty on failure.
    pub data: &'a [u8],
}

impl<'a> BytesResponse<'a> {
    /// Encoded body length in bytes.
    pub fn encoded_len(&self) -> usize {
        4 + self.data.len()
    }

    /// Serializes the body into `out`, returning the bytes written.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<usize, WireError> {
        let len = self.encoded_len();
        if len > MAX_MSG {
            return Err(WireError::TooLarge { got: len, limit: MAX_MSG });
        }
        if out.len() < len {
            return Err(WireError::OutputTooSmall);
        }
        out[0..4].copy_from_slice(&self.ret.to_le_bytes());
        out[4..len].copy_from_slice(self.data);
        Ok(len)
    }

    /// Parses the body; everything after the return code is payload.
    pub fn decode(body: &'a [u8]) -> Result<Self, WireError> {
        if body.len() < 4 {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            ret: i32::from_le_bytes([body[0], body[1], body[2], body[3]]),
            data: &body[4..],
        })
    }
}
