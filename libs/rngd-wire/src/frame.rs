// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Frame envelope wrapping each serialized RPC message.
//!
//! Request frame:  `[method_index:u32][message_length:u32][request_id:u32][payload]`
//! Response frame: `[status_code:u32][method_index:u32][message_length:u32][request_id:u32][payload]`
//!
//! All header fields travel little-endian regardless of host byte order.

use thiserror::Error;

/// Maximum permitted payload length of a single frame, both directions.
pub const MAX_MSG: usize = 65536;

/// Extra scratch capacity a decoder may consume beyond the payload itself.
pub const HEADROOM: usize = 128;

/// Byte length of the client-to-server header.
pub const REQUEST_HEADER_LEN: usize = 12;

/// Byte length of the server-to-client header.
pub const RESPONSE_HEADER_LEN: usize = 16;

/// Response status: the handler produced a reply.
pub const STATUS_SUCCESS: u32 = 0;

/// Response status: the request was answered but the service failed it.
pub const STATUS_SERVICE_FAILED: u32 = 1;

/// Errors produced while encoding or decoding wire data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum WireError {
    /// Buffer is too short for the expected structure.
    #[error("frame truncated")]
    Truncated,
    /// A body carried more bytes than its message type defines.
    #[error("trailing bytes after message body")]
    TrailingBytes,
    /// A length or count exceeds the protocol bound.
    #[error("length {got} exceeds limit {limit}")]
    TooLarge {
        /// Length observed in the input.
        got: usize,
        /// Maximum the protocol permits.
        limit: usize,
    },
    /// Output buffer cannot hold the encoded message.
    #[error("output buffer too small")]
    OutputTooSmall,
}

pub(crate) fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Client-to-server frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestHeader {
    /// Index of the method in the endpoint's service table.
    pub method_index: u32,
    /// Declared payload length in bytes, as sent by the client.
    pub message_length: u32,
    /// Caller-chosen correlation id echoed in the response.
    pub request_id: u32,
}

impl RequestHeader {
    /// Serializes the header into its wire representation.
    pub fn encode(&self) -> [u8; REQUEST_HEADER_LEN] {
        let mut out = [0u8; REQUEST_HEADER_LEN];
        out[0..4].copy_from_slice(&self.method_index.to_le_bytes());
        out[4..8].copy_from_slice(&self.message_length.to_le_bytes());
        out[8..12].copy_from_slice(&self.request_id.to_le_bytes());
        out
    }

    /// Parses a header from the first [`REQUEST_HEADER_LEN`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < REQUEST_HEADER_LEN {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            method_index: u32_at(buf, 0),
            message_length: u32_at(buf, 4),
            request_id: u32_at(buf, 8),
        })
    }

    /// Declared payload length clamped to [`MAX_MSG`].
    ///
    /// Servers must size reads off this value, never off the raw field: a
    /// hostile client may declare any length it likes.
    pub fn clamped_len(&self) -> usize {
        (self.message_length as usize).min(MAX_MSG)
    }
}

/// Server-to-client frame header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseHeader {
    /// [`STATUS_SUCCESS`] or [`STATUS_SERVICE_FAILED`]; other values reserved.
    pub status_code: u32,
    /// Method index of the request being answered.
    pub method_index: u32,
    /// Payload length in bytes following this header.
    pub message_length: u32,
    /// Correlation id of the request being answered.
    pub request_id: u32,
}

impl ResponseHeader {
    /// Builds a failure header answering the given request with no payload.
    pub fn service_failed(method_index: u32, request_id: u32) -> Self {
        Self {
            status_code: STATUS_SERVICE_FAILED,
            method_index,
            message_length: 0,
            request_id,
        }
    }

    /// Serializes the header into its wire representation.
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_LEN] {
        let mut out = [0u8; RESPONSE_HEADER_LEN];
        out[0..4].copy_from_slice(&self.status_code.to_le_bytes());
        out[4..8].copy_from_slice(&self.method_index.to_le_bytes());
        out[8..12].copy_from_slice(&self.message_length.to_le_bytes());
        out[12..16].copy_from_slice(&self.request_id.to_le_bytes());
        out
    }

    /// Parses a header from the first [`RESPONSE_HEADER_LEN`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < RESPONSE_HEADER_LEN {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            status_code: u32_at(buf, 0),
            method_index: u32_at(buf, 4),
            message_length: u32_at(buf, 8),
            request_id: u32_at(buf, 12),
        })
    }

    /// Payload length clamped to [`MAX_MSG`], mirroring the request-side rule.
    pub fn clamped_len(&self) -> usize {
        (self.message_length as usize).min(MAX_MSG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_roundtrip() {
        let hdr = RequestHeader {
            method_index: 7,
            message_length: 4096,
            request_id: 0xdead_beef,
        };
        let decoded = RequestHeader::decode(&hdr.encode()).unwrap();
        assert_eq!(decoded, hdr);
    }

    #[test]
    fn request_header_wire_layout_is_little_endian() {
        let hdr = RequestHeader {
            method_index: 0x0102_0304,
            message_length: 0x0506_0708,
            request_id: 0x090a_0b0c,
        };
        assert_eq!(
            hdr.encode(),
            [0x04, 0x03, 0x02, 0x01, 0x08, 0x07, 0x06, 0x05, 0x0c, 0x0b, 0x0a, 0x09]
        );
    }

    #[test]
    fn response_header_roundtrip() {
        let hdr = ResponseHeader {
            status_code: STATUS_SUCCESS,
            method_index: 3,
            message_length: 16,
            request_id: 42,
        };
        assert_eq!(ResponseHeader::decode(&hdr.encode()).unwrap(), hdr);
    }

    #[test]
    fn truncated_headers_are_rejected() {
        assert_eq!(
            RequestHeader::decode(&[0u8; REQUEST_HEADER_LEN - 1]),
            Err(WireError::Truncated)
        );
        assert_eq!(
            ResponseHeader::decode(&[0u8; RESPONSE_HEADER_LEN - 1]),
            Err(WireError::Truncated)
        );
    }

    #[test]
    fn declared_length_is_clamped() {
        let exact = RequestHeader {
            method_index: 0,
            message_length: MAX_MSG as u32,
            request_id: 1,
        };
        assert_eq!(exact.clamped_len(), MAX_MSG);

        let over = RequestHeader {
            method_index: 0,
            message_length: (MAX_MSG + 1) as u32,
            request_id: 1,
        };
        assert_eq!(over.clamped_len(), MAX_MSG);

        let hostile = RequestHeader {
            method_index: 0,
            message_length: u32::MAX,
            request_id: 1,
        };
        assert_eq!(hostile.clamped_len(), MAX_MSG);
    }

    #[test]
    fn service_failed_header_answers_the_request() {
        let hdr = ResponseHeader::service_failed(9, 77);
        assert_eq!(hdr.status_code, STATUS_SERVICE_FAILED);
        assert_eq!(hdr.method_index, 9);
        assert_eq!(hdr.request_id, 77);
        assert_eq!(hdr.message_length, 0);
    }
}
