// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Blocking client helper.
//!
//! One connection, one request in flight: `call` frames the request,
//! writes it, and blocks for the matching reply. Local tools and the
//! integration tests use this instead of hand-rolling frames.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use rngd_wire::frame::{
    RequestHeader, ResponseHeader, WireError, RESPONSE_HEADER_LEN, STATUS_SUCCESS,
};
use rngd_wire::msg::{self, BytesResponse, LenRequest, ValueResponse};
use rngd_wire::MAX_MSG;

/// Failures surfaced by the client helper.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection failed at the OS level.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    /// The peer violated the wire protocol.
    #[error("protocol violation: {0}")]
    Wire(#[from] WireError),
    /// The reply answers a different request than the one in flight.
    #[error("reply answers request {got}, expected {expected}")]
    RequestMismatch {
        /// Correlation id of the request in flight.
        expected: u32,
        /// Correlation id found in the reply.
        got: u32,
    },
    /// The server answered `SERVICE_FAILED`.
    #[error("service failed the request")]
    ServiceFailed,
    /// The server reported an errno-style failure code.
    #[error("service returned error code {0}")]
    ServiceCode(i32),
}

/// A decoded reply frame.
#[derive(Debug)]
pub struct Reply {
    /// Status code from the reply header.
    pub status_code: u32,
    /// Method index echoed from the request.
    pub method_index: u32,
    /// Correlation id echoed from the request.
    pub request_id: u32,
    /// Reply payload.
    pub body: Vec<u8>,
}

impl Reply {
    /// Whether the server answered `SUCCESS`.
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_SUCCESS
    }
}

/// Blocking RPC connection to one endpoint.
pub struct RpcClient {
    stream: UnixStream,
    next_request_id: u32,
}

impl RpcClient {
    /// Connects to the endpoint at `path`.
    pub fn connect(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)?;
        Ok(Self { stream, next_request_id: 1 })
    }

    /// Applies a read timeout to replies; `None` blocks indefinitely.
    pub fn set_reply_timeout(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Sends one request and blocks for its reply.
    pub fn call(&mut self, method_index: u32, body: &[u8]) -> Result<Reply, ClientError> {
        if body.len() > MAX_MSG {
            return Err(WireError::TooLarge { got: body.len(), limit: MAX_MSG }.into());
        }
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let header = RequestHeader {
            method_index,
            message_length: body.len() as u32,
            request_id,
        };
        self.stream.write_all(&header.encode())?;
        if !body.is_empty() {
            self.stream.write_all(body)?;
        }

        let mut header_buf = [0u8; RESPONSE_HEADER_LEN];
        self.stream.read_exact(&mut header_buf)?;
        let reply_header = ResponseHeader::decode(&header_buf)?;
        let mut reply_body = vec![0u8; reply_header.clamped_len()];
        self.stream.read_exact(&mut reply_body)?;

        if reply_header.request_id != request_id {
            return Err(ClientError::RequestMismatch {
                expected: request_id,
                got: reply_header.request_id,
            });
        }
        Ok(Reply {
            status_code: reply_header.status_code,
            method_index: reply_header.method_index,
            request_id: reply_header.request_id,
            body: reply_body,
        })
    }

    /// Fetches the daemon's human-readable status report.
    pub fn status_text(&mut self) -> Result<String, ClientError> {
        let reply = self.call(msg::unpriv::STATUS, &[])?;
        let body = Self::success_body(&reply)?;
        let status = BytesResponse::decode(body)?;
        if status.ret < 0 {
            return Err(ClientError::ServiceCode(status.ret));
        }
        Ok(String::from_utf8_lossy(status.data).into_owned())
    }

    /// Whether at least one DRNG is seeded at full security strength.
    pub fn is_fully_seeded(&mut self) -> Result<bool, ClientError> {
        let reply = self.call(msg::unpriv::IS_FULLY_SEEDED, &[])?;
        let body = Self::success_body(&reply)?;
        let value = ValueResponse::decode(body)?;
        if value.ret < 0 {
            return Err(ClientError::ServiceCode(value.ret));
        }
        Ok(value.value != 0)
    }

    /// Fetches `len` random bytes from the fully seeded DRNG.
    pub fn get_random_bytes_full(&mut self, len: u32) -> Result<Vec<u8>, ClientError> {
        let body = LenRequest { len }.encode();
        let reply = self.call(msg::unpriv::GET_RANDOM_BYTES_FULL, &body)?;
        let body = Self::success_body(&reply)?;
        let bytes = BytesResponse::decode(body)?;
        if bytes.ret < 0 {
            return Err(ClientError::ServiceCode(bytes.ret));
        }
        Ok(bytes.data.to_vec())
    }

    fn success_body(reply: &Reply) -> Result<&[u8], ClientError> {
        if !reply.is_success() {
            return Err(ClientError::ServiceFailed);
        }
        Ok(&reply.body)
    }
}
