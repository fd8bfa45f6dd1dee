// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Request dispatch and the two service tables.
//!
//! A service table maps dense method indices to handlers. Two instances
//! exist, bound one-to-one to the endpoints: [`UnprivService`] behind the
//! world-accessible socket and [`PrivService`] behind the root-only socket.
//! The dispatcher hands each decoded request to its handler together with a
//! [`Responder`] that must be used exactly once; handlers that fail reply
//! `SERVICE_FAILED` and the connection lives on.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use log::debug;

use rngd_wire::frame::{RequestHeader, ResponseHeader, STATUS_SUCCESS};
use rngd_wire::msg::{
    self, AddEntropyRequest, EmptyRequest, LenRequest, RetResponse, ValueRequest, ValueResponse,
};
use rngd_wire::MAX_MSG;

use crate::arena::ScratchArena;
use crate::backend::{Backend, SeedRequirement};
use crate::connection::ConnectionError;
use crate::peer;

/// Static description of one RPC method.
pub struct MethodDescriptor {
    /// Method name used in log lines.
    pub name: &'static str,
    /// Whether the handler consults the peer-credential guard.
    pub requires_privilege: bool,
}

/// One endpoint's method table.
pub trait ServiceTable: Send + Sync {
    /// Short table name used in log lines.
    fn name(&self) -> &'static str;

    /// Looks up the descriptor for a method index, `None` when unknown.
    fn descriptor(&self, method_index: u32) -> Option<&'static MethodDescriptor>;

    /// Runs the handler for `method_index`.
    ///
    /// The handler replies through `call.responder` exactly once; an `Err`
    /// from this function means the connection itself is broken.
    fn invoke(&self, method_index: u32, call: &mut Call<'_>) -> Result<(), ConnectionError>;
}

/// Everything a handler may touch while serving one request.
pub struct Call<'a> {
    /// Raw request body as read from the wire.
    pub body: &'a [u8],
    /// Per-connection scratch arena for decode and reply staging.
    pub arena: &'a mut ScratchArena,
    /// Reply channel for this request.
    pub responder: Responder<'a>,
    stream: &'a UnixStream,
}

impl Call<'_> {
    /// Whether the peer of this connection runs with effective uid 0.
    pub fn peer_is_privileged(&self) -> bool {
        peer::is_privileged(self.stream)
    }
}

/// Writes the reply frame for one request.
pub struct Responder<'a> {
    stream: &'a UnixStream,
    method_index: u32,
    request_id: u32,
    replied: bool,
}

impl Responder<'_> {
    /// Answers the request successfully with `body` as the payload.
    ///
    /// A body exceeding [`MAX_MSG`] cannot be framed; the request is then
    /// answered as failed and the connection survives.
    pub fn success(&mut self, body: &[u8]) -> Result<(), ConnectionError> {
        if self.replied {
            return Ok(());
        }
        self.replied = true;
        if body.len() > MAX_MSG {
            return write_frame(
                self.stream,
                &ResponseHeader::service_failed(self.method_index, self.request_id),
                &[],
            );
        }
        let header = ResponseHeader {
            status_code: STATUS_SUCCESS,
            method_index: self.method_index,
            message_length: body.len() as u32,
            request_id: self.request_id,
        };
        write_frame(self.stream, &header, body)
    }

    /// Answers the request as failed, with no payload.
    pub fn service_failed(&mut self) -> Result<(), ConnectionError> {
        if self.replied {
            return Ok(());
        }
        self.replied = true;
        write_frame(
            self.stream,
            &ResponseHeader::service_failed(self.method_index, self.request_id),
            &[],
        )
    }
}

fn write_frame(
    mut stream: &UnixStream,
    header: &ResponseHeader,
    body: &[u8],
) -> Result<(), ConnectionError> {
    stream.write_all(&header.encode())?;
    if !body.is_empty() {
        stream.write_all(body)?;
    }
    Ok(())
}

/// Routes one fully-buffered request into `table`.
///
/// Unknown method indices and handlers that never replied are both answered
/// `SERVICE_FAILED`; the reply header always echoes the request's
/// `(method_index, request_id)`.
pub(crate) fn dispatch(
    table: &dyn ServiceTable,
    header: &RequestHeader,
    body: &[u8],
    arena: &mut ScratchArena,
    stream: &UnixStream,
) -> Result<(), ConnectionError> {
    let mut call = Call {
        body,
        arena,
        responder: Responder {
            stream,
            method_index: header.method_index,
            request_id: header.request_id,
            replied: false,
        },
        stream,
    };

    if table.descriptor(header.method_index).is_none() {
        debug!(
            "rngd: {}: unknown method index {}",
            table.name(),
            header.method_index
        );
        return call.responder.service_failed();
    }

    table.invoke(header.method_index, &mut call)?;
    if !call.responder.replied {
        return call.responder.service_failed();
    }
    Ok(())
}

/// Stages a `ret`-plus-data response body in the arena.
fn stage_bytes<'a>(
    arena: &'a mut ScratchArena,
    ret: i32,
    data: &[u8],
) -> Option<&'a [u8]> {
    let staged = match arena.alloc(4 + data.len()) {
        Ok(staged) => staged,
        Err(err) => {
            debug!("rngd: staging reply failed: {err}");
            return None;
        }
    };
    staged[0..4].copy_from_slice(&ret.to_le_bytes());
    staged[4..].copy_from_slice(data);
    Some(staged)
}

/// Method table of the world-accessible endpoint.
pub struct UnprivService {
    backend: Arc<Backend>,
}

static UNPRIV_METHODS: [MethodDescriptor; msg::unpriv::METHOD_COUNT as usize] = [
    MethodDescriptor { name: "Status", requires_privilege: false },
    MethodDescriptor { name: "IsFullySeeded", requires_privilege: false },
    MethodDescriptor { name: "IsMinSeeded", requires_privilege: false },
    MethodDescriptor { name: "AvailEntropy", requires_privilege: false },
    MethodDescriptor { name: "AvailPoolsize", requires_privilege: false },
    MethodDescriptor { name: "GetRandomBytesFull", requires_privilege: false },
    MethodDescriptor { name: "GetRandomBytesMin", requires_privilege: false },
    MethodDescriptor { name: "GetRandomBytesPr", requires_privilege: false },
    MethodDescriptor { name: "GetRandomBytes", requires_privilege: false },
    MethodDescriptor { name: "GetWriteWakeupThresh", requires_privilege: false },
    MethodDescriptor { name: "GetMinReseedSecs", requires_privilege: false },
];

impl UnprivService {
    /// Creates the table over the shared back-end.
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    fn status(&self, call: &mut Call<'_>) -> Result<(), ConnectionError> {
        if EmptyRequest::decode(call.body).is_err() {
            return call.responder.service_failed();
        }
        let text = self.backend.status_text();
        match stage_bytes(call.arena, 0, text.as_bytes()) {
            Some(body) => call.responder.success(body),
            None => call.responder.service_failed(),
        }
    }

    fn value_reply(
        &self,
        call: &mut Call<'_>,
        value: u32,
    ) -> Result<(), ConnectionError> {
        if EmptyRequest::decode(call.body).is_err() {
            return call.responder.service_failed();
        }
        call.responder
            .success(&ValueResponse { ret: 0, value }.encode())
    }

    fn random_bytes(
        &self,
        call: &mut Call<'_>,
        requirement: SeedRequirement,
    ) -> Result<(), ConnectionError> {
        let request = match LenRequest::decode(call.body) {
            Ok(request) => request,
            Err(err) => {
                debug!("rngd: unpriv: random-bytes decode failed: {err}");
                return call.responder.service_failed();
            }
        };
        // The reply body (ret + data) must fit one frame.
        let want = (request.len as usize).min(MAX_MSG - 4);
        let staged = match call.arena.alloc(4 + want) {
            Ok(staged) => staged,
            Err(err) => {
                debug!("rngd: unpriv: {err}");
                return call.responder.service_failed();
            }
        };
        let (ret_field, data) = staged.split_at_mut(4);
        let (ret, produced) = match self.backend.fill_random(data, requirement) {
            Ok(produced) => (produced as i32, produced),
            Err(err) => (err.ret_code(), 0),
        };
        ret_field.copy_from_slice(&ret.to_le_bytes());
        call.responder.success(&staged[..4 + produced])
    }
}

impl ServiceTable for UnprivService {
    fn name(&self) -> &'static str {
        "unpriv"
    }

    fn descriptor(&self, method_index: u32) -> Option<&'static MethodDescriptor> {
        UNPRIV_METHODS.get(method_index as usize)
    }

    fn invoke(&self, method_index: u32, call: &mut Call<'_>) -> Result<(), ConnectionError> {
        match method_index {
            msg::unpriv::STATUS => self.status(call),
            msg::unpriv::IS_FULLY_SEEDED => {
                let seeded = self.backend.is_fully_seeded();
                self.value_reply(call, seeded.into())
            }
            msg::unpriv::IS_MIN_SEEDED => {
                let seeded = self.backend.is_min_seeded();
                self.value_reply(call, seeded.into())
            }
            msg::unpriv::AVAIL_ENTROPY => {
                let bits = self.backend.avail_entropy_bits();
                self.value_reply(call, bits)
            }
            msg::unpriv::AVAIL_POOLSIZE => {
                let bits = self.backend.avail_poolsize_bits();
                self.value_reply(call, bits)
            }
            msg::unpriv::GET_RANDOM_BYTES_FULL => self.random_bytes(call, SeedRequirement::Full),
            msg::unpriv::GET_RANDOM_BYTES_MIN => self.random_bytes(call, SeedRequirement::Min),
            msg::unpriv::GET_RANDOM_BYTES_PR => {
                self.random_bytes(call, SeedRequirement::PredictionResistant)
            }
            msg::unpriv::GET_RANDOM_BYTES => self.random_bytes(call, SeedRequirement::Any),
            msg::unpriv::GET_WRITE_WAKEUP_THRESH => {
                let bits = self.backend.write_wakeup_bits();
                self.value_reply(call, bits)
            }
            msg::unpriv::GET_MIN_RESEED_SECS => {
                let secs = self.backend.min_reseed_secs();
                self.value_reply(call, secs)
            }
            _ => call.responder.service_failed(),
        }
    }
}

/// Method table of the root-only endpoint.
pub struct PrivService {
    backend: Arc<Backend>,
}

static PRIV_METHODS: [MethodDescriptor; msg::privileged::METHOD_COUNT as usize] = [
    MethodDescriptor { name: "AddEntropy", requires_privilege: true },
    MethodDescriptor { name: "AddToEntCount", requires_privilege: true },
    MethodDescriptor { name: "ClearPool", requires_privilege: true },
    MethodDescriptor { name: "ReseedCrng", requires_privilege: true },
    MethodDescriptor { name: "SetWriteWakeupThresh", requires_privilege: true },
    MethodDescriptor { name: "SetMinReseedSecs", requires_privilege: true },
];

impl PrivService {
    /// Creates the table over the shared back-end.
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    fn add_entropy(&self, call: &mut Call<'_>) -> Result<(), ConnectionError> {
        let request = match AddEntropyRequest::decode(call.body) {
            Ok(request) => request,
            Err(err) => {
                debug!("rngd: priv: add-entropy decode failed: {err}");
                return call.responder.service_failed();
            }
        };
        let ret = match self.backend.add_entropy(request.data, request.entropy_bits) {
            Ok(()) => 0,
            Err(err) => err.ret_code(),
        };
        call.responder.success(&RetResponse { ret }.encode())
    }

    fn with_value(
        &self,
        call: &mut Call<'_>,
        apply: impl FnOnce(&Backend, u32),
    ) -> Result<(), ConnectionError> {
        let request = match ValueRequest::decode(call.body) {
            Ok(request) => request,
            Err(err) => {
                debug!("rngd: priv: decode failed: {err}");
                return call.responder.service_failed();
            }
        };
        apply(&self.backend, request.value);
        call.responder.success(&RetResponse { ret: 0 }.encode())
    }

    fn no_args(
        &self,
        call: &mut Call<'_>,
        apply: impl FnOnce(&Backend),
    ) -> Result<(), ConnectionError> {
        if EmptyRequest::decode(call.body).is_err() {
            return call.responder.service_failed();
        }
        apply(&self.backend);
        call.responder.success(&RetResponse { ret: 0 }.encode())
    }
}

impl ServiceTable for PrivService {
    fn name(&self) -> &'static str {
        "priv"
    }

    fn descriptor(&self, method_index: u32) -> Option<&'static MethodDescriptor> {
        PRIV_METHODS.get(method_index as usize)
    }

    fn invoke(&self, method_index: u32, call: &mut Call<'_>) -> Result<(), ConnectionError> {
        // The socket mode is the primary filter; this catches a
        // misconfigured filesystem permission.
        let needs_privilege = self
            .descriptor(method_index)
            .is_some_and(|descriptor| descriptor.requires_privilege);
        if needs_privilege && !call.peer_is_privileged() {
            debug!("rngd: priv: rejecting unprivileged peer");
            return call.responder.service_failed();
        }

        match method_index {
            msg::privileged::ADD_ENTROPY => self.add_entropy(call),
            msg::privileged::ADD_TO_ENT_COUNT => {
                self.with_value(call, |backend, bits| backend.add_to_entropy_count(bits))
            }
            msg::privileged::CLEAR_POOL => self.no_args(call, Backend::clear_pool),
            msg::privileged::RESEED_CRNG => self.no_args(call, Backend::force_reseed),
            msg::privileged::SET_WRITE_WAKEUP_THRESH => {
                self.with_value(call, |backend, bits| backend.set_write_wakeup_bits(bits))
            }
            msg::privileged::SET_MIN_RESEED_SECS => {
                self.with_value(call, |backend, secs| backend.set_min_reseed_secs(secs))
            }
            _ => call.responder.service_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use nix::unistd::Uid;

    use rngd_wire::frame::{RESPONSE_HEADER_LEN, STATUS_SERVICE_FAILED};
    use rngd_wire::msg::BytesResponse;

    fn roundtrip(
        table: &dyn ServiceTable,
        method_index: u32,
        request_id: u32,
        body: &[u8],
    ) -> (ResponseHeader, Vec<u8>) {
        let (server, mut client) = UnixStream::pair().unwrap();
        let header = RequestHeader {
            method_index,
            message_length: body.len() as u32,
            request_id,
        };
        let mut arena = ScratchArena::for_connection();
        dispatch(table, &header, body, &mut arena, &server).unwrap();
        drop(server);

        let mut hdr = [0u8; RESPONSE_HEADER_LEN];
        client.read_exact(&mut hdr).unwrap();
        let hdr = ResponseHeader::decode(&hdr).unwrap();
        let mut payload = vec![0u8; hdr.clamped_len()];
        client.read_exact(&mut payload).unwrap();
        (hdr, payload)
    }

    fn unpriv_table() -> UnprivService {
        UnprivService::new(Arc::new(Backend::new().unwrap()))
    }

    #[test]
    fn unknown_method_is_answered_service_failed() {
        let (hdr, payload) = roundtrip(&unpriv_table(), 99, 7, &[]);
        assert_eq!(hdr.status_code, STATUS_SERVICE_FAILED);
        assert_eq!(hdr.method_index, 99);
        assert_eq!(hdr.request_id, 7);
        assert!(payload.is_empty());
    }

    #[test]
    fn status_reply_echoes_request_identity() {
        let (hdr, payload) = roundtrip(&unpriv_table(), msg::unpriv::STATUS, 42, &[]);
        assert_eq!(hdr.status_code, STATUS_SUCCESS);
        assert_eq!(hdr.method_index, msg::unpriv::STATUS);
        assert_eq!(hdr.request_id, 42);
        assert_eq!(hdr.message_length as usize, payload.len());
        let status = BytesResponse::decode(&payload).unwrap();
        assert_eq!(status.ret, 0);
        assert!(std::str::from_utf8(status.data).unwrap().contains("rngd"));
    }

    #[test]
    fn random_bytes_reply_matches_requested_length() {
        let body = LenRequest { len: 128 }.encode();
        let (hdr, payload) = roundtrip(&unpriv_table(), msg::unpriv::GET_RANDOM_BYTES, 1, &body);
        assert_eq!(hdr.status_code, STATUS_SUCCESS);
        let rsp = BytesResponse::decode(&payload).unwrap();
        assert_eq!(rsp.ret, 128);
        assert_eq!(rsp.data.len(), 128);
        assert_ne!(rsp.data, &[0u8; 128][..]);
    }

    #[test]
    fn random_bytes_rejects_malformed_body() {
        let (hdr, _) = roundtrip(&unpriv_table(), msg::unpriv::GET_RANDOM_BYTES, 1, &[1, 2]);
        assert_eq!(hdr.status_code, STATUS_SERVICE_FAILED);
    }

    #[test]
    fn oversized_want_is_clamped_to_one_frame() {
        let body = LenRequest { len: u32::MAX }.encode();
        let (hdr, payload) =
            roundtrip(&unpriv_table(), msg::unpriv::GET_RANDOM_BYTES, 2, &body);
        assert_eq!(hdr.status_code, STATUS_SUCCESS);
        assert_eq!(payload.len(), MAX_MSG);
    }

    #[test]
    fn privileged_table_consults_the_guard() {
        let table = PrivService::new(Arc::new(Backend::new().unwrap()));
        let body = ValueRequest { value: 256 }.encode();
        let (hdr, _) = roundtrip(&table, msg::privileged::SET_WRITE_WAKEUP_THRESH, 3, &body);
        if Uid::effective().is_root() {
            assert_eq!(hdr.status_code, STATUS_SUCCESS);
        } else {
            assert_eq!(hdr.status_code, STATUS_SERVICE_FAILED);
        }
    }

    #[test]
    fn clear_pool_requires_empty_body() {
        let table = PrivService::new(Arc::new(Backend::new().unwrap()));
        if !Uid::effective().is_root() {
            // The guard answers first for unprivileged peers.
            return;
        }
        let (hdr, _) = roundtrip(&table, msg::privileged::CLEAR_POOL, 4, &[0xff]);
        assert_eq!(hdr.status_code, STATUS_SERVICE_FAILED);
    }
}
