// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Per-connection request loop.
//!
//! Each accepted descriptor is owned by exactly one handler thread running
//! [`serve`]. The loop reads one frame at a time into a fixed buffer with a
//! bounded timeout, dispatches it, wipes the buffer, and continues until the
//! peer disappears. The timeout is what keeps a client that connects and
//! then goes silent from pinning a thread and a descriptor forever.

use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use zeroize::Zeroize;

use rngd_wire::frame::{RequestHeader, REQUEST_HEADER_LEN};
use rngd_wire::MAX_MSG;

use crate::arena::ScratchArena;
use crate::service::{self, ServiceTable};

/// Reasons a connection is torn down.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer closed the connection, possibly mid-frame.
    #[error("peer closed the connection")]
    Closed,
    /// No bytes arrived within the bounded read window.
    #[error("read timed out")]
    Timeout,
    /// The descriptor failed at the OS level.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves one accepted connection until the peer closes or errors.
///
/// Owns `stream`; the descriptor is closed exactly once, when this returns.
pub(crate) fn serve(stream: UnixStream, table: Arc<dyn ServiceTable>, read_timeout: Duration) {
    let fd = stream.as_raw_fd();
    debug!("rngd: {}: serving connection on fd {fd}", table.name());
    match serve_loop(&stream, table.as_ref(), read_timeout) {
        Err(ConnectionError::Closed) | Err(ConnectionError::Timeout) => {
            debug!("rngd: {}: closing connection on fd {fd}", table.name());
        }
        Err(ConnectionError::Io(err)) => {
            warn!("rngd: {}: connection on fd {fd} failed: {err}", table.name());
        }
        Ok(()) => {}
    }
}

fn serve_loop(
    stream: &UnixStream,
    table: &dyn ServiceTable,
    read_timeout: Duration,
) -> Result<(), ConnectionError> {
    stream.set_read_timeout(Some(read_timeout))?;

    let mut arena = ScratchArena::for_connection();
    let mut buf = vec![0u8; REQUEST_HEADER_LEN + MAX_MSG].into_boxed_slice();

    loop {
        let (header, frame_len, total) = match read_one_frame(stream, &mut buf) {
            Ok(frame) => frame,
            Err(err) => {
                buf.zeroize();
                return Err(err);
            }
        };

        let body = &buf[REQUEST_HEADER_LEN..frame_len];
        let result = service::dispatch(table, &header, body, &mut arena, stream);

        // One request, one wipe: neither client payloads nor staged random
        // bytes survive into the next iteration.
        buf[..total].zeroize();
        arena.reset();
        result?;
    }
}

/// Reads one complete frame: the fixed header plus the declared-and-clamped
/// payload. Partial reads are normal and resumed until the frame is whole.
fn read_one_frame(
    mut stream: &UnixStream,
    buf: &mut [u8],
) -> Result<(RequestHeader, usize, usize), ConnectionError> {
    let mut total = 0usize;
    let mut header: Option<RequestHeader> = None;
    let mut frame_len: Option<usize> = None;

    loop {
        let n = match stream.read(&mut buf[total..]) {
            Ok(0) => return Err(ConnectionError::Closed),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                return Err(ConnectionError::Timeout)
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ConnectionError::Io(err)),
        };
        total += n;

        if header.is_none() && total >= REQUEST_HEADER_LEN {
            let parsed = RequestHeader::decode(&buf[..REQUEST_HEADER_LEN])
                .map_err(|_| ConnectionError::Closed)?;
            debug!(
                "rngd: received header: method {}, length {}, request id {}",
                parsed.method_index, parsed.message_length, parsed.request_id
            );
            // A client may declare any length; reads are sized off the clamp.
            frame_len = Some(REQUEST_HEADER_LEN + parsed.clamped_len());
            header = Some(parsed);
        }

        if let Some(want) = frame_len {
            if total >= want {
                let header = header.ok_or(ConnectionError::Closed)?;
                return Ok((header, want, total));
            }
        }

        if total == buf.len() {
            // Buffer full without a complete frame cannot happen with a
            // clamped length; treat it as a protocol breakdown.
            return Err(ConnectionError::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_assembles_a_frame_from_partial_writes() {
        let (server, mut client) = UnixStream::pair().unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let header = RequestHeader { method_index: 3, message_length: 8, request_id: 11 };
        let encoded = header.encode();
        client.write_all(&encoded[..5]).unwrap();
        client.flush().unwrap();

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            client.write_all(&encoded[5..]).unwrap();
            client.write_all(&[0xab; 8]).unwrap();
            client
        });

        let mut buf = vec![0u8; REQUEST_HEADER_LEN + MAX_MSG].into_boxed_slice();
        let (parsed, frame_len, total) = read_one_frame(&server, &mut buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(frame_len, REQUEST_HEADER_LEN + 8);
        assert_eq!(total, frame_len);
        assert_eq!(&buf[REQUEST_HEADER_LEN..frame_len], &[0xab; 8]);
        drop(writer.join().unwrap());
    }

    #[test]
    fn silent_peer_times_out() {
        let (server, client) = UnixStream::pair().unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut buf = vec![0u8; REQUEST_HEADER_LEN + MAX_MSG].into_boxed_slice();
        let err = read_one_frame(&server, &mut buf).unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout));
        drop(client);
    }

    #[test]
    fn eof_mid_frame_closes() {
        let (server, mut client) = UnixStream::pair().unwrap();
        server
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        // Half a header, then hang up.
        client.write_all(&[1, 0, 0, 0, 4, 0]).unwrap();
        drop(client);
        let mut buf = vec![0u8; REQUEST_HEADER_LEN + MAX_MSG].into_boxed_slice();
        let err = read_one_frame(&server, &mut buf).unwrap_err();
        assert!(matches!(err, ConnectionError::Closed));
    }
}
