//! Per-connection state.

use crate::net::{Endpoint, TcpSocket, WriteStatus};
use bytes::{Buf, BytesMut};
use mio::Interest;
use std::io;

/// One accepted client: its owned socket, the peer's address, and any echo
/// bytes the kernel has not yet accepted for sending.
///
/// The connection set keeps registration and ownership in lockstep: an
/// entry exists exactly as long as its token is registered with the poll
/// registry, so no event can ever name a released descriptor.
pub struct Connection {
    pub socket: TcpSocket,
    pub peer: Endpoint,
    pending: BytesMut,
}

impl Connection {
    pub fn new(socket: TcpSocket, peer: Endpoint) -> Self {
        Self {
            socket,
            peer,
            pending: BytesMut::new(),
        }
    }

    /// Queue echo bytes behind any already-unflushed ones, preserving
    /// stream order.
    pub fn queue(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Write queued bytes out until the queue empties or the kernel pushes
    /// back. Returns `true` once nothing is left to flush.
    pub fn flush_pending(&mut self) -> io::Result<bool> {
        while !self.pending.is_empty() {
            match self.socket.write(&self.pending)? {
                WriteStatus::Wrote(n) => self.pending.advance(n),
                WriteStatus::WouldBlock => return Ok(false),
            }
        }
        Ok(true)
    }

    /// The poll interest matching the current state: writable only while
    /// unflushed bytes remain.
    pub fn interest(&self) -> Interest {
        if self.has_pending() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }
}
