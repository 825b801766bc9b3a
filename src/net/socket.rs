//! Owned TCP socket handle.
//!
//! [`TcpSocket`] is the exclusive owner of one OS socket descriptor.
//! Dropping the handle closes the descriptor, and Rust move semantics make
//! ownership transferable but never duplicable, so the descriptor is
//! released exactly once on every exit path. There is no explicit close.
//!
//! Routine outcomes of non-blocking calls (would-block, orderly peer
//! shutdown) are values ([`ReadStatus`], [`WriteStatus`]), not errors;
//! `Err` is reserved for genuine I/O failures.

use crate::net::addr::Endpoint;
use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::io::{self, Read};
use std::os::unix::io::AsRawFd;

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Outcome of a non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were transferred.
    Data(usize),
    /// Orderly shutdown by the peer; end of stream.
    Closed,
    /// No data available right now.
    WouldBlock,
}

/// Outcome of a non-blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The kernel accepted `n` bytes; may be fewer than requested.
    Wrote(usize),
    /// No buffer space available right now.
    WouldBlock,
}

/// Exclusive owner of one TCP socket descriptor.
pub struct TcpSocket {
    inner: Socket,
}

impl TcpSocket {
    /// Allocate a new TCP/IPv4 socket.
    pub fn open() -> Result<Self, SocketError> {
        let inner = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(SocketError::Open)?;
        Ok(Self { inner })
    }

    /// Bind to `addr`, enabling SO_REUSEADDR first so a restarted server
    /// can rebind a port whose previous owner is still in TIME_WAIT.
    pub fn bind(&self, addr: Endpoint) -> Result<(), SocketError> {
        self.inner
            .set_reuse_address(true)
            .and_then(|()| self.inner.bind(&addr.into()))
            .map_err(|e| SocketError::Bind(addr, e))
    }

    /// Mark the socket passive with the platform-maximum backlog.
    pub fn listen(&self) -> Result<(), SocketError> {
        self.inner
            .listen(libc::SOMAXCONN)
            .map_err(SocketError::Listen)
    }

    /// Switch the descriptor to non-blocking mode; read, write, and accept
    /// return immediately from here on.
    pub fn set_nonblocking(&self) -> io::Result<()> {
        self.inner.set_nonblocking(true)
    }

    /// Take one pending inbound connection.
    ///
    /// Returns `Ok(None)` when the socket is non-blocking and nothing is
    /// queued; that is an expected condition, not a failure, and must not
    /// be logged as one.
    pub fn accept(&self) -> io::Result<Option<(TcpSocket, Endpoint)>> {
        match self.inner.accept() {
            Ok((sock, peer)) => {
                let peer = Endpoint::try_from(&peer)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some((TcpSocket { inner: sock }, peer)))
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Initiate an outbound connection.
    pub fn connect(&self, addr: Endpoint) -> Result<(), SocketError> {
        self.inner
            .connect(&addr.into())
            .map_err(|e| SocketError::Connect(addr, e))
    }

    /// Read into `buf`. `Closed` is the peer's orderly shutdown.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        match (&self.inner).read(buf) {
            Ok(0) => Ok(ReadStatus::Closed),
            Ok(n) => Ok(ReadStatus::Data(n)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// Write `buf`. Short writes are surfaced; the caller owns any
    /// unaccepted remainder. Sends carry MSG_NOSIGNAL so a reset peer
    /// cannot raise SIGPIPE.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<WriteStatus> {
        match self.inner.send_with_flags(buf, SEND_FLAGS) {
            Ok(n) => Ok(WriteStatus::Wrote(n)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(WriteStatus::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// The locally bound address (resolves the real port after binding 0).
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        let addr = self.inner.local_addr()?;
        Endpoint::try_from(&addr).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Source for TcpSocket {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &Registry,
        token: Token,
        interests: Interest,
    ) -> io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.inner.as_raw_fd()).deregister(registry)
    }
}

/// Startup-path socket failures. All of these are fatal to the caller that
/// is setting a socket up; none occur on the per-connection path.
#[derive(Debug)]
pub enum SocketError {
    /// The OS could not allocate a descriptor.
    Open(io::Error),
    /// Binding failed: port exclusively held, permission denied, or the
    /// address is not local.
    Bind(Endpoint, io::Error),
    Listen(io::Error),
    /// Refused, unreachable, or timed out.
    Connect(Endpoint, io::Error),
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::Open(e) => write!(f, "Failed to create socket: {e}"),
            SocketError::Bind(addr, e) => write!(f, "Failed to bind {addr}: {e}"),
            SocketError::Listen(e) => write!(f, "Failed to listen: {e}"),
            SocketError::Connect(addr, e) => write!(f, "Failed to connect to {addr}: {e}"),
        }
    }
}

impl std::error::Error for SocketError {}
