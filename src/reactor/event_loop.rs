//! The readiness-driven echo loop.
//!
//! Readiness-based model: poll tells us when sockets are ready, then we
//! perform non-blocking read/write syscalls. mio's epoll and kqueue
//! backends deliver edge-triggered notifications: an event fires once per
//! readiness transition, not while the socket stays ready. Every handler
//! here therefore drains its socket to would-block before returning to the
//! wait; data left behind would stall until the peer produces a new edge.

use crate::config::Config;
use crate::net::{Endpoint, ReadStatus, TcpSocket, WriteStatus};
use crate::reactor::connection::Connection;
use mio::{Events, Interest, Poll, Registry, Token};
use slab::Slab;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(usize::MAX);
const MAX_EVENTS: usize = 1024;

/// What became of a connection after a readiness dispatch.
enum Disposition {
    Open,
    /// The peer shut its write side down; routine, not an error.
    PeerClosed,
}

/// Bind, listen, and run the echo loop until `stop` is set.
///
/// Failures before the loop starts (socket, bind, listen, poll-context
/// creation) are returned to the caller and end the process; once the loop
/// is running, failures are contained to the connection they occur on.
pub fn run(config: &Config, stop: &AtomicBool) -> Result<(), Box<dyn std::error::Error>> {
    let addr = Endpoint::parse(&config.host, config.port)?;

    let mut listener = TcpSocket::open()?;
    listener.bind(addr)?;
    listener.listen()?;
    listener.set_nonblocking()?;

    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(MAX_EVENTS);
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut connections: Slab<Connection> = Slab::new();
    let mut read_buf = vec![0u8; config.buffer_size];

    info!(addr = %listener.local_endpoint()?, "Listening");

    while !stop.load(Ordering::Relaxed) {
        match poll.poll(&mut events, None) {
            Ok(()) => {}
            // A signal interrupted the wait; re-check the stop flag.
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_pending(&listener, poll.registry(), &mut connections);
                }
                Token(conn_id) => handle_client_event(
                    conn_id,
                    event,
                    poll.registry(),
                    &mut connections,
                    &mut read_buf,
                ),
            }
        }
    }

    info!(open_connections = connections.len(), "Shutting down");
    teardown_all(poll.registry(), &mut connections);
    Ok(())
}

/// Drain the accept queue. Readiness fires once per transition to
/// non-empty, so a single accept is not enough: every queued connection
/// must be taken now or it stalls until the next unrelated connect.
fn accept_pending(listener: &TcpSocket, registry: &Registry, connections: &mut Slab<Connection>) {
    loop {
        match listener.accept() {
            Ok(Some((socket, peer))) => {
                // A setup failure is contained to this one connection.
                if let Err(e) = register_client(socket, peer, registry, connections) {
                    warn!(peer = %peer, error = %e, "Failed to set up accepted connection");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Accept error");
                break;
            }
        }
    }
}

fn register_client(
    socket: TcpSocket,
    peer: Endpoint,
    registry: &Registry,
    connections: &mut Slab<Connection>,
) -> io::Result<()> {
    socket.set_nonblocking()?;

    let conn_id = connections.insert(Connection::new(socket, peer));
    let conn = &mut connections[conn_id];
    if let Err(e) = registry.register(&mut conn.socket, Token(conn_id), Interest::READABLE) {
        // Registration and ownership stay in lockstep; an unregistered
        // socket must not linger in the set.
        connections.remove(conn_id);
        return Err(e);
    }

    debug!(conn_id, peer = %peer, "Accepted connection");
    Ok(())
}

fn handle_client_event(
    conn_id: usize,
    event: &mio::event::Event,
    registry: &Registry,
    connections: &mut Slab<Connection>,
    read_buf: &mut [u8],
) {
    if !connections.contains(conn_id) {
        return;
    }

    if event.is_writable() {
        if let Err(e) = flush_pending(conn_id, registry, connections) {
            debug!(conn_id, error = %e, "Write error");
            close_connection(conn_id, registry, connections);
            return;
        }
    }

    if event.is_readable() {
        match drain_and_echo(conn_id, registry, connections, read_buf) {
            Ok(Disposition::Open) => {}
            Ok(Disposition::PeerClosed) => {
                debug!(conn_id, "Peer disconnected");
                close_connection(conn_id, registry, connections);
            }
            Err(e) => {
                debug!(conn_id, error = %e, "Connection error");
                close_connection(conn_id, registry, connections);
            }
        }
    }
}

/// Read to exhaustion, echoing each chunk as it arrives.
fn drain_and_echo(
    conn_id: usize,
    registry: &Registry,
    connections: &mut Slab<Connection>,
    read_buf: &mut [u8],
) -> io::Result<Disposition> {
    let conn = &mut connections[conn_id];
    loop {
        match conn.socket.read(read_buf)? {
            ReadStatus::Data(n) => echo_chunk(conn, Token(conn_id), registry, &read_buf[..n])?,
            ReadStatus::Closed => return Ok(Disposition::PeerClosed),
            ReadStatus::WouldBlock => return Ok(Disposition::Open),
        }
    }
}

/// Echo one chunk. Whatever the kernel does not accept immediately is
/// queued on the connection and the registration widened to writable, to
/// be flushed when the socket drains.
fn echo_chunk(
    conn: &mut Connection,
    token: Token,
    registry: &Registry,
    chunk: &[u8],
) -> io::Result<()> {
    if conn.has_pending() {
        // Earlier bytes are still queued; write behind them to keep order.
        conn.queue(chunk);
        return Ok(());
    }

    let accepted = match conn.socket.write(chunk)? {
        WriteStatus::Wrote(n) => n,
        WriteStatus::WouldBlock => 0,
    };

    if accepted < chunk.len() {
        conn.queue(&chunk[accepted..]);
        let interest = conn.interest();
        registry.reregister(&mut conn.socket, token, interest)?;
    }
    Ok(())
}

/// Push queued echo bytes out; once the queue empties, interest narrows
/// back to readable alone.
fn flush_pending(
    conn_id: usize,
    registry: &Registry,
    connections: &mut Slab<Connection>,
) -> io::Result<()> {
    let conn = &mut connections[conn_id];
    if conn.flush_pending()? {
        let interest = conn.interest();
        registry.reregister(&mut conn.socket, Token(conn_id), interest)?;
    }
    Ok(())
}

/// Tear one connection down: deregister first, then let the moved-out
/// handle drop, so no event can reference a released descriptor.
fn close_connection(conn_id: usize, registry: &Registry, connections: &mut Slab<Connection>) {
    if let Some(mut conn) = connections.try_remove(conn_id) {
        let _ = registry.deregister(&mut conn.socket);
        debug!(conn_id, peer = %conn.peer, "Connection closed");
    }
}

/// Release every still-open connection during shutdown; no half-open
/// socket survives the loop.
fn teardown_all(registry: &Registry, connections: &mut Slab<Connection>) {
    for (_, conn) in connections.iter_mut() {
        let _ = registry.deregister(&mut conn.socket);
    }
    connections.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn test_config(port: u16) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port,
            buffer_size: 1024,
            log_level: "info".to_string(),
        }
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn connect_with_retry(port: u16) -> TcpStream {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => return stream,
                Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                Err(e) => panic!("server never came up: {e}"),
            }
        }
    }

    #[test]
    fn test_echoes_then_stops_on_flag() {
        let port = free_port();
        let config = test_config(port);
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);

        let handle =
            thread::spawn(move || run(&config, &loop_stop).map_err(|e| e.to_string()));

        let mut stream = connect_with_retry(port);
        stream
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        // The loop observes the flag after its next wakeup; closing the
        // connection produces that wakeup.
        stop.store(true, Ordering::Relaxed);
        drop(stream);

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_bind_failure_is_fatal() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let config = test_config(port);
        let stop = AtomicBool::new(false);
        assert!(run(&config, &stop).is_err());
    }
}
