//! Helpers for exercising the table and handlers without a ring.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use crate::core::session::SessionId;
use crate::core::socket::make_listener;
use crate::core::stream_pump::{Operation, Side};
use crate::error::BalancerError;
use crate::upstream::{Policy, Server, ServerPool};

use super::connection_table::ConnectionTable;
use super::handlers::handle_connect;
use super::registry::Registry;

#[derive(Debug, Default)]
pub(crate) struct RecordingRegistry {
    pub armed: Vec<(RawFd, SessionId, Operation)>,
    pub disarmed: Vec<(SessionId, Operation)>,
}

impl RecordingRegistry {
    pub fn armed_for(&self, id: SessionId) -> Vec<Operation> {
        self.armed
            .iter()
            .filter(|(_, armed_id, _)| *armed_id == id)
            .map(|(_, _, op)| *op)
            .collect()
    }
}

impl Registry for RecordingRegistry {
    fn arm(&mut self, fd: RawFd, id: SessionId, op: Operation) -> io::Result<()> {
        self.armed.push((fd, id, op));
        Ok(())
    }

    fn disarm(&mut self, id: SessionId, op: Operation) -> io::Result<()> {
        self.disarmed.push((id, op));
        Ok(())
    }
}

/// A connected pair: the remote client end and the end the balancer accepted.
pub(crate) fn client_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let remote = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (accepted, _) = listener.accept().unwrap();
    remote.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    (remote, accepted)
}

/// Listening upstream servers and the pool naming them, in order.
pub(crate) fn upstreams(n: usize) -> (Vec<TcpListener>, ServerPool) {
    let listeners: Vec<TcpListener> = (0..n)
        .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    let pool = ServerPool::from_addrs(listeners.iter().map(|l| l.local_addr().unwrap())).unwrap();
    (listeners, pool)
}

/// Accept the connection the balancer opened to an upstream.
pub(crate) fn accept_upstream(listener: &TcpListener) -> TcpStream {
    let (stream, _) = listener.accept().unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// A server nobody listens on.
pub(crate) fn refused_server() -> Server {
    let addr: SocketAddr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    Server::new(addr)
}

/// A server that never completes a handshake.
///
/// Its accept queue holds at most one connection and is filled up front, so
/// the kernel drops every further SYN. Keep it alive for the test's duration.
pub(crate) struct Unresponsive {
    pub server: Server,
    _listener: TcpListener,
    _queued: Vec<TcpStream>,
}

pub(crate) fn unresponsive_server() -> Unresponsive {
    let listener = make_listener("127.0.0.1:0".parse().unwrap(), 0).unwrap();
    let addr = listener.local_addr().unwrap();
    let mut queued = Vec::new();
    for _ in 0..2 {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            Ok(stream) => queued.push(stream),
            Err(_) => break,
        }
    }
    Unresponsive {
        server: Server::new(addr),
        _listener: listener,
        _queued: queued,
    }
}

/// Block until `stream` reports write-readiness (or an error).
pub(crate) fn wait_writable(stream: &TcpStream) {
    let mut fds = libc::pollfd {
        fd: stream.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    // SAFETY: one valid pollfd for the duration of the call
    let ready = unsafe { libc::poll(&mut fds, 1, 5_000) };
    assert_eq!(ready, 1, "socket never became writable");
}

/// Drive the upstream handshake of `id` to its outcome, the way the loop
/// does when the `Connect` poll fires.
pub(crate) fn settle_connect<P: Policy>(
    registry: &mut RecordingRegistry,
    table: &mut ConnectionTable<P>,
    id: SessionId,
) -> Result<(), BalancerError> {
    while let Some(session) = table.get(id) {
        if session.is_established() {
            break;
        }
        wait_writable(session.stream(Side::Upstream));
        handle_connect(registry, table, id, libc::POLLOUT as i32)?;
    }
    Ok(())
}

/// Add a session and wait until it relays.
pub(crate) fn open_session<P: Policy>(
    registry: &mut RecordingRegistry,
    table: &mut ConnectionTable<P>,
    client: TcpStream,
    server: Server,
) -> SessionId {
    let id = table.add(registry, client, server).unwrap();
    settle_connect(registry, table, id).unwrap();
    id
}
