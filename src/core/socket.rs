//! Socket utility functions for the load balancer
//!
//! - the non-blocking listening socket the dispatch loop polls
//! - upstream connections, started without waiting for the handshake and
//!   finished once the socket reports write-readiness

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};

fn domain_for(addr: &SocketAddr) -> Domain {
    if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    }
}

/// Create the non-blocking listening socket.
pub fn make_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let sock = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;
    sock.set_reuse_address(true)?;
    sock.bind(&addr.into())?;
    sock.listen(backlog)?;
    sock.set_nonblocking(true)?;
    Ok(sock.into())
}

/// Start connecting to an upstream server without waiting for the handshake.
///
/// Returns the non-blocking stream and whether it is already connected. When
/// it is not, the caller waits for write-readiness and then asks
/// [`connect_result`] how the handshake went.
pub fn connect_upstream(addr: SocketAddr) -> io::Result<(TcpStream, bool)> {
    let sock = Socket::new(domain_for(&addr), Type::STREAM, Some(Protocol::TCP))?;
    sock.set_nonblocking(true)?;
    let connected = match sock.connect(&SockAddr::from(addr)) {
        Ok(()) => true,
        Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => false,
        Err(e) => return Err(e),
    };
    let stream: TcpStream = sock.into();
    stream.set_nodelay(true)?;
    Ok((stream, connected))
}

/// Outcome of a pending connect once the socket has reported readiness.
///
/// `Ok(true)` once connected, `Ok(false)` while the handshake is still
/// running, and the pending socket error (`SO_ERROR`) if it failed.
pub fn connect_result(stream: &TcpStream) -> io::Result<bool> {
    if let Some(e) = stream.take_error()? {
        return Err(e);
    }
    match stream.peer_addr() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
        Err(e) => Err(e),
    }
}

/// Prepare an accepted client stream for relaying.
pub fn prepare_client(stream: &TcpStream) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)
}
