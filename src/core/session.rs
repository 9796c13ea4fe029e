use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Instant;

use crate::core::stream_pump::{Direction, Operation, Side, StreamPump};
use crate::upstream::Server;

/// Identifier of a session, unique for the life of the process.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One end of a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Endpoint {
    pub session: SessionId,
    pub side: Side,
}

impl Endpoint {
    pub fn new(session: SessionId, side: Side) -> Self {
        Self { session, side }
    }

    pub fn client(session: SessionId) -> Self {
        Self::new(session, Side::Client)
    }

    pub fn upstream(session: SessionId) -> Self {
        Self::new(session, Side::Upstream)
    }

    /// The other end of the same session.
    pub fn opposite(self) -> Self {
        Self::new(self.session, self.side.opposite())
    }
}

/// A client connection paired with the upstream connection it was routed to.
///
/// Both streams are owned here and closed when the session is dropped. A
/// session starts half-open: the upstream handshake is still running and only
/// the `Connect` poll is armed. Relaying starts once it is established.
pub struct Session {
    pub id: SessionId,
    pub server: Server,
    pub client_addr: Option<SocketAddr>,
    /// When the upstream connect was started, `None` once it completed.
    pub connecting_since: Option<Instant>,
    /// True while a write-readiness poll waits for the handshake.
    pub connect_armed: bool,

    client: TcpStream,
    upstream: TcpStream,

    pub pump_client_to_upstream: StreamPump,
    pub pump_upstream_to_client: StreamPump,
}

impl Session {
    pub fn new(
        id: SessionId,
        server: Server,
        client: TcpStream,
        upstream: TcpStream,
        io_buffer_capacity: usize,
    ) -> Self {
        Self {
            id,
            server,
            client_addr: client.peer_addr().ok(),
            connecting_since: Some(Instant::now()),
            connect_armed: false,
            client,
            upstream,
            pump_client_to_upstream: StreamPump::new(io_buffer_capacity),
            pump_upstream_to_client: StreamPump::new(io_buffer_capacity),
        }
    }

    pub fn is_established(&self) -> bool {
        self.connecting_since.is_none()
    }

    pub fn stream(&self, side: Side) -> &TcpStream {
        match side {
            Side::Client => &self.client,
            Side::Upstream => &self.upstream,
        }
    }

    pub fn fd(&self, side: Side) -> RawFd {
        self.stream(side).as_raw_fd()
    }

    pub fn pump(&self, dir: Direction) -> &StreamPump {
        match dir {
            Direction::ClientToUpstream => &self.pump_client_to_upstream,
            Direction::UpstreamToClient => &self.pump_upstream_to_client,
        }
    }

    pub fn pump_mut(&mut self, dir: Direction) -> &mut StreamPump {
        match dir {
            Direction::ClientToUpstream => &mut self.pump_client_to_upstream,
            Direction::UpstreamToClient => &mut self.pump_upstream_to_client,
        }
    }

    /// Both streams, borrowed alongside the pump of one direction.
    pub fn split(&mut self, dir: Direction) -> (Streams<'_>, &mut StreamPump) {
        let streams = Streams {
            client: &self.client,
            upstream: &self.upstream,
        };
        let pump = match dir {
            Direction::ClientToUpstream => &mut self.pump_client_to_upstream,
            Direction::UpstreamToClient => &mut self.pump_upstream_to_client,
        };
        (streams, pump)
    }

    /// Polls still outstanding on the ring for this session.
    pub fn armed(&self) -> Vec<Operation> {
        let mut ops = Vec::with_capacity(4);
        if self.connect_armed {
            ops.push(Operation::Connect);
        }
        for dir in Direction::BOTH {
            let pump = self.pump(dir);
            if pump.recv_armed {
                ops.push(Operation::Recv(dir));
            }
            if pump.send_armed {
                ops.push(Operation::Send(dir));
            }
        }
        ops
    }
}

#[derive(Copy, Clone)]
pub struct Streams<'a> {
    client: &'a TcpStream,
    upstream: &'a TcpStream,
}

impl<'a> Streams<'a> {
    pub fn side(self, side: Side) -> &'a TcpStream {
        match side {
            Side::Client => self.client,
            Side::Upstream => self.upstream,
        }
    }
}
