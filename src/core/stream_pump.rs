#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpCode {
    Accept  = 1,
    Recv    = 2,
    Send    = 3,
    Tick    = 4,
    Cancel  = 5,
    Connect = 6,
}

impl OpCode {
    #[inline]
    pub fn try_from_u8(v: u8) -> Option<Self> {
        use OpCode::*;
        Some(match v {
            1 => Accept,
            2 => Recv,
            3 => Send,
            4 => Tick,
            5 => Cancel,
            6 => Connect,
            _ => return None,
        })
    }
}

/// Which endpoint of a session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    Client,
    Upstream,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Client => Side::Upstream,
            Side::Upstream => Side::Client,
        }
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    ClientToUpstream = 0,
    UpstreamToClient = 1,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::ClientToUpstream, Direction::UpstreamToClient];

    /// Side the bytes are read from.
    pub fn source(self) -> Side {
        match self {
            Direction::ClientToUpstream => Side::Client,
            Direction::UpstreamToClient => Side::Upstream,
        }
    }
}

/// What a completion on the ring stands for.
///
/// `Recv(d)` is read-readiness on the source of `d`, `Send(d)` is
/// write-readiness on its destination. `Connect` is write-readiness on an
/// upstream whose handshake is still in progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    Accept,
    Recv(Direction),
    Send(Direction),
    Tick,
    Cancel,
    Connect,
}

impl Operation {
    /// poll(2) events this operation waits for, `None` for non-poll operations.
    pub fn poll_mask(self) -> Option<u32> {
        match self {
            Operation::Accept | Operation::Recv(_) => Some(libc::POLLIN as u32),
            Operation::Send(_) | Operation::Connect => Some(libc::POLLOUT as u32),
            Operation::Tick | Operation::Cancel => None,
        }
    }
}

/// Single-direction forwarding state.
pub struct StreamPump {
    /// Fixed-size I/O buffer, one read's worth.
    pub buffer: Vec<u8>,

    /// Number of valid bytes currently in `buffer` (prefix).
    pub bytes_ready_to_send: usize,
    /// How many of those bytes have been written so far (for partial sends).
    pub bytes_already_sent: usize,

    /// True while a read-readiness poll on the source is outstanding.
    pub recv_armed: bool,
    /// True while a write-readiness poll on the destination is outstanding.
    pub send_armed: bool,
}

impl StreamPump {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; buffer_capacity],
            bytes_ready_to_send: 0,
            bytes_already_sent: 0,
            recv_armed: false,
            send_armed: false,
        }
    }

    /// Bytes read but not yet written to the destination.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.bytes_already_sent..self.bytes_ready_to_send]
    }

    pub fn has_pending(&self) -> bool {
        self.bytes_already_sent < self.bytes_ready_to_send
    }

    /// Reset buffer after a full send.
    pub fn reset_buffer(&mut self) {
        self.bytes_ready_to_send = 0;
        self.bytes_already_sent = 0;
    }
}
