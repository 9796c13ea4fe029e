use std::time::Duration;

/// Bytes read from one side of a session per readiness event.
pub const IO_BUFFER_CAPACITY: usize = 4096;

pub const RING_SIZE: u32 = 256;
pub const LISTEN_BACKLOG: i32 = 1024;

/// How long an upstream handshake may stay pending, checked on every tick.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on how long an idle loop takes to notice a shutdown request.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// user_data id carried by completions that belong to no session.
pub const LISTENER_ID: u64 = 0;
