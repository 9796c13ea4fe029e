use std::net::SocketAddr;
use std::time::Duration;

use crate::core::constants;
use crate::upstream::PolicyKind;

#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Address clients connect to
    pub listen_addr: SocketAddr,
    /// Upstream servers, in pool order
    pub servers: Vec<SocketAddr>,
    pub policy: PolicyKind,
    /// Size of the io_uring submission/completion queue
    pub ring_size: u32,
    /// Bytes read from one side of a session per readiness event
    pub io_buffer_capacity: usize,
    pub listen_backlog: i32,
    /// How long an upstream connect may stay pending before the session is
    /// abandoned. Checked on every tick, so it is honored to within `tick_interval`
    pub connect_timeout: Duration,
    /// Longest the loop sleeps before re-checking the shutdown flag
    pub tick_interval: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            servers: Vec::new(),
            policy: PolicyKind::default(),
            ring_size: constants::RING_SIZE,
            io_buffer_capacity: constants::IO_BUFFER_CAPACITY,
            listen_backlog: constants::LISTEN_BACKLOG,
            connect_timeout: constants::CONNECT_TIMEOUT,
            tick_interval: constants::TICK_INTERVAL,
        }
    }
}

impl BalancerConfig {
    pub fn new(listen_addr: SocketAddr, servers: Vec<SocketAddr>, policy: PolicyKind) -> Self {
        Self {
            listen_addr,
            servers,
            policy,
            ..Self::default()
        }
    }
}
