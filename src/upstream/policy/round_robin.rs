use crate::core::session::SessionId;
use crate::upstream::pool::{Server, ServerPool};

use super::{LoadChange, Policy};

/// Cycles through the pool in configured order, ignoring load.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    pool: ServerPool,
    /// Index of the next pick, always below the pool length.
    counter: usize,
}

impl RoundRobin {
    pub fn new(pool: ServerPool) -> Self {
        Self { pool, counter: 0 }
    }
}

impl Policy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn select_server(&mut self) -> Server {
        let server = self.pool[self.counter];
        self.counter = (self.counter + 1) % self.pool.len();
        server
    }

    fn update(&mut self, _change: LoadChange, _server: &Server, _session: SessionId) {}
}
