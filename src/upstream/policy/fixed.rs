use crate::core::session::SessionId;
use crate::upstream::pool::{Server, ServerPool};

use super::{LoadChange, Policy};

/// Sends every session to the first configured server.
#[derive(Debug, Clone)]
pub struct FixedTarget {
    pool: ServerPool,
}

impl FixedTarget {
    pub fn new(pool: ServerPool) -> Self {
        Self { pool }
    }
}

impl Policy for FixedTarget {
    fn name(&self) -> &'static str {
        "n2one"
    }

    fn select_server(&mut self) -> Server {
        self.pool.first()
    }

    fn update(&mut self, _change: LoadChange, _server: &Server, _session: SessionId) {}
}
