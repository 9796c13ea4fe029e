use tracing::warn;

use crate::core::session::SessionId;
use crate::upstream::pool::{Server, ServerPool};

use super::{LoadChange, Policy, first_min_index};

/// Picks the server with the fewest open sessions.
///
/// Counts are kept in a vector parallel to the pool so the minimum search
/// walks servers in configured order and ties go to the earliest one.
#[derive(Debug, Clone)]
pub struct LeastConnections {
    pool: ServerPool,
    open: Vec<usize>,
}

impl LeastConnections {
    pub fn new(pool: ServerPool) -> Self {
        let open = vec![0; pool.len()];
        Self { pool, open }
    }

    /// Open session count for `server`, `None` if it is not in the pool.
    pub fn connections(&self, server: &Server) -> Option<usize> {
        self.pool.position(server).map(|i| self.open[i])
    }
}

impl Policy for LeastConnections {
    fn name(&self) -> &'static str {
        "least-connections"
    }

    fn select_server(&mut self) -> Server {
        self.pool[first_min_index(&self.open)]
    }

    fn update(&mut self, change: LoadChange, server: &Server, session: SessionId) {
        let Some(i) = self.pool.position(server) else {
            warn!(%server, %session, "load update for server outside the pool");
            return;
        };
        match change {
            LoadChange::Opened => self.open[i] += 1,
            LoadChange::Closed => match self.open[i].checked_sub(1) {
                Some(n) => self.open[i] = n,
                None => warn!(%server, %session, "close without a matching open"),
            },
        }
    }
}
