use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::core::session::SessionId;
use crate::upstream::pool::{Server, ServerPool};

use super::{LoadChange, Policy, first_min_index};

/// Completed-session durations folded into an exact mean.
#[derive(Debug, Clone, Copy, Default)]
struct Completed {
    total: Duration,
    count: u64,
}

impl Completed {
    /// Saturates rather than overflowing.
    fn record(&mut self, elapsed: Duration) {
        self.total = self.total.saturating_add(elapsed);
        self.count = self.count.saturating_add(1);
    }

    fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Picks the server whose completed sessions had the lowest mean duration.
///
/// Servers without completed sessions have a mean of zero, so until
/// sessions start finishing this behaves like the fixed-target policy.
/// Sessions still in flight never contribute to a mean.
#[derive(Debug, Clone)]
pub struct LeastResponseTime {
    pool: ServerPool,
    means: Vec<Duration>,
    completed: Vec<Completed>,
    in_flight: HashMap<(Server, SessionId), Instant>,
}

impl LeastResponseTime {
    pub fn new(pool: ServerPool) -> Self {
        let n = pool.len();
        Self {
            pool,
            means: vec![Duration::ZERO; n],
            completed: vec![Completed::default(); n],
            in_flight: HashMap::new(),
        }
    }

    /// Mean completed-session duration for `server`.
    pub fn average(&self, server: &Server) -> Option<Duration> {
        self.pool.position(server).map(|i| self.means[i])
    }

    /// Number of sessions started and not yet closed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub(crate) fn opened_at(&mut self, server: &Server, session: SessionId, at: Instant) {
        if self.pool.position(server).is_none() {
            warn!(%server, %session, "load update for server outside the pool");
            return;
        }
        self.in_flight.insert((*server, session), at);
    }

    pub(crate) fn closed_at(&mut self, server: &Server, session: SessionId, at: Instant) {
        let Some(started) = self.in_flight.remove(&(*server, session)) else {
            warn!(%server, %session, "close without a matching open");
            return;
        };
        let Some(i) = self.pool.position(server) else {
            return;
        };
        let elapsed = at.saturating_duration_since(started);
        self.completed[i].record(elapsed);
        self.means[i] = self.completed[i].mean();
        trace!(%server, ?elapsed, mean = ?self.means[i], "session duration recorded");
    }
}

impl Policy for LeastResponseTime {
    fn name(&self) -> &'static str {
        "least-response-time"
    }

    fn select_server(&mut self) -> Server {
        self.pool[first_min_index(&self.means)]
    }

    fn update(&mut self, change: LoadChange, server: &Server, session: SessionId) {
        let now = Instant::now();
        match change {
            LoadChange::Opened => self.opened_at(server, session, now),
            LoadChange::Closed => self.closed_at(server, session, now),
        }
    }
}
