//! Load balancing policies
//!
//! Every policy answers two questions for the connection table:
//! - which server should the next session go to (`select_server`)
//! - a session against a server just opened or closed (`update`)
//!
//! The set of policies is closed. [`Strategy`] wraps them so the dispatch
//! loop is monomorphized over a single type chosen at startup.

mod fixed;
mod least_connections;
mod least_response_time;
mod round_robin;

use clap::ValueEnum;

use crate::core::session::SessionId;

use super::pool::{Server, ServerPool};

pub use fixed::FixedTarget;
pub use least_connections::LeastConnections;
pub use least_response_time::LeastResponseTime;
pub use round_robin::RoundRobin;

/// Load signal change reported by the connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadChange {
    Opened,
    Closed,
}

pub trait Policy {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Pick the server for a new session. Always a member of the pool.
    fn select_server(&mut self) -> Server;

    /// Record that `session` against `server` opened or closed.
    fn update(&mut self, change: LoadChange, server: &Server, session: SessionId);
}

/// Policy selectable from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Every session goes to the first server
    #[default]
    #[value(name = "n2one", alias = "fixed")]
    N2One,
    /// Cycle through the servers in order
    RoundRobin,
    /// Fewest open sessions wins
    LeastConnections,
    /// Lowest mean session duration wins
    LeastResponseTime,
}

#[derive(Debug)]
pub enum Strategy {
    Fixed(FixedTarget),
    RoundRobin(RoundRobin),
    LeastConnections(LeastConnections),
    LeastResponseTime(LeastResponseTime),
}

impl Strategy {
    pub fn new(kind: PolicyKind, pool: ServerPool) -> Self {
        match kind {
            PolicyKind::N2One => Strategy::Fixed(FixedTarget::new(pool)),
            PolicyKind::RoundRobin => Strategy::RoundRobin(RoundRobin::new(pool)),
            PolicyKind::LeastConnections => {
                Strategy::LeastConnections(LeastConnections::new(pool))
            }
            PolicyKind::LeastResponseTime => {
                Strategy::LeastResponseTime(LeastResponseTime::new(pool))
            }
        }
    }
}

impl Policy for Strategy {
    fn name(&self) -> &'static str {
        match self {
            Strategy::Fixed(p) => p.name(),
            Strategy::RoundRobin(p) => p.name(),
            Strategy::LeastConnections(p) => p.name(),
            Strategy::LeastResponseTime(p) => p.name(),
        }
    }

    fn select_server(&mut self) -> Server {
        match self {
            Strategy::Fixed(p) => p.select_server(),
            Strategy::RoundRobin(p) => p.select_server(),
            Strategy::LeastConnections(p) => p.select_server(),
            Strategy::LeastResponseTime(p) => p.select_server(),
        }
    }

    fn update(&mut self, change: LoadChange, server: &Server, session: SessionId) {
        match self {
            Strategy::Fixed(p) => p.update(change, server, session),
            Strategy::RoundRobin(p) => p.update(change, server, session),
            Strategy::LeastConnections(p) => p.update(change, server, session),
            Strategy::LeastResponseTime(p) => p.update(change, server, session),
        }
    }
}

/// Index of the first minimum, so ties go to the earliest server in the pool.
fn first_min_index<T: PartialOrd>(values: &[T]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v < values[best] {
            best = i;
        }
    }
    best
}
