//! A single-threaded Layer-4 TCP load balancer
//!
//! Clients are accepted on one listening socket, routed to one of a fixed
//! pool of upstream servers by a [`Policy`](upstream::Policy), and bytes are
//! relayed verbatim in both directions until either side closes.
//!
//! - `upstream`: server pool and load balancing policies
//! - `balancer`: dispatch loop, connection table and handlers
//! - `core`: sessions, relay pumps, sockets, ring tags

pub mod balancer;
pub mod core;
pub mod error;
pub mod upstream;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

pub use balancer::{BalancerConfig, LoadBalancer};
pub use error::BalancerError;
pub use upstream::{PolicyKind, Server, ServerPool, Strategy};

/// Build the configured policy, bind and serve until `shutdown` is set.
pub fn run(config: &BalancerConfig, shutdown: Arc<AtomicBool>) -> Result<(), BalancerError> {
    let pool = ServerPool::from_addrs(config.servers.iter().copied())?;
    let policy = Strategy::new(config.policy, pool);
    let mut balancer = LoadBalancer::bind(config, policy, shutdown)?;
    balancer.run()
}
