//! The load balancer proper
//!
//! - dispatch loop over an io_uring used as a readiness multiplexer
//! - connection table pairing clients with upstreams
//! - accept and relay handlers

pub mod config;
pub mod connection_table;
pub mod handlers;
pub mod registry;
pub mod uring_ops;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use config::BalancerConfig;
pub use connection_table::ConnectionTable;
pub use registry::Registry;
pub use worker::LoadBalancer;
