//! Upstream servers and the policies that choose between them.

pub mod policy;
pub mod pool;

pub use policy::{
    FixedTarget, LeastConnections, LeastResponseTime, LoadChange, Policy, PolicyKind, RoundRobin,
    Strategy,
};
pub use pool::{Server, ServerPool};
