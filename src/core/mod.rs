//! Building blocks shared by the balancer: sessions, relay pumps, sockets and
//! the ring's user_data encoding.

pub mod constants;
pub mod session;
pub mod socket;
pub mod stream_pump;
pub mod user_data;
