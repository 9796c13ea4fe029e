use std::error::Error as _;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use io_uring::{IoUring, types};
use tracing::{debug, error, field, info, warn};

use crate::core::constants::LISTENER_ID;
use crate::core::session::SessionId;
use crate::core::socket::make_listener;
use crate::core::stream_pump::Operation;
use crate::core::user_data::unpack_user_data;
use crate::error::BalancerError;
use crate::upstream::Policy;

use super::config::BalancerConfig;
use super::connection_table::ConnectionTable;
use super::handlers::{handle_accept, handle_connect, handle_readable, handle_writable};
use super::registry::Registry;
use super::uring_ops::post_tick;

/// Everything the dispatch loop touches, owned in one place.
pub struct LoadBalancer<P> {
    ring: IoUring,
    listener: TcpListener,
    table: ConnectionTable<P>,
    /// Referenced by the in-flight tick SQE, so it must outlive `ring`.
    tick: Box<types::Timespec>,
    shutdown: Arc<AtomicBool>,
}

impl<P: Policy> LoadBalancer<P> {
    /// Create the ring and bind the listening socket.
    pub fn bind(
        config: &BalancerConfig,
        policy: P,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, BalancerError> {
        let ring = IoUring::new(config.ring_size).map_err(BalancerError::Reactor)?;
        let listener = make_listener(config.listen_addr, config.listen_backlog)
            .map_err(BalancerError::Listen)?;
        let tick = Box::new(
            types::Timespec::new()
                .sec(config.tick_interval.as_secs())
                .nsec(config.tick_interval.subsec_nanos()),
        );

        Ok(Self {
            ring,
            listener,
            table: ConnectionTable::new(policy, config.io_buffer_capacity, config.connect_timeout),
            tick,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn table(&self) -> &ConnectionTable<P> {
        &self.table
    }

    /// Run the dispatch loop until shutdown is requested.
    ///
    /// The shutdown flag is checked once per batch of completions, so a
    /// request that lands mid-batch still lets the rest of the batch run.
    /// Sessions still open on return are closed when `self` is dropped.
    pub fn run(&mut self) -> Result<(), BalancerError> {
        self.ring
            .arm(self.listener.as_raw_fd(), SessionId::new(LISTENER_ID), Operation::Accept)
            .map_err(BalancerError::Submission)?;
        post_tick(&mut self.ring, &self.tick).map_err(BalancerError::Submission)?;

        let listen = self.local_addr().map_err(BalancerError::Listen)?;
        info!(
            %listen,
            policy = self.table.policy().name(),
            "listening"
        );

        let mut events: Vec<(u64, i32)> = Vec::new();
        while !self.shutdown.load(Ordering::Acquire) {
            match self.ring.submit_and_wait(1) {
                Ok(_) => {}
                // a signal landed, go look at the flag
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "waiting for readiness failed");
                    return Err(BalancerError::Submission(e));
                }
            }

            events.extend(
                self.ring
                    .completion()
                    .map(|cqe| (cqe.user_data(), cqe.result())),
            );

            for (tag, res) in events.drain(..) {
                if let Err(e) = self.dispatch(tag, res) {
                    error!(error = %e, cause = e.source().map(field::display), "dispatch loop failed");
                    return Err(e);
                }
            }
        }

        info!(open_sessions = self.table.len(), "graceful shutdown");
        Ok(())
    }

    /// Hand one completion to its handler. Session-local failures are
    /// reported here and swallowed, anything else ends the loop.
    fn dispatch(&mut self, tag: u64, res: i32) -> Result<(), BalancerError> {
        let Some((id, op)) = unpack_user_data(tag) else {
            warn!(tag, "completion with unknown tag");
            return Ok(());
        };
        let id = SessionId::new(id);

        let outcome = match op {
            Operation::Accept => handle_accept(&mut self.ring, &self.listener, &mut self.table, res),
            Operation::Recv(dir) => handle_readable(&mut self.ring, &mut self.table, id, dir, res),
            Operation::Send(dir) => handle_writable(&mut self.ring, &mut self.table, id, dir, res),
            Operation::Connect => handle_connect(&mut self.ring, &mut self.table, id, res),
            Operation::Tick => self.on_tick(),
            Operation::Cancel => {
                debug!(session = %id, res, "poll cancelled");
                Ok(())
            }
        };

        match outcome {
            Err(e) if e.is_session_local() => {
                report_aborted(&e);
                Ok(())
            }
            other => other,
        }
    }

    /// Re-post the tick and give up on upstream handshakes that took too long.
    fn on_tick(&mut self) -> Result<(), BalancerError> {
        post_tick(&mut self.ring, &self.tick).map_err(BalancerError::Submission)?;
        for e in self.table.expire_connects(&mut self.ring, Instant::now()) {
            report_aborted(&e);
        }
        Ok(())
    }
}

fn report_aborted(e: &BalancerError) {
    error!(error = %e, cause = e.source().map(field::display), "session aborted");
}
