use std::collections::HashMap;
use std::io;
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::core::constants::LISTENER_ID;
use crate::core::session::{Endpoint, Session, SessionId};
use crate::core::socket::{connect_upstream, prepare_client};
use crate::core::stream_pump::{Direction, Operation, Side};
use crate::error::BalancerError;
use crate::upstream::{LoadChange, Policy, Server};

use super::registry::Registry;

/// Pairs client connections with upstream connections.
///
/// The table owns both streams of every session and is the only caller of
/// [`Policy::update`]. A session counts as load from the moment its upstream
/// handshake completes until it is deleted, so the policy only ever sees
/// sessions that actually relayed. A session is present exactly while it has
/// polls armed on the registry.
pub struct ConnectionTable<P> {
    sessions: HashMap<SessionId, Session>,
    next_id: u64,
    policy: P,
    io_buffer_capacity: usize,
    connect_timeout: Duration,
}

impl<P: Policy> ConnectionTable<P> {
    pub fn new(policy: P, io_buffer_capacity: usize, connect_timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: LISTENER_ID + 1,
            policy,
            io_buffer_capacity,
            connect_timeout,
        }
    }

    /// Open a session routing `client` to `server`.
    ///
    /// The upstream connect is only started here. Unless it completes on the
    /// spot, the session waits half-open on a `Connect` poll and
    /// [`establish`](Self::establish) is called once the handshake is done.
    /// On failure the client stream is dropped, which closes it, and nothing
    /// is recorded.
    pub fn add<R: Registry>(
        &mut self,
        registry: &mut R,
        client: TcpStream,
        server: Server,
    ) -> Result<SessionId, BalancerError> {
        prepare_client(&client).map_err(BalancerError::ClientSetup)?;
        let (upstream, connected) = connect_upstream(server.address)
            .map_err(|source| BalancerError::UpstreamConnect { server, source })?;

        let id = SessionId::new(self.next_id);
        self.next_id += 1;

        let mut session = Session::new(id, server, client, upstream, self.io_buffer_capacity);
        if !connected {
            registry
                .arm(session.fd(Side::Upstream), id, Operation::Connect)
                .map_err(BalancerError::Submission)?;
            session.connect_armed = true;
            trace!(session = %id, upstream = %server, "connecting to upstream");
        }
        self.sessions.insert(id, session);

        if connected {
            self.establish(registry, id)?;
        }
        Ok(id)
    }

    /// The upstream handshake of `id` completed: start relaying both ways and
    /// count the session as load on its server.
    pub fn establish<R: Registry>(
        &mut self,
        registry: &mut R,
        id: SessionId,
    ) -> Result<(), BalancerError> {
        let Some(session) = self.sessions.get_mut(&id) else {
            return Ok(());
        };
        if session.is_established() {
            return Ok(());
        }

        for dir in Direction::BOTH {
            registry
                .arm(session.fd(dir.source()), id, Operation::Recv(dir))
                .map_err(BalancerError::Submission)?;
            session.pump_mut(dir).recv_armed = true;
        }
        session.connecting_since = None;

        debug!(
            session = %id,
            client = ?session.client_addr,
            upstream = %session.server,
            "proxying to upstream"
        );
        self.policy.update(LoadChange::Opened, &session.server, id);
        Ok(())
    }

    /// Tear down the session containing `endpoint`.
    ///
    /// Returns `false` if there was no such session, so deleting twice is
    /// harmless.
    pub fn delete<R: Registry>(&mut self, registry: &mut R, endpoint: Endpoint) -> bool {
        let Some(session) = self.sessions.remove(&endpoint.session) else {
            return false;
        };

        for op in session.armed() {
            if let Err(e) = registry.disarm(session.id, op) {
                warn!(session = %session.id, ?op, error = %e, "failed to cancel poll");
            }
        }
        // a half-open session was never counted
        if session.is_established() {
            self.policy
                .update(LoadChange::Closed, &session.server, session.id);
        }
        debug!(
            session = %session.id,
            client = ?session.client_addr,
            upstream = %session.server,
            closed_by = ?endpoint.side,
            established = session.is_established(),
            "session closed"
        );
        // both streams close here
        drop(session);
        true
    }

    /// Abandon every session whose upstream handshake has been pending for
    /// the connect timeout or longer as of `now`.
    ///
    /// Returns one `UpstreamConnect` error per abandoned session for the
    /// caller to report.
    pub fn expire_connects<R: Registry>(
        &mut self,
        registry: &mut R,
        now: Instant,
    ) -> Vec<BalancerError> {
        let timeout = self.connect_timeout;
        let expired: Vec<(SessionId, Server)> = self
            .sessions
            .values()
            .filter(|s| {
                s.connecting_since
                    .is_some_and(|since| now.saturating_duration_since(since) >= timeout)
            })
            .map(|s| (s.id, s.server))
            .collect();

        expired
            .into_iter()
            .map(|(id, server)| {
                self.delete(registry, Endpoint::upstream(id));
                BalancerError::UpstreamConnect {
                    server,
                    source: io::ErrorKind::TimedOut.into(),
                }
            })
            .collect()
    }

    /// The other end of `endpoint`'s session, if the session is live.
    pub fn peer_of(&self, endpoint: Endpoint) -> Option<Endpoint> {
        self.sessions
            .contains_key(&endpoint.session)
            .then(|| endpoint.opposite())
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
