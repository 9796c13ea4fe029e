use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::os::fd::AsRawFd;

use tracing::{debug, trace, warn};

use crate::core::constants::LISTENER_ID;
use crate::core::session::{Endpoint, Session, SessionId};
use crate::core::socket::connect_result;
use crate::core::stream_pump::{Direction, Operation, Side};
use crate::error::BalancerError;
use crate::upstream::Policy;

use super::connection_table::ConnectionTable;
use super::registry::Registry;

/// What a relay step left the session in.
enum Relay {
    Open,
    PeerClosed,
    Failed(io::Error),
}

fn poll_error(res: i32) -> io::Error {
    io::Error::from_raw_os_error(-res)
}

/// Listener became readable: accept one client and route it.
pub fn handle_accept<P: Policy, R: Registry>(
    registry: &mut R,
    listener: &TcpListener,
    table: &mut ConnectionTable<P>,
    res: i32,
) -> Result<(), BalancerError> {
    // keep accepting whatever happens to this client
    registry
        .arm(listener.as_raw_fd(), SessionId::new(LISTENER_ID), Operation::Accept)
        .map_err(BalancerError::Submission)?;

    if res < 0 {
        warn!(error = %poll_error(res), "listener poll failed");
        return Ok(());
    }

    let (client, peer) = match listener.accept() {
        Ok(accepted) => accepted,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
        Err(e) => return Err(BalancerError::Accept(e)),
    };
    debug!(%peer, "accepted connection");

    let server = table.policy_mut().select_server();
    table.add(registry, client, server)?;
    Ok(())
}

/// Upstream of a half-open session became writable, or its handshake failed.
///
/// On success the session starts relaying. On failure it is dropped, which
/// closes the client, and the error is returned for the loop to report.
pub fn handle_connect<P: Policy, R: Registry>(
    registry: &mut R,
    table: &mut ConnectionTable<P>,
    id: SessionId,
    res: i32,
) -> Result<(), BalancerError> {
    let Some(session) = table.get_mut(id) else {
        return Ok(());
    };
    session.connect_armed = false;
    let server = session.server;

    let outcome = if res < 0 {
        Err(poll_error(res))
    } else {
        connect_result(session.stream(Side::Upstream))
    };

    match outcome {
        Ok(true) => table.establish(registry, id),
        Ok(false) => {
            registry
                .arm(session.fd(Side::Upstream), id, Operation::Connect)
                .map_err(BalancerError::Submission)?;
            session.connect_armed = true;
            Ok(())
        }
        Err(source) => {
            table.delete(registry, Endpoint::upstream(id));
            Err(BalancerError::UpstreamConnect { server, source })
        }
    }
}

/// Source of `dir` became readable.
pub fn handle_readable<P: Policy, R: Registry>(
    registry: &mut R,
    table: &mut ConnectionTable<P>,
    id: SessionId,
    dir: Direction,
    res: i32,
) -> Result<(), BalancerError> {
    let source = Endpoint::new(id, dir.source());
    // torn down earlier in this batch
    let Some(target) = table.peer_of(source) else {
        return Ok(());
    };
    let Some(session) = table.get_mut(id) else {
        return Ok(());
    };
    session.pump_mut(dir).recv_armed = false;

    let outcome = if res < 0 {
        Relay::Failed(poll_error(res))
    } else {
        match read_source(session, dir) {
            Ok(0) => Relay::PeerClosed,
            Ok(n) => {
                let pump = session.pump_mut(dir);
                pump.bytes_ready_to_send = n;
                pump.bytes_already_sent = 0;
                trace!(session = %id, ?dir, bytes = n, "read");
                flush(registry, session, dir, target.side)?
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                rearm_source(registry, session, dir)?;
                Relay::Open
            }
            Err(e) => Relay::Failed(e),
        }
    };

    finish(registry, table, source, outcome);
    Ok(())
}

/// Destination of `dir` can take the bytes left over from a short write.
pub fn handle_writable<P: Policy, R: Registry>(
    registry: &mut R,
    table: &mut ConnectionTable<P>,
    id: SessionId,
    dir: Direction,
    res: i32,
) -> Result<(), BalancerError> {
    let Some(target) = table.peer_of(Endpoint::new(id, dir.source())) else {
        return Ok(());
    };
    let Some(session) = table.get_mut(id) else {
        return Ok(());
    };
    session.pump_mut(dir).send_armed = false;

    let outcome = if res < 0 {
        Relay::Failed(poll_error(res))
    } else {
        flush(registry, session, dir, target.side)?
    };

    finish(registry, table, target, outcome);
    Ok(())
}

fn read_source(session: &mut Session, dir: Direction) -> io::Result<usize> {
    let (streams, pump) = session.split(dir);
    let mut source = streams.side(dir.source());
    loop {
        match source.read(&mut pump.buffer) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Write the pump's pending bytes to the `to` side of the session.
///
/// When everything is out the source is armed for the next read. When the
/// destination would block the rest stays in the pump and the destination is
/// armed for writability; the source is not read again until it drains.
fn flush<R: Registry>(
    registry: &mut R,
    session: &mut Session,
    dir: Direction,
    to: Side,
) -> Result<Relay, BalancerError> {
    let id = session.id;
    let (streams, pump) = session.split(dir);
    let mut dest = streams.side(to);

    while pump.has_pending() {
        match dest.write(pump.pending()) {
            Ok(0) => return Ok(Relay::Failed(io::ErrorKind::WriteZero.into())),
            Ok(n) => pump.bytes_already_sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                registry
                    .arm(dest.as_raw_fd(), id, Operation::Send(dir))
                    .map_err(BalancerError::Submission)?;
                pump.send_armed = true;
                trace!(session = %id, ?dir, pending = pump.pending().len(), "destination full");
                return Ok(Relay::Open);
            }
            Err(e) => return Ok(Relay::Failed(e)),
        }
    }

    pump.reset_buffer();
    rearm_source(registry, session, dir)?;
    Ok(Relay::Open)
}

fn rearm_source<R: Registry>(
    registry: &mut R,
    session: &mut Session,
    dir: Direction,
) -> Result<(), BalancerError> {
    registry
        .arm(session.fd(dir.source()), session.id, Operation::Recv(dir))
        .map_err(BalancerError::Submission)?;
    session.pump_mut(dir).recv_armed = true;
    Ok(())
}

fn finish<P: Policy, R: Registry>(
    registry: &mut R,
    table: &mut ConnectionTable<P>,
    endpoint: Endpoint,
    outcome: Relay,
) {
    match outcome {
        Relay::Open => {}
        Relay::PeerClosed => {
            debug!(session = %endpoint.session, side = ?endpoint.side, "peer closed");
            table.delete(registry, endpoint);
        }
        Relay::Failed(e) => {
            debug!(session = %endpoint.session, side = ?endpoint.side, error = %e, "relay failed");
            table.delete(registry, endpoint);
        }
    }
}
