//! io_uring SQE submission helpers
//!
//! The ring is used as a readiness multiplexer: one-shot `POLL_ADD` entries
//! stand for "wake me when this socket is readable/writable", `POLL_REMOVE`
//! unregisters them and a `TIMEOUT` entry keeps the loop ticking.

use std::io;
use std::os::fd::RawFd;

use io_uring::{IoUring, opcode, squeue, types};

use crate::core::constants::LISTENER_ID;
use crate::core::stream_pump::Operation;
use crate::core::user_data::pack_user_data;

/// Queue an entry, flushing the submission queue to the kernel once if it is full.
fn push_sqe(ring: &mut IoUring, sqe: &squeue::Entry) -> io::Result<()> {
    // SAFETY: none of our entries point at memory that can go away before
    // completion (polls carry no buffers, the tick timespec is boxed by the
    // loop that owns the ring).
    if unsafe { ring.submission().push(sqe) }.is_ok() {
        return Ok(());
    }
    ring.submit()?;
    unsafe { ring.submission().push(sqe) }
        .map_err(|_| io::Error::other("submission queue full"))
}

/// Post a one-shot readiness poll for `op` on `fd`.
pub fn post_poll(ring: &mut IoUring, fd: RawFd, id: u64, op: Operation) -> io::Result<()> {
    let Some(mask) = op.poll_mask() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{op:?} is not a poll operation"),
        ));
    };
    let sqe = opcode::PollAdd::new(types::Fd(fd), mask)
        .build()
        .user_data(pack_user_data(id, op));
    push_sqe(ring, &sqe)
}

/// Cancel an outstanding poll.
///
/// The cancelled poll completes with `-ECANCELED` under its own tag; the
/// removal completes under `Operation::Cancel`.
pub fn post_poll_remove(ring: &mut IoUring, id: u64, op: Operation) -> io::Result<()> {
    let sqe = opcode::PollRemove::new(pack_user_data(id, op))
        .build()
        .user_data(pack_user_data(id, Operation::Cancel));
    push_sqe(ring, &sqe)
}

/// Post the periodic wake-up so an idle loop still observes shutdown requests.
pub fn post_tick(ring: &mut IoUring, interval: &types::Timespec) -> io::Result<()> {
    let sqe = opcode::Timeout::new(interval)
        .build()
        .user_data(pack_user_data(LISTENER_ID, Operation::Tick));
    push_sqe(ring, &sqe)
}
