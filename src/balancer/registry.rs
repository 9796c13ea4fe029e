use std::io;
use std::os::fd::RawFd;

use io_uring::IoUring;

use crate::core::session::SessionId;
use crate::core::stream_pump::Operation;

use super::uring_ops::{post_poll, post_poll_remove};

/// Where sockets are registered for readiness.
///
/// Registrations are one-shot: after the completion for `(id, op)` is
/// delivered the socket must be armed again to hear about it.
pub trait Registry {
    fn arm(&mut self, fd: RawFd, id: SessionId, op: Operation) -> io::Result<()>;

    fn disarm(&mut self, id: SessionId, op: Operation) -> io::Result<()>;
}

impl Registry for IoUring {
    fn arm(&mut self, fd: RawFd, id: SessionId, op: Operation) -> io::Result<()> {
        post_poll(self, fd, id.get(), op)
    }

    fn disarm(&mut self, id: SessionId, op: Operation) -> io::Result<()> {
        post_poll_remove(self, id.get(), op)
    }
}
