use std::io;

use thiserror::Error;

use crate::upstream::Server;

#[derive(Debug, Error)]
pub enum BalancerError {
    /// No upstream servers were configured.
    #[error("server pool is empty")]
    EmptyPool,

    #[error("server {0} is configured more than once")]
    DuplicateServer(Server),

    #[error("failed to listen")]
    Listen(#[source] io::Error),

    /// The io_uring instance could not be created.
    #[error("failed to set up the event ring")]
    Reactor(#[source] io::Error),

    /// Queueing or submitting work to the ring failed. The loop cannot go on.
    #[error("event ring submission failed")]
    Submission(#[source] io::Error),

    #[error("failed to accept client")]
    Accept(#[source] io::Error),

    #[error("failed to prepare client socket")]
    ClientSetup(#[source] io::Error),

    #[error("failed to connect to upstream {server}")]
    UpstreamConnect {
        server: Server,
        #[source]
        source: io::Error,
    },
}

impl BalancerError {
    /// Errors that only cost the session being set up.
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            BalancerError::Accept(_)
                | BalancerError::ClientSetup(_)
                | BalancerError::UpstreamConnect { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let server = Server::new("127.0.0.1:9001".parse().unwrap());
        let refused = || io::Error::from(io::ErrorKind::ConnectionRefused);

        assert!(BalancerError::UpstreamConnect { server, source: refused() }.is_session_local());
        assert!(BalancerError::Accept(refused()).is_session_local());
        assert!(!BalancerError::Submission(refused()).is_session_local());
        assert!(!BalancerError::Reactor(refused()).is_session_local());
        assert!(!BalancerError::EmptyPool.is_session_local());
    }

    #[test]
    fn connect_error_names_the_server() {
        let server = Server::new("127.0.0.1:9001".parse().unwrap());
        let err = BalancerError::UpstreamConnect {
            server,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert!(err.to_string().contains("127.0.0.1:9001"));
    }

    #[test]
    fn io_cause_is_chained_not_repeated() {
        use std::error::Error as _;

        let server = Server::new("127.0.0.1:9001".parse().unwrap());
        let cause = io::Error::new(io::ErrorKind::ConnectionRefused, "nobody home");
        let errors = [
            BalancerError::UpstreamConnect {
                server,
                source: io::Error::new(cause.kind(), "nobody home"),
            },
            BalancerError::Listen(io::Error::new(cause.kind(), "nobody home")),
            BalancerError::Submission(cause),
        ];
        for err in errors {
            assert!(!err.to_string().contains("nobody home"), "{err}");
            assert_eq!(err.source().unwrap().to_string(), "nobody home");
        }
    }
}
