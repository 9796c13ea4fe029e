use std::fmt;
use std::net::SocketAddr;
use std::ops::Index;
use std::sync::Arc;

use crate::error::BalancerError;

/// Identity of one upstream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Server {
    pub address: SocketAddr,
}

impl Server {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl From<SocketAddr> for Server {
    fn from(address: SocketAddr) -> Self {
        Self::new(address)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.address.fmt(f)
    }
}

/// Ordered, non-empty and immutable list of upstream servers.
///
/// Pool order matters: it is the round-robin cycle order and the tie-break
/// order for the load-aware policies. Cloning is cheap, every policy keeps
/// its own handle.
#[derive(Debug, Clone)]
pub struct ServerPool {
    servers: Arc<[Server]>,
}

impl ServerPool {
    pub fn new(servers: Vec<Server>) -> Result<Self, BalancerError> {
        if servers.is_empty() {
            return Err(BalancerError::EmptyPool);
        }
        for (i, server) in servers.iter().enumerate() {
            if servers[..i].contains(server) {
                return Err(BalancerError::DuplicateServer(*server));
            }
        }
        Ok(Self {
            servers: servers.into(),
        })
    }

    pub fn from_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Result<Self, BalancerError> {
        Self::new(addrs.into_iter().map(Server::new).collect())
    }

    pub fn first(&self) -> Server {
        // non-empty by construction
        self.servers[0]
    }

    pub fn position(&self, server: &Server) -> Option<usize> {
        self.servers.iter().position(|s| s == server)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Server> {
        self.servers.iter()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

impl Index<usize> for ServerPool {
    type Output = Server;

    fn index(&self, index: usize) -> &Server {
        &self.servers[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn empty_pool_is_rejected() {
        let err = ServerPool::new(Vec::new()).unwrap_err();
        assert!(matches!(err, BalancerError::EmptyPool));
        assert!(!err.is_session_local());
    }

    #[test]
    fn duplicate_server_is_rejected() {
        let err = ServerPool::from_addrs([addr(9001), addr(9002), addr(9001)]).unwrap_err();
        assert!(matches!(err, BalancerError::DuplicateServer(s) if s.address == addr(9001)));
    }

    #[test]
    fn pool_keeps_configured_order() {
        let pool = ServerPool::from_addrs([addr(9003), addr(9001), addr(9002)]).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.first().address, addr(9003));
        assert_eq!(pool[2].address, addr(9002));
        assert_eq!(pool.position(&Server::new(addr(9001))), Some(1));
        assert_eq!(pool.position(&Server::new(addr(9999))), None);
    }
}
