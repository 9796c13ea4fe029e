//! Shared fixtures for integration tests
//!
//! Runs the balancer on its own thread against loopback upstreams. Every
//! upstream connection is served on its own thread and reports what it saw
//! over channels.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use sluice::{BalancerConfig, BalancerError, LoadBalancer, PolicyKind, ServerPool, Strategy};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct Running {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), BalancerError>>,
}

impl Running {
    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream
    }

    /// Request shutdown and wait for the loop to exit.
    pub fn stop(self) -> Result<(), BalancerError> {
        self.shutdown.store(true, Ordering::Release);
        self.handle.join().expect("balancer thread panicked")
    }
}

/// Start a balancer, or `None` when io_uring is not available here.
pub fn start(policy: PolicyKind, servers: Vec<SocketAddr>) -> Option<Running> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let config = BalancerConfig {
            tick_interval: Duration::from_millis(50),
            ..BalancerConfig::new("127.0.0.1:0".parse().unwrap(), servers.clone(), policy)
        };
        let pool = ServerPool::from_addrs(servers).unwrap();
        let mut balancer = match LoadBalancer::bind(&config, Strategy::new(policy, pool), flag) {
            Ok(balancer) => balancer,
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
                return Ok(());
            }
        };
        tx.send(Ok(balancer.local_addr().unwrap())).unwrap();
        balancer.run()
    });

    match rx.recv().unwrap() {
        Ok(addr) => Some(Running {
            addr,
            shutdown,
            handle,
        }),
        Err(reason) => {
            eprintln!("skipping: balancer unavailable: {reason}");
            None
        }
    }
}

/// Upstream that greets every connection with `tag`, then drains it.
///
/// The receiver gets one message per connection once the balancer closes it.
pub fn tagged_upstream(tag: &'static [u8]) -> (SocketAddr, Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let closed_tx = closed_tx.clone();
            thread::spawn(move || {
                if stream.write_all(tag).is_err() {
                    return;
                }
                let mut sink = [0u8; 1024];
                while let Ok(n) = stream.read(&mut sink) {
                    if n == 0 {
                        break;
                    }
                }
                let _ = closed_tx.send(());
            });
        }
    });

    (addr, closed_rx)
}

/// Upstream that answers each `PING` with `PONG`.
///
/// Reports every byte it received per connection once that connection closes.
pub fn ping_upstream() -> (SocketAddr, Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let tx = tx.clone();
            thread::spawn(move || {
                let mut received = Vec::new();
                let mut buf = [0u8; 4];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            received.extend_from_slice(&buf[..n]);
                            if received.ends_with(b"PING") && stream.write_all(b"PONG").is_err() {
                                break;
                            }
                        }
                    }
                }
                let _ = tx.send(received);
            });
        }
    });

    (addr, rx)
}

/// Upstream that writes back everything it reads.
pub fn echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            thread::spawn(move || {
                let mut buf = [0u8; 16 * 1024];
                loop {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Upstream that accepts nothing and never completes a handshake.
///
/// Its accept queue has room for one connection, which is filled up front,
/// so further SYNs are dropped. Dropping it frees the port.
pub struct SilentUpstream {
    pub addr: SocketAddr,
    _listener: Socket,
    _queued: Vec<TcpStream>,
}

pub fn silent_upstream() -> SilentUpstream {
    let listener = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap();
    listener
        .bind(&SocketAddr::from(([127, 0, 0, 1], 0)).into())
        .unwrap();
    listener.listen(0).unwrap();
    let addr = listener.local_addr().unwrap().as_socket().unwrap();

    let mut queued = Vec::new();
    for _ in 0..2 {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
            Ok(stream) => queued.push(stream),
            Err(_) => break,
        }
    }
    SilentUpstream {
        addr,
        _listener: listener,
        _queued: queued,
    }
}

/// An address nothing listens on.
pub fn dead_upstream() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}

pub fn read_tag(stream: &mut TcpStream) -> Vec<u8> {
    let mut tag = [0u8; 2];
    stream.read_exact(&mut tag).unwrap();
    tag.to_vec()
}
