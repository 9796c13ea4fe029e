use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::info;

use sluice::{BalancerConfig, PolicyKind};

#[derive(Parser, Debug)]
#[command(name = "sluice", version, about = "Single-threaded TCP load balancer")]
struct Cli {
    /// Load balancer port
    #[arg(short = 'p', long, default_value_t = 8080)]
    port: u16,

    /// Upstream server ports
    #[arg(short = 's', long, num_args = 1.., required = true)]
    servers: Vec<u16>,

    /// Address to listen on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// Host the upstream servers run on
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    upstream_host: IpAddr,

    /// Load balancing policy
    #[arg(long, value_enum, default_value_t = PolicyKind::N2One)]
    policy: PolicyKind,

    /// Bytes read per readiness event
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "debug")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> BalancerConfig {
        let servers = self
            .servers
            .iter()
            .map(|port| SocketAddr::new(self.upstream_host, *port))
            .collect();
        let mut config =
            BalancerConfig::new(SocketAddr::new(self.bind, self.port), servers, self.policy);
        if let Some(size) = self.buffer_size {
            config.io_buffer_capacity = size.max(1);
        }
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let config = cli.config();
    info!(
        listen = %config.listen_addr,
        servers = ?config.servers,
        policy = ?config.policy,
        "starting sluice"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("failed to register handler for signal {signal}"))?;
    }

    sluice::run(&config, shutdown).context("load balancer failed")
}
