//! pinpay gateway: charges for uploads on a ledger before pinning them
//! to IPFS, and serves back whatever the node has pinned.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use service::config::StorageConfig;
use service::Config;

mod process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (defaults to ~/.pinpay/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on for HTTP requests
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Kubo RPC API to pin content through
    #[arg(long, conflicts_with = "memory")]
    kubo_url: Option<Url>,

    /// Use an in-process storage network instead of Kubo
    #[arg(long)]
    memory: bool,

    /// Base URL handed back to uploaders for fetching their content
    #[arg(long)]
    public_gateway_url: Option<Url>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(api_url) = self.kubo_url {
            config.storage = StorageConfig::Kubo { api_url };
        }
        if self.memory {
            config.storage = StorageConfig::Memory;
        }
        if let Some(url) = self.public_gateway_url {
            config.public_gateway_url = url;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    args.apply(&mut config);

    let log_level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let _guard = process::init_logging(log_level);

    process::spawn_service(&config).await
}
