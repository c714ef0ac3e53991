//! # SPV Wallet
//!
//! Keeps a validated Bitcoin header chain in sync with a pool of Electrum
//! servers.
//!
//! ```text
//! spv-wallet --config wallet.toml
//! spv-wallet --chain regtest --server 127.0.0.1:50001:t --header-file /tmp/h.bin
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use spv_04_network_coordinator::TcpConnector;
use spv_telemetry::{init_logging, TelemetryConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use wallet_runtime::config::ServerEntry;
use wallet_runtime::{WalletConfig, WalletRuntime};

#[derive(Parser, Debug)]
#[command(name = "spv-wallet")]
#[command(author, version, about = "SPV header sync against Electrum servers", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chain preset (mainnet, regtest); overrides the file
    #[arg(long)]
    chain: Option<String>,

    /// Electrum server as host:port:t; repeatable, replaces the file's list
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Header file location; overrides the file
    #[arg(long)]
    header_file: Option<PathBuf>,

    /// Log level or filter directive
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn wallet_config(&self) -> Result<WalletConfig> {
        let mut config = match &self.config {
            Some(path) => WalletConfig::load(path)?,
            None => WalletConfig::default(),
        };
        if let Some(chain) = &self.chain {
            config.network.chain = chain.clone();
        }
        if !self.servers.is_empty() {
            config.servers = self
                .servers
                .iter()
                .map(|address| ServerEntry {
                    address: address.clone(),
                })
                .collect();
        }
        if let Some(path) = &self.header_file {
            config.network.header_file = path.clone();
        }
        config.validate()?;
        Ok(config)
    }

    fn telemetry(&self) -> TelemetryConfig {
        let mut telemetry = TelemetryConfig::from_env();
        if let Some(level) = &self.log_level {
            telemetry = telemetry.with_level(level.clone());
        }
        if self.json_logs {
            telemetry.json_logs = true;
        }
        telemetry
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.telemetry()).context("Failed to initialize logging")?;

    let config = cli.wallet_config().context("Failed to load configuration")?;
    info!(
        chain = %config.network.chain,
        servers = config.servers.len(),
        header_file = %config.network.header_file.display(),
        "Starting spv-wallet v{}",
        env!("CARGO_PKG_VERSION")
    );

    let runtime = WalletRuntime::start(&config, Arc::new(TcpConnector))?;

    info!("Wallet is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown().await?;
    Ok(())
}
