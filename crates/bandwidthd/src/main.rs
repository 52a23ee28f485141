//! Bandwidth Controller Daemon Entry Point
//!
//! Reads `bandwidth` commands from stdin, one per line, and writes the
//! response lines to stdout. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use netd_bandwidthd::{BandwidthConfig, BandwidthCtrl, CommandHandler, QuotaUpdater};
use netd_common::{RealSyscalls, ShellIptables, SocketClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Bandwidth and data-quota policy controller
#[derive(Parser, Debug)]
#[command(name = "bandwidthd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = netd_bandwidthd::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Exempt system UIDs from the penalty path on every enable
    #[arg(long)]
    first_run: bool,

    /// Do not enable bandwidth control at startup
    #[arg(long)]
    no_enable: bool,
}

fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BandwidthConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    init_logging(&log_level);

    info!("Starting bandwidthd");

    let ipt = Arc::new(ShellIptables::new(config.iptables_paths()));
    let quota = QuotaUpdater::new(Arc::new(RealSyscalls), config.quota.quota_dir.clone());
    let mut ctrl = BandwidthCtrl::new(ipt, quota).with_system_uids(config.quota.system_uids);

    ctrl.setup_hooks()
        .await
        .context("failed to set up bandwidth chains")?;
    if !args.no_enable {
        ctrl.enable(args.first_run)
            .await
            .context("failed to enable bandwidth control")?;
    }

    let mut handler = CommandHandler::new(ctrl, args.first_run);
    let mut client =
        SocketClient::with_delimiter(tokio::io::stdout(), config.daemon.delimiter.byte());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("bandwidthd initialized successfully");

    while let Some(line) = lines.next_line().await.context("reading command")? {
        if let Err(e) = handler.handle_line(&mut client, &line).await {
            error!("Failed to send response: {}", e);
            return Err(e).context("response transport failed");
        }
    }

    info!("Input closed, exiting");
    Ok(())
}
