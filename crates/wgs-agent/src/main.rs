//! wgs agent daemon
//!
//! Brings the station link up, starts the tunnel to the configured peer and
//! keeps the throughput workload cycling. Runs until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wgs_agent::host::{IperfService, ProbeLinkDriver, SntpClient, UdpProbeTunnel};
use wgs_agent::sequencer::idle_until_cancelled;
use wgs_agent::tunnel::TunnelBootstrapper;
use wgs_agent::{BootOutcome, Collaborators, Sequencer};
use wgs_core::config::{self, FatalPolicy, SupervisorConfig};
use wgs_core::settings::FileSettingsStore;

/// How long a cancelled workload gets to stop cleanly
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, ValueEnum)]
enum FatalPolicyArg {
    Halt,
    Exit,
}

impl From<FatalPolicyArg> for FatalPolicy {
    fn from(arg: FatalPolicyArg) -> Self {
        match arg {
            FatalPolicyArg::Halt => FatalPolicy::Halt,
            FatalPolicyArg::Exit => FatalPolicy::Exit,
        }
    }
}

#[derive(Parser)]
#[command(name = "wgs-agent")]
#[command(about = "wgs agent - link, WireGuard tunnel and iperf workload supervisor")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Reconnect attempts before the link is declared failed
    #[arg(long)]
    max_retries: Option<u32>,

    /// Give up on the peer after this many seconds (default: wait forever)
    #[arg(long)]
    peer_timeout: Option<u64>,

    /// Tunnel peer endpoint (host or host:port)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// What to do after a fatal boot failure
    #[arg(long, value_enum)]
    fatal_policy: Option<FatalPolicyArg>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    let default_filter = format!(
        "{},wgs_agent::tunnel=debug,wgs_agent::host::tunnel=debug",
        log_level
    );
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or(default_filter),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("wgs agent starting...");

    let config = load_config(&args)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupted, shutting down"),
            Err(e) => tracing::warn!("Cannot listen for Ctrl-C: {}", e),
        }
        ctrl_c.cancel();
    });

    let tunnel = UdpProbeTunnel::new();
    let sequencer = Sequencer::new(
        config.clone(),
        Collaborators {
            settings: Arc::new(FileSettingsStore::new(config.settings.path.clone())),
            link: Arc::new(ProbeLinkDriver::new()),
            tunnel: tunnel.clone(),
            workload: Arc::new(IperfService::new()),
            clock: Arc::new(SntpClient::new(&config.time_sync)),
        },
    );

    match sequencer.run(cancel.clone()).await {
        BootOutcome::Running(system) => {
            tracing::info!("Tunnel to {} is up", system.session.endpoint());
            idle_until_cancelled(&cancel).await;

            if let Err(e) = TunnelBootstrapper::new(tunnel).teardown(system.session).await {
                tracing::warn!("Tunnel teardown: {}", e);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, system.workload_task)
                .await
                .is_err()
            {
                tracing::warn!("Workload did not stop within {:?}", SHUTDOWN_GRACE);
            }
            Ok(())
        }
        BootOutcome::Halted(error) => match config.fatal_policy {
            FatalPolicy::Halt => {
                tracing::error!("Halting due to error: {}", error);
                idle_until_cancelled(&cancel).await;
                Ok(())
            }
            FatalPolicy::Exit => Err(error).context("Boot failed"),
        },
        BootOutcome::Cancelled => {
            tracing::info!("Boot cancelled");
            Ok(())
        }
    }
}

/// Read the config file and apply command-line overrides
fn load_config(args: &Args) -> Result<SupervisorConfig> {
    let mut config = match &args.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let path = config::default_config_path();
            if path.exists() {
                config::load_config(&path)
                    .with_context(|| format!("Failed to load config from {:?}", path))?
            } else {
                tracing::info!("No config at {:?}, using defaults", path);
                SupervisorConfig::default()
            }
        }
    };

    if let Some(max_retries) = args.max_retries {
        config.link.max_retries = max_retries;
    }
    if let Some(secs) = args.peer_timeout {
        config.peer_wait.max_wait = Some(Duration::from_secs(secs));
    }
    if let Some(endpoint) = &args.endpoint {
        config
            .tunnel
            .set_endpoint(endpoint)
            .with_context(|| format!("Invalid --endpoint {:?}", endpoint))?;
    }
    if let Some(policy) = args.fatal_policy {
        config.fatal_policy = policy.into();
    }
    config
        .time_sync
        .utc_offset()
        .context("Invalid time sync settings")?;

    Ok(config)
}
