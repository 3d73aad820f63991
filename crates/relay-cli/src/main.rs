//! Command-line interface for stock-relay
//!
//! Exposes a local stock-analysis MCP server to the internet through a
//! Cloudflare tunnel.
//!
//! # Usage
//!
//! ```bash
//! # One-time setup
//! stock-relay bootstrap
//! stock-relay register --hostname stocks.example.com
//!
//! # Every session
//! stock-relay run
//! ```

mod doctor;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use relay_core::{ConfigOverrides, RelayConfig, ShutdownPolicy, SystemRunner, Variant};
use relay_env::Bootstrapper;
use relay_launcher::{LaunchPlan, ProcessLauncher, WaitOutcome};
use relay_tunnel::Registrar;
use relay_utils::{LogOptions, init_tracing};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "stock-relay", version)]
#[command(about = "Run the stock-analysis MCP server behind a Cloudflare tunnel", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Configuration file (default: user config merged under ./stock-relay.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Server port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Server host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Cloudflare tunnel name
    #[arg(long, global = true)]
    tunnel_name: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the Python environment and install the server's packages
    Bootstrap {
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
    },
    /// Create the tunnel and bind the local tunnel config to it
    Register {
        /// Skip `cloudflared tunnel login` when a certificate already exists
        #[arg(long)]
        skip_login: bool,

        /// Public hostname to route to the tunnel
        #[arg(long)]
        hostname: Option<String>,
    },
    /// Start the server, then the tunnel, and wait for Ctrl-C
    Run {
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,

        /// Leave both processes running on exit
        #[arg(long)]
        detach: bool,

        /// Do not bootstrap the environment first
        #[arg(long)]
        no_bootstrap: bool,
    },
    /// Check the local setup without changing anything
    Doctor,
    /// Print the effective configuration as JSON
    Config,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VariantArg {
    Venv,
    Uv,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Venv => Variant::Venv,
            VariantArg::Uv => Variant::Uv,
        }
    }
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            host: self.global.host.clone(),
            port: self.global.port,
            tunnel_name: self.global.tunnel_name.clone(),
            ..Default::default()
        };

        match &self.command {
            Commands::Bootstrap { variant } => overrides.variant = variant.map(Into::into),
            Commands::Register { hostname, .. } => overrides.hostname = hostname.clone(),
            Commands::Run {
                variant, detach, ..
            } => {
                overrides.variant = variant.map(Into::into);
                if *detach {
                    overrides.shutdown_policy = Some(ShutdownPolicy::Detach);
                }
            }
            Commands::Doctor | Commands::Config => {}
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(LogOptions {
        verbosity: cli.global.verbose,
        json: cli.global.json_logs,
    });

    let mut config = RelayConfig::load_merged(cli.global.config.as_deref())
        .context("Failed to load configuration")?;
    config.apply_overrides(cli.overrides());
    config.validate()?;

    match cli.command {
        Commands::Bootstrap { .. } => bootstrap(&config).await,
        Commands::Register { skip_login, .. } => register(config, skip_login).await,
        Commands::Run { no_bootstrap, .. } => run(&config, no_bootstrap).await,
        Commands::Doctor => doctor(&config).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn bootstrap(config: &RelayConfig) -> anyhow::Result<()> {
    let bootstrapper = Bootstrapper::new(config.environment.clone(), Arc::new(SystemRunner));
    let report = bootstrapper.run().await.context("Bootstrap failed")?;

    info!(
        "Environment ready ({}): created={}, manifest written={}",
        report.variant, report.environment_created, report.manifest_written
    );
    Ok(())
}

async fn register(config: RelayConfig, skip_login: bool) -> anyhow::Result<()> {
    let registration = Registrar::new(config, Arc::new(SystemRunner))
        .with_skip_login(skip_login)
        .register()
        .await
        .context("Tunnel registration failed")?;

    println!("{}", registration.guidance);
    Ok(())
}

async fn run(config: &RelayConfig, no_bootstrap: bool) -> anyhow::Result<()> {
    if !no_bootstrap {
        bootstrap(config).await?;
    }

    let policy = config.launch.shutdown.policy;
    let ctrl_c = interrupted();
    tokio::pin!(ctrl_c);

    // Dropping an unfinished launch kills the server it already started
    let launcher = ProcessLauncher::new(LaunchPlan::from_config(config));
    let mut supervisor = tokio::select! {
        launched = launcher.launch() => {
            launched.context("Launch failed")?
        }
        () = &mut ctrl_c => {
            warn!("Interrupted before the tunnel started, server stopped");
            return Ok(());
        }
    };

    println!("{}", supervisor.report(policy));

    let outcome = supervisor.wait(ctrl_c).await;
    let summary = supervisor
        .shutdown(policy, config.launch.shutdown.grace())
        .await;
    let outcome = outcome?;
    let summary = summary?;
    info!("Shutdown: {:?}", summary);

    if policy == ShutdownPolicy::Detach {
        let (server_pid, tunnel_pid) = supervisor.pids();
        println!("Processes left running. Stop them with: kill {server_pid} {tunnel_pid}");
    }

    match outcome {
        WaitOutcome::Interrupted => Ok(()),
        WaitOutcome::ChildExited { role, code } => {
            bail!("The {role} exited unexpectedly (exit code {code:?})")
        }
    }
}

/// Resolves on Ctrl-C, or never if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler only a child exit can end the wait
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn doctor(config: &RelayConfig) -> anyhow::Result<()> {
    let report = doctor::diagnose(config).await;
    println!("{}", report.table());

    let failures = report.failures();
    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    Ok(())
}
