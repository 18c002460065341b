mod config;
mod middleware;
mod seed;
mod signals;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::middleware::AdminRateLimiter;

/// ModelHub Server - multi-tenant model broker and gateway
#[derive(Parser)]
#[command(name = "modelhub-server")]
#[command(about = "ModelHub Server - multi-tenant model broker and gateway")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for the HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config {
        if !Path::new(path).is_file() {
            anyhow::bail!("config file does not exist: {}", path.to_string_lossy());
        }
    }

    init_logging(cli.verbose);

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (MODELHUB__*) -> 4) CLI
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_port_override(cli.port);

    tracing::info!("ModelHub Server starting");

    if cli.print_config {
        println!(
            "Effective configuration:\n{}",
            serde_json::to_string_pretty(&config)?
        );
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    // load() already validated shape and keys; surface the effective view.
    println!("Configuration is valid");
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    tracing::info!(
        models = config.hub.models.len(),
        tenants = config.hub.tenants.len(),
        "Seeding hub state"
    );
    let state = seed::build_hub(&config).await?;

    let admin_limiter = Arc::new(AdminRateLimiter::new(
        config.server.admin_rate_limit.rps,
        config.server.admin_rate_limit.burst,
    )?);
    let app = hub_gateway::router(state).layer(axum::middleware::from_fn_with_state(
        admin_limiter,
        middleware::admin_rate_limit,
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    tracing::info!(addr = %config.server.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(signals::wait_for_shutdown())
        .await
        .context("server error")
}
