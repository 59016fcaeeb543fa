//! ringq-migrate - migration progress relay
//!
//! Starts a data migration on the backend, reads its streamed log and turns
//! it into structured progress. Two ways to drive it:
//! - `run`: one migration in the foreground, progress rendered on stdout
//! - `serve`: local HTTP API (REST + SSE) for a desktop UI

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ringq_common::config::{default_config_path, load_or_default, write_toml_config, TomlConfig};
use ringq_common::events::RelayEvent;
use ringq_migrate::config::{CliOverrides, Settings};
use ringq_migrate::milestones::MilestoneTable;
use ringq_migrate::models::{MigrationRunState, RunStatus};
use ringq_migrate::AppState;
use tokio::signal;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for ringq-migrate
#[derive(Parser, Debug)]
#[command(name = "ringq-migrate")]
#[command(about = "Relays backend data-migration progress")]
#[command(version)]
struct Args {
    /// Config file (defaults to <config dir>/ringq/ringq-migrate.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Deadline for the whole migration request, 0 for none
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one migration in the foreground (Ctrl+C cancels)
    Run {
        /// JSON file forwarded as the migration request body
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Print relay events as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Serve the local HTTP API
    Serve {
        /// Port to listen on (127.0.0.1 only)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a config file with defaults and the built-in milestone table
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_or_default(args.config.as_deref());
    init_tracing(&toml_config)?;

    info!(
        "ringq-migrate {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let mut cli = CliOverrides {
        backend_url: args.backend_url.clone(),
        port: None,
        timeout_secs: args.timeout_secs,
    };

    match args.command {
        Command::Run { request, json } => {
            let settings = Settings::resolve(&toml_config, &cli)?;
            let request = load_request(request.as_deref())?;
            run_foreground(&settings, request, json).await
        }
        Command::Serve { port } => {
            cli.port = port;
            let settings = Settings::resolve(&toml_config, &cli)?;
            serve(&settings).await
        }
        Command::InitConfig { force } => {
            let path = args
                .config
                .or_else(default_config_path)
                .ok_or_else(|| anyhow!("Could not determine config directory; pass --config"))?;
            init_config(&path, force)
        }
    }
}

/// stderr (or the configured log file) with `RUST_LOG` taking precedence
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ringq_migrate={level},ringq_common={level},tower_http={level}").into()
    });

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn load_request(path: Option<&Path>) -> Result<serde_json::Value> {
    let Some(path) = path else {
        return Ok(serde_json::json!({}));
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Request file {} is not valid JSON", path.display()))
}

async fn run_foreground(settings: &Settings, request: serde_json::Value, json: bool) -> Result<()> {
    let state = AppState::from_settings(settings)?;
    let controller = state.controller;

    // Subscribe before starting so the first event is not missed
    let mut events = controller.subscribe();
    let run_id = controller.start(request).await?;
    info!(run_id = %run_id, backend = %settings.backend_url, "Migration started");

    let wait = controller.wait();
    tokio::pin!(wait);
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    let final_state = loop {
        tokio::select! {
            finished = &mut wait => break finished?,
            received = events.recv() => match received {
                Ok(event) => render(&event, json)?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress output lagged behind the relay");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
            _ = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                info!("Received Ctrl+C, cancelling migration");
                if let Err(e) = controller.cancel().await {
                    warn!(error = %e, "Cancel failed");
                }
            }
        }
    };

    // Events published just before the run finished
    loop {
        match events.try_recv() {
            Ok(event) => render(&event, json)?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    report(&final_state)
}

fn render(event: &RelayEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    if let Some(entry) = &event.new_log_entry {
        println!("[{:>3}%] {}  {}", event.progress, entry.timestamp, entry.message);
    }
    Ok(())
}

fn report(state: &MigrationRunState) -> Result<()> {
    match state.status {
        RunStatus::Completed => {
            info!(run_id = %state.run_id, "Migration completed");
            Ok(())
        }
        _ => bail!(
            "Migration failed at {}%: {}",
            state.progress,
            state.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn serve(settings: &Settings) -> Result<()> {
    let state = AppState::from_settings(settings)?;
    let controller = state.controller.clone();
    info!("Event bus initialized (capacity {})", state.event_bus.capacity());
    let app = ringq_migrate::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if controller.cancel().await.is_ok() {
        info!("Cancelled active migration on shutdown");
        let _ = controller.wait().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = TomlConfig::default();
    config.milestones = Some(MilestoneTable::builtin().to_config());
    write_toml_config(&config, path)?;

    println!("Wrote {}", path.display());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
