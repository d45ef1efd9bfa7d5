//! cfgridd — the cfgrid daemon.
//!
//! Single binary that opens the KV backend, builds the config and group
//! stores over it, and serves the REST API with request metrics and an
//! optional rate limit.
//!
//! # Usage
//!
//! ```text
//! cfgridd serve --config /etc/cfgrid/cfgridd.toml --port 8000 --data-dir /var/lib/cfgrid
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cfgrid_api::{ApiState, RateLimit};
use cfgrid_state::{ConfigGroupStore, ConfigStore, IdempotencyGate, RedbKv, SharedKv};

use crate::config::{Backend, DaemonConfig, LogFormat};

#[derive(Parser)]
#[command(name = "cfgridd", about = "cfgrid configuration store daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API.
    Serve {
        /// TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the redb file.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// KV backend.
        #[arg(long, value_enum)]
        backend: Option<Backend>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            backend,
        } => {
            let mut daemon = match config {
                Some(path) => DaemonConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => DaemonConfig::default(),
            };
            if let Some(port) = port {
                daemon.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                daemon.store.data_dir = data_dir;
            }
            if let Some(backend) = backend {
                daemon.store.backend = backend;
            }

            init_tracing(&daemon)?;
            run_server(daemon).await
        }
    }
}

fn init_tracing(daemon: &DaemonConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&daemon.log.filter)
            .with_context(|| format!("invalid log filter {:?}", daemon.log.filter))?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match daemon.log.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

fn open_kv(daemon: &DaemonConfig) -> anyhow::Result<SharedKv> {
    let kv = match daemon.store.backend {
        Backend::Redb => {
            std::fs::create_dir_all(&daemon.store.data_dir)?;
            let db_path = daemon.db_path();
            let kv = RedbKv::open(&db_path)?;
            info!(path = ?db_path, "redb store opened");
            kv
        }
        Backend::Memory => {
            let kv = RedbKv::open_in_memory()?;
            info!("in-memory store opened; state will not survive restart");
            kv
        }
    };
    Ok(kv.shared())
}

async fn run_server(daemon: DaemonConfig) -> anyhow::Result<()> {
    info!("cfgrid daemon starting");

    let kv = open_kv(&daemon)?;

    let mut gate = IdempotencyGate::new(kv.clone());
    if let Some(ttl) = daemon.idempotency.ttl() {
        gate = gate.with_ttl(ttl);
        info!(ttl_secs = ttl.as_secs(), "idempotency markers expire");
    }

    let mut state = ApiState::new(
        ConfigStore::new(kv.clone(), gate.clone()),
        ConfigGroupStore::new(kv, gate).with_max_cas_retries(daemon.store.max_cas_retries),
    );
    let limits = &daemon.rate_limit;
    if limits.enabled {
        let limit = RateLimit::new(limits.period(), limits.burst).with_context(|| {
            format!(
                "rate limit needs a non-zero period and burst, got {}ms / {}",
                limits.period_ms, limits.burst
            )
        })?;
        state = state.with_rate_limit(limit);
        info!(period_ms = limits.period_ms, burst = limits.burst, "rate limiting enabled");
    }

    let router = cfgrid_api::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], daemon.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("cfgrid daemon stopped");
    Ok(())
}
