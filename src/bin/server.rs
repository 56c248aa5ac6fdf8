//! ghost-world-server binary
//!
//! Serves the entity API and runs the viewer TTL sweep.
//!
//! ## Configuration (TOML file and env via `config` crate, CLI overrides)
//!
//! | Key                           | Default        | Description                        |
//! |-------------------------------|----------------|------------------------------------|
//! | `GHOST__BIND_ADDR`            | `0.0.0.0:6000` | HTTP listen address                |
//! | `GHOST__VIEWER_TTL_SECS`      | `30`           | Viewer position lifetime           |
//! | `GHOST__SWEEP_INTERVAL_SECS`  | `5`            | Viewer sweep period                |
//! | `GHOST__MAX_RESULTS`          | `100`          | Cap on entities per query          |
//! | `GHOST__DEFAULT_RADIUS_M`     | `1000`         | Radius when a query omits one      |
//! | `GHOST__GENERATOR__ENDPOINT`  | unset          | Chat-completions base URL          |
//! | `GHOST__GENERATOR__API_KEY`   | unset          | Chat-completions key               |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ghost_world::{
    generator::{ChatCompletionsGenerator, ContentGenerator, OfflineGenerator},
    http::{router, AppState},
    types::ServiceConfig,
    viewers::spawn_sweeper,
};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ghost-world-server", about = "Ghost World entity service", version)]
struct Args {
    /// Optional TOML config file
    #[arg(long, short, env = "GHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long, env = "GHOST_BIND")]
    bind: Option<String>,

    /// Verbose logging for this crate
    #[arg(long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<ServiceConfig> {
    // Unset keys fall back to `ServiceConfig::default()` via `#[serde(default)]`.
    let mut builder = config::Config::builder();
    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::from(path.as_path()).required(true));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("GHOST")
            .prefix_separator("__")
            .separator("__"),
    );

    let mut cfg: ServiceConfig = builder
        .build()
        .context("failed to load configuration")?
        .try_deserialize()
        .context("invalid configuration")?;

    if let Some(bind) = &args.bind {
        cfg.bind_addr = bind.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let directive = if args.debug {
        "ghost_world=debug,tower_http=debug"
    } else {
        "ghost_world=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    let config = load_config(&args)?;

    let generator: Arc<dyn ContentGenerator> = match config.generator.clone() {
        Some(g) => Arc::new(ChatCompletionsGenerator::new(g)?),
        None => {
            log::warn!("no generator endpoint configured, using offline generator");
            Arc::new(OfflineGenerator)
        }
    };

    log::info!(
        "Starting ghost-world-server (bind={}, generator={}, viewer_ttl={}s, max_results={})",
        config.bind_addr,
        generator.name(),
        config.viewer_ttl_secs,
        config.max_results,
    );

    let state = AppState::new(config.clone(), generator);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        state.viewers.clone(),
        config.sweep_interval(),
        config.viewer_ttl(),
        shutdown_rx,
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    log::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("failed to listen for ctrl-c: {}", e);
            }
            log::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    sweeper.await.ok();
    log::info!("ghost-world-server stopped");
    Ok(())
}
