//! ghost-world-client binary
//!
//! Headless viewer: reports a fixed position, polls nearby entities, runs
//! proximity evaluation and logs every client event. Useful for exercising
//! a server without a device.
//!
//! ## Configuration (CLI flags or env)
//!
//! | Key                     | Default                  | Description                  |
//! |-------------------------|--------------------------|------------------------------|
//! | `GHOST_API_URL`         | `http://localhost:6000`  | Ghost service base URL       |
//! | `GHOST_LAT` / `GHOST_LNG` | `37.7749` / `-122.4194` | Simulated viewer position   |
//! | `GHOST_POLL_MS`         | `30000`                  | Poll interval                |
//! | `GHOST_REPORT_MS`       | `5000`                   | Position report interval     |
//! | `GHOST_TICK_MS`         | `100`                    | Proximity tick interval      |
//! | `GHOST_ANSWER`          | unset                    | Answer submitted to riddles  |

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ghost_world::{
    api::HttpGhostApi,
    events::ClientEvent,
    reporter::SharedPosition,
    runtime::ClientRuntime,
    session::Prompt,
    types::{ClientConfig, GeoPoint},
};

/// Debug fallback location (San Francisco).
const DEFAULT_LAT: f64 = 37.7749;
const DEFAULT_LNG: f64 = -122.4194;

#[derive(Parser, Debug)]
#[command(name = "ghost-world-client", about = "Headless Ghost World viewer", version)]
struct Args {
    #[arg(long, env = "GHOST_API_URL", default_value = "http://localhost:6000")]
    api_url: String,

    #[arg(long, env = "GHOST_LAT", default_value_t = DEFAULT_LAT, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, env = "GHOST_LNG", default_value_t = DEFAULT_LNG, allow_hyphen_values = true)]
    lng: f64,

    #[arg(long, env = "GHOST_POLL_MS", default_value_t = 30_000)]
    poll_ms: u64,

    #[arg(long, env = "GHOST_REPORT_MS", default_value_t = 5_000)]
    report_ms: u64,

    #[arg(long, env = "GHOST_TICK_MS", default_value_t = 100)]
    tick_ms: u64,

    /// Submit this answer whenever a riddle is shown
    #[arg(long, env = "GHOST_ANSWER")]
    answer: Option<String>,

    /// Drop poll responses older than the last applied one
    #[arg(long)]
    ignore_stale: bool,

    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let directive = if args.debug {
        "ghost_world=debug"
    } else {
        "ghost_world=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    let config = ClientConfig {
        api_url: args.api_url.clone(),
        poll_interval_ms: args.poll_ms,
        report_interval_ms: args.report_ms,
        tick_interval_ms: args.tick_ms,
        ignore_stale_responses: args.ignore_stale,
        ..Default::default()
    };

    let api = Arc::new(HttpGhostApi::new(&config)?);
    let position = SharedPosition::at(GeoPoint::new(args.lat, args.lng));
    let (runtime, mut events) = ClientRuntime::new(api, Arc::new(position), config)?;

    log::info!(
        "ghost-world-client started as {} against {} at ({:.6}, {:.6})",
        runtime.viewer_id(),
        args.api_url,
        args.lat,
        args.lng
    );
    runtime.start();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
                if let (ClientEvent::PromptShown { prompt: Prompt::Riddle { .. }, .. }, Some(answer)) =
                    (&event, args.answer.as_deref())
                {
                    runtime.submit_answer(answer);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("ctrl-c received, shutting down");
                break;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}

fn log_event(event: &ClientEvent) {
    match event {
        ClientEvent::EntitySpawned { record } => log::info!(
            "spawned {} '{}' at {} ({:?} m)",
            record.id,
            record.name,
            record.location,
            record.distance
        ),
        ClientEvent::EntityUpdated { record } => log::debug!("updated {}", record.id),
        ClientEvent::EntityDespawned { entity_id } => log::info!("despawned {}", entity_id),
        ClientEvent::Engaged { target, distance } => {
            log::info!("engaged {} at {:.1} m", target, distance)
        }
        ClientEvent::Disengaged { target, reason } => {
            log::info!("disengaged {}: {:?}", target, reason)
        }
        ClientEvent::PromptShown { target, prompt } => match prompt {
            Prompt::Riddle {
                entity_name,
                riddle,
            } => log::info!("[{}] {} asks: {}", target, entity_name, riddle),
            Prompt::Acknowledgement { message } => log::info!("[{}] {}", target, message),
        },
        ClientEvent::AnswerResult { target, outcome } => {
            log::info!("[{}] answer: {:?}", target, outcome)
        }
        ClientEvent::PollFailed { reason } => log::warn!("poll failed: {}", reason),
    }
}
