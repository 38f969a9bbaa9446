//! Earshot Player - Main entry point
//!
//! Runs the playback engine behind an HTTP/SSE control surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use earshot_common::session::SessionContext;
use earshot_player::api::{self, AppContext};
use earshot_player::catalog::CatalogClient;
use earshot_player::config::{MediaBackend, PlayerConfig};
use earshot_player::media::{MediaElement, NativeMedia, SimulatedMedia};
use earshot_player::playback::{spawn_reconciler, PlaybackEngine, PodcastPlayer};
use earshot_player::SharedState;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Playhead tick for the simulated backend
const SIMULATED_TICK: Duration = Duration::from_millis(250);

/// Length assumed by the simulated backend when an episode declares none
const SIMULATED_FALLBACK_SECONDS: f64 = 1800.0;

/// Command-line arguments for earshot-player
#[derive(Parser, Debug)]
#[command(name = "earshot-player")]
#[command(about = "Podcast playback service for Earshot")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, env = "EARSHOT_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "EARSHOT_PORT")]
    port: Option<u16>,

    /// Media backend: native or simulated (overrides config file)
    #[arg(short, long, env = "EARSHOT_BACKEND")]
    backend: Option<MediaBackend>,

    /// Search and directory service base URL (overrides config file)
    #[arg(long, env = "EARSHOT_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Analytics session id to carry instead of a freshly generated one
    #[arg(long, env = "EARSHOT_SESSION_ID")]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "earshot_player=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Config: CLI path, then EARSHOT_CONFIG (clap reads the env), then platform paths
    let config_path =
        earshot_common::config::resolve_config_path(args.config.as_deref(), "EARSHOT_CONFIG");
    let mut config =
        PlayerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(url) = args.api_base_url {
        config.api_base_url = url;
    }
    config.validate().context("Invalid configuration")?;

    let session = match args.session_id {
        Some(id) if !id.trim().is_empty() => SessionContext::from_id(id),
        _ => SessionContext::capture(),
    };

    info!("Starting Earshot Player on {}", config.bind_addr());
    info!(
        "Backend: {:?}, catalog: {}, session: {}",
        config.backend,
        config.api_base_url,
        session.session_id()
    );

    let state = Arc::new(SharedState::new(session.clone(), config.event_capacity));

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    // Media element
    let mut clock = None;
    let media: Box<dyn MediaElement> = match config.backend {
        MediaBackend::Native => Box::new(
            NativeMedia::new(http.clone(), config.output_device.clone())
                .context("Failed to start native media backend")?,
        ),
        MediaBackend::Simulated => {
            let (media, controller) = SimulatedMedia::new();
            clock = Some(controller.spawn_clock(SIMULATED_TICK, SIMULATED_FALLBACK_SECONDS));
            Box::new(media)
        }
    };

    let (engine, engine_task) =
        PlaybackEngine::spawn(media, Arc::clone(&state), config.engine_config())
            .context("Failed to start playback engine")?;
    info!("Playback engine initialized");

    let player = Arc::new(Mutex::new(PodcastPlayer::with_skip_step(
        engine.clone(),
        config.skip_seconds,
    )));
    let reconciler = spawn_reconciler(Arc::clone(&player), state.subscribe_events());

    let catalog = CatalogClient::new(http, config.api_base_url.clone(), config.search_top_k, session);

    let ctx = AppContext {
        player,
        state,
        catalog: Some(Arc::new(catalog)),
        port: config.port,
    };

    let served = api::run(ctx, &config.bind_addr(), shutdown_signal()).await;

    engine.shutdown();
    if let Err(e) = engine_task.await {
        warn!("Engine task ended abnormally: {}", e);
    }
    reconciler.abort();
    if let Some(clock) = clock {
        clock.abort();
    }

    served.context("Server error")?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install signal handler: {}", e);
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
