//! HTTP server setup and routing

use crate::catalog::CatalogClient;
use crate::error::{Error, Result};
use crate::playback::PodcastPlayer;
use crate::state::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub player: Arc<Mutex<PodcastPlayer>>,
    pub state: Arc<SharedState>,
    /// Search and directory access; `None` leaves those routes unavailable
    pub catalog: Option<Arc<CatalogClient>>,
    pub port: u16,
}

/// Build the router with every control route attached
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Player
        .route("/player/state", get(super::handlers::get_player_state))
        .route(
            "/player/episode",
            post(super::handlers::select_episode).delete(super::handlers::close_episode),
        )
        .route("/player/play", post(super::handlers::play))
        .route("/player/pause", post(super::handlers::pause))
        .route("/player/toggle", post(super::handlers::toggle))
        .route("/player/skip", post(super::handlers::skip))
        .route("/player/scrub", post(super::handlers::scrub))
        .route("/player/seek", post(super::handlers::seek))
        .route("/player/notes", post(super::handlers::set_notes))
        // Catalog
        .route("/search", post(super::handlers::search))
        .route(
            "/directory/:feed_id/episodes",
            get(super::handlers::directory_episodes),
        )
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API on `bind_addr` until `shutdown` resolves
pub async fn run<F>(ctx: AppContext, bind_addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind {}: {}", bind_addr, e)))?;

    info!("Player API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("Player API stopped");
    Ok(())
}
