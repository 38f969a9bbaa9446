//! HTTP request handlers
//!
//! Player handlers take the player lock, apply one change, wait for the
//! engine to drain it, and answer with the resulting transport view.

use crate::api::server::AppContext;
use crate::catalog::CatalogClient;
use crate::error::Error;
use crate::playback::intent::PlaybackIntent;
use crate::playback::presenter::{ResultCard, ToggleAction, TransportView};
use crate::playback::snapshot::PlaybackSnapshot;
use crate::playback::PodcastPlayer;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use earshot_common::models::{DirectoryEpisode, SearchHit};
use earshot_common::Episode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    port: u16,
    session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Intent as exposed over HTTP
#[derive(Debug, Serialize)]
pub struct IntentResponse {
    episode: Option<Episode>,
    is_playing: bool,
    seek_target_ms: Option<f64>,
    seek_token: Option<u64>,
}

impl From<&PlaybackIntent> for IntentResponse {
    fn from(intent: &PlaybackIntent) -> Self {
        Self {
            episode: intent.episode.as_deref().cloned(),
            is_playing: intent.is_playing,
            seek_target_ms: intent.seek_request.map(|r| r.target_ms),
            seek_token: intent.seek_token().map(|t| t.value()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayerStateResponse {
    intent: IntentResponse,
    snapshot: PlaybackSnapshot,
    view: TransportView,
}

/// Either an explicit episode or a search hit to play from its moment
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SelectRequest {
    Hit {
        hit: SearchHit,
    },
    Episode {
        episode: Episode,
        #[serde(default)]
        start_offset_ms: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    action: &'static str,
    view: TransportView,
}

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    delta_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    target_ms: f64,
    view: TransportView,
}

#[derive(Debug, Deserialize)]
pub struct ScrubRequest {
    percent: f64,
}

#[derive(Debug, Serialize)]
pub struct ScrubResponse {
    target_seconds: f64,
    view: TransportView,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequestBody {
    position_ms: f64,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    open: bool,
}

#[derive(Debug, Serialize)]
pub struct NotesResponse {
    open: bool,
    notes: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    query: String,
    results: Vec<ResultCard>,
}

#[derive(Debug, Serialize)]
pub struct DirectoryResponse {
    feed_id: String,
    episodes: Vec<DirectoryEpisode>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", message),
        }),
    )
}

impl From<Error> for (StatusCode, Json<StatusResponse>) {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::BadRequest(_) | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
            Error::Catalog(_) | Error::CatalogResponse(_) => StatusCode::BAD_GATEWAY,
            Error::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
            Error::Common(earshot_common::Error::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        } else {
            warn!("Request rejected: {}", e);
        }
        error_response(status, e)
    }
}

fn require_finite(name: &str, value: f64) -> Result<f64, ApiError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("{} must be a finite number", name),
        ))
    }
}

fn catalog(ctx: &AppContext) -> Result<&Arc<CatalogClient>, ApiError> {
    ctx.catalog.as_ref().ok_or_else(|| {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "catalog service not configured")
    })
}

/// Wait for the engine to apply everything sent so far, then render
async fn settled_view(player: &PodcastPlayer) -> Result<TransportView, ApiError> {
    player.engine().flush().await?;
    Ok(player.view().await)
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "earshot-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: ctx.port,
        session_id: ctx.state.session.session_id().to_string(),
    })
}

// ============================================================================
// Player Endpoints
// ============================================================================

/// GET /player/state
pub async fn get_player_state(State(ctx): State<AppContext>) -> ApiResult<PlayerStateResponse> {
    let player = ctx.player.lock().await;
    let view = settled_view(&player).await?;
    Ok(Json(PlayerStateResponse {
        intent: IntentResponse::from(player.intent()),
        snapshot: player.snapshot().await,
        view,
    }))
}

/// POST /player/episode
pub async fn select_episode(
    State(ctx): State<AppContext>,
    Json(req): Json<SelectRequest>,
) -> ApiResult<TransportView> {
    let mut player = ctx.player.lock().await;
    match req {
        SelectRequest::Hit { hit } => {
            info!("Selecting search hit {} ({})", hit.id, hit.title);
            player.select_hit(&hit)?;
        }
        SelectRequest::Episode {
            episode,
            start_offset_ms,
        } => {
            if let Some(offset) = start_offset_ms {
                require_finite("start_offset_ms", offset)?;
            }
            player.select_episode(episode, start_offset_ms)?;
        }
    }
    Ok(Json(settled_view(&player).await?))
}

/// DELETE /player/episode
pub async fn close_episode(State(ctx): State<AppContext>) -> ApiResult<TransportView> {
    let mut player = ctx.player.lock().await;
    player.close()?;
    Ok(Json(settled_view(&player).await?))
}

/// POST /player/play
pub async fn play(State(ctx): State<AppContext>) -> ApiResult<TransportView> {
    let mut player = ctx.player.lock().await;
    if player.intent().episode.is_none() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no episode selected"));
    }
    player.set_playing(true)?;
    Ok(Json(settled_view(&player).await?))
}

/// POST /player/pause
pub async fn pause(State(ctx): State<AppContext>) -> ApiResult<TransportView> {
    let mut player = ctx.player.lock().await;
    player.set_playing(false)?;
    Ok(Json(settled_view(&player).await?))
}

/// POST /player/toggle
pub async fn toggle(State(ctx): State<AppContext>) -> ApiResult<ToggleResponse> {
    let mut player = ctx.player.lock().await;
    if player.intent().episode.is_none() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no episode selected"));
    }
    let action = player.toggle_play().await?;
    let view = settled_view(&player).await?;
    Ok(Json(ToggleResponse {
        action: match action {
            ToggleAction::Play => "play",
            ToggleAction::Pause => "pause",
            ToggleAction::Retry => "retry",
        },
        view,
    }))
}

/// POST /player/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Json(req): Json<SkipRequest>,
) -> ApiResult<SkipResponse> {
    let delta = require_finite("delta_seconds", req.delta_seconds)?;
    let mut player = ctx.player.lock().await;
    if player.intent().episode.is_none() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no episode selected"));
    }
    let target_ms = player.skip(delta).await?;
    let view = settled_view(&player).await?;
    Ok(Json(SkipResponse { target_ms, view }))
}

/// POST /player/scrub
pub async fn scrub(
    State(ctx): State<AppContext>,
    Json(req): Json<ScrubRequest>,
) -> ApiResult<ScrubResponse> {
    let percent = require_finite("percent", req.percent)?;
    let mut player = ctx.player.lock().await;
    let target_seconds = player.scrub_to(percent).await?;
    let view = settled_view(&player).await?;
    Ok(Json(ScrubResponse {
        target_seconds,
        view,
    }))
}

/// POST /player/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequestBody>,
) -> ApiResult<TransportView> {
    let position_ms = require_finite("position_ms", req.position_ms)?;
    let mut player = ctx.player.lock().await;
    if player.intent().episode.is_none() {
        return Err(error_response(StatusCode::BAD_REQUEST, "no episode selected"));
    }
    player.seek_to_ms(position_ms)?;
    Ok(Json(settled_view(&player).await?))
}

/// POST /player/notes
pub async fn set_notes(
    State(ctx): State<AppContext>,
    Json(req): Json<NotesRequest>,
) -> Json<NotesResponse> {
    let mut player = ctx.player.lock().await;
    player.set_notes_open(req.open);
    Json(NotesResponse {
        open: req.open,
        notes: player.notes(),
    })
}

// ============================================================================
// Catalog Endpoints
// ============================================================================

/// POST /search
pub async fn search(
    State(ctx): State<AppContext>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    let client = catalog(&ctx)?;
    let hits = client.search(&req.query).await?;
    Ok(Json(SearchResponse {
        query: req.query,
        results: hits.into_iter().map(ResultCard::from_hit).collect(),
    }))
}

/// GET /directory/:feed_id/episodes
pub async fn directory_episodes(
    State(ctx): State<AppContext>,
    Path(feed_id): Path<String>,
) -> ApiResult<DirectoryResponse> {
    let client = catalog(&ctx)?;
    let episodes = client.episodes(&feed_id).await?;
    if episodes.is_empty() {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("no episodes for feed {}", feed_id),
        ));
    }
    Ok(Json(DirectoryResponse { feed_id, episodes }))
}
