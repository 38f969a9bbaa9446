//! Integration tests for the player HTTP API
//!
//! Requests go through the real router with `oneshot`; the engine runs over
//! the simulated media backend so tests decide when metadata arrives.

use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use earshot_player::api::{create_router, AppContext};
use earshot_player::media::{SimulatedController, SimulatedMedia};
use earshot_player::playback::{EngineConfig, PlaybackEngine, PodcastPlayer};
use earshot_player::SharedState;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Test helper to create a router over a fresh engine
fn setup_test_server() -> (axum::Router, SimulatedController) {
    let state = Arc::new(SharedState::default());
    let (media, controller) = SimulatedMedia::new();
    let (engine, _task) = PlaybackEngine::spawn(
        media,
        Arc::clone(&state),
        EngineConfig {
            buffering_timeout: None,
        },
    )
    .expect("Failed to start engine");

    let ctx = AppContext {
        player: Arc::new(Mutex::new(PodcastPlayer::new(engine))),
        state,
        catalog: None,
        port: 5760,
    };

    (create_router(ctx), controller)
}

/// Helper function to make HTTP requests to the test server
async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    use http::{Method, Request};
    use tower::ServiceExt;

    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "DELETE" => Method::DELETE,
        _ => panic!("Unsupported method"),
    };

    let request = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => request
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let value = serde_json::from_slice(&bytes).ok();
    (status, value)
}

fn episode_body(start_offset_ms: Option<f64>) -> Value {
    json!({
        "episode": {
            "id": "ep-1",
            "title": "Why do cats purr?",
            "stream_url": "https://cdn.example/ep-1.mp3",
            "duration_seconds": 1800.0,
            "podcast_title": "Curious Minds"
        },
        "start_offset_ms": start_offset_ms
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _media) = setup_test_server();

    let (status, body) = make_request(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "earshot-player");
    assert_eq!(body["port"], 5760);
    assert!(body["session_id"].as_str().is_some_and(|s| !s.is_empty()));
}

#[tokio::test]
async fn test_initial_state_is_empty() {
    let (app, _media) = setup_test_server();

    let (status, body) = make_request(&app, "GET", "/player/state", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert!(body["intent"]["episode"].is_null());
    assert_eq!(body["intent"]["is_playing"], false);
    assert_eq!(body["view"]["affordance"], "unavailable");
    assert_eq!(body["view"]["elapsed"], "00:00");
}

#[tokio::test]
async fn test_select_episode_plays_from_offset() {
    let (app, media) = setup_test_server();

    let (status, body) =
        make_request(&app, "POST", "/player/episode", Some(episode_body(Some(120_000.0)))).await;
    assert_eq!(status, StatusCode::OK);
    let view = body.unwrap();
    assert_eq!(view["episode_id"], "ep-1");
    assert_eq!(view["affordance"], "buffering");
    assert_eq!(view["length_label"], "30 min");

    media.load_metadata(Some(1800.0));
    media.can_play();

    let (_, body) = make_request(&app, "GET", "/player/state", None).await;
    let body = body.unwrap();
    assert_eq!(body["snapshot"]["current_time_seconds"], 120.0);
    assert_eq!(body["snapshot"]["is_paused_at_element_level"], false);
    assert_eq!(body["view"]["affordance"], "pause");
    assert_eq!(body["view"]["elapsed"], "02:00");
    assert_eq!(body["view"]["duration"], "30:00");
}

#[tokio::test]
async fn test_select_search_hit() {
    let (app, media) = setup_test_server();
    let hit = json!({
        "hit": {
            "id": 77,
            "title": "Sleep science",
            "podcast_title": "Night Shift",
            "duration": 3600.0,
            "enclosure_url": "https://cdn.example/77.mp3",
            "start": 90000.0
        }
    });

    let (status, body) = make_request(&app, "POST", "/player/episode", Some(hit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["episode_id"], "77");

    media.load_metadata(Some(3600.0));
    let (_, body) = make_request(&app, "GET", "/player/state", None).await;
    let body = body.unwrap();
    assert_eq!(body["snapshot"]["current_time_seconds"], 90.0);
    assert_eq!(body["intent"]["seek_target_ms"], 90000.0);
}

#[tokio::test]
async fn test_transport_controls() {
    let (app, media) = setup_test_server();
    make_request(&app, "POST", "/player/episode", Some(episode_body(None))).await;
    media.load_metadata(Some(1800.0));
    media.can_play();

    let (status, body) = make_request(
        &app,
        "POST",
        "/player/skip",
        Some(json!({"delta_seconds": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["target_ms"], 10000.0);
    assert_eq!(body["view"]["elapsed"], "00:10");

    let (status, body) =
        make_request(&app, "POST", "/player/scrub", Some(json!({"percent": 50.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["target_seconds"], 900.0);

    let (status, body) = make_request(
        &app,
        "POST",
        "/player/seek",
        Some(json!({"position_ms": 60000.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["elapsed"], "01:00");

    let (status, body) = make_request(&app, "POST", "/player/toggle", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["action"], "pause");
    assert_eq!(body["view"]["affordance"], "play");

    let (status, body) = make_request(&app, "POST", "/player/play", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["affordance"], "pause");

    let (status, body) = make_request(&app, "POST", "/player/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["affordance"], "play");
}

#[tokio::test]
async fn test_controls_without_episode_are_rejected() {
    let (app, _media) = setup_test_server();

    let (status, body) = make_request(&app, "POST", "/player/play", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["status"]
        .as_str()
        .unwrap()
        .starts_with("error:"));

    let (status, _) = make_request(&app, "POST", "/player/toggle", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = make_request(
        &app,
        "POST",
        "/player/skip",
        Some(json!({"delta_seconds": 10.0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_notes_panel() {
    let (app, _media) = setup_test_server();
    make_request(&app, "POST", "/player/episode", Some(episode_body(None))).await;

    let (status, body) =
        make_request(&app, "POST", "/player/notes", Some(json!({"open": true}))).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["open"], true);
    assert_eq!(body["notes"], "No show notes available.");

    let (_, body) = make_request(&app, "GET", "/player/state", None).await;
    assert_eq!(body.unwrap()["view"]["notes_open"], true);
}

#[tokio::test]
async fn test_close_episode() {
    let (app, _media) = setup_test_server();
    make_request(&app, "POST", "/player/episode", Some(episode_body(None))).await;

    let (status, body) = make_request(&app, "DELETE", "/player/episode", None).await;
    assert_eq!(status, StatusCode::OK);
    let view = body.unwrap();
    assert!(view["episode_id"].is_null());
    assert_eq!(view["affordance"], "unavailable");
}

#[tokio::test]
async fn test_catalog_routes_unavailable_without_client() {
    let (app, _media) = setup_test_server();

    let (status, _) =
        make_request(&app, "POST", "/search", Some(json!({"query": "why"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = make_request(&app, "GET", "/directory/12/episodes", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_event_stream_starts_with_snapshot() {
    use http::Request;
    use tower::ServiceExt;

    let (app, _media) = setup_test_server();
    let request = Request::builder()
        .uri("/events")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let mut stream = response.into_body().into_data_stream();
    let first = stream.next().await.unwrap().unwrap();
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: Snapshot"));
    assert!(text.contains("\"type\":\"Snapshot\""));
}
