//! Engine and player behaviour against a scripted media element
//!
//! Each test drives the real engine task through `SimulatedMedia` and checks
//! the element operations it issued, the published snapshot, and the events
//! it broadcast.

mod helpers;

use std::time::Duration;

use earshot_common::events::PlayerEvent;
use earshot_player::media::{MediaNotification, MediaOp, PlayOutcome};
use earshot_player::playback::{EngineConfig, ToggleAction, TransportAffordance};

use helpers::{count_ops, episode, seek_positions, Harness};

// ============================================================================
// Selection and start offset
// ============================================================================

#[tokio::test]
async fn test_start_offset_applied_before_play() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 1800.0), Some(120_000.0)).await;

    let ops = h.media.ops();
    assert!(matches!(&ops[0], MediaOp::Load { url, .. } if url == "https://cdn.example/a.mp3"));
    assert_eq!(ops[1..], [MediaOp::SetPosition(120.0), MediaOp::Play]);

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.current_time_seconds, 120.0);
    assert!(snapshot.is_playing());
    assert!(!snapshot.is_buffering);
    assert!(!snapshot.play_failed);
    assert_eq!(h.media.position(), 120.0);

    let events = h.pump_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::SeekApplied { position_ms: 120_000, .. }
    )));
    h.shutdown().await;
}

#[tokio::test]
async fn test_rejected_play_lands_paused_at_offset() {
    let mut h = Harness::start();
    h.media
        .set_play_outcome(PlayOutcome::Reject("NotAllowedError".to_string()));

    h.player
        .select_episode(episode("a", 1800.0), Some(120_000.0))
        .unwrap();
    h.settle().await;
    h.media.load_metadata(Some(1800.0));
    h.settle().await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.current_time_seconds, 120.0);
    assert!(!snapshot.is_playing());
    assert!(!snapshot.is_buffering);
    assert!(snapshot.play_failed);

    let view = h.player.view().await;
    assert_eq!(view.affordance, TransportAffordance::Play);
    assert_eq!(view.elapsed, "02:00");

    let events = h.pump_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, PlayerEvent::PlayFailed { .. })));

    // Retry once the platform allows playback
    h.media.set_play_outcome(PlayOutcome::Resolve);
    assert_eq!(h.player.toggle_play().await.unwrap(), ToggleAction::Retry);
    h.settle().await;
    h.media.can_play();
    h.settle().await;

    let snapshot = h.snapshot().await;
    assert!(snapshot.is_playing());
    assert!(!snapshot.play_failed);
    assert_eq!(h.media.position(), 120.0);
    h.shutdown().await;
}

#[tokio::test]
async fn test_select_without_offset_starts_at_zero() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 600.0), Some(45_000.0)).await;
    h.media.advance(5.0);
    h.settle().await;

    h.media.clear_ops();
    h.start_playing(episode("b", 900.0), None).await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.episode_id.as_ref().map(|id| id.as_str()), Some("b"));
    assert_eq!(snapshot.current_time_seconds, 0.0);
    assert_eq!(seek_positions(&h.media.ops()), vec![0.0]);
    h.shutdown().await;
}

// ============================================================================
// Switching episodes
// ============================================================================

#[tokio::test]
async fn test_stale_callbacks_from_previous_episode_are_ignored() {
    let mut h = Harness::start();
    h.media.set_play_outcome(PlayOutcome::Hold);

    h.player
        .select_episode(episode("a", 1800.0), Some(60_000.0))
        .unwrap();
    h.settle().await;
    h.media.load_metadata(Some(1800.0));
    h.settle().await;
    let old_load = h.media.current_load_id().unwrap();
    assert_eq!(h.media.pending_play_count(), 1);

    h.media.clear_ops();
    h.player.select_episode(episode("b", 900.0), None).unwrap();
    h.settle().await;

    // A's held play was aborted by the switch; late signals for A arrive now
    h.media.emit(MediaNotification::MetadataLoaded { load_id: old_load });
    h.media.emit(MediaNotification::CanPlay { load_id: old_load });
    h.media.emit(MediaNotification::Ended { load_id: old_load });
    h.settle().await;

    let ops = h.media.ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], MediaOp::Load { url, .. } if url.ends_with("/b.mp3")));

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.episode_id.as_ref().map(|id| id.as_str()), Some("b"));
    assert!(!snapshot.metadata_ready);
    assert!(!snapshot.ended);
    assert!(!snapshot.play_failed);
    assert!(snapshot.is_buffering);

    h.media.set_play_outcome(PlayOutcome::Resolve);
    h.media.load_metadata(Some(900.0));
    h.settle().await;
    assert_eq!(seek_positions(&h.media.ops()), vec![0.0]);
    assert_eq!(h.media.position(), 0.0);

    let events = h.pump_events();
    assert!(!events
        .iter()
        .any(|e| matches!(e, PlayerEvent::PlaybackEnded { .. })));
    h.shutdown().await;
}

#[tokio::test]
async fn test_close_unloads_and_resets() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 600.0), None).await;

    h.player.close().unwrap();
    h.settle().await;

    assert_eq!(h.media.ops().last(), Some(&MediaOp::Unload));
    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.episode_id, None);
    assert!(!snapshot.is_playing());

    let view = h.player.view().await;
    assert_eq!(view.affordance, TransportAffordance::Unavailable);
    assert_eq!(view.elapsed, "00:00");
    h.shutdown().await;
}

// ============================================================================
// Seeking
// ============================================================================

#[tokio::test]
async fn test_consecutive_skips_accumulate() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 100.0), Some(50_000.0)).await;
    h.player.set_playing(false).unwrap();
    h.settle().await;
    h.media.clear_ops();

    assert_eq!(h.player.skip_forward().await.unwrap(), 60_000.0);
    assert_eq!(h.player.skip_forward().await.unwrap(), 70_000.0);
    h.settle().await;

    assert_eq!(seek_positions(&h.media.ops()), vec![60.0, 70.0]);
    assert_eq!(h.media.position(), 70.0);
    assert_eq!(h.snapshot().await.current_time_seconds, 70.0);
    h.shutdown().await;
}

#[tokio::test]
async fn test_skips_before_metadata_apply_once() {
    let mut h = Harness::start();
    h.player
        .select_episode(episode("a", 1800.0), Some(50_000.0))
        .unwrap();
    h.settle().await;

    assert_eq!(h.player.skip(10.0).await.unwrap(), 60_000.0);
    assert_eq!(h.player.skip(10.0).await.unwrap(), 70_000.0);
    h.settle().await;
    assert!(seek_positions(&h.media.ops()).is_empty());

    h.media.load_metadata(Some(1800.0));
    h.settle().await;
    assert_eq!(seek_positions(&h.media.ops()), vec![70.0]);
    h.shutdown().await;
}

#[tokio::test]
async fn test_skip_forward_clamps_to_duration() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 100.0), Some(95_000.0)).await;

    assert_eq!(h.player.skip_forward().await.unwrap(), 100_000.0);
    h.settle().await;
    assert_eq!(h.media.position(), 100.0);
    assert_eq!(h.snapshot().await.progress_percent, 100.0);
    h.shutdown().await;
}

#[tokio::test]
async fn test_skip_back_clamps_at_zero() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 1800.0), Some(4_000.0)).await;

    assert_eq!(h.player.skip_back().await.unwrap(), 0.0);
    h.settle().await;
    assert_eq!(h.media.position(), 0.0);
    h.shutdown().await;
}

#[tokio::test]
async fn test_same_target_with_new_token_repositions() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 1800.0), None).await;

    h.player.seek_to_ms(30_000.0).unwrap();
    h.settle().await;
    h.media.advance(5.0);
    h.settle().await;
    assert_eq!(h.media.position(), 35.0);

    h.player.seek_to_ms(30_000.0).unwrap();
    h.settle().await;

    assert_eq!(h.media.position(), 30.0);
    let positions = seek_positions(&h.media.ops());
    assert_eq!(positions.iter().filter(|p| **p == 30.0).count(), 2);
    h.shutdown().await;
}

#[tokio::test]
async fn test_scrub_moves_playhead_directly() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 1800.0), None).await;

    let seconds = h.player.scrub_to(50.0).await.unwrap();
    assert_eq!(seconds, 900.0);
    h.settle().await;

    assert_eq!(h.media.position(), 900.0);
    let view = h.player.view().await;
    assert_eq!(view.elapsed, "15:00");
    assert_eq!(view.progress_percent, 50.0);
    h.shutdown().await;
}

// ============================================================================
// Play / pause
// ============================================================================

#[tokio::test]
async fn test_toggles_before_metadata_settle_on_last_intent() {
    let mut h = Harness::start();
    h.player.select_episode(episode("a", 600.0), None).unwrap();
    h.player.set_playing(false).unwrap();
    h.player.set_playing(true).unwrap();
    h.player.set_playing(false).unwrap();
    h.settle().await;

    h.media.load_metadata(Some(600.0));
    h.media.can_play();
    h.settle().await;

    assert_eq!(count_ops(&h.media.ops(), |op| *op == MediaOp::Play), 0);
    assert!(!h.snapshot().await.is_playing());
    assert!(!h.player.intent().is_playing);

    h.player.set_playing(false).unwrap();
    h.player.set_playing(true).unwrap();
    h.settle().await;
    assert_eq!(count_ops(&h.media.ops(), |op| *op == MediaOp::Play), 1);
    assert!(h.snapshot().await.is_playing());
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_pause_drops_buffering_raised_for_deferred_play() {
    let mut h = Harness::with_config(EngineConfig {
        buffering_timeout: Some(Duration::from_secs(30)),
    });
    h.player.select_episode(episode("a", 600.0), None).unwrap();
    h.player.set_playing(false).unwrap();
    h.settle().await;
    // Still loading the source
    assert!(h.snapshot().await.is_buffering);

    tokio::time::sleep(Duration::from_secs(31)).await;
    h.settle().await;
    assert!(!h.snapshot().await.is_buffering);

    h.player.set_playing(true).unwrap();
    h.settle().await;
    assert!(h.snapshot().await.is_buffering);

    h.player.set_playing(false).unwrap();
    h.settle().await;
    assert!(!h.snapshot().await.is_buffering);
    assert_eq!(h.player.view().await.affordance, TransportAffordance::Play);
    assert_eq!(count_ops(&h.media.ops(), |op| *op == MediaOp::Play), 0);
    h.shutdown().await;
}

#[tokio::test]
async fn test_pause_during_pending_play_wins() {
    let mut h = Harness::start();
    h.media.set_play_outcome(PlayOutcome::Hold);
    h.player.select_episode(episode("a", 600.0), None).unwrap();
    h.settle().await;
    h.media.load_metadata(Some(600.0));
    h.settle().await;

    h.player.set_playing(false).unwrap();
    h.settle().await;
    h.media.settle_play(PlayOutcome::Resolve);
    h.media.can_play();
    h.settle().await;

    assert!(!h.snapshot().await.is_playing());
    assert!(h.media.is_paused());
    h.shutdown().await;
}

#[tokio::test]
async fn test_external_pause_is_reported_upward() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 600.0), None).await;
    h.pump_events();
    assert!(h.player.intent().is_playing);

    h.media.pause_externally();
    h.settle().await;

    let events = h.pump_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::ActualStateReported { playing: false, .. }
    )));
    assert!(!h.player.intent().is_playing);
    assert_eq!(h.player.view().await.affordance, TransportAffordance::Play);
    h.shutdown().await;
}

#[tokio::test]
async fn test_time_updates_publish_progress() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 200.0), None).await;
    h.pump_events();

    h.media.advance(50.0);
    h.settle().await;

    let snapshot = h.snapshot().await;
    assert_eq!(snapshot.current_time_seconds, 50.0);
    assert_eq!(snapshot.progress_percent, 25.0);

    let events = h.pump_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::PlaybackProgress { position_ms: 50_000, duration_ms: 200_000, .. }
    )));
    h.shutdown().await;
}

// ============================================================================
// End of stream
// ============================================================================

#[tokio::test]
async fn test_end_of_stream_reported_once() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 600.0), None).await;
    let load_id = h.media.current_load_id().unwrap();

    h.media.end();
    h.media.emit(MediaNotification::Ended { load_id });
    h.settle().await;

    let events = h.pump_events();
    let ended = events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::PlaybackEnded { .. }))
        .count();
    assert_eq!(ended, 1);

    let snapshot = h.snapshot().await;
    assert!(snapshot.ended);
    assert_eq!(snapshot.current_time_seconds, 600.0);
    assert!(!h.player.intent().is_playing);
    assert_eq!(h.player.view().await.affordance, TransportAffordance::Play);
    h.shutdown().await;
}

#[tokio::test]
async fn test_replay_after_end_reports_end_again() {
    let mut h = Harness::start();
    h.start_playing(episode("a", 600.0), None).await;

    h.media.end();
    h.settle().await;
    h.pump_events();
    assert!(!h.player.intent().is_playing);

    h.player.set_playing(true).unwrap();
    h.settle().await;
    assert_eq!(h.media.position(), 0.0);
    let snapshot = h.snapshot().await;
    assert!(!snapshot.ended);
    assert!(snapshot.is_playing());
    assert_eq!(snapshot.current_time_seconds, 0.0);
    assert_eq!(h.player.view().await.affordance, TransportAffordance::Pause);

    h.media.advance(5.0);
    h.settle().await;
    assert_eq!(h.snapshot().await.current_time_seconds, 5.0);

    h.media.end();
    h.settle().await;
    let ended = h
        .pump_events()
        .iter()
        .filter(|e| matches!(e, PlayerEvent::PlaybackEnded { .. }))
        .count();
    assert_eq!(ended, 1);
    assert!(h.snapshot().await.ended);
    assert!(!h.player.intent().is_playing);
    assert_eq!(h.player.view().await.affordance, TransportAffordance::Play);
    h.shutdown().await;
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_load_failure_is_persistent_until_reselect() {
    let mut h = Harness::start();
    h.player.select_episode(episode("a", 600.0), None).unwrap();
    h.settle().await;

    h.media.fail_load("404 Not Found");
    h.settle().await;

    let snapshot = h.snapshot().await;
    assert!(snapshot.load_failed);
    assert!(!snapshot.is_buffering);
    assert_eq!(
        h.player.view().await.affordance,
        TransportAffordance::Unavailable
    );

    // Play and seek requests do nothing while the source is broken
    h.player.set_playing(false).unwrap();
    h.player.set_playing(true).unwrap();
    h.player.seek_to_ms(10_000.0).unwrap();
    h.settle().await;
    assert_eq!(count_ops(&h.media.ops(), |op| *op == MediaOp::Play), 0);
    assert!(h.snapshot().await.load_failed);

    h.player.select_episode(episode("a", 600.0), None).unwrap();
    h.settle().await;

    let loads = count_ops(&h.media.ops(), |op| matches!(op, MediaOp::Load { .. }));
    assert_eq!(loads, 2);
    assert!(!h.snapshot().await.load_failed);

    let events = h.pump_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, PlayerEvent::LoadFailed { .. })));
    h.shutdown().await;
}

#[tokio::test]
async fn test_episode_without_stream_is_unavailable() {
    let mut h = Harness::start();
    let mut silent = episode("a", 600.0);
    silent.stream_url = None;

    h.player.select_episode(silent, None).unwrap();
    h.settle().await;

    assert!(!h.player.intent().is_playing);
    let snapshot = h.snapshot().await;
    assert!(snapshot.load_failed);
    assert_eq!(count_ops(&h.media.ops(), |op| matches!(op, MediaOp::Load { .. })), 0);
    assert_eq!(
        h.player.view().await.affordance,
        TransportAffordance::Unavailable
    );
    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_buffering_timeout_gives_up_and_offers_retry() {
    let mut h = Harness::with_config(EngineConfig {
        buffering_timeout: Some(Duration::from_secs(30)),
    });
    h.player.select_episode(episode("a", 600.0), None).unwrap();
    h.settle().await;
    h.media.load_metadata(Some(600.0));
    h.settle().await;
    assert!(h.snapshot().await.is_buffering);

    tokio::time::sleep(Duration::from_secs(31)).await;
    h.settle().await;

    let snapshot = h.snapshot().await;
    assert!(!snapshot.is_buffering);
    assert!(snapshot.play_failed);
    assert!(!snapshot.is_playing());

    let events = h.pump_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, PlayerEvent::BufferingTimedOut { .. })));
    assert_eq!(h.player.toggle_play().await.unwrap(), ToggleAction::Retry);
    h.shutdown().await;
}

// ============================================================================
// Duration
// ============================================================================

#[tokio::test]
async fn test_declared_duration_used_when_media_reports_none() {
    let mut h = Harness::start();
    h.player.select_episode(episode("a", 900.0), None).unwrap();
    h.settle().await;
    h.media.load_metadata(None);
    h.settle().await;

    let snapshot = h.snapshot().await;
    assert!(snapshot.metadata_ready);
    assert_eq!(snapshot.duration_seconds, 900.0);
    assert_eq!(h.player.view().await.duration, "15:00");

    let events = h.pump_events();
    assert!(events.iter().any(|e| matches!(
        e,
        PlayerEvent::MetadataLoaded { fallback_duration: true, .. }
    )));
    h.shutdown().await;
}
