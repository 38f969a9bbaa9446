//! Deterministic in-memory media element
//!
//! `SimulatedMedia` behaves like a browser audio element whose network and
//! clock are driven by hand through a [`SimulatedController`]. Tests use the
//! controller to decide when metadata arrives, whether `play()` resolves or
//! rejects, and when the stream ends. The headless service mode uses
//! [`SimulatedController::spawn_clock`] to drive it on a timer instead.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{LoadId, MediaElement, MediaError, MediaNotification, PlayFuture, ReadyState};

/// Operation applied to the element, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum MediaOp {
    Load { load_id: LoadId, url: String },
    Unload,
    Play,
    Pause,
    SetPosition(f64),
}

/// How `play()` calls settle
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlayOutcome {
    /// Resolve once the element can play through (immediately if it already can)
    #[default]
    Resolve,
    /// Reject immediately with the given reason
    Reject(String),
    /// Stay pending until [`SimulatedController::settle_play`]
    Hold,
}

struct Inner {
    tx: mpsc::UnboundedSender<MediaNotification>,
    load_id: Option<LoadId>,
    url: Option<String>,
    position: f64,
    duration: Option<f64>,
    paused: bool,
    ended: bool,
    ready: ReadyState,
    play_outcome: PlayOutcome,
    pending_plays: Vec<oneshot::Sender<Result<(), MediaError>>>,
    ops: Vec<MediaOp>,
}

impl Inner {
    fn notify(&self, make: impl FnOnce(LoadId) -> MediaNotification) {
        if let Some(load_id) = self.load_id {
            let _ = self.tx.send(make(load_id));
        }
    }

    fn settle_pending(&mut self, result: Result<(), MediaError>) {
        if result.is_err() {
            self.paused = true;
        }
        for reply in self.pending_plays.drain(..) {
            let _ = reply.send(result.clone());
        }
    }

    fn clamp(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        match self.duration {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A panicking test thread must not wedge every later assertion
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable media element
pub struct SimulatedMedia {
    inner: Arc<Mutex<Inner>>,
    rx: Option<mpsc::UnboundedReceiver<MediaNotification>>,
}

impl SimulatedMedia {
    /// Create an element and the controller that drives it
    pub fn new() -> (Self, SimulatedController) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Mutex::new(Inner {
            tx,
            load_id: None,
            url: None,
            position: 0.0,
            duration: None,
            paused: true,
            ended: false,
            ready: ReadyState::HaveNothing,
            play_outcome: PlayOutcome::default(),
            pending_plays: Vec::new(),
            ops: Vec::new(),
        }));

        let media = Self {
            inner: Arc::clone(&inner),
            rx: Some(rx),
        };
        (media, SimulatedController { inner })
    }
}

impl MediaElement for SimulatedMedia {
    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<MediaNotification>> {
        self.rx.take()
    }

    fn load(&mut self, load_id: LoadId, url: &str) {
        let mut inner = lock(&self.inner);
        inner.ops.push(MediaOp::Load {
            load_id,
            url: url.to_string(),
        });
        inner.settle_pending(Err(MediaError::Aborted));
        inner.load_id = Some(load_id);
        inner.url = Some(url.to_string());
        inner.position = 0.0;
        inner.duration = None;
        inner.paused = true;
        inner.ended = false;
        inner.ready = ReadyState::HaveNothing;
    }

    fn unload(&mut self) {
        let mut inner = lock(&self.inner);
        inner.ops.push(MediaOp::Unload);
        inner.settle_pending(Err(MediaError::Aborted));
        inner.load_id = None;
        inner.url = None;
        inner.position = 0.0;
        inner.duration = None;
        inner.paused = true;
        inner.ended = false;
        inner.ready = ReadyState::HaveNothing;
    }

    fn play(&mut self) -> PlayFuture {
        let mut inner = lock(&self.inner);
        inner.ops.push(MediaOp::Play);

        if inner.load_id.is_none() {
            return futures::future::ready(Err(MediaError::NoSource)).boxed();
        }

        if inner.ended {
            inner.position = 0.0;
            inner.ended = false;
        }
        inner.paused = false;
        match inner.play_outcome.clone() {
            PlayOutcome::Reject(reason) => {
                inner.paused = true;
                futures::future::ready(Err(MediaError::PlayRejected(reason))).boxed()
            }
            PlayOutcome::Resolve if inner.ready.can_play_through() => {
                futures::future::ready(Ok(())).boxed()
            }
            PlayOutcome::Resolve | PlayOutcome::Hold => {
                let (reply_tx, reply_rx) = oneshot::channel();
                inner.pending_plays.push(reply_tx);
                async move { reply_rx.await.unwrap_or(Err(MediaError::Aborted)) }.boxed()
            }
        }
    }

    fn pause(&mut self) {
        let mut inner = lock(&self.inner);
        inner.ops.push(MediaOp::Pause);
        inner.settle_pending(Err(MediaError::Aborted));
        inner.paused = true;
    }

    fn position(&self) -> f64 {
        lock(&self.inner).position
    }

    fn set_position(&mut self, seconds: f64) {
        let mut inner = lock(&self.inner);
        inner.ops.push(MediaOp::SetPosition(seconds));
        inner.position = inner.clamp(seconds);
        inner.ended = false;
    }

    fn duration(&self) -> Option<f64> {
        lock(&self.inner).duration
    }

    fn is_paused(&self) -> bool {
        lock(&self.inner).paused
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.inner).ready
    }
}

/// Test-side handle that plays the role of network, clock and platform
#[derive(Clone)]
pub struct SimulatedController {
    inner: Arc<Mutex<Inner>>,
}

impl SimulatedController {
    /// Metadata arrived. `None` models a stream that cannot report duration.
    pub fn load_metadata(&self, duration: Option<f64>) {
        let mut inner = lock(&self.inner);
        if inner.ready < ReadyState::HaveMetadata {
            inner.ready = ReadyState::HaveMetadata;
        }
        inner.duration = duration.filter(|d| d.is_finite() && *d > 0.0);
        inner.notify(|load_id| MediaNotification::MetadataLoaded { load_id });
    }

    /// Enough data buffered to play through; resolves waiting plays
    pub fn can_play(&self) {
        let mut inner = lock(&self.inner);
        inner.ready = ReadyState::HaveEnoughData;
        if inner.play_outcome == PlayOutcome::Resolve && !inner.pending_plays.is_empty() {
            inner.settle_pending(Ok(()));
        }
        inner.notify(|load_id| MediaNotification::CanPlay { load_id });
    }

    /// Advance the playhead if playing, then emit a time update
    pub fn advance(&self, seconds: f64) {
        let mut inner = lock(&self.inner);
        if !inner.paused {
            let target = inner.position + seconds;
            inner.position = inner.clamp(target);
        }
        inner.notify(|load_id| MediaNotification::TimeUpdate { load_id });
    }

    /// Emit a time update without moving the playhead
    pub fn tick(&self) {
        lock(&self.inner).notify(|load_id| MediaNotification::TimeUpdate { load_id });
    }

    /// Reach end of stream
    pub fn end(&self) {
        let mut inner = lock(&self.inner);
        if let Some(duration) = inner.duration {
            inner.position = duration;
        }
        inner.paused = true;
        inner.ended = true;
        inner.notify(|load_id| MediaNotification::Ended { load_id });
    }

    /// Playback paused by something other than the engine (focus loss, headset unplugged)
    pub fn pause_externally(&self) {
        let mut inner = lock(&self.inner);
        inner.paused = true;
        inner.notify(|load_id| MediaNotification::TimeUpdate { load_id });
    }

    /// The source could not be fetched
    pub fn fail_load(&self, reason: &str) {
        let mut inner = lock(&self.inner);
        inner.ready = ReadyState::HaveNothing;
        inner.settle_pending(Err(MediaError::Aborted));
        let error = MediaError::Load(reason.to_string());
        inner.notify(|load_id| MediaNotification::Failed { load_id, error });
    }

    /// Deliver an arbitrary notification, e.g. one tagged with an old load id
    pub fn emit(&self, notification: MediaNotification) {
        let _ = lock(&self.inner).tx.send(notification);
    }

    /// Outcome applied to subsequent `play()` calls
    pub fn set_play_outcome(&self, outcome: PlayOutcome) {
        lock(&self.inner).play_outcome = outcome;
    }

    /// Settle every pending play with `outcome` (`Hold` leaves them pending)
    pub fn settle_play(&self, outcome: PlayOutcome) {
        let mut inner = lock(&self.inner);
        match outcome {
            PlayOutcome::Resolve => inner.settle_pending(Ok(())),
            PlayOutcome::Reject(reason) => inner.settle_pending(Err(MediaError::PlayRejected(reason))),
            PlayOutcome::Hold => {}
        }
    }

    pub fn ops(&self) -> Vec<MediaOp> {
        lock(&self.inner).ops.clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.inner).ops.clear();
    }

    pub fn position(&self) -> f64 {
        lock(&self.inner).position
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.inner).paused
    }

    pub fn current_load_id(&self) -> Option<LoadId> {
        lock(&self.inner).load_id
    }

    pub fn current_url(&self) -> Option<String> {
        lock(&self.inner).url.clone()
    }

    pub fn pending_play_count(&self) -> usize {
        lock(&self.inner).pending_plays.len()
    }

    /// Drive the element on a timer: instant metadata with `fallback_duration`
    /// when nothing better is known, real-time playhead, end of stream at the
    /// duration.
    pub fn spawn_clock(&self, interval: Duration, fallback_duration: f64) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let (loaded, ready, paused, ended, position, duration) = {
                    let inner = lock(&controller.inner);
                    (
                        inner.load_id.is_some(),
                        inner.ready,
                        inner.paused,
                        inner.ended,
                        inner.position,
                        inner.duration,
                    )
                };

                if !loaded || ended {
                    continue;
                }
                if ready == ReadyState::HaveNothing {
                    debug!("Simulated clock: source ready ({}s)", fallback_duration);
                    controller.load_metadata(Some(fallback_duration));
                    controller.can_play();
                    continue;
                }
                if paused {
                    continue;
                }

                let end = duration.unwrap_or(fallback_duration);
                if position + interval.as_secs_f64() >= end {
                    controller.end();
                } else {
                    controller.advance(interval.as_secs_f64());
                }
            }
        })
    }
}
