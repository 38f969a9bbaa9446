//! Native media element
//!
//! Plays an episode enclosure without a browser:
//! 1. `load` downloads the enclosure with reqwest on the tokio runtime
//! 2. the deck thread probes it with symphonia (metadata-loaded, can-play)
//! 3. `play` opens the cpal output on first use and starts the stream
//! 4. the deck keeps the ring buffer topped up, converting sample rate and
//!    channel layout on the way, and reports time updates and end of stream
//!
//! The cpal stream is not `Send` on every platform, so the output lives and
//! dies on the deck thread. `NativeMedia` itself only sends commands and
//! reads the status the deck publishes.

mod decoder;
mod output;
mod resampler;

use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::decoder::{extension_hint, StreamDecoder};
use self::output::AudioOutput;
use self::resampler::StreamConverter;
use super::{LoadId, MediaElement, MediaError, MediaNotification, PlayFuture, ReadyState};

/// Interval between time-update notifications while playing
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

/// Deck wake-up interval when no command arrives
const DECK_POLL: Duration = Duration::from_millis(10);

/// Minimum free ring space (samples) before decoding another packet
const FILL_THRESHOLD: usize = 2048;

/// Values the deck publishes for synchronous reads
#[derive(Debug)]
struct Status {
    load_id: Option<LoadId>,
    duration: Option<f64>,
    ready: ReadyState,
    paused: bool,
    position: f64,
}

fn lock(status: &Mutex<Status>) -> MutexGuard<'_, Status> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum DeckCommand {
    Open {
        load_id: LoadId,
        bytes: Vec<u8>,
        extension: Option<String>,
    },
    Close,
    Play {
        reply: oneshot::Sender<Result<(), MediaError>>,
    },
    Pause,
    Seek {
        seconds: f64,
    },
    Shutdown,
}

/// Media element backed by the local audio device
pub struct NativeMedia {
    status: Arc<Mutex<Status>>,
    commands: std_mpsc::Sender<DeckCommand>,
    notify_tx: mpsc::UnboundedSender<MediaNotification>,
    notify_rx: Option<mpsc::UnboundedReceiver<MediaNotification>>,
    http: reqwest::Client,
    download: Option<JoinHandle<()>>,
}

impl NativeMedia {
    /// Start the deck thread. The output device is opened on first play.
    pub fn new(http: reqwest::Client, output_device: Option<String>) -> Result<Self, MediaError> {
        let status = Arc::new(Mutex::new(Status {
            load_id: None,
            duration: None,
            ready: ReadyState::HaveNothing,
            paused: true,
            position: 0.0,
        }));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (commands, command_rx) = std_mpsc::channel();

        let deck_status = Arc::clone(&status);
        let deck_notify = notify_tx.clone();
        thread::Builder::new()
            .name("earshot-deck".to_string())
            .spawn(move || {
                Deck {
                    status: deck_status,
                    notify_tx: deck_notify,
                    commands: command_rx,
                    output_device,
                    output: None,
                    source: None,
                    pending_play: None,
                    pending_seek: None,
                    playing: false,
                    last_time_update: Instant::now(),
                }
                .run()
            })
            .map_err(|e| MediaError::Output(format!("Failed to start deck thread: {}", e)))?;

        Ok(Self {
            status,
            commands,
            notify_tx,
            notify_rx: Some(notify_rx),
            http,
            download: None,
        })
    }

    fn send(&self, command: DeckCommand) {
        if self.commands.send(command).is_err() {
            warn!("Deck thread has exited; command dropped");
        }
    }

    fn abort_download(&mut self) {
        if let Some(task) = self.download.take() {
            task.abort();
        }
    }
}

impl MediaElement for NativeMedia {
    fn take_notifications(&mut self) -> Option<mpsc::UnboundedReceiver<MediaNotification>> {
        self.notify_rx.take()
    }

    fn load(&mut self, load_id: LoadId, url: &str) {
        self.abort_download();
        self.send(DeckCommand::Close);
        {
            let mut status = lock(&self.status);
            status.load_id = Some(load_id);
            status.duration = None;
            status.ready = ReadyState::HaveNothing;
            status.paused = true;
            status.position = 0.0;
        }

        info!("Loading {} from {}", load_id, url);
        let http = self.http.clone();
        let url = url.to_string();
        let commands = self.commands.clone();
        let notify_tx = self.notify_tx.clone();
        self.download = Some(tokio::spawn(async move {
            match fetch(&http, &url).await {
                Ok(bytes) => {
                    debug!("Downloaded {} bytes for {}", bytes.len(), load_id);
                    let _ = commands.send(DeckCommand::Open {
                        load_id,
                        bytes,
                        extension: extension_hint(&url),
                    });
                }
                Err(error) => {
                    warn!("Download failed for {}: {}", load_id, error);
                    let _ = notify_tx.send(MediaNotification::Failed { load_id, error });
                }
            }
        }));
    }

    fn unload(&mut self) {
        self.abort_download();
        self.send(DeckCommand::Close);
        let mut status = lock(&self.status);
        status.load_id = None;
        status.duration = None;
        status.ready = ReadyState::HaveNothing;
        status.paused = true;
        status.position = 0.0;
    }

    fn play(&mut self) -> PlayFuture {
        {
            let mut status = lock(&self.status);
            if status.load_id.is_none() {
                return futures::future::ready(Err(MediaError::NoSource)).boxed();
            }
            status.paused = false;
        }

        let (reply, reply_rx) = oneshot::channel();
        self.send(DeckCommand::Play { reply });
        async move { reply_rx.await.unwrap_or(Err(MediaError::Aborted)) }.boxed()
    }

    fn pause(&mut self) {
        lock(&self.status).paused = true;
        self.send(DeckCommand::Pause);
    }

    fn position(&self) -> f64 {
        lock(&self.status).position
    }

    fn set_position(&mut self, seconds: f64) {
        let seconds = {
            let mut status = lock(&self.status);
            let mut target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
            if let Some(duration) = status.duration {
                target = target.min(duration);
            }
            status.position = target;
            target
        };
        self.send(DeckCommand::Seek { seconds });
    }

    fn duration(&self) -> Option<f64> {
        lock(&self.status).duration
    }

    fn is_paused(&self) -> bool {
        lock(&self.status).paused
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.status).ready
    }
}

impl Drop for NativeMedia {
    fn drop(&mut self) {
        self.abort_download();
        let _ = self.commands.send(DeckCommand::Shutdown);
    }
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, MediaError> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| MediaError::Load(e.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| MediaError::Load(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Decoded source owned by the deck
struct Source {
    load_id: LoadId,
    decoder: StreamDecoder,
    converter: Option<StreamConverter>,
    /// Converted samples that did not fit in the ring yet
    carry: Vec<f32>,
    /// Position the played-frame counter is relative to
    base_position: f64,
    exhausted: bool,
    ended_sent: bool,
}

impl Source {
    fn seek(&mut self, seconds: f64) {
        if let Err(e) = self.decoder.seek(seconds) {
            warn!("{}", e);
        }
        if let Some(converter) = self.converter.as_mut() {
            converter.reset();
        }
        self.carry.clear();
        self.base_position = seconds;
        self.exhausted = false;
        self.ended_sent = false;
    }

    /// Top up the ring buffer from the decoder
    fn fill(&mut self, output: &mut AudioOutput) {
        // Anything pushed now would be dropped together with the stale audio
        if output.clear_pending() {
            return;
        }
        loop {
            if !self.carry.is_empty() {
                let written = output.push(&self.carry);
                self.carry.drain(..written);
                if !self.carry.is_empty() {
                    return;
                }
            }
            if self.exhausted || output.vacant() < FILL_THRESHOLD {
                return;
            }

            match self.decoder.next_chunk() {
                Ok(Some(samples)) => {
                    let (rate, channels) = (self.decoder.sample_rate(), self.decoder.channels());
                    let (out_rate, out_channels) = (output.sample_rate(), output.channels());
                    let stale = self
                        .converter
                        .as_ref()
                        .map_or(true, |c| !c.matches(rate, channels, out_rate, out_channels));
                    if stale {
                        match StreamConverter::new(rate, channels, out_rate, out_channels) {
                            Ok(converter) => self.converter = Some(converter),
                            Err(e) => {
                                warn!("{}", e);
                                self.exhausted = true;
                                return;
                            }
                        }
                    }
                    if let Some(converter) = self.converter.as_mut() {
                        match converter.process(&samples) {
                            Ok(converted) => self.carry = converted,
                            Err(e) => {
                                warn!("{}", e);
                                self.exhausted = true;
                            }
                        }
                    }
                }
                Ok(None) => {
                    self.exhausted = true;
                    if let Some(converter) = self.converter.as_mut() {
                        self.carry = converter.flush().unwrap_or_default();
                    }
                }
                Err(e) => {
                    warn!("Stopping decode for {}: {}", self.load_id, e);
                    self.exhausted = true;
                }
            }
        }
    }
}

/// Owns decoder and output; runs on its own thread
struct Deck {
    status: Arc<Mutex<Status>>,
    notify_tx: mpsc::UnboundedSender<MediaNotification>,
    commands: std_mpsc::Receiver<DeckCommand>,
    output_device: Option<String>,
    output: Option<AudioOutput>,
    source: Option<Source>,
    pending_play: Option<oneshot::Sender<Result<(), MediaError>>>,
    pending_seek: Option<f64>,
    playing: bool,
    last_time_update: Instant,
}

impl Deck {
    fn run(mut self) {
        debug!("Deck thread started");
        loop {
            match self.commands.recv_timeout(DECK_POLL) {
                Ok(DeckCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.pump();
        }
        debug!("Deck thread stopped");
    }

    fn notify(&self, notification: MediaNotification) {
        let _ = self.notify_tx.send(notification);
    }

    fn abort_pending_play(&mut self) {
        if let Some(reply) = self.pending_play.take() {
            let _ = reply.send(Err(MediaError::Aborted));
        }
    }

    fn stop_output(&mut self) {
        self.playing = false;
        if let Some(output) = self.output.as_ref() {
            output.pause();
        }
    }

    fn handle(&mut self, command: DeckCommand) {
        match command {
            DeckCommand::Open {
                load_id,
                bytes,
                extension,
            } => self.open(load_id, bytes, extension.as_deref()),
            DeckCommand::Close => {
                self.abort_pending_play();
                self.stop_output();
                if let Some(output) = self.output.as_ref() {
                    output.clear();
                }
                self.source = None;
                self.pending_seek = None;
            }
            DeckCommand::Play { reply } => {
                if self.source.is_some() {
                    self.start(reply);
                } else {
                    // Still downloading; answered once the source opens
                    self.abort_pending_play();
                    self.pending_play = Some(reply);
                }
            }
            DeckCommand::Pause => {
                self.abort_pending_play();
                self.stop_output();
            }
            DeckCommand::Seek { seconds } => match self.source.as_mut() {
                Some(source) => {
                    source.seek(seconds);
                    if let Some(output) = self.output.as_ref() {
                        output.clear();
                    }
                }
                None => self.pending_seek = Some(seconds),
            },
            DeckCommand::Shutdown => {}
        }
    }

    fn open(&mut self, load_id: LoadId, bytes: Vec<u8>, extension: Option<&str>) {
        if lock(&self.status).load_id != Some(load_id) {
            debug!("Discarding download for replaced {}", load_id);
            return;
        }

        let decoder = match StreamDecoder::open(bytes, extension) {
            Ok(decoder) => decoder,
            Err(error) => {
                warn!("Cannot open {}: {}", load_id, error);
                self.abort_pending_play();
                self.notify(MediaNotification::Failed { load_id, error });
                return;
            }
        };

        let mut source = Source {
            load_id,
            decoder,
            converter: None,
            carry: Vec::new(),
            base_position: 0.0,
            exhausted: false,
            ended_sent: false,
        };
        if let Some(seconds) = self.pending_seek.take() {
            source.seek(seconds);
        }

        {
            let mut status = lock(&self.status);
            status.duration = source.decoder.duration();
            status.ready = ReadyState::HaveMetadata;
        }
        self.source = Some(source);
        self.notify(MediaNotification::MetadataLoaded { load_id });

        // The whole enclosure is in memory, so playback can run to the end
        lock(&self.status).ready = ReadyState::HaveEnoughData;
        self.notify(MediaNotification::CanPlay { load_id });

        if let Some(reply) = self.pending_play.take() {
            self.start(reply);
        }
    }

    fn start(&mut self, reply: oneshot::Sender<Result<(), MediaError>>) {
        if self.output.is_none() {
            match AudioOutput::open(self.output_device.as_deref()) {
                Ok(output) => self.output = Some(output),
                Err(error) => {
                    lock(&self.status).paused = true;
                    let _ = reply.send(Err(error));
                    return;
                }
            }
        }

        // Playing after the end restarts from the top
        if let Some(source) = self.source.as_mut() {
            if source.ended_sent {
                source.seek(0.0);
                lock(&self.status).position = 0.0;
                if let Some(output) = self.output.as_ref() {
                    output.clear();
                }
            }
        }

        let started = match self.output.as_ref() {
            Some(output) => output.resume(),
            None => Err(MediaError::Output("Output unavailable".to_string())),
        };
        match started {
            Ok(()) => {
                self.playing = true;
                self.last_time_update = Instant::now();
                let _ = reply.send(Ok(()));
            }
            Err(error) => {
                lock(&self.status).paused = true;
                let _ = reply.send(Err(error));
            }
        }
    }

    /// Keep audio flowing and publish position, time updates and end of stream
    fn pump(&mut self) {
        if !self.playing {
            return;
        }
        let (Some(source), Some(output)) = (self.source.as_mut(), self.output.as_mut()) else {
            return;
        };
        let load_id = source.load_id;

        if output.has_failed() {
            warn!("Audio device failed during {}; pausing", load_id);
            self.output = None;
            self.playing = false;
            lock(&self.status).paused = true;
            self.notify(MediaNotification::TimeUpdate { load_id });
            return;
        }

        source.fill(output);

        let position =
            source.base_position + output.frames_played() as f64 / output.sample_rate() as f64;
        let finished = source.exhausted && source.carry.is_empty() && output.buffered() == 0;
        if finished && !source.ended_sent {
            source.ended_sent = true;
            output.pause();
            self.playing = false;
            {
                let mut status = lock(&self.status);
                status.paused = true;
                status.position = status.duration.unwrap_or(position);
            }
            info!("End of stream for {}", load_id);
            self.notify(MediaNotification::Ended { load_id });
            return;
        }

        lock(&self.status).position = position;
        if self.last_time_update.elapsed() >= TIME_UPDATE_INTERVAL {
            self.last_time_update = Instant::now();
            self.notify(MediaNotification::TimeUpdate { load_id });
        }
    }
}
