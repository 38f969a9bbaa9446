//! Audio output using cpal
//!
//! The device callback pulls interleaved f32 samples from a ring buffer filled
//! by the deck thread. Underruns play silence. The callback counts frames it
//! actually played so the deck can report an accurate position.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::*;
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

use crate::media::MediaError;

/// Ring buffer length in seconds of device audio
const RING_SECONDS: f32 = 0.5;

/// Open output device plus the producer half of its ring buffer
pub struct AudioOutput {
    stream: Stream,
    producer: HeapProd<f32>,
    sample_rate: u32,
    channels: usize,
    frames_played: Arc<AtomicU64>,
    clear_requested: Arc<AtomicBool>,
    error_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Open `device_name` (or the default device) and start a paused stream.
    ///
    /// Falls back to the default device when the named one is missing.
    pub fn open(device_name: Option<&str>) -> Result<Self, MediaError> {
        let host = cpal::default_host();
        let device = select_device(&host, device_name)?;

        let supported = device
            .default_output_config()
            .map_err(|e| MediaError::Output(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            sample_rate, channels, sample_format
        );

        let capacity = ((sample_rate as f32 * RING_SECONDS) as usize * channels).max(channels);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let frames_played = Arc::new(AtomicU64::new(0));
        let clear_requested = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::new(AtomicBool::new(false));
        let feed = Feed {
            consumer,
            channels,
            frames_played: Arc::clone(&frames_played),
            clear_requested: Arc::clone(&clear_requested),
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, feed, Arc::clone(&error_flag))?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, feed, Arc::clone(&error_flag))?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, feed, Arc::clone(&error_flag))?,
            other => {
                return Err(MediaError::Output(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        // Some hosts start streams immediately
        let _ = stream.pause();

        info!("Audio output ready ({} Hz, {} ch)", sample_rate, channels);
        Ok(Self {
            stream,
            producer,
            sample_rate,
            channels,
            frames_played,
            clear_requested,
            error_flag,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn resume(&self) -> Result<(), MediaError> {
        self.stream
            .play()
            .map_err(|e| MediaError::Output(format!("Failed to start stream: {}", e)))
    }

    pub fn pause(&self) {
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause stream: {}", e);
        }
    }

    /// Free sample slots in the ring
    pub fn vacant(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Samples queued but not yet played
    pub fn buffered(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Queue samples; returns how many fit
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Discard queued audio and restart the played-frame count
    pub fn clear(&self) {
        self.clear_requested.store(true, Ordering::Release);
        self.frames_played.store(0, Ordering::Release);
    }

    /// True until the callback has dropped the queued audio
    pub fn clear_pending(&self) -> bool {
        self.clear_requested.load(Ordering::Acquire)
    }

    /// Frames played since the last `clear`
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    /// True once the stream reported an error
    pub fn has_failed(&self) -> bool {
        self.error_flag.load(Ordering::Acquire)
    }
}

/// State moved into the device callback
struct Feed {
    consumer: HeapCons<f32>,
    channels: usize,
    frames_played: Arc<AtomicU64>,
    clear_requested: Arc<AtomicBool>,
}

impl Feed {
    fn fill<T: SizedSample + FromSample<f32>>(&mut self, data: &mut [T]) {
        if self.clear_requested.swap(false, Ordering::AcqRel) {
            while self.consumer.try_pop().is_some() {}
            self.frames_played.store(0, Ordering::Release);
        }

        let mut played = 0usize;
        for slot in data.iter_mut() {
            *slot = match self.consumer.try_pop() {
                Some(sample) => {
                    played += 1;
                    T::from_sample(sample.clamp(-1.0, 1.0))
                }
                None => T::EQUILIBRIUM,
            };
        }
        self.frames_played
            .fetch_add((played / self.channels) as u64, Ordering::AcqRel);
    }
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<Device, MediaError> {
    if let Some(name) = device_name {
        let found = host
            .output_devices()
            .map_err(|e| MediaError::Output(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(name));
        match found {
            Some(device) => return Ok(device),
            None => warn!("Requested device '{}' not found, falling back to default device", name),
        }
    }

    host.default_output_device()
        .ok_or_else(|| MediaError::Output("No default output device found".to_string()))
}

fn build_stream<T: SizedSample + FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    mut feed: Feed,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream, MediaError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| feed.fill(data),
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| MediaError::Output(format!("Failed to build stream: {}", e)))
}
