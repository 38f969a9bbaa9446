//! Incremental audio decoder using symphonia
//!
//! Wraps a probed format reader and codec over an in-memory copy of the
//! enclosure. Packets are decoded on demand so the deck only holds a small
//! amount of PCM at a time.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

use crate::media::MediaError;

/// Streaming decoder over a fully downloaded source
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<f64>,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl StreamDecoder {
    /// Probe `bytes` and prepare the first audio track.
    ///
    /// `extension` (e.g. `"mp3"`) is only a hint; probing falls back to
    /// content sniffing.
    pub fn open(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, MediaError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| MediaError::Load(format!("Failed to probe format: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| MediaError::Load("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| MediaError::Load("Sample rate not found".to_string()))?;
        let channels = params.channels.map(|c| c.count()).unwrap_or(2);

        let duration = match (params.n_frames, params.time_base) {
            (Some(frames), Some(time_base)) => {
                let time = time_base.calc_time(frames);
                Some(time.seconds as f64 + time.frac)
            }
            (Some(frames), None) => Some(frames as f64 / sample_rate as f64),
            _ => None,
        };

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| MediaError::Decode(format!("Unsupported codec: {}", e)))?;

        debug!(
            "Opened source: sample_rate={}, channels={}, duration={:?}",
            sample_rate, channels, duration
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            sample_buf: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Duration from the container, if it declares a frame count
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Decode the next packet into interleaved f32 samples.
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt packets are skipped.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<f32>>, MediaError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(MediaError::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity();
                    self.channels = spec.channels.count();

                    let needed = capacity * self.channels;
                    if self.sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                        self.sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
                    }
                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        return Ok(Some(buf.samples().to_vec()));
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet: {}", e);
                    continue;
                }
                Err(e) => return Err(MediaError::Decode(format!("Decode failed: {}", e))),
            }
        }
    }

    /// Reposition to `seconds`; the next chunk starts at or just before it.
    pub fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds.max(0.0)),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| MediaError::Decode(format!("Seek to {:.3}s failed: {}", seconds, e)))?;
        self.decoder.reset();
        Ok(())
    }
}

/// Lower-cased file extension of a URL path, ignoring query and fragment
pub fn extension_hint(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5).then(|| ext.to_ascii_lowercase())
}
