//! Streaming sample-rate and channel conversion
//!
//! Decoded packets arrive in arbitrary sizes at the source rate and channel
//! count. `StreamConverter` buffers them into the fixed chunks rubato wants,
//! resamples to the device rate and maps channels to the device layout.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};

use crate::media::MediaError;

/// Frames per rubato processing chunk
const CHUNK_FRAMES: usize = 1024;

/// Converts interleaved source audio into interleaved device audio
pub struct StreamConverter {
    source_rate: u32,
    source_channels: usize,
    output_rate: u32,
    output_channels: usize,
    resampler: Option<FastFixedIn<f32>>,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
}

impl StreamConverter {
    pub fn new(
        source_rate: u32,
        source_channels: usize,
        output_rate: u32,
        output_channels: usize,
    ) -> Result<Self, MediaError> {
        let source_channels = source_channels.max(1);
        let resampler = if source_rate == output_rate {
            None
        } else {
            Some(
                FastFixedIn::<f32>::new(
                    output_rate as f64 / source_rate as f64,
                    1.0,
                    PolynomialDegree::Septic,
                    CHUNK_FRAMES,
                    source_channels,
                )
                .map_err(|e| MediaError::Decode(format!("Failed to create resampler: {}", e)))?,
            )
        };

        Ok(Self {
            source_rate,
            source_channels,
            output_rate,
            output_channels: output_channels.max(1),
            resampler,
            pending: vec![Vec::new(); source_channels],
        })
    }

    /// True if this converter was built for the given layout
    pub fn matches(
        &self,
        source_rate: u32,
        source_channels: usize,
        output_rate: u32,
        output_channels: usize,
    ) -> bool {
        self.source_rate == source_rate
            && self.source_channels == source_channels.max(1)
            && self.output_rate == output_rate
            && self.output_channels == output_channels.max(1)
    }

    /// Feed interleaved source samples, returning whatever output is ready
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, MediaError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(map_channels(interleaved, self.source_channels, self.output_channels));
        };

        for (index, sample) in interleaved.iter().enumerate() {
            self.pending[index % self.source_channels].push(*sample);
        }

        let mut planar_out: Vec<Vec<f32>> = vec![Vec::new(); self.source_channels];
        while self.pending[0].len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();
            let output = resampler
                .process(&chunk, None)
                .map_err(|e| MediaError::Decode(format!("Resampling failed: {}", e)))?;
            for (dst, src) in planar_out.iter_mut().zip(output) {
                dst.extend(src);
            }
        }

        let interleaved = interleave(&planar_out);
        Ok(map_channels(&interleaved, self.source_channels, self.output_channels))
    }

    /// Push out the tail still held for a partial chunk (end of stream)
    pub fn flush(&mut self) -> Result<Vec<f32>, MediaError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }

        let tail: Vec<Vec<f32>> = self.pending.iter_mut().map(std::mem::take).collect();
        let output = resampler
            .process_partial(Some(tail.as_slice()), None)
            .map_err(|e| MediaError::Decode(format!("Resampling failed: {}", e)))?;
        let interleaved = interleave(&output);
        Ok(map_channels(&interleaved, self.source_channels, self.output_channels))
    }

    /// Drop buffered input and filter state (after a seek)
    pub fn reset(&mut self) {
        for channel in &mut self.pending {
            channel.clear();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

/// Planar to interleaved
fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let frames = first.len();
    let mut interleaved = Vec::with_capacity(frames * planar.len());
    for frame in 0..frames {
        for channel in planar {
            interleaved.push(channel[frame]);
        }
    }
    interleaved
}

/// Re-layout interleaved audio. Missing output channels repeat the last
/// source channel; extra source channels are dropped.
fn map_channels(interleaved: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return interleaved.to_vec();
    }
    let frames = interleaved.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in interleaved.chunks_exact(from) {
        for channel in 0..to {
            out.push(frame[channel.min(from - 1)]);
        }
    }
    out
}
