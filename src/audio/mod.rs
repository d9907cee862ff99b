//! Audio playback subsystem

pub mod output;
pub mod scheduler;

pub use output::AudioOutput;
pub use scheduler::{PlaybackScheduler, SchedulerConfig, SchedulerStats};

/// Decoded audio ready for scheduling
#[derive(Clone)]
pub struct AudioFrame {
    /// Interleaved samples in the f32 range
    pub samples: Vec<f32>,
    /// Source sample rate
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Get number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Get frame duration in microseconds
    pub fn duration_us(&self) -> u64 {
        (self.samples_per_channel() as u64 * 1_000_000) / self.sample_rate.max(1) as u64
    }
}

/// Adapt interleaved samples from one channel layout to another.
///
/// Mono is duplicated across outputs, extra source channels are averaged
/// down to mono, and other mismatches repeat the last source channel.
pub fn adapt_channels(samples: Vec<f32>, from: u16, to: u16) -> Vec<f32> {
    let from = from.max(1) as usize;
    let to = to.max(1) as usize;
    if from == to {
        return samples;
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame[ch.min(from - 1)]);
            }
        }
    }
    out
}
