//! Audio codec layer
//!
//! Adaptive 4-bit delta decoding for compressed server audio plus a
//! linear resampler between the stream rate and the playback device rate.

pub mod adpcm;
pub mod resampler;

pub use adpcm::{decode, encode, AdpcmDecoder};
pub use resampler::resample;

/// Convert signed 16-bit samples to the f32 range used by playback.
pub fn samples_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Convert little-endian PCM bytes to signed 16-bit samples.
///
/// A trailing odd byte is ignored.
pub fn pcm_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
