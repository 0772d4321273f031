//! Wire codecs for live audio
//!
//! Audio travels as base64 text wrapping signed 16-bit little-endian PCM.
//! Microphone and playback buffers are planar `f32` in `[-1.0, 1.0)`.

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scale between PCM16 integers and float samples
const PCM16_SCALE: f32 = 32768.0;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("PCM16 payload of {len} bytes is not a whole number of {channels}-channel frames")]
    MisalignedPcm { len: usize, channels: usize },

    #[error("channel count must be at least 1")]
    ZeroChannels,
}

/// Encode raw bytes as standard padded base64
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard padded base64 into raw bytes
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

/// Interpret `bytes` as interleaved little-endian i16 samples and split them
/// into `channels` planar float arrays.
pub fn pcm16_to_float(bytes: &[u8], channels: usize) -> Result<Vec<Vec<f32>>, CodecError> {
    if channels == 0 {
        return Err(CodecError::ZeroChannels);
    }

    let frame_bytes = channels * 2;
    if bytes.len() % frame_bytes != 0 {
        return Err(CodecError::MisalignedPcm {
            len: bytes.len(),
            channels,
        });
    }

    let frame_count = bytes.len() / frame_bytes;
    let mut planar = vec![Vec::with_capacity(frame_count); channels];

    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planar[i % channels].push(sample as f32 / PCM16_SCALE);
    }

    Ok(planar)
}

/// Convert float samples to little-endian PCM16 bytes.
///
/// Samples outside `[-1.0, 1.0)` are clamped to the i16 range instead of
/// wrapping. NaN becomes silence.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| sample_to_i16(s).to_le_bytes())
        .collect()
}

fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * PCM16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// MIME tag for mono PCM16 at `sample_rate`
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Parse the `rate=` parameter out of a PCM MIME tag
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}

/// Base64 audio payload with its MIME tag, as exchanged with the live API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    pub mime_type: String,
}

impl MediaBlob {
    /// Build an outbound blob from captured float samples
    pub fn pcm16(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: encode_base64(&float_to_pcm16(samples)),
            mime_type: pcm_mime_type(sample_rate),
        }
    }

    /// Decode the payload into planar float channels
    pub fn decode_pcm16(&self, channels: usize) -> Result<Vec<Vec<f32>>, CodecError> {
        pcm16_to_float(&decode_base64(&self.data)?, channels)
    }
}
