//! PCM16 conversion and wire encoding.
//!
//! Both providers carry mono little-endian PCM16, base64-encoded inside JSON.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

use crate::error::{Result, VoiceError};

/// Convert float samples in [-1, 1] to PCM16, clamping anything outside.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
            if clamped < 0.0 {
                (clamped * 32768.0) as i16
            } else {
                (clamped * 32767.0) as i16
            }
        })
        .collect()
}

/// Convert PCM16 samples to floats in [-1, 1).
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| f32::from(sample) / 32768.0)
        .collect()
}

pub fn encode_pcm16_le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|sample| sample.to_le_bytes()).collect()
}

/// Decode little-endian PCM16 bytes. A trailing odd byte is dropped.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Encode PCM16 samples as base64 for a JSON frame.
pub fn encode_base64(samples: &[i16]) -> String {
    B64.encode(encode_pcm16_le(samples))
}

pub fn decode_base64(data: &str) -> Result<Vec<i16>> {
    let bytes = B64
        .decode(data.trim())
        .map_err(|error| VoiceError::InvalidArgument(format!("Invalid base64 audio: {error}")))?;
    Ok(decode_pcm16_le(&bytes))
}

/// Mix interleaved frames down to mono and resample linearly to `to_rate`.
///
/// Input devices rarely run at a provider's capture rate or in mono.
pub fn to_mono_at_rate(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if channels == 0 || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return Vec::new();
    }
    let channels = usize::from(channels);
    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    if from_rate == to_rate || mono.is_empty() {
        return mono;
    }

    let out_len = (mono.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let step = f64::from(from_rate) / f64::from(to_rate);
    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position as usize).min(mono.len() - 1);
            let fraction = (position - index as f64) as f32;
            let current = mono[index];
            let next = mono.get(index + 1).copied().unwrap_or(current);
            current + (next - current) * fraction
        })
        .collect()
}

/// MIME type for raw PCM at a given rate, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Extract the `rate=` parameter from a PCM MIME type.
pub fn parse_pcm_rate(mime: &str) -> Option<u32> {
    mime.split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// Whether a MIME type describes raw PCM audio.
pub fn is_pcm_mime(mime: &str) -> bool {
    mime.split(';')
        .next()
        .map(|essence| {
            let essence = essence.trim();
            essence.eq_ignore_ascii_case("audio/pcm") || essence.eq_ignore_ascii_case("audio/l16")
        })
        .unwrap_or(false)
}
