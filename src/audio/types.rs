//! Audio-related types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which way a chunk travels relative to the local user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Capture,
    Playback,
}

/// Identifies who is speaking in a chunk, for "who is talking" UI state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeakerId(String);

impl SpeakerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The local user at the microphone.
    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpeakerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An immutable unit of mono PCM16 audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub direction: Direction,
    pub speaker: SpeakerId,
    pub samples: Arc<[i16]>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn capture(samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Self {
        Self {
            direction: Direction::Capture,
            speaker: SpeakerId::user(),
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn playback(speaker: SpeakerId, samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Self {
        Self {
            direction: Direction::Playback,
            speaker,
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Play time at the chunk's own sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}
