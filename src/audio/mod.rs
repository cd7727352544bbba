//! Audio bridge: microphone capture, PCM16 codec, and the voice bus.

pub mod capture;
pub mod pcm;
pub mod playback;
pub mod types;

#[cfg(feature = "device")]
pub mod device;

pub use capture::{AudioCapture, CaptureRequest, CaptureStream, MicrophoneSource, UnavailableMicrophone};
pub use playback::{PlaybackSink, SimulatedPlayback, VoiceBus};
pub use types::{AudioChunk, Direction, SpeakerId};

#[cfg(feature = "device")]
pub use device::{CpalMicrophone, RodioSpeaker};
