//! Microphone capture: acquire, convert to PCM16, forward, release.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::pcm;
use crate::error::{Result, VoiceError};
use crate::session::RealtimeSession;
use crate::util::sync::lock;

/// Parameters for opening the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Rate dictated by the active provider.
    pub sample_rate: u32,
    /// Samples per delivered frame.
    pub buffer_size: usize,
}

/// A source of microphone frames.
///
/// `open` must either return a live stream or an error; a `Permission` error
/// is surfaced to the user unchanged.
pub trait MicrophoneSource: Send + Sync {
    fn open(
        &self,
        request: CaptureRequest,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureStream>>;
}

/// An acquired microphone stream. `release` must be idempotent.
pub trait CaptureStream: Send {
    fn release(&mut self);
}

struct ActiveCapture {
    session_id: String,
    stream: Box<dyn CaptureStream>,
    forwarder: JoinHandle<()>,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.stream.release();
        self.forwarder.abort();
        info!(session_id = %self.session_id, "microphone released");
    }
}

/// Owns the single microphone handle and streams it into a session.
pub struct AudioCapture {
    source: Arc<dyn MicrophoneSource>,
    buffer_size: usize,
    active: Mutex<Option<ActiveCapture>>,
}

impl AudioCapture {
    pub fn new(source: Arc<dyn MicrophoneSource>, buffer_size: usize) -> Self {
        Self {
            source,
            buffer_size,
            active: Mutex::new(None),
        }
    }

    /// Open the microphone and forward frames to `session`.
    ///
    /// No-op while already capturing. Fails if the session is not accepting
    /// input or the microphone cannot be acquired.
    pub fn start_capture(&self, session: Arc<dyn RealtimeSession>) -> Result<()> {
        let mut active = lock(&self.active);
        if active.is_some() {
            debug!("capture already active");
            return Ok(());
        }

        let state = session.state();
        if !state.accepts_input() {
            return Err(VoiceError::InvalidState(format!(
                "Cannot start capture while session is {state}"
            )));
        }

        let request = CaptureRequest {
            sample_rate: session.input_sample_rate(),
            buffer_size: self.buffer_size,
        };
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let stream = self.source.open(request, frames_tx)?;
        let session_id = session.session_id().to_string();
        let forwarder = tokio::spawn(forward_frames(frames_rx, session));

        info!(
            session_id = %session_id,
            sample_rate = request.sample_rate,
            buffer_size = request.buffer_size,
            "microphone capture started"
        );
        *active = Some(ActiveCapture {
            session_id,
            stream,
            forwarder,
        });
        Ok(())
    }

    /// Release the microphone. Safe to call when not capturing.
    pub fn stop_capture(&self) {
        let released = lock(&self.active).take();
        drop(released);
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.active).is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop_capture();
    }
}

async fn forward_frames(
    mut frames: mpsc::UnboundedReceiver<Vec<f32>>,
    session: Arc<dyn RealtimeSession>,
) {
    while let Some(frame) = frames.recv().await {
        let pcm16 = pcm::float_to_pcm16(&frame);
        session.send_realtime_audio(&pcm16);
    }
}

/// Microphone stand-in for builds without device audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableMicrophone;

impl MicrophoneSource for UnavailableMicrophone {
    fn open(
        &self,
        _request: CaptureRequest,
        _frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureStream>> {
        Err(VoiceError::Permission(
            "no microphone available (built without the `device` feature)".into(),
        ))
    }
}
