//! Hardware audio: cpal microphone capture and rodio speaker playback.
//!
//! Both backends keep their non-`Send` stream objects on a dedicated thread
//! and hand the async side a channel-backed handle.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle as ThreadHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use futures::future::BoxFuture;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::capture::{CaptureRequest, CaptureStream, MicrophoneSource};
use super::pcm;
use super::playback::PlaybackSink;
use super::types::AudioChunk;
use crate::error::{Result, VoiceError};

/// The default input device in its native format, converted to mono at the
/// provider's capture rate.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl MicrophoneSource for CpalMicrophone {
    fn open(
        &self,
        request: CaptureRequest,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureStream>> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("deskvoice-capture".into())
            .spawn(move || {
                let stream = match build_input_stream(request, frames) {
                    Ok(stream) => stream,
                    Err(error) => {
                        let _ = ready_tx.send(Err(error));
                        return;
                    }
                };
                if let Err(error) = stream.play() {
                    let _ = ready_tx.send(Err(VoiceError::AudioDevice(format!(
                        "Failed to start input stream: {error}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Hold the stream until released or the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalCaptureStream {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            })),
            Ok(Err(error)) => {
                let _ = thread.join();
                Err(error)
            }
            Err(_) => Err(VoiceError::AudioDevice(
                "Capture thread exited before the stream opened".into(),
            )),
        }
    }
}

fn build_input_stream(
    request: CaptureRequest,
    frames: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::Permission("No input device available".into()))?;
    let supported = device.default_input_config().map_err(|error| {
        VoiceError::AudioDevice(format!("No usable input configuration: {error}"))
    })?;
    let device_rate = supported.sample_rate().0;
    let channels = supported.channels();
    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".into()),
        device_rate,
        channels,
        target_rate = request.sample_rate,
        "opening input device"
    );

    let config = supported.config();
    let mut framer = Framer::new(request.buffer_size, frames);
    let target_rate = request.sample_rate;
    let on_error = |error: cpal::StreamError| warn!(%error, "input stream error");

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                framer.push(pcm::to_mono_at_rate(data, channels, device_rate, target_rate));
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats = pcm::pcm16_to_float(data);
                framer.push(pcm::to_mono_at_rate(&floats, channels, device_rate, target_rate));
            },
            on_error,
            None,
        ),
        other => {
            return Err(VoiceError::AudioDevice(format!(
                "Unsupported input sample format {other:?}"
            )))
        }
    };
    stream.map_err(map_build_error)
}

/// Regroups converted samples into frames of the requested capture size.
struct Framer {
    buffer_size: usize,
    pending: Vec<f32>,
    frames: mpsc::UnboundedSender<Vec<f32>>,
}

impl Framer {
    fn new(buffer_size: usize, frames: mpsc::UnboundedSender<Vec<f32>>) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            buffer_size,
            pending: Vec::with_capacity(buffer_size),
            frames,
        }
    }

    fn push(&mut self, samples: Vec<f32>) {
        for sample in samples {
            self.pending.push(sample);
            if self.pending.len() >= self.buffer_size {
                let frame =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.buffer_size));
                let _ = self.frames.send(frame);
            }
        }
    }
}

fn map_build_error(error: cpal::BuildStreamError) -> VoiceError {
    match error {
        cpal::BuildStreamError::DeviceNotAvailable => {
            VoiceError::Permission("Microphone is unavailable or access was denied".into())
        }
        other => VoiceError::AudioDevice(format!("Failed to open input stream: {other}")),
    }
}

struct CpalCaptureStream {
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<ThreadHandle<()>>,
}

impl CaptureStream for CpalCaptureStream {
    fn release(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalCaptureStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// The default output device.
pub struct RodioSpeaker {
    handle: OutputStreamHandle,
    _keepalive: std_mpsc::Sender<()>,
}

impl RodioSpeaker {
    pub fn open_default() -> Result<Self> {
        let (handle_tx, handle_rx) = std_mpsc::channel::<Result<OutputStreamHandle>>();
        let (keepalive, keepalive_rx) = std_mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("deskvoice-playback".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Returns once the speaker (and its sender) is dropped.
                    let _ = keepalive_rx.recv();
                    drop(stream);
                }
                Err(error) => {
                    let _ = handle_tx.send(Err(VoiceError::AudioDevice(format!(
                        "No output device: {error}"
                    ))));
                }
            })?;

        let handle = handle_rx.recv().map_err(|_| {
            VoiceError::AudioDevice("Playback thread exited before the device opened".into())
        })??;
        Ok(Self {
            handle,
            _keepalive: keepalive,
        })
    }
}

struct StopOnDrop(Sink);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

impl PlaybackSink for RodioSpeaker {
    fn play(&self, chunk: AudioChunk) -> BoxFuture<'static, Result<()>> {
        let handle = self.handle.clone();
        Box::pin(async move {
            let sink = Sink::try_new(&handle)
                .map_err(|error| VoiceError::AudioDevice(format!("Playback failed: {error}")))?;
            let sink = StopOnDrop(sink);
            sink.0.append(SamplesBuffer::new(
                1,
                chunk.sample_rate,
                pcm::pcm16_to_float(&chunk.samples),
            ));
            while !sink.0.empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(())
        })
    }
}
