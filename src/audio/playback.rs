//! Voice bus: ordered, interruptible playback of synthesized speech.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pcm;
use super::types::{AudioChunk, SpeakerId};
use crate::error::Result;
use crate::util::sync::lock;

/// An output that plays one chunk at a time.
pub trait PlaybackSink: Send + Sync {
    /// Play `chunk` at its own sample rate, resolving when it has finished.
    ///
    /// Dropping the returned future must silence the chunk immediately.
    fn play(&self, chunk: AudioChunk) -> BoxFuture<'static, Result<()>>;
}

#[derive(Default)]
struct BusQueue {
    pending: VecDeque<AudioChunk>,
    current: Option<CancellationToken>,
}

struct BusShared {
    queue: Mutex<BusQueue>,
    wake: Notify,
    speaker: watch::Sender<Option<SpeakerId>>,
}

/// FIFO playback queue with barge-in and active-speaker publishing.
///
/// Chunks play strictly one after another in arrival order. Each chunk start
/// publishes its speaker; the bus publishes `None` when it goes idle or is
/// stopped.
pub struct VoiceBus {
    shared: Arc<BusShared>,
    worker: JoinHandle<()>,
}

impl VoiceBus {
    /// Create a bus draining into `sink`. Must be called inside a Tokio runtime.
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        let (speaker, _) = watch::channel(None);
        let shared = Arc::new(BusShared {
            queue: Mutex::new(BusQueue::default()),
            wake: Notify::new(),
            speaker,
        });
        let worker = tokio::spawn(run_worker(Arc::clone(&shared), sink));
        Self { shared, worker }
    }

    /// Queue a chunk; playback starts at once if the bus is idle.
    pub fn enqueue_playback(&self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        lock(&self.shared.queue).pending.push_back(chunk);
        self.shared.wake.notify_one();
    }

    /// Decode a base64 PCM16 payload and queue it.
    pub fn enqueue_base64(&self, speaker: SpeakerId, data: &str, sample_rate: u32) -> Result<()> {
        let samples = pcm::decode_base64(data)?;
        self.enqueue_playback(AudioChunk::playback(speaker, samples, sample_rate));
        Ok(())
    }

    /// Barge-in: drop everything queued, silence the current chunk, publish `None`.
    pub fn stop(&self) {
        let mut queue = lock(&self.shared.queue);
        let dropped = queue.pending.len();
        queue.pending.clear();
        let interrupted = queue.current.take().map(|token| token.cancel()).is_some();
        self.shared.speaker.send_replace(None);
        if dropped > 0 || interrupted {
            debug!(dropped, interrupted, "voice bus stopped");
        }
    }

    pub fn queue_len(&self) -> usize {
        lock(&self.shared.queue).pending.len()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.shared.queue).current.is_some()
    }

    pub fn active_speaker(&self) -> Option<SpeakerId> {
        self.shared.speaker.borrow().clone()
    }

    pub fn subscribe_speaker(&self) -> watch::Receiver<Option<SpeakerId>> {
        self.shared.speaker.subscribe()
    }
}

impl Drop for VoiceBus {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn run_worker(shared: Arc<BusShared>, sink: Arc<dyn PlaybackSink>) {
    loop {
        let next = {
            let mut queue = lock(&shared.queue);
            match queue.pending.pop_front() {
                Some(chunk) => {
                    let token = CancellationToken::new();
                    queue.current = Some(token.clone());
                    shared.speaker.send_replace(Some(chunk.speaker.clone()));
                    Some((chunk, token))
                }
                None => {
                    shared.speaker.send_if_modified(|speaker| speaker.take().is_some());
                    None
                }
            }
        };

        let Some((chunk, token)) = next else {
            shared.wake.notified().await;
            continue;
        };

        let speaker = chunk.speaker.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            result = sink.play(chunk) => {
                if let Err(error) = result {
                    warn!(speaker = %speaker, %error, "playback chunk failed");
                }
            }
        }

        lock(&shared.queue).current = None;
    }
}

/// A sink that plays nothing but takes each chunk's real duration.
///
/// Keeps speaker state meaningful in builds without an audio device.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedPlayback;

impl PlaybackSink for SimulatedPlayback {
    fn play(&self, chunk: AudioChunk) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(chunk.duration()).await;
            Ok(())
        })
    }
}
