//! Shared test doubles: microphone, playback sink, sessions, and a mock
//! realtime WebSocket server.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deskvoice::audio::{AudioChunk, CaptureRequest, CaptureStream, MicrophoneSource, PlaybackSink};
use deskvoice::error::{Result, VoiceError};
use deskvoice::provider::ProviderKind;
use deskvoice::room::SessionProfile;
use deskvoice::session::{
    RealtimeSession, ResultDelivery, SessionEvent, SessionFactory, SessionState, ToolResult,
};
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Counts acquisitions and releases so tests can assert nothing leaks.
#[derive(Default)]
pub struct FakeMicrophone {
    deny: AtomicBool,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
    frames: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>>,
    requests: Mutex<Vec<CaptureRequest>>,
}

impl FakeMicrophone {
    pub fn denying() -> Self {
        let mic = Self::default();
        mic.deny.store(true, Ordering::SeqCst);
        mic
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.open_count() - self.release_count()
    }

    pub fn last_request(&self) -> Option<CaptureRequest> {
        self.requests.lock().unwrap().last().copied()
    }

    /// Deliver one hardware frame. Returns false when no stream is open.
    pub fn push_frame(&self, frame: Vec<f32>) -> bool {
        match self.frames.lock().unwrap().as_ref() {
            Some(sender) => sender.send(frame).is_ok(),
            None => false,
        }
    }
}

impl MicrophoneSource for FakeMicrophone {
    fn open(
        &self,
        request: CaptureRequest,
        frames: mpsc::UnboundedSender<Vec<f32>>,
    ) -> Result<Box<dyn CaptureStream>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(VoiceError::Permission("denied by test".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        *self.frames.lock().unwrap() = Some(frames);
        Ok(Box::new(FakeStream {
            released: Arc::clone(&self.released),
            frames: Arc::clone(&self.frames),
            done: false,
        }))
    }
}

struct FakeStream {
    released: Arc<AtomicUsize>,
    frames: Arc<Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>>,
    done: bool,
}

impl CaptureStream for FakeStream {
    fn release(&mut self) {
        if !self.done {
            self.done = true;
            self.frames.lock().unwrap().take();
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Records which chunks started and which played to completion.
pub struct RecordingSink {
    chunk_time: Duration,
    started: Mutex<Vec<AudioChunk>>,
    finished: Arc<Mutex<Vec<AudioChunk>>>,
}

impl RecordingSink {
    /// Every chunk takes `chunk_time` to play.
    pub fn new(chunk_time: Duration) -> Self {
        Self {
            chunk_time,
            started: Mutex::new(Vec::new()),
            finished: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn started(&self) -> Vec<AudioChunk> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<AudioChunk> {
        self.finished.lock().unwrap().clone()
    }
}

impl PlaybackSink for RecordingSink {
    fn play(&self, chunk: AudioChunk) -> BoxFuture<'static, Result<()>> {
        self.started.lock().unwrap().push(chunk.clone());
        let finished = Arc::clone(&self.finished);
        let chunk_time = self.chunk_time;
        Box::pin(async move {
            tokio::time::sleep(chunk_time).await;
            finished.lock().unwrap().push(chunk);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Ordered record of lifecycle calls across every fake session.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub struct FakeSession {
    id: String,
    profile: SessionProfile,
    delivery: ResultDelivery,
    journal: Journal,
    fail_connect: bool,
    state: watch::Sender<SessionState>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    pub texts: Mutex<Vec<String>>,
    pub audio_frames: Mutex<Vec<Vec<i16>>>,
    pub results: Mutex<Vec<ToolResult>>,
}

impl FakeSession {
    pub fn new(id: impl Into<String>, profile: SessionProfile, journal: Journal) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let delivery = match profile.provider {
            ProviderKind::Gemini => ResultDelivery::Batched,
            ProviderKind::OpenAi => ResultDelivery::PerCall,
        };
        Self {
            id: id.into(),
            profile,
            delivery,
            journal,
            fail_connect: false,
            state,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            texts: Mutex::new(Vec::new()),
            audio_frames: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    /// Simulate an inbound provider event.
    pub fn inject(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    fn log(&self, entry: String) {
        self.journal.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl RealtimeSession for FakeSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn provider(&self) -> ProviderKind {
        self.profile.provider
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn input_sample_rate(&self) -> u32 {
        16_000
    }

    fn result_delivery(&self) -> ResultDelivery {
        self.delivery
    }

    async fn connect(&self) -> Result<()> {
        self.log(format!("connect:{}", self.id));
        self.state.send_replace(SessionState::Connecting);
        tokio::task::yield_now().await;
        if self.fail_connect {
            self.state.send_replace(SessionState::Error);
            return Err(VoiceError::Transport("connection refused".into()));
        }
        self.state.send_replace(SessionState::Active);
        self.log(format!("active:{}", self.id));
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    fn send_user_text(&self, text: &str, _end_of_turn: bool) -> Result<()> {
        if !self.state().accepts_input() {
            return Err(VoiceError::InvalidState("not active".into()));
        }
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn send_realtime_audio(&self, pcm16: &[i16]) {
        if self.state().accepts_input() {
            self.audio_frames.lock().unwrap().push(pcm16.to_vec());
        }
    }

    fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()> {
        self.log(format!("results:{}:{}", self.id, results.len()));
        self.results.lock().unwrap().extend(results);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }
        self.log(format!("close:{}", self.id));
        self.state.send_replace(SessionState::Closed);
        let _ = self.events_tx.send(SessionEvent::Closed);
        Ok(())
    }
}

/// Creates [`FakeSession`]s named `<room>-<n>` and keeps them for inspection.
#[derive(Default)]
pub struct FakeFactory {
    pub journal: Journal,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail_next: AtomicBool,
}

impl FakeFactory {
    pub fn fail_next_connect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeSession> {
        self.sessions().last().cloned().expect("a session was created")
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl SessionFactory for FakeFactory {
    fn create(&self, profile: SessionProfile) -> Result<Arc<dyn RealtimeSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        let id = format!("{}-{}", profile.room, sessions.len() + 1);
        self.journal.lock().unwrap().push(format!("create:{id}"));
        let mut session = FakeSession::new(id, profile, Arc::clone(&self.journal));
        if self.fail_next.swap(false, Ordering::SeqCst) {
            session = session.failing();
        }
        let session = Arc::new(session);
        sessions.push(Arc::clone(&session));
        Ok(session)
    }
}

// ---------------------------------------------------------------------------
// Mock realtime WebSocket server
// ---------------------------------------------------------------------------

pub type ServerSocket = WebSocketStream<TcpStream>;

/// What the client sent during the HTTP upgrade.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub query: String,
    pub headers: HashMap<String, String>,
}

/// Accept one connection on a local port and hand it to `handler`.
///
/// Returns the `ws://` base URL and the server task.
pub async fn serve_once<F, Fut>(handler: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(ServerSocket, Handshake) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("local addr should be available");

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("server should accept");
        let captured = Arc::new(Mutex::new(Handshake::default()));
        let captured_inner = Arc::clone(&captured);
        let ws = accept_hdr_async(stream, move |req: &Request, response: Response| {
            let mut handshake = captured_inner.lock().unwrap();
            handshake.query = req.uri().query().unwrap_or_default().to_string();
            handshake.headers = req
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
                })
                .collect();
            Ok(response)
        })
        .await
        .expect("handshake should succeed");
        let handshake = captured.lock().unwrap().clone();
        handler(ws, handshake).await;
    });

    (format!("ws://{address}/realtime"), task)
}

/// Next JSON text frame from the client, skipping control frames.
pub async fn recv_json(ws: &mut ServerSocket) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("client frame should arrive")
            .expect("stream should be open")
            .expect("frame should parse");
        match frame {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("client frame should be JSON")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected client frame: {other:?}"),
        }
    }
}

pub async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("server frame should send");
}

/// Wait until the client closes the socket.
pub async fn wait_for_close(ws: &mut ServerSocket) {
    while let Ok(Some(Ok(frame))) = timeout(Duration::from_secs(2), ws.next()).await {
        if matches!(frame, Message::Close(_)) {
            break;
        }
    }
}

/// Receive the next event, failing the test after two seconds.
pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event should arrive")
        .expect("event stream should be open")
}
