//! The voice desk: the application-facing owner of the active session.
//!
//! At most one session exists at a time. Joining a room tears the previous
//! session down completely (microphone, playback, transport) before the new
//! one is created.

pub mod events;
mod router;

pub use events::DeskEvent;

use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audio::{AudioCapture, MicrophoneSource, PlaybackSink, SpeakerId, VoiceBus};
use crate::backend::{desk_tools, DeskBackend};
use crate::config::VoiceConfig;
use crate::dispatch::{ActivityLog, ToolDispatcher, ToolInvocation};
use crate::error::{Result, VoiceError};
use crate::provider::{ProviderKind, ProviderSessionFactory};
use crate::room::{RoomId, RoomRegistry};
use crate::session::{RealtimeSession, SessionFactory, SessionState};
use crate::util::sync::lock;
use router::{forward_status, EventRouter};

const TEARDOWN_GRACE: Duration = Duration::from_secs(2);

/// Collaborators for a [`VoiceDesk`].
#[derive(Builder)]
pub struct DeskSetup {
    registry: Arc<RoomRegistry>,
    factory: Arc<dyn SessionFactory>,
    dispatcher: ToolDispatcher,
    microphone: Arc<dyn MicrophoneSource>,
    speaker: Arc<dyn PlaybackSink>,
    #[builder(default = ProviderKind::Gemini)]
    provider: ProviderKind,
    #[builder(default = 4096)]
    capture_buffer_size: usize,
}

struct ActiveRoom {
    room: RoomId,
    session: Arc<dyn RealtimeSession>,
    status_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
}

pub struct VoiceDesk {
    registry: Arc<RoomRegistry>,
    factory: Arc<dyn SessionFactory>,
    dispatcher: ToolDispatcher,
    capture: Arc<AudioCapture>,
    bus: Arc<VoiceBus>,
    provider: std::sync::Mutex<ProviderKind>,
    active: Mutex<Option<ActiveRoom>>,
    events: mpsc::UnboundedSender<DeskEvent>,
    background: Vec<JoinHandle<()>>,
}

impl VoiceDesk {
    /// Create the desk and its event stream. Must be called inside a Tokio runtime.
    pub fn new(setup: DeskSetup) -> (Self, mpsc::UnboundedReceiver<DeskEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let bus = Arc::new(VoiceBus::new(setup.speaker));
        let background = vec![
            tokio::spawn(forward_speaker(bus.subscribe_speaker(), events.clone())),
            tokio::spawn(forward_activity(
                setup.dispatcher.activity().subscribe(),
                events.clone(),
            )),
        ];

        let desk = Self {
            registry: setup.registry,
            factory: setup.factory,
            dispatcher: setup.dispatcher,
            capture: Arc::new(AudioCapture::new(
                setup.microphone,
                setup.capture_buffer_size,
            )),
            bus,
            provider: std::sync::Mutex::new(setup.provider),
            active: Mutex::new(None),
            events,
            background,
        };
        (desk, events_rx)
    }

    /// Wire the built-in rooms, provider clients, and backend tools from config.
    ///
    /// Without a backend URL every tool call is answered with an error.
    pub fn from_config(
        config: VoiceConfig,
        provider: ProviderKind,
        microphone: Arc<dyn MicrophoneSource>,
        speaker: Arc<dyn PlaybackSink>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DeskEvent>)> {
        let registry = RoomRegistry::desk_default()?;
        let activity = Arc::new(ActivityLog::new(config.activity_log_capacity));
        let dispatcher = match config.backend_url.as_deref() {
            Some(_) => {
                let backend = DeskBackend::from_config(&config)?;
                ToolDispatcher::with_tools(activity, desk_tools(&backend, registry.catalog())?)
            }
            None => {
                warn!("no desk backend configured; tool calls will fail");
                ToolDispatcher::new(activity)
            }
        };
        let capture_buffer_size = config.capture_buffer_size;

        Ok(Self::new(
            DeskSetup::builder()
                .registry(Arc::new(registry))
                .factory(Arc::new(ProviderSessionFactory::new(config)))
                .dispatcher(dispatcher)
                .microphone(microphone)
                .speaker(speaker)
                .provider(provider)
                .capture_buffer_size(capture_buffer_size)
                .build(),
        ))
    }

    pub fn provider(&self) -> ProviderKind {
        *lock(&self.provider)
    }

    /// Select the provider used by the next `join_room`.
    pub fn set_provider(&self, provider: ProviderKind) {
        *lock(&self.provider) = provider;
    }

    pub async fn active_room(&self) -> Option<RoomId> {
        self.active.lock().await.as_ref().map(|active| active.room)
    }

    pub async fn session_state(&self) -> Option<SessionState> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.session.state())
    }

    pub fn is_mic_on(&self) -> bool {
        self.capture.is_capturing()
    }

    pub fn active_speaker(&self) -> Option<SpeakerId> {
        self.bus.active_speaker()
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        self.dispatcher.activity()
    }

    /// Tear down any current session, then connect to `room`.
    ///
    /// The room is resolved first, so a configuration error leaves the
    /// current session untouched. The connecting session is published before
    /// the handshake, so `leave_room` or another join can close it while the
    /// provider is still answering.
    pub async fn join_room(&self, room: RoomId) -> Result<()> {
        let provider = self.provider();
        let profile = match self.registry.resolve(room, provider) {
            Ok(profile) => profile,
            Err(error) => return Err(self.report(error)),
        };
        let speaker = profile.speaker.clone();

        let session = {
            let mut active = self.active.lock().await;
            if let Some(previous) = active.take() {
                self.teardown(previous).await;
            }

            let session = match self.factory.create(profile) {
                Ok(session) => session,
                Err(error) => return Err(self.report(error)),
            };
            let Some(inbound) = session.take_events() else {
                return Err(self.report(VoiceError::InvalidState(
                    "Session events were already taken".into(),
                )));
            };

            let status_task = tokio::spawn(forward_status(
                room,
                session.subscribe_state(),
                self.events.clone(),
            ));
            let router_task = tokio::spawn(
                EventRouter {
                    room,
                    speaker,
                    session: Arc::clone(&session),
                    bus: Arc::clone(&self.bus),
                    capture: Arc::clone(&self.capture),
                    dispatcher: self.dispatcher.clone(),
                    events: self.events.clone(),
                }
                .run(inbound),
            );

            *active = Some(ActiveRoom {
                room,
                session: Arc::clone(&session),
                status_task,
                router_task,
            });
            session
        };

        info!(%room, %provider, session_id = %session.session_id(), "joining room");
        let Err(error) = session.connect().await else {
            return Ok(());
        };

        let mut active = self.active.lock().await;
        let still_current = active
            .as_ref()
            .is_some_and(|current| current.session.session_id() == session.session_id());
        if !still_current {
            // Left or replaced mid-handshake; whoever did that tore it down.
            info!(%room, %error, "join cancelled during handshake");
            return Err(error);
        }
        if let Some(current) = active.take() {
            self.teardown(current).await;
        }
        Err(self.report(error))
    }

    /// Close the current session, if any.
    pub async fn leave_room(&self) -> Result<()> {
        if let Some(previous) = self.active.lock().await.take() {
            info!(room = %previous.room, "leaving room");
            self.teardown(previous).await;
        }
        Ok(())
    }

    /// Start or stop microphone capture. Returns whether the mic is now on.
    pub async fn toggle_mic(&self) -> Result<bool> {
        let active = self.active.lock().await;
        let Some(current) = active.as_ref() else {
            return Err(self.report(VoiceError::InvalidState(
                "Join a room before enabling the microphone".into(),
            )));
        };

        if self.capture.is_capturing() {
            self.capture.stop_capture();
            return Ok(false);
        }

        // The user is about to speak.
        self.bus.stop();
        match self.capture.start_capture(Arc::clone(&current.session)) {
            Ok(()) => Ok(true),
            Err(error) => Err(self.report(error)),
        }
    }

    /// Send a typed turn, interrupting any assistant speech first.
    pub async fn send_user_text(&self, text: &str) -> Result<()> {
        let active = self.active.lock().await;
        let Some(current) = active.as_ref() else {
            return Err(self.report(VoiceError::InvalidState(
                "Join a room before sending text".into(),
            )));
        };
        self.bus.stop();
        current
            .session
            .send_user_text(text, true)
            .map_err(|error| self.report(error))
    }

    /// Microphone, then playback, then transport. Waits for the session's
    /// background tasks to observe the close.
    async fn teardown(&self, previous: ActiveRoom) {
        self.capture.stop_capture();
        self.bus.stop();
        if let Err(error) = previous.session.close().await {
            warn!(room = %previous.room, %error, "session close reported an error");
        }
        for mut task in [previous.router_task, previous.status_task] {
            if tokio::time::timeout(TEARDOWN_GRACE, &mut task).await.is_err() {
                warn!(room = %previous.room, "session task did not finish; aborting");
                task.abort();
            }
        }
    }

    fn report(&self, error: VoiceError) -> VoiceError {
        let _ = self.events.send(DeskEvent::from_error(&error));
        error
    }
}

impl Drop for VoiceDesk {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
        if let Some(active) = self.active.get_mut().take() {
            active.status_task.abort();
            active.router_task.abort();
        }
    }
}

async fn forward_speaker(
    mut speaker_rx: watch::Receiver<Option<SpeakerId>>,
    events: mpsc::UnboundedSender<DeskEvent>,
) {
    while speaker_rx.changed().await.is_ok() {
        let speaker = speaker_rx.borrow_and_update().clone();
        if events.send(DeskEvent::ActiveSpeaker { speaker }).is_err() {
            break;
        }
    }
}

async fn forward_activity(
    mut activity_rx: broadcast::Receiver<ToolInvocation>,
    events: mpsc::UnboundedSender<DeskEvent>,
) {
    loop {
        match activity_rx.recv().await {
            Ok(invocation) => {
                if events.send(DeskEvent::ToolActivity { invocation }).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "activity feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
