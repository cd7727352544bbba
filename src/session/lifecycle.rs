//! Connection lifecycle shared by the provider session clients.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use super::events::SessionEvent;
use super::link::SessionLink;
use super::state::SessionState;
use super::transport::{self, FrameDecoder, PumpHandle, RealtimeWebSocket};
use crate::error::{Result, VoiceError};
use crate::provider::ProviderKind;
use crate::util::sync::lock;
use crate::util::timeout::with_timeout;

pub(crate) struct SessionCore {
    pub(crate) link: Arc<SessionLink>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    pump: Mutex<Option<PumpHandle>>,
}

impl SessionCore {
    pub(crate) fn new(provider: ProviderKind) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            link: Arc::new(SessionLink::new(session_id, provider)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            pump: Mutex::new(None),
        }
    }

    pub(crate) fn session_id(&self) -> &str {
        self.link.session_id()
    }

    pub(crate) fn state(&self) -> SessionState {
        self.link.state()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.link.subscribe()
    }

    pub(crate) fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        lock(&self.events_rx).take()
    }

    /// `Idle → Connecting`, rejecting a second connect on the same session.
    pub(crate) fn begin_connect(&self) -> Result<()> {
        let state = self.state();
        if state != SessionState::Idle || !self.link.transition(SessionState::Connecting) {
            return Err(VoiceError::InvalidState(format!(
                "Cannot connect a session that is {state}"
            )));
        }
        Ok(())
    }

    /// Hand the socket to a pump task.
    pub(crate) fn start_pump<D: FrameDecoder>(
        &self,
        socket: RealtimeWebSocket,
        decoder: D,
        heartbeat_interval: Duration,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.link.attach(outbound_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(transport::run_pump(
            socket,
            Arc::clone(&self.link),
            decoder,
            outbound_rx,
            self.events_tx.clone(),
            shutdown_rx,
            heartbeat_interval,
        ));
        *lock(&self.pump) = Some(PumpHandle { shutdown_tx, task });
    }

    /// Wait for the handshake to finish, bounded by `timeout`.
    pub(crate) async fn wait_until_active(&self, timeout: Duration) -> Result<()> {
        let mut state_rx = self.link.subscribe();
        let state = with_timeout(timeout, async move {
            state_rx
                .wait_for(|state| *state != SessionState::Connecting)
                .await
                .map(|state| *state)
                .map_err(|_| VoiceError::Transport("Session dropped during handshake".into()))
        })
        .await?;

        if state.accepts_input() {
            Ok(())
        } else {
            Err(VoiceError::Transport(format!(
                "Session entered {state} during handshake"
            )))
        }
    }

    /// `Connecting → Active` for providers that send no acknowledgement.
    /// Fails when the pump or a concurrent close already moved the session on.
    pub(crate) fn mark_active(&self) -> Result<()> {
        if self.link.transition(SessionState::Active) {
            return Ok(());
        }
        Err(VoiceError::Transport(format!(
            "Session entered {} during handshake",
            self.state()
        )))
    }

    /// Tear down after a failed connect and surface the error.
    ///
    /// A session that was closed mid-handshake, or whose pump already
    /// reported the failure, emits nothing further.
    pub(crate) fn fail(&self, error: &VoiceError) {
        if let Some(pump) = lock(&self.pump).take() {
            let _ = pump.shutdown_tx.send(true);
            pump.task.abort();
        }
        self.link.detach();
        if matches!(
            self.state(),
            SessionState::Closing | SessionState::Closed | SessionState::Error
        ) {
            return;
        }
        self.link.transition(SessionState::Error);
        let _ = self.events_tx.send(SessionEvent::Error {
            message: error.to_string(),
        });
    }

    /// Idempotent close from any state.
    pub(crate) async fn close(&self) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }

        let pump = lock(&self.pump).take();
        let outcome = match pump {
            Some(pump) => {
                self.link.transition(SessionState::Closing);
                let _ = pump.shutdown_tx.send(true);
                pump.task.await.map_err(|error| {
                    VoiceError::Transport(format!("Realtime pump task failed: {error}"))
                })
            }
            None => {
                let _ = self.events_tx.send(SessionEvent::Closed);
                Ok(())
            }
        };

        self.link.detach();
        self.link.transition(SessionState::Closed);
        outcome
    }
}

impl Drop for SessionCore {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.pump).take() {
            let _ = pump.shutdown_tx.send(true);
            pump.task.abort();
        }
    }
}
