//! Per-session background tasks: state forwarding and inbound event routing.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::events::DeskEvent;
use crate::audio::{AudioCapture, SpeakerId, VoiceBus};
use crate::dispatch::ToolDispatcher;
use crate::error::RecoverySuggestion;
use crate::room::RoomId;
use crate::session::{RealtimeSession, SessionEvent, SessionState};

/// Publish every state change until the session is closed.
pub(super) async fn forward_status(
    room: RoomId,
    mut state_rx: watch::Receiver<SessionState>,
    events: mpsc::UnboundedSender<DeskEvent>,
) {
    loop {
        let state = *state_rx.borrow_and_update();
        if state != SessionState::Idle {
            let _ = events.send(DeskEvent::ConnectionStatus { room, state });
        }
        if state == SessionState::Closed || state_rx.changed().await.is_err() {
            break;
        }
    }
}

pub(super) struct EventRouter {
    pub(super) room: RoomId,
    pub(super) speaker: SpeakerId,
    pub(super) session: Arc<dyn RealtimeSession>,
    pub(super) bus: Arc<VoiceBus>,
    pub(super) capture: Arc<AudioCapture>,
    pub(super) dispatcher: ToolDispatcher,
    pub(super) events: mpsc::UnboundedSender<DeskEvent>,
}

impl EventRouter {
    /// Route inbound events in arrival order until the session closes.
    pub(super) async fn run(self, mut inbound: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = inbound.recv().await {
            match event {
                SessionEvent::Text { text, is_final } => {
                    let _ = self.events.send(DeskEvent::Transcript {
                        room: self.room,
                        speaker: self.speaker.clone(),
                        text,
                        is_final,
                    });
                }
                SessionEvent::Audio(chunk) => self.bus.enqueue_playback(chunk),
                SessionEvent::ToolCalls(calls) => {
                    debug!(room = %self.room, count = calls.len(), "dispatching tool calls");
                    // Detached: the next inbound message is not held up by tools.
                    drop(self.dispatcher.dispatch(Arc::clone(&self.session), calls));
                }
                SessionEvent::Interrupted => self.bus.stop(),
                SessionEvent::Error { message } => {
                    let fatal = self.session.state() == SessionState::Error;
                    warn!(room = %self.room, %message, fatal, "session error");
                    if fatal {
                        self.capture.stop_capture();
                        self.bus.stop();
                    }
                    let _ = self.events.send(DeskEvent::Error {
                        message,
                        suggestion: if fatal {
                            RecoverySuggestion::RejoinRoom
                        } else {
                            RecoverySuggestion::RetryLater
                        },
                    });
                }
                SessionEvent::Closed => {
                    self.capture.stop_capture();
                    break;
                }
            }
        }
    }
}
