//! State, outbound queue, and pending calls shared by a session and its pump.

use std::collections::HashSet;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use super::events::ToolResult;
use super::state::SessionState;
use crate::error::{Result, VoiceError};
use crate::provider::ProviderKind;
use crate::util::sync::lock;

pub(crate) struct SessionLink {
    session_id: String,
    provider: ProviderKind,
    state: watch::Sender<SessionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    pending_calls: Mutex<HashSet<String>>,
}

impl SessionLink {
    pub(crate) fn new(session_id: String, provider: ProviderKind) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            session_id,
            provider,
            state,
            outbound: Mutex::new(None),
            pending_calls: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn session_id(&self) -> &str {
        &self.session_id
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Apply a transition if the state machine allows it.
    pub(crate) fn transition(&self, next: SessionState) -> bool {
        let mut previous = None;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                previous = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        match previous {
            Some(from) => {
                info!(
                    session_id = %self.session_id,
                    provider = %self.provider,
                    %from,
                    to = %next,
                    "session state changed"
                );
                true
            }
            None => false,
        }
    }

    pub(crate) fn attach(&self, outbound: mpsc::UnboundedSender<Message>) {
        *lock(&self.outbound) = Some(outbound);
    }

    /// Drop the outbound queue; later sends become no-ops.
    pub(crate) fn detach(&self) {
        lock(&self.outbound).take();
        lock(&self.pending_calls).clear();
    }

    /// Queue a JSON frame for the pump. Never waits on the network.
    pub(crate) fn send_json(&self, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let outbound = lock(&self.outbound);
        let sender = outbound
            .as_ref()
            .ok_or_else(|| VoiceError::InvalidState("Session transport is closed".into()))?;
        sender
            .send(Message::Text(text.into()))
            .map_err(|_| VoiceError::InvalidState("Session transport is closed".into()))
    }

    /// Record calls awaiting results and suspend the session.
    pub(crate) fn register_calls<'a>(&self, call_ids: impl IntoIterator<Item = &'a str>) {
        let mut pending = lock(&self.pending_calls);
        pending.extend(call_ids.into_iter().map(str::to_string));
        if !pending.is_empty() {
            self.transition(SessionState::ToolSuspended);
        }
    }

    /// Keep only results whose call is still pending, marking them answered.
    ///
    /// Duplicates and ids this session never issued are dropped, so each call
    /// is answered at most once.
    pub(crate) fn claim_results(&self, results: Vec<ToolResult>) -> Vec<ToolResult> {
        let mut pending = lock(&self.pending_calls);
        let claimed: Vec<ToolResult> = results
            .into_iter()
            .filter(|result| {
                let known = pending.remove(&result.call_id);
                if !known {
                    debug!(
                        session_id = %self.session_id,
                        call_id = %result.call_id,
                        "dropping result for unknown or answered call"
                    );
                }
                known
            })
            .collect();
        if pending.is_empty() && !claimed.is_empty() {
            self.transition(SessionState::Active);
        }
        claimed
    }

    pub(crate) fn pending_count(&self) -> usize {
        lock(&self.pending_calls).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::events::ToolCallRequest;

    fn link() -> SessionLink {
        let link = SessionLink::new("s-1".into(), ProviderKind::Gemini);
        link.transition(SessionState::Connecting);
        link.transition(SessionState::Active);
        link
    }

    fn result(call_id: &str) -> ToolResult {
        ToolResult::ok(
            &ToolCallRequest {
                call_id: call_id.into(),
                name: "get_broker_snapshot".into(),
                args: serde_json::json!({}),
            },
            serde_json::json!({ "ok": true }),
        )
    }

    #[test]
    fn pending_calls_suspend_until_all_answered() {
        let link = link();
        link.register_calls(["a", "b"]);
        assert_eq!(link.state(), SessionState::ToolSuspended);

        assert_eq!(link.claim_results(vec![result("a")]).len(), 1);
        assert_eq!(link.state(), SessionState::ToolSuspended);

        assert_eq!(link.claim_results(vec![result("b")]).len(), 1);
        assert_eq!(link.state(), SessionState::Active);
    }

    #[test]
    fn duplicate_and_foreign_results_are_dropped() {
        let link = link();
        link.register_calls(["a"]);
        let claimed = link.claim_results(vec![result("a"), result("a"), result("zzz")]);
        assert_eq!(claimed.len(), 1);
        assert_eq!(link.pending_count(), 0);
    }

    #[test]
    fn sends_fail_without_transport() {
        let link = link();
        let error = link.send_json(&serde_json::json!({ "x": 1 })).unwrap_err();
        assert!(matches!(error, VoiceError::InvalidState(_)));

        let (tx, mut rx) = mpsc::unbounded_channel();
        link.attach(tx);
        link.send_json(&serde_json::json!({ "x": 1 })).unwrap();
        assert!(matches!(rx.try_recv(), Ok(Message::Text(_))));

        link.detach();
        assert!(link.send_json(&serde_json::json!({ "x": 2 })).is_err());
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let link = SessionLink::new("s-2".into(), ProviderKind::OpenAi);
        assert!(!link.transition(SessionState::Active));
        assert_eq!(link.state(), SessionState::Idle);
    }
}
