//! Realtime session contract shared by both provider clients.
//!
//! Each provider implements [`RealtimeSession`] with its own framing; only the
//! behaviour (state machine, event stream, fire-and-forget sends) is shared.

pub(crate) mod lifecycle;
pub mod events;
pub(crate) mod link;
pub mod state;
pub(crate) mod transport;

pub use events::{ResultDelivery, SessionEvent, ToolCallRequest, ToolResult};
pub use state::SessionState;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::provider::ProviderKind;
use crate::room::SessionProfile;

/// One duplex connection to a realtime voice provider.
///
/// Send methods only queue frames; none of them wait on the network.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    fn session_id(&self) -> &str;

    fn provider(&self) -> ProviderKind;

    fn state(&self) -> SessionState;

    fn subscribe_state(&self) -> watch::Receiver<SessionState>;

    /// PCM16 rate the provider expects from the microphone.
    fn input_sample_rate(&self) -> u32;

    fn result_delivery(&self) -> ResultDelivery;

    /// Open the connection, send setup, and wait until the session is active.
    async fn connect(&self) -> Result<()>;

    /// The inbound event stream. Yields `Some` once.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>>;

    /// Inject a user text turn. Fails unless the session is active.
    fn send_user_text(&self, text: &str, end_of_turn: bool) -> Result<()>;

    /// Stream one capture frame. Silently ignored unless the session is active.
    fn send_realtime_audio(&self, pcm16: &[i16]);

    /// Return tool results upstream, framed per [`Self::result_delivery`].
    ///
    /// Results for calls that are not pending are dropped.
    fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<()>;

    /// Release the transport. Idempotent and safe from any state.
    async fn close(&self) -> Result<()>;
}

/// Creates sessions for a resolved room profile.
pub trait SessionFactory: Send + Sync {
    fn create(&self, profile: SessionProfile) -> Result<Arc<dyn RealtimeSession>>;
}
