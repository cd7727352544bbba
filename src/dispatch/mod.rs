//! Tool-call dispatcher.
//!
//! Every inbound call resolves to exactly one [`ToolResult`]. Unknown tools,
//! bad arguments, handler errors, and handler panics all become error
//! payloads; nothing propagates back into the session.

pub mod activity;

pub use activity::{ActivityLog, InvocationStatus, ToolInvocation};

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::session::{RealtimeSession, ResultDelivery, ToolCallRequest, ToolResult};
use crate::tools::{validate_arguments, Tool, ToolArguments, ToolContext};

/// Routes tool calls to registered handlers. Cheap to clone.
#[derive(Clone)]
pub struct ToolDispatcher {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
    activity: Arc<ActivityLog>,
}

impl ToolDispatcher {
    pub fn new(activity: Arc<ActivityLog>) -> Self {
        Self {
            tools: Arc::new(HashMap::new()),
            activity,
        }
    }

    pub fn with_tools(activity: Arc<ActivityLog>, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let mut dispatcher = Self::new(activity);
        for tool in tools {
            dispatcher.register(tool);
        }
        dispatcher
    }

    /// Register a handler, replacing any with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        Arc::make_mut(&mut self.tools).insert(tool.name().to_string(), tool);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    /// Resolve one call to a result. Never fails.
    pub async fn invoke(&self, session_id: &str, call: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::error(call, format!("Unknown tool: {}", call.name));
        };

        let args = match ToolArguments::from_wire(&call.args) {
            Ok(args) => args,
            Err(error) => return ToolResult::error(call, error.to_string()),
        };
        if let Err(message) = validate_arguments(args.raw(), &tool.spec().parameters.schema) {
            return ToolResult::error(call, format!("Invalid arguments for {}: {message}", call.name));
        }

        let ctx = ToolContext {
            session_id: session_id.to_string(),
            call_id: call.call_id.clone(),
        };
        match AssertUnwindSafe(tool.execute(&args, &ctx)).catch_unwind().await {
            Ok(Ok(payload)) => ToolResult::ok(call, payload),
            Ok(Err(error)) => ToolResult::error(call, error.to_string()),
            Err(_) => ToolResult::error(call, format!("Tool '{}' panicked", call.name)),
        }
    }

    /// Invoke with activity tracking.
    async fn run_call(&self, session_id: &str, call: &ToolCallRequest) -> ToolResult {
        let mut invocation = ToolInvocation::pending(session_id, call);
        self.activity.record(invocation.clone());
        debug!(%session_id, call_id = %call.call_id, tool = %call.name, "tool call started");

        let result = self.invoke(session_id, call).await;
        if let Some(message) = result.error_message() {
            warn!(%session_id, call_id = %call.call_id, tool = %call.name, error = %message, "tool call failed");
        }

        invocation.finish(&result);
        self.activity.record(invocation);
        result
    }

    /// Run a batch of calls from one server message in the background.
    ///
    /// Calls run concurrently. Results go back framed per the session's
    /// [`ResultDelivery`]. Results for a session that has since closed are
    /// discarded by the session.
    pub fn dispatch(
        &self,
        session: Arc<dyn RealtimeSession>,
        calls: Vec<ToolCallRequest>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let session_id = session.session_id().to_string();
            match session.result_delivery() {
                ResultDelivery::Batched => {
                    let results =
                        join_all(calls.iter().map(|call| dispatcher.run_call(&session_id, call)))
                            .await;
                    if let Err(error) = session.send_tool_results(results) {
                        debug!(%session_id, %error, "tool results not delivered");
                    }
                }
                ResultDelivery::PerCall => {
                    let mut pending: FuturesUnordered<_> = calls
                        .iter()
                        .map(|call| dispatcher.run_call(&session_id, call))
                        .collect();
                    while let Some(result) = pending.next().await {
                        if let Err(error) = session.send_tool_results(vec![result]) {
                            debug!(%session_id, %error, "tool result not delivered");
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("tools", &self.tool_names())
            .finish()
    }
}
