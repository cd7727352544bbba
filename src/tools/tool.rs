//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::arguments::ToolArguments;
use super::types::ToolSpec;
use crate::error::VoiceError;

/// Context available while a tool runs.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: String,
    pub call_id: String,
}

/// A handler the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> &ToolSpec;

    fn name(&self) -> &str {
        &self.spec().name
    }

    /// Run the tool. The returned JSON is passed upstream verbatim.
    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<Value, VoiceError>;
}

type ToolHandler = dyn Fn(ToolArguments, ToolContext) -> Pin<Box<dyn Future<Output = Result<Value, VoiceError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for local handlers and tests.
pub struct FnTool {
    spec: ToolSpec,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, VoiceError>> + Send + 'static,
    {
        Self {
            spec,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ToolContext) -> Result<Value, VoiceError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("name", &self.spec.name).finish()
    }
}
