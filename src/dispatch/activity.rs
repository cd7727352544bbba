//! Tool invocation records and the bounded activity log.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tokio::sync::broadcast;

use crate::session::{ToolCallRequest, ToolResult};
use crate::util::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    Ok,
    Error,
}

impl InvocationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, InvocationStatus::Pending)
    }
}

/// One tool call as shown in the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call ids are only unique within this session.
    pub session_id: String,
    pub call_id: String,
    pub name: String,
    pub args: Value,
    pub status: InvocationStatus,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ToolInvocation {
    pub fn pending(session_id: impl Into<String>, call: &ToolCallRequest) -> Self {
        Self {
            session_id: session_id.into(),
            call_id: call.call_id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
            status: InvocationStatus::Pending,
            result: None,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to the terminal state described by `result`.
    pub fn finish(&mut self, result: &ToolResult) {
        self.finished_at = Some(Utc::now());
        if result.is_error {
            self.status = InvocationStatus::Error;
            self.error_message = Some(
                result
                    .error_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| result.payload.to_string()),
            );
        } else {
            self.status = InvocationStatus::Ok;
            self.result = Some(result.payload.clone());
        }
    }

    fn same_call(&self, other: &ToolInvocation) -> bool {
        self.session_id == other.session_id && self.call_id == other.call_id
    }
}

/// Most recent invocations, oldest first, with a change feed for the UI.
///
/// Recording never blocks: slow subscribers lag and lose updates.
pub struct ActivityLog {
    capacity: usize,
    entries: Mutex<VecDeque<ToolInvocation>>,
    updates: broadcast::Sender<ToolInvocation>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (updates, _) = broadcast::channel(capacity.max(16));
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            updates,
        }
    }

    /// Insert or update the entry for this call and publish it.
    pub fn record(&self, invocation: ToolInvocation) {
        {
            let mut entries = lock(&self.entries);
            match entries.iter_mut().find(|entry| entry.same_call(&invocation)) {
                Some(entry) => *entry = invocation.clone(),
                None => {
                    if entries.len() == self.capacity {
                        entries.pop_front();
                    }
                    entries.push_back(invocation.clone());
                }
            }
        }
        let _ = self.updates.send(invocation);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToolInvocation> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> Vec<ToolInvocation> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn get(&self, session_id: &str, call_id: &str) -> Option<ToolInvocation> {
        lock(&self.entries)
            .iter()
            .find(|entry| entry.session_id == session_id && entry.call_id == call_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(50)
    }
}
