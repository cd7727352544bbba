//! Desk backend endpoints exposed as tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::DeskBackend;
use crate::error::{Result, VoiceError};
use crate::room::ToolCatalog;
use crate::tools::{Tool, ToolArguments, ToolContext, ToolSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Arguments are sent as query parameters.
    Get,
    /// Arguments are sent as the JSON body.
    Post,
}

/// Where a logical tool is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub tool: &'static str,
    pub method: Method,
    pub path: &'static str,
}

pub const DESK_ROUTES: &[Route] = &[
    Route {
        tool: "get_broker_snapshot",
        method: Method::Get,
        path: "/api/broker/snapshot",
    },
    Route {
        tool: "lookup_playbook",
        method: Method::Get,
        path: "/api/playbooks",
    },
    Route {
        tool: "log_trade_journal",
        method: Method::Post,
        path: "/api/journal",
    },
    Route {
        tool: "list_journal_entries",
        method: Method::Get,
        path: "/api/journal",
    },
    Route {
        tool: "get_autopilot_proposal",
        method: Method::Post,
        path: "/api/autopilot/proposal",
    },
    Route {
        tool: "review_risk",
        method: Method::Post,
        path: "/api/risk/review",
    },
    Route {
        tool: "get_vision_summary",
        method: Method::Post,
        path: "/api/vision/summary",
    },
];

/// A tool answered by one backend endpoint. The response JSON is the result.
#[derive(Debug, Clone)]
pub struct BackendTool {
    spec: ToolSpec,
    route: Route,
    backend: DeskBackend,
}

impl BackendTool {
    pub fn new(spec: ToolSpec, route: Route, backend: DeskBackend) -> Self {
        Self { spec, route, backend }
    }

    pub fn route(&self) -> Route {
        self.route
    }
}

#[async_trait]
impl Tool for BackendTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(&self, args: &ToolArguments, _ctx: &ToolContext) -> Result<Value> {
        match self.route.method {
            Method::Get => self.backend.get(self.route.path, &args.query_pairs()).await,
            Method::Post => self.backend.post(self.route.path, args.raw()).await,
        }
    }
}

/// Build a tool for every desk route, taking schemas from `catalog`.
pub fn desk_tools(backend: &DeskBackend, catalog: &ToolCatalog) -> Result<Vec<Arc<dyn Tool>>> {
    DESK_ROUTES
        .iter()
        .map(|route| {
            let spec = catalog.spec(route.tool).cloned().ok_or_else(|| {
                VoiceError::Configuration(format!(
                    "Backend route for '{}' has no tool schema",
                    route.tool
                ))
            })?;
            Ok(Arc::new(BackendTool::new(spec, *route, backend.clone())) as Arc<dyn Tool>)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_tool_has_a_route() {
        let catalog = ToolCatalog::desk();
        for spec in catalog.specs() {
            assert!(
                DESK_ROUTES.iter().any(|route| route.tool == spec.name),
                "no route for {}",
                spec.name
            );
        }
    }

    #[test]
    fn builds_one_tool_per_route() {
        let backend = DeskBackend::new("http://127.0.0.1:9").unwrap();
        let tools = desk_tools(&backend, &ToolCatalog::desk()).unwrap();
        assert_eq!(tools.len(), DESK_ROUTES.len());
    }

    #[test]
    fn missing_schema_is_reported() {
        let backend = DeskBackend::new("http://127.0.0.1:9").unwrap();
        let error = desk_tools(&backend, &ToolCatalog::new()).err().unwrap();
        assert!(matches!(error, VoiceError::Configuration(_)));
    }
}
