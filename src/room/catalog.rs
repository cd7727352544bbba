//! Logical tool set and its per-provider schema encodings.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::provider::ProviderKind;
use crate::tools::{ToolParameters, ToolSpec};

/// Logical tools keyed by name, plus the encoding each provider needs.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    specs: Vec<ToolSpec>,
    encodings: HashMap<ProviderKind, HashMap<String, Value>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The desk tools encoded for every provider.
    pub fn desk() -> Self {
        let mut catalog = Self::new();
        for spec in desk_tool_specs() {
            catalog.register(spec);
        }
        catalog.with_builtin_encodings()
    }

    /// Add or replace a logical tool. Existing encodings are kept.
    pub fn register(&mut self, spec: ToolSpec) {
        match self.specs.iter_mut().find(|existing| existing.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Attach a hand-written provider encoding for a tool.
    pub fn register_encoding(
        &mut self,
        provider: ProviderKind,
        name: impl Into<String>,
        encoding: Value,
    ) {
        self.encodings
            .entry(provider)
            .or_default()
            .insert(name.into(), encoding);
    }

    /// Derive encodings for every registered tool and provider.
    pub fn with_builtin_encodings(mut self) -> Self {
        let specs = self.specs.clone();
        for spec in &specs {
            self.register_encoding(ProviderKind::Gemini, &spec.name, encode_gemini(spec));
            self.register_encoding(ProviderKind::OpenAi, &spec.name, encode_openai(spec));
        }
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|spec| spec.name == name)
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn encoding(&self, provider: ProviderKind, name: &str) -> Option<&Value> {
        self.encodings.get(&provider)?.get(name)
    }
}

/// Gemini function declaration. Schema types use the OpenAPI uppercase form.
pub fn encode_gemini(spec: &ToolSpec) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "parameters": uppercase_types(&spec.parameters.schema),
    })
}

/// OpenAI realtime function tool.
pub fn encode_openai(spec: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "name": spec.name,
        "description": spec.description,
        "parameters": spec.parameters.schema,
    })
}

fn uppercase_types(schema: &Value) -> Value {
    match schema {
        Value::Object(fields) => {
            let mut converted = Map::with_capacity(fields.len());
            for (key, value) in fields {
                let value = match (key.as_str(), value) {
                    ("type", Value::String(kind)) => Value::String(kind.to_ascii_uppercase()),
                    // Property names are data, not schema keywords.
                    ("properties", Value::Object(properties)) => Value::Object(
                        properties
                            .iter()
                            .map(|(name, property)| (name.clone(), uppercase_types(property)))
                            .collect(),
                    ),
                    ("required" | "enum", other) => other.clone(),
                    (_, other) => uppercase_types(other),
                };
                converted.insert(key.clone(), value);
            }
            Value::Object(converted)
        }
        Value::Array(items) => Value::Array(items.iter().map(uppercase_types).collect()),
        other => other.clone(),
    }
}

/// Logical tools answered by the desk backend.
pub fn desk_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "get_broker_snapshot",
            "Current broker account snapshot: balances, open positions, working orders.",
            ToolParameters::object()
                .string("account_id", "Broker account; defaults to the active one", false)
                .build(),
        ),
        ToolSpec::new(
            "lookup_playbook",
            "Search the trader's playbooks for setups matching a query.",
            ToolParameters::object()
                .string("query", "Setup name or free-text description", true)
                .string("symbol", "Restrict to one instrument", false)
                .build(),
        ),
        ToolSpec::new(
            "review_risk",
            "Check a proposed trade against the desk's risk limits.",
            ToolParameters::object()
                .string("symbol", "Instrument ticker", true)
                .string_enum("side", "Trade direction", &["long", "short"], true)
                .number("quantity", "Contracts or shares", true)
                .number("entry_price", "Planned entry", false)
                .number("stop_price", "Protective stop", false)
                .build(),
        ),
        ToolSpec::new(
            "get_vision_summary",
            "Summarize the chart currently shared on the desk.",
            ToolParameters::object()
                .string("symbol", "Instrument on the chart", false)
                .string("timeframe", "Chart timeframe such as 5m or 1h", false)
                .build(),
        ),
        ToolSpec::new(
            "get_autopilot_proposal",
            "Generate an autopilot trade proposal for an instrument.",
            ToolParameters::object()
                .string("symbol", "Instrument ticker", true)
                .string("timeframe", "Trading timeframe", false)
                .number("risk_budget", "Maximum risk in account currency", false)
                .build(),
        ),
        ToolSpec::new(
            "log_trade_journal",
            "Record a trade and the trader's reflections in the journal.",
            ToolParameters::object()
                .string("symbol", "Instrument ticker", true)
                .string_enum("side", "Trade direction", &["long", "short"], true)
                .string("notes", "What happened and why", true)
                .number("pnl", "Realized profit or loss", false)
                .string_list("tags", "Labels such as setup names or mistakes", false)
                .build(),
        ),
        ToolSpec::new(
            "list_journal_entries",
            "List recent journal entries.",
            ToolParameters::object()
                .integer("limit", "Maximum entries to return", false)
                .string("symbol", "Restrict to one instrument", false)
                .build(),
        ),
    ]
}
