//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::VoiceError;

/// Wrapper around the `args` of a tool call.
///
/// Providers disagree on the shape: one sends a JSON object, the other a
/// JSON-encoded string. Both normalize to an object here.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Normalize raw provider arguments: strings are parsed, `null` becomes `{}`.
    pub fn from_wire(raw: &Value) -> Result<Self, VoiceError> {
        let value = match raw {
            Value::Null => Value::Object(Default::default()),
            Value::String(text) if text.trim().is_empty() => Value::Object(Default::default()),
            Value::String(text) => serde_json::from_str(text.trim()).map_err(|error| {
                VoiceError::InvalidArgument(format!("Arguments are not valid JSON: {error}"))
            })?,
            other => other.clone(),
        };
        Ok(Self { value })
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, VoiceError> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| VoiceError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, VoiceError> {
        self.value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| VoiceError::InvalidArgument(format!("Missing number argument: {key}")))
    }

    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        self.value.get(key).and_then(Value::as_i64)
    }

    /// Scalar arguments flattened to string pairs, for query strings.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let Some(object) = self.value.as_object() else {
            return Vec::new();
        };
        object
            .iter()
            .filter_map(|(key, value)| {
                let rendered = match value {
                    Value::String(text) => text.clone(),
                    Value::Number(number) => number.to_string(),
                    Value::Bool(flag) => flag.to_string(),
                    _ => return None,
                };
                Some((key.clone(), rendered))
            })
            .collect()
    }

    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, VoiceError> {
        serde_json::from_value(self.value.clone()).map_err(|error| {
            VoiceError::InvalidArgument(format!("Failed to deserialize arguments: {error}"))
        })
    }
}
