use serde::Serialize;
use serde_json::{Map, Value};

/// Description of a tool as advertised to the assistant host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// A set of tools backed by one remote API.
#[async_trait::async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn tools(&self) -> Vec<ToolSpec>;

    /// Run a tool and render its result as text.
    async fn call(&self, tool: &str, arguments: &Arguments) -> Result<String, anyhow::Error>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("missing required argument `{0}`")]
    Missing(&'static str),
    #[error("argument `{name}` {reason}")]
    Invalid {
        name: &'static str,
        reason: &'static str,
    },
}

/// Tool-call arguments; always a JSON object.
#[derive(Debug, Clone, Default)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn str(&self, name: &'static str) -> Result<&str, InputError> {
        self.opt_str(name)?.ok_or(InputError::Missing(name))
    }

    pub fn opt_str(&self, name: &'static str) -> Result<Option<&str>, InputError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(InputError::Invalid {
                name,
                reason: "must be a string",
            }),
        }
    }

    pub fn opt_u64(&self, name: &'static str) -> Result<Option<u64>, InputError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or(InputError::Invalid {
                name,
                reason: "must be a non-negative integer",
            }),
        }
    }

    pub fn object(&self, name: &'static str) -> Result<&Map<String, Value>, InputError> {
        self.opt_object(name)?.ok_or(InputError::Missing(name))
    }

    pub fn opt_object(&self, name: &'static str) -> Result<Option<&Map<String, Value>>, InputError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(InputError::Invalid {
                name,
                reason: "must be an object",
            }),
        }
    }

    /// A list of strings, given either as a JSON array or a comma separated string.
    pub fn opt_list(&self, name: &'static str) -> Result<Vec<String>, InputError> {
        let invalid = InputError::Invalid {
            name,
            reason: "must be a list of strings",
        };
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(value)) => Ok(value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_owned).ok_or(invalid.clone()))
                .collect(),
            Some(_) => Err(invalid),
        }
    }
}

/// Render a JSON value for the assistant.
pub fn render_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn args(value: Value) -> Arguments {
        match value {
            Value::Object(map) => Arguments::new(map),
            _ => panic!("arguments must be an object"),
        }
    }

    #[test]
    fn blank_strings_are_missing() {
        let args = args(json!({"path": "  "}));
        assert_eq!(args.str("path"), Err(InputError::Missing("path")));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let args = args(json!({"path": 3, "limit": "ten", "data": []}));
        assert!(matches!(args.str("path"), Err(InputError::Invalid { .. })));
        assert!(matches!(args.opt_u64("limit"), Err(InputError::Invalid { .. })));
        assert!(matches!(args.object("data"), Err(InputError::Invalid { .. })));
    }

    #[test]
    fn lists_accept_arrays_and_csv() {
        let from_array = args(json!({"fields": ["name", "status"]}));
        let from_csv = args(json!({"fields": "name, status,"}));
        assert_eq!(from_array.opt_list("fields").unwrap(), ["name", "status"]);
        assert_eq!(from_csv.opt_list("fields").unwrap(), ["name", "status"]);
        assert!(args(json!({})).opt_list("fields").unwrap().is_empty());
    }
}
