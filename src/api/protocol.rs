//! JSON-RPC 2.0 tool protocol spoken with the assistant host.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::core::{Adapter, Arguments};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
pub struct Request {
    /// `None` only when the member is absent; an explicit `null` id still gets a reply.
    #[serde(default, deserialize_with = "present")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl Response {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Map<String, Value>>,
}

/// Routes protocol messages to one adapter.
#[derive(Clone)]
pub struct Dispatcher {
    adapter: Arc<dyn Adapter>,
}

impl Dispatcher {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    /// Handle one serialized message. Notifications produce no reply.
    pub async fn handle_message(&self, message: &str) -> Option<String> {
        self.handle_bytes(message.as_bytes()).await
    }

    /// Like [`Dispatcher::handle_message`], for input that may not be valid UTF-8.
    pub async fn handle_bytes(&self, message: &[u8]) -> Option<String> {
        let response = match serde_json::from_slice::<Value>(message) {
            Err(err) => Some(Response::error(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {err}"),
            )),
            Ok(value) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<Request>(value) {
                    Err(err) => Some(Response::error(
                        id,
                        INVALID_REQUEST,
                        format!("invalid request: {err}"),
                    )),
                    Ok(request) => self.handle(request).await,
                }
            }
        }?;

        match serde_json::to_string(&response) {
            Ok(serialized) => Some(serialized),
            Err(err) => {
                warn!(message = "Failed to serialize response", error = %err);
                None
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Option<Response> {
        let Request { id, method, params } = request;
        debug!(message = "Received request", %method, is_notification = id.is_none());

        let outcome = match method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.adapter.tools() })),
            "tools/call" => self.call_tool(params).await,
            method if method.starts_with("notifications/") => Ok(Value::Null),
            _ => Err((METHOD_NOT_FOUND, format!("method not found: {method}"))),
        };

        let id = id?;
        Some(match outcome {
            Ok(result) => Response::result(id, result),
            Err((code, message)) => Response::error(id, code, message),
        })
    }

    fn initialize(&self) -> Value {
        info!(message = "Client initialized", adapter = self.adapter.name());
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": format!("{}-adapter", self.adapter.name()),
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, (i64, String)> {
        let CallParams { name, arguments } = serde_json::from_value(params)
            .map_err(|err| (INVALID_PARAMS, format!("invalid params: {err}")))?;
        let arguments = Arguments::new(arguments.unwrap_or_default());

        let (text, is_error) = match self.adapter.call(&name, &arguments).await {
            Ok(text) => {
                info!(message = "Tool call succeeded", tool = %name);
                (text, false)
            }
            Err(err) => {
                warn!(message = "Tool call failed", tool = %name, error = %format!("{err:#}"));
                (format!("Error: {err:#}"), true)
            }
        };

        Ok(json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        }))
    }
}
