//! JSON-RPC 2.0 envelope used for `tools/list` and `tools/call`.

use convoforge_core::{ForgeError, ForgeResult};
use serde::Serialize;
use serde_json::{json, Map, Value};

pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Error text fragments that mean the session endpoint is no longer valid.
const SESSION_EXPIRY_KEYWORDS: [&str; 4] = ["session", "expired", "invalid", "unauthorized"];

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }

    pub fn tools_list(id: u64) -> Self {
        Self::new(id, METHOD_TOOLS_LIST, json!({}))
    }

    pub fn tools_call(id: u64, name: &str, arguments: &Map<String, Value>) -> Self {
        Self::new(
            id,
            METHOD_TOOLS_CALL,
            json!({ "name": name, "arguments": arguments }),
        )
    }
}

/// A delivered JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    Success(Value),
    Failure(Value),
}

impl RpcReply {
    /// Decode a response body. Exactly one of `result` / `error` is expected;
    /// `result` wins if a server sends both.
    pub fn decode(body: &Value) -> ForgeResult<Self> {
        let Some(obj) = body.as_object() else {
            return Err(ForgeError::Decode(format!(
                "JSON-RPC response is not an object: {}",
                truncate(&body.to_string(), 200)
            )));
        };
        if let Some(result) = obj.get("result") {
            return Ok(RpcReply::Success(result.clone()));
        }
        if let Some(error) = obj.get("error") {
            return Ok(RpcReply::Failure(error.clone()));
        }
        Err(ForgeError::Decode(
            "JSON-RPC response has neither result nor error".into(),
        ))
    }
}

/// Human-readable text of a JSON-RPC error payload.
pub fn error_text(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let message = obj.get("message").and_then(Value::as_str).unwrap_or("");
            match obj.get("data") {
                Some(Value::String(data)) => format!("{message} {data}").trim().to_string(),
                Some(data) if !data.is_null() => format!("{message} {data}").trim().to_string(),
                _ if message.is_empty() => error.to_string(),
                _ => message.to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// Whether an error payload reports an expired or invalid session.
pub fn is_session_expiry(error: &Value) -> bool {
    let text = error_text(error).to_lowercase();
    SESSION_EXPIRY_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// The JSON-RPC `id` of a pushed message, if numeric.
pub fn response_id(body: &Value) -> Option<u64> {
    body.get("id").and_then(Value::as_u64)
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
