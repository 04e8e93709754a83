use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ForgeResult;
use crate::tools::{ToolDescriptor, ToolInvocation};

/// Trait for LLM providers used by the conversation completer.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., "openai_compat", "mock").
    fn name(&self) -> &str;

    /// Send a chat request, optionally advertising tools, and return the reply.
    ///
    /// Transport timeouts surface as [`ForgeError::Timeout`](crate::ForgeError::Timeout),
    /// every other failure as [`ForgeError::Llm`](crate::ForgeError::Llm).
    async fn complete(&self, request: &LlmRequest) -> ForgeResult<LlmResponse>;
}

/// Something that can execute named tools. Implemented by the protocol client
/// and by test doubles.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>)
        -> ForgeResult<ToolInvocation>;

    /// Snapshot of the tools currently known to the invoker.
    async fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Release the underlying session. Safe to call more than once.
    async fn release(&self) {}
}

/// One message of a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<LlmToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<LlmToolCall>) -> Self {
        Self {
            role: "assistant".into(),
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool call requested by the model. `arguments` is the raw JSON text the
/// model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl LlmToolCall {
    /// Parse the argument text; anything but a JSON object yields an empty map.
    pub fn parsed_arguments(&self) -> Map<String, Value> {
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Function schemas in OpenAI `tools` format. Empty means no tools.
    pub tools: Vec<Value>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Response from an LLM provider.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<LlmToolCall>,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_arguments_parse_to_empty_map() {
        let call = LlmToolCall {
            id: "c1".into(),
            name: "get_block_by_number".into(),
            arguments: "not json".into(),
        };
        assert!(call.parsed_arguments().is_empty());

        let call = LlmToolCall {
            arguments: r#"{"number": 12}"#.into(),
            ..call
        };
        assert_eq!(call.parsed_arguments()["number"], 12);
    }

    #[test]
    fn tool_message_carries_call_id() {
        let msg = ChatMessage::tool("call_9", "{}");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_9");
        assert!(v.get("tool_calls").is_none());
    }
}
