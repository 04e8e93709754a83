use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use convoforge_core::{
    ChatMessage, ForgeError, ForgeResult, LlmProvider, LlmRequest, LlmResponse, LlmToolCall,
};
use convoforge_logging::redact_sensitive_data;

const PROVIDER_NAME: &str = "openai_compat";

/// Chat-completions provider for any OpenAI-compatible endpoint
/// (DeepSeek, OpenRouter, vLLM, ...), with function calling.
pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.deepseek.com".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn llm_error(&self, message: impl AsRef<str>) -> ForgeError {
        ForgeError::Llm {
            provider: PROVIDER_NAME.to_string(),
            message: redact_sensitive_data(message.as_ref()),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
            msg.tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: function_type(),
                    function: WireFunction {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect()
        });
        Self {
            role: msg.role.clone(),
            content: msg.content.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(&self, request: &LlmRequest) -> ForgeResult<LlmResponse> {
        let start = Instant::now();

        let has_tools = !request.tools.is_empty();
        let body = ChatRequest {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: has_tools.then_some(request.tools.as_slice()),
            tool_choice: has_tools.then_some("auto"),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ForgeError::Timeout(format!("chat completion: {e}"))
                } else {
                    self.llm_error(format!("HTTP request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let err = self.llm_error(format!("returned {status}: {error_body}"));
            warn!(error = %err, "Chat completion rejected");
            return Err(err);
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ForgeError::Timeout(format!("chat completion body: {e}"))
            } else {
                ForgeError::Decode(format!("chat completion response: {e}"))
            }
        })?;

        let message = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ForgeError::Decode("chat completion has no choices".into()))?;

        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| LlmToolCall {
                id: c.id,
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect();

        let tokens_used = chat_response
            .usage
            .and_then(|u| u.total_tokens)
            .unwrap_or(0);

        Ok(LlmResponse {
            content: message.content,
            tool_calls,
            provider: PROVIDER_NAME.to_string(),
            model: request.model.clone(),
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_use_wire_shape() {
        let msg = ChatMessage::assistant(
            None,
            vec![LlmToolCall {
                id: "call_1".into(),
                name: "mcp__merlin_mcp_tool__get_balance".into(),
                arguments: r#"{"address":"0x1"}"#.into(),
            }],
        );
        let v = serde_json::to_value(WireMessage::from(&msg)).unwrap();
        assert_eq!(v["tool_calls"][0]["type"], "function");
        assert_eq!(
            v["tool_calls"][0]["function"]["name"],
            "mcp__merlin_mcp_tool__get_balance"
        );
        assert!(v["content"].is_null());
    }

    #[test]
    fn llm_errors_are_redacted() {
        let p = OpenAiCompatProvider::new("sk-abcdefghijklmnopqrstuvwxyz123456");
        let err = p.llm_error("bad key sk-abcdefghijklmnopqrstuvwxyz123456");
        assert!(!err.to_string().contains("abcdefghijklmnop"));
    }
}
