use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use convoforge_core::{ForgeResult, LlmProvider, LlmRequest, LlmResponse, LlmToolCall};

/// A scripted LLM provider for tests and dry runs.
///
/// Queued replies are returned in order; once the queue is empty every call
/// gets the fixed response.
pub struct MockProvider {
    name: String,
    fixed_response: Option<String>,
    script: Mutex<VecDeque<ForgeResult<LlmResponse>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed_response: None,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = Some(response.into());
        self
    }

    /// Queue a plain text reply.
    pub fn then_reply(self, text: impl Into<String>) -> Self {
        let response = LlmResponse {
            content: Some(text.into()),
            ..self.base_response()
        };
        self.push(Ok(response))
    }

    /// Queue a reply that requests one tool call.
    pub fn then_tool_call(self, name: impl Into<String>, arguments: Value) -> Self {
        let n = self.queued();
        let response = LlmResponse {
            tool_calls: vec![LlmToolCall {
                id: format!("call_{n}"),
                name: name.into(),
                arguments: arguments.to_string(),
            }],
            ..self.base_response()
        };
        self.push(Ok(response))
    }

    /// Queue an arbitrary result, including errors.
    pub fn then(self, result: ForgeResult<LlmResponse>) -> Self {
        self.push(result)
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn push(self, result: ForgeResult<LlmResponse>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
        self
    }

    fn queued(&self) -> usize {
        self.script.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn base_response(&self) -> LlmResponse {
        LlmResponse {
            provider: self.name.clone(),
            model: "mock".to_string(),
            ..LlmResponse::default()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, req: &LlmRequest) -> ForgeResult<LlmResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(req.clone());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(result) => result,
            None => Ok(LlmResponse {
                content: Some(
                    self.fixed_response
                        .clone()
                        .unwrap_or_else(|| "Mock response".to_string()),
                ),
                ..self.base_response()
            }),
        }
    }
}
