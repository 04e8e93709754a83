//! Conversation completion: drives the LLM through a tool-calling loop and
//! appends `function_call` / `observation` / `gpt` turns to a question record.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use convoforge_core::{
    ChatMessage, ConversationRecord, ForgeError, ForgeResult, LlmProvider, LlmRequest,
    LlmResponse, LlmToolCall, RetryPolicy, Speaker, ToolInvoker, Turn,
};
use convoforge_logging::{PipelineEvent, PipelineEventLogger};

/// Closing reply appended when the model keeps calling tools past the limit.
pub const ROUND_LIMIT_REPLY: &str = "由于达到最大工具调用轮数限制，对话被强制结束。";

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub system_prompt: String,
    /// Prefix the model sees on every tool name.
    pub tool_prefix: String,
    pub max_tool_rounds: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Backoff after an LLM timeout.
    pub timeout_retry: RetryPolicy,
    /// Backoff after any other LLM request failure.
    pub request_retry: RetryPolicy,
}

impl CompletionSettings {
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            tool_prefix: "mcp__merlin_mcp_tool__".into(),
            max_tool_rounds: 6,
            max_tokens: 4096,
            temperature: 0.7,
            timeout_retry: RetryPolicy::linear(2, 10_000),
            request_retry: RetryPolicy::linear(2, 5_000),
        }
    }
}

pub struct ConversationCompleter {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolInvoker>,
    settings: CompletionSettings,
    run_id: String,
}

impl ConversationCompleter {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolInvoker>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            llm,
            tools,
            settings,
            run_id: String::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Function schemas advertised to the model, names prefixed.
    pub async fn function_schemas(&self) -> Vec<Value> {
        self.tools
            .descriptors()
            .await
            .iter()
            .map(|d| d.function_schema(&self.settings.tool_prefix))
            .collect()
    }

    /// Complete one question record.
    ///
    /// Only the first tool call of each model turn is executed. The returned
    /// record has `user` turns renamed to `human` and `tools` set to the JSON
    /// list of tool descriptors actually used.
    pub async fn complete(&self, record: &ConversationRecord) -> ForgeResult<ConversationRecord> {
        let schemas = self.function_schemas().await;
        let mut messages = self.seed_messages(record);
        let mut new_turns = Vec::new();
        let mut used_tools: Vec<Value> = Vec::new();
        let mut rounds = 0;

        loop {
            if rounds >= self.settings.max_tool_rounds {
                warn!(rounds, "Tool round limit reached; closing conversation");
                new_turns.push(Turn::new(Speaker::Gpt, ROUND_LIMIT_REPLY));
                break;
            }

            let response = self.chat(&messages, &schemas).await?;
            let Some(call) = response.tool_calls.first().cloned() else {
                debug!(rounds, "Model replied without tool calls");
                new_turns.push(Turn::new(
                    Speaker::Gpt,
                    response.content.unwrap_or_default(),
                ));
                break;
            };
            rounds += 1;
            if response.tool_calls.len() > 1 {
                debug!(
                    ignored = response.tool_calls.len() - 1,
                    "Executing only the first tool call of this turn"
                );
            }

            let arguments = call.parsed_arguments();
            new_turns.push(Turn::new(
                Speaker::FunctionCall,
                json!({ "name": call.name, "arguments": arguments }).to_string(),
            ));

            let observation = self.observe(&call, arguments).await?;
            new_turns.push(Turn::new(Speaker::Observation, observation.clone()));
            used_tools.push(used_tool_entry(&call.name, &schemas));

            messages.push(ChatMessage::assistant(response.content, vec![call.clone()]));
            messages.push(ChatMessage::tool(call.id, observation));
        }

        info!(rounds, turns = new_turns.len(), "Conversation completed");
        let mut completed = record.clone();
        completed.normalize_askers();
        completed.conversations.extend(new_turns);
        completed.tools = Some(Value::Array(used_tools).to_string());
        Ok(completed)
    }

    fn seed_messages(&self, record: &ConversationRecord) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&self.settings.system_prompt)];
        for turn in &record.conversations {
            match turn.from {
                Speaker::User | Speaker::Human => messages.push(ChatMessage::user(&turn.value)),
                Speaker::System => messages.push(ChatMessage::system(&turn.value)),
                _ => {}
            }
        }
        messages
    }

    /// Run the tool the model asked for and return the observation text.
    ///
    /// Names without the prefix, or not in the catalog, become an
    /// `Unknown tool` observation; other failures propagate.
    async fn observe(
        &self,
        call: &LlmToolCall,
        arguments: serde_json::Map<String, Value>,
    ) -> ForgeResult<String> {
        let prefix = &self.settings.tool_prefix;
        let Some(bare) = call.name.strip_prefix(prefix.as_str()) else {
            warn!(tool = %call.name, "Model called a tool outside the namespace");
            return Ok(unknown_tool(&call.name));
        };

        let arguments_json = Value::Object(arguments.clone()).to_string();
        let start = Instant::now();
        let result = self.tools.call_tool(bare, arguments).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = match &result {
            Ok(inv) => inv.status().to_string(),
            Err(e) => e.kind().to_string(),
        };
        PipelineEventLogger::log(
            &self.run_id,
            PipelineEvent::ToolCall {
                tool_name: bare.to_string(),
                arguments_json,
                status,
                latency_ms,
            },
        );

        match result {
            Ok(invocation) => Ok(invocation.to_json().to_string()),
            Err(ForgeError::UnknownTool { name, .. }) => {
                warn!(tool = %name, "Model called a tool the service does not offer");
                Ok(unknown_tool(&call.name))
            }
            Err(e) => Err(e),
        }
    }

    /// One LLM round trip, retried with linear backoff on transport failures.
    async fn chat(&self, messages: &[ChatMessage], schemas: &[Value]) -> ForgeResult<LlmResponse> {
        let request = LlmRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            tools: schemas.to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let mut retries = 0;
        loop {
            let err = match self.llm.complete(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            let policy = match &err {
                ForgeError::Timeout(_) => &self.settings.timeout_retry,
                ForgeError::Llm { .. } => &self.settings.request_retry,
                _ => return Err(err),
            };
            if !policy.should_retry(retries) {
                return Err(err);
            }
            retries += 1;
            let delay = policy.delay_for(retries);
            warn!(
                provider = self.llm.name(),
                attempt = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "LLM request failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn unknown_tool(name: &str) -> String {
    json!({ "error": format!("Unknown tool: {name}") }).to_string()
}

/// `{name, description, parameters}` of a called tool, taken from the
/// advertised schemas.
fn used_tool_entry(name: &str, schemas: &[Value]) -> Value {
    let function = schemas
        .iter()
        .map(|s| &s["function"])
        .find(|f| f["name"] == name);
    match function {
        Some(f) => json!({
            "name": name,
            "description": f.get("description").cloned().unwrap_or_else(|| json!("")),
            "parameters": f.get("parameters").cloned().unwrap_or_else(|| json!({})),
        }),
        None => json!({ "name": name, "description": "", "parameters": {} }),
    }
}
