#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use convoforge_core::{
    ConversationRecord, ForgeError, ForgeResult, Speaker, ToolDescriptor, ToolInvocation,
    ToolInvoker, Turn,
};
use convoforge_pipeline::Generator;
use serde_json::{json, Map, Value};

pub const PREFIX: &str = "mcp__merlin_mcp_tool__";

pub fn question(text: &str) -> ConversationRecord {
    ConversationRecord::new(vec![
        Turn::new(Speaker::System, "be concise"),
        Turn::new(Speaker::User, text),
    ])
}

pub fn answered(text: &str, answer: &str) -> ConversationRecord {
    ConversationRecord::new(vec![
        Turn::new(Speaker::Human, text),
        Turn::new(Speaker::Gpt, answer),
    ])
}

/// In-process tool service with one tool, `get_balance`.
#[derive(Default)]
pub struct FakeTools {
    pub calls: Mutex<Vec<(String, Map<String, Value>)>>,
    pub released: AtomicBool,
}

#[async_trait]
impl ToolInvoker for FakeTools {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> ForgeResult<ToolInvocation> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        match name {
            "get_balance" => Ok(ToolInvocation::success(
                name,
                arguments,
                json!({"content": [{"type": "text", "text": "1.5 BTC"}]}),
            )),
            other => Err(ForgeError::UnknownTool {
                name: other.to_string(),
                available: vec!["get_balance".into()],
            }),
        }
    }

    async fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "get_balance".into(),
            description: "Native balance of an address".into(),
            parameters: json!({"type": "object", "properties": {"address": {"type": "string"}}}),
        }]
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Generator that answers by "calling" `tool`. Questions mentioning `fail`
/// error out and ones mentioning `slow` sleep past any sane item timeout.
pub struct EchoGenerator {
    pub tool: String,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl EchoGenerator {
    pub fn new(tool: &str, delay: Duration) -> Self {
        Self {
            tool: tool.to_string(),
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Generator for EchoGenerator {
    async fn generate(&self, record: &ConversationRecord) -> ForgeResult<ConversationRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let question = record.user_question().unwrap_or_default().to_string();
        if question.contains("fail") {
            return Err(ForgeError::Connection("service unreachable".into()));
        }
        if question.contains("slow") {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        tokio::time::sleep(self.delay).await;

        let mut done = record.clone();
        done.normalize_askers();
        done.conversations.push(Turn::new(
            Speaker::FunctionCall,
            json!({"name": format!("{PREFIX}{}", self.tool), "arguments": {}}).to_string(),
        ));
        done.conversations.push(Turn::new(Speaker::Observation, "{}"));
        done.conversations
            .push(Turn::new(Speaker::Gpt, format!("answer to {question}")));
        Ok(done)
    }
}
