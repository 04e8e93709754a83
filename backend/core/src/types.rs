use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced a turn in a ShareGPT-style conversation.
///
/// Unknown speaker tags are preserved verbatim so records written by other
/// tools survive a load/merge/save cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speaker {
    System,
    User,
    Human,
    Gpt,
    Assistant,
    FunctionCall,
    Observation,
    Other(String),
}

impl Speaker {
    pub fn as_str(&self) -> &str {
        match self {
            Speaker::System => "system",
            Speaker::User => "user",
            Speaker::Human => "human",
            Speaker::Gpt => "gpt",
            Speaker::Assistant => "assistant",
            Speaker::FunctionCall => "function_call",
            Speaker::Observation => "observation",
            Speaker::Other(tag) => tag,
        }
    }

    /// `user` and `human` both denote the person asking.
    pub fn is_asker(&self) -> bool {
        matches!(self, Speaker::User | Speaker::Human)
    }

    /// A final reply turn produced by the model.
    pub fn is_reply(&self) -> bool {
        matches!(self, Speaker::Gpt | Speaker::Assistant)
    }
}

impl From<String> for Speaker {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "system" => Speaker::System,
            "user" => Speaker::User,
            "human" => Speaker::Human,
            "gpt" => Speaker::Gpt,
            "assistant" => Speaker::Assistant,
            "function_call" => Speaker::FunctionCall,
            "observation" => Speaker::Observation,
            _ => Speaker::Other(tag),
        }
    }
}

impl From<Speaker> for String {
    fn from(speaker: Speaker) -> Self {
        speaker.as_str().to_string()
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub from: Speaker,
    #[serde(default)]
    pub value: String,
}

impl Turn {
    pub fn new(from: Speaker, value: impl Into<String>) -> Self {
        Self {
            from,
            value: value.into(),
        }
    }
}

/// A single dataset record: a conversation plus the tool definitions it used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(default)]
    pub conversations: Vec<Turn>,

    /// JSON-encoded list of tool descriptors used by the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<String>,

    /// Any other fields are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationRecord {
    pub fn new(conversations: Vec<Turn>) -> Self {
        Self {
            conversations,
            ..Default::default()
        }
    }

    /// The first question asked in the conversation, if any.
    pub fn user_question(&self) -> Option<&str> {
        self.conversations
            .iter()
            .find(|t| t.from.is_asker())
            .map(|t| t.value.as_str())
    }

    /// A record is complete once it contains a final reply turn.
    pub fn is_complete(&self) -> bool {
        self.conversations.iter().any(|t| t.from.is_reply())
    }

    /// Rename `user` turns to `human`, the tag used by completed records.
    pub fn normalize_askers(&mut self) {
        for turn in &mut self.conversations {
            if turn.from == Speaker::User {
                turn.from = Speaker::Human;
            }
        }
    }

    /// Name of the first tool the conversation called, read from its
    /// `function_call` turn.
    pub fn first_tool_called(&self) -> Option<String> {
        self.conversations
            .iter()
            .filter(|t| t.from == Speaker::FunctionCall)
            .find_map(|t| {
                serde_json::from_str::<Value>(&t.value)
                    .ok()
                    .and_then(|v| v.get("name").and_then(Value::as_str).map(str::to_string))
            })
    }
}
