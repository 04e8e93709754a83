use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A tool advertised by the remote service catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's arguments.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolDescriptor {
    /// OpenAI-style function schema, advertised under `prefix` + name.
    pub fn function_schema(&self, prefix: &str) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": format!("{prefix}{}", self.name),
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Result of a delivered tool call.
///
/// `Failure` is an application-level error reported by the tool itself; the
/// protocol round-trip succeeded, so it is a normal outcome and not retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { result: Value },
    #[serde(rename = "error")]
    Failure { error: Value },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            ToolOutcome::Success { .. } => "success",
            ToolOutcome::Failure { .. } => "error",
        }
    }
}

/// A completed tool invocation. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub parameters: Map<String, Value>,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolInvocation {
    pub fn success(tool: impl Into<String>, parameters: Map<String, Value>, result: Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
            outcome: ToolOutcome::Success { result },
        }
    }

    pub fn failure(tool: impl Into<String>, parameters: Map<String, Value>, error: Value) -> Self {
        Self {
            tool: tool.into(),
            parameters,
            outcome: ToolOutcome::Failure { error },
        }
    }

    pub fn status(&self) -> &'static str {
        self.outcome.status()
    }

    /// JSON form used as the observation text of a conversation.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// One entry of a multi-call request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallSpec {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}
