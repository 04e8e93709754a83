use thiserror::Error;

/// Top-level error type for the ConvoForge pipeline.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Transport or session bootstrap failure, unrecoverable after retries.
    #[error("connection error: {0}")]
    Connection(String),

    /// The requested tool is not in the catalog. Never retried.
    #[error("unknown tool: {name}, available tools: {}", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// A response did not have the shape the protocol promises.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("LLM provider error ({provider}): {message}")]
    Llm { provider: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ForgeResult<T> = Result<T, ForgeError>;

impl ForgeError {
    /// Whether a retry (usually after a reconnect) has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ForgeError::Connection(_) | ForgeError::SessionExpired(_) | ForgeError::Timeout(_)
        )
    }

    /// Short machine-readable tag, used in logs and error markers.
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Connection(_) => "connection",
            ForgeError::UnknownTool { .. } => "unknown_tool",
            ForgeError::SessionExpired(_) => "session_expired",
            ForgeError::Timeout(_) => "timeout",
            ForgeError::Decode(_) => "decode",
            ForgeError::Llm { .. } => "llm",
            ForgeError::Storage(_) => "storage",
            ForgeError::Config(_) => "config",
            ForgeError::Cancelled(_) => "cancelled",
            ForgeError::Other(_) => "other",
        }
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(e: std::io::Error) -> Self {
        ForgeError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(e: serde_json::Error) -> Self {
        ForgeError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_lists_available_names() {
        let err = ForgeError::UnknownTool {
            name: "get_tx".into(),
            available: vec!["get_block_by_hash".into(), "list_latest_txs".into()],
        };
        let text = err.to_string();
        assert!(text.contains("get_tx"));
        assert!(text.contains("get_block_by_hash, list_latest_txs"));
        assert!(!err.is_transient());
    }

    #[test]
    fn session_and_timeout_errors_are_transient() {
        assert!(ForgeError::SessionExpired("401".into()).is_transient());
        assert!(ForgeError::Timeout("30s".into()).is_transient());
        assert!(!ForgeError::Decode("bad".into()).is_transient());
    }
}
