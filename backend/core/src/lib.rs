pub mod error;
pub mod retry;
pub mod tools;
pub mod traits;
pub mod types;

pub use error::{ForgeError, ForgeResult};
pub use retry::RetryPolicy;
pub use tools::{ToolCallSpec, ToolDescriptor, ToolInvocation, ToolOutcome};
pub use traits::{
    ChatMessage, LlmProvider, LlmRequest, LlmResponse, LlmToolCall, ToolInvoker,
};
pub use types::{ConversationRecord, Speaker, Turn};
