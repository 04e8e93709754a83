//! MCP-over-SSE tool access for ConvoForge.
//!
//! [`SessionManager`] keeps one live session (push channel, endpoint, tool
//! catalog) and recovers it on expiry. [`ToolClient`] layers named tool
//! invocation, fan-out and per-tool telemetry on top.

pub mod catalog;
pub mod client;
pub mod protocol;
pub mod session;
pub mod sse;
pub mod telemetry;

pub use catalog::{strip_prefix, ToolCatalog};
pub use client::ToolClient;
pub use protocol::{JsonRpcRequest, RpcReply};
pub use session::{RpcFailure, SessionManager, SessionPhase, SessionSettings};
pub use sse::{PushChannel, PushHandle};
pub use telemetry::{CallTelemetry, CallTimer, ToolCallRecord, ToolStats};
