//! Tool client: invokes tools by bare name on top of the session manager.

use std::sync::Arc;

use async_trait::async_trait;
use convoforge_core::{
    ForgeError, ForgeResult, ToolCallSpec, ToolDescriptor, ToolInvocation, ToolInvoker,
};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::protocol::{error_text, RpcReply, METHOD_TOOLS_CALL};
use crate::session::{SessionManager, SessionSettings};
use crate::telemetry::{CallTelemetry, CallTimer, ToolCallRecord};

#[derive(Clone)]
pub struct ToolClient {
    session: Arc<SessionManager>,
    telemetry: CallTelemetry,
    max_retries: u32,
}

impl ToolClient {
    pub fn new(settings: SessionSettings) -> ForgeResult<Self> {
        let max_retries = settings.max_retries;
        Ok(Self::with_session(Arc::new(SessionManager::new(settings)?), max_retries))
    }

    pub fn with_session(session: Arc<SessionManager>, max_retries: u32) -> Self {
        Self {
            session,
            telemetry: CallTelemetry::default(),
            max_retries,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn telemetry(&self) -> &CallTelemetry {
        &self.telemetry
    }

    pub async fn connect(&self) -> ForgeResult<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    /// Invoke `tool` with `parameters`, retrying up to the session's
    /// configured limit.
    pub async fn call_tool(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
    ) -> ForgeResult<ToolInvocation> {
        self.call_tool_with_retries(tool, parameters, self.max_retries)
            .await
    }

    /// Invoke `tool` with `parameters`, reconnecting and retrying transient
    /// failures at most `max_retries` times.
    ///
    /// A business error from the service is a successful return carrying a
    /// failure outcome. Unknown names fail before anything is sent.
    pub async fn call_tool_with_retries(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
        max_retries: u32,
    ) -> ForgeResult<ToolInvocation> {
        if !self.session.is_connected().await {
            self.session.connect().await?;
        }
        if self.session.tool_info(tool).await.is_none() {
            return Err(ForgeError::UnknownTool {
                name: tool.to_string(),
                available: self.session.available_tools().await,
            });
        }

        let timer = CallTimer::start();
        let params = json!({ "name": tool, "arguments": parameters });
        let (outcome, retries) = self
            .session
            .request(METHOD_TOOLS_CALL, params, max_retries)
            .await;

        let (result, status) = match outcome {
            Ok(reply) => {
                let invocation = match reply {
                    RpcReply::Success(result) => ToolInvocation::success(tool, parameters, result),
                    RpcReply::Failure(error) => {
                        warn!(tool, error = %error_text(&error), "Tool returned an error");
                        ToolInvocation::failure(tool, parameters, error)
                    }
                };
                let status = invocation.status().to_string();
                (Ok(invocation), status)
            }
            Err(e) => {
                warn!(tool, error = %e, "Tool call failed");
                let kind = e.kind().to_string();
                (Err(e), kind)
            }
        };

        let duration_ms = timer.elapsed_ms();
        info!(tool, status = %status, duration_ms, retries, "Tool call finished");
        self.telemetry
            .record(ToolCallRecord {
                tool: tool.to_string(),
                duration_ms,
                status,
                retries,
                timestamp_secs: chrono::Utc::now().timestamp(),
            })
            .await;
        result
    }

    /// Run every call concurrently. Results line up with `calls`.
    pub async fn call_multiple(&self, calls: Vec<ToolCallSpec>) -> Vec<ForgeResult<ToolInvocation>> {
        join_all(
            calls
                .into_iter()
                .map(|spec| async move { self.call_tool(&spec.name, spec.arguments).await }),
        )
        .await
    }

    pub async fn available_tools(&self) -> Vec<String> {
        self.session.available_tools().await
    }

    pub async fn tool_info(&self, name: &str) -> Option<ToolDescriptor> {
        self.session.tool_info(name).await
    }
}

#[async_trait]
impl ToolInvoker for ToolClient {
    async fn call_tool(
        &self,
        tool: &str,
        parameters: Map<String, Value>,
    ) -> ForgeResult<ToolInvocation> {
        ToolClient::call_tool(self, tool, parameters).await
    }

    async fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.session.all_tools().await
    }

    async fn release(&self) {
        self.session.disconnect().await;
    }
}
