//! Session Manager: owns the push channel, the resolved session endpoint and
//! the tool catalog, and recovers them when the session expires.
//!
//! Lifecycle: `Disconnected → Bootstrapping → CatalogFetching → Ready`.
//! A detected expiry sends `Ready` back through `Bootstrapping`; explicit
//! disconnect or an unrecoverable failure lands in `Disconnected`.
//!
//! Every successful bootstrap bumps a generation counter. Requests remember
//! the generation they were sent under, so when several in-flight calls hit
//! the same expiry only the first one reconnects.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use convoforge_core::{ForgeError, ForgeResult, RetryPolicy, ToolDescriptor};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::catalog::ToolCatalog;
use crate::protocol::{
    error_text, is_session_expiry, truncate, JsonRpcRequest, RpcReply, METHOD_TOOLS_LIST,
};
use crate::sse::PushChannel;

const HEALTH_PATHS: [&str; 3] = ["/health", "/api/health", "/status"];
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const USER_AGENT: &str = concat!("ConvoForge-MCP/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub base_url: String,
    pub sse_path: String,
    /// Namespace prefix stripped from catalog names.
    pub tool_prefix: String,
    /// Recovery attempts for catalog fetches and tool calls.
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// Bounds both the TCP connect and the wait for the endpoint event.
    pub connect_timeout: Duration,
    /// Pause before each recovery attempt.
    pub backoff: RetryPolicy,
}

impl SessionSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sse_path: "/sse".into(),
            tool_prefix: "mcp__merlin_mcp_tool__".into(),
            max_retries: 2,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            backoff: RetryPolicy::exponential(2, 500),
        }
    }

    pub fn sse_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.sse_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Bootstrapping,
    CatalogFetching,
    Ready,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Disconnected => "disconnected",
            SessionPhase::Bootstrapping => "bootstrapping",
            SessionPhase::CatalogFetching => "catalog_fetching",
            SessionPhase::Ready => "ready",
        };
        f.write_str(s)
    }
}

struct SessionState {
    phase: SessionPhase,
    push: Option<PushChannel>,
    generation: u64,
}

/// A request that failed, tagged with the session generation it used.
#[derive(Debug)]
pub struct RpcFailure {
    pub generation: u64,
    pub error: ForgeError,
}

pub struct SessionManager {
    http: Client,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    catalog: RwLock<ToolCatalog>,
    /// Serializes connect, reconnect and disconnect.
    lifecycle: Mutex<()>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(settings: SessionSettings) -> ForgeResult<Self> {
        let http = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ForgeError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            settings,
            state: RwLock::new(SessionState {
                phase: SessionPhase::Disconnected,
                push: None,
                generation: 0,
            }),
            catalog: RwLock::new(ToolCatalog::default()),
            lifecycle: Mutex::new(()),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    pub async fn is_connected(&self) -> bool {
        self.phase().await == SessionPhase::Ready
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn endpoint(&self) -> Option<String> {
        self.state
            .read()
            .await
            .push
            .as_ref()
            .map(|p| p.endpoint().to_string())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Bootstrap the push channel and fetch the catalog. A no-op when the
    /// session is already ready.
    pub async fn connect(&self) -> ForgeResult<()> {
        let _guard = self.lifecycle.lock().await;
        if self.phase().await == SessionPhase::Ready {
            debug!("Session already ready");
            return Ok(());
        }
        self.connect_locked().await
    }

    /// Tear down and connect again.
    pub async fn reconnect(&self) -> ForgeResult<()> {
        let _guard = self.lifecycle.lock().await;
        info!(base_url = %self.settings.base_url, "Reconnecting session");
        self.disconnect_locked().await;
        self.connect_locked().await
    }

    /// Reconnect unless another task already did so since `observed_generation`.
    pub async fn reconnect_from(&self, observed_generation: u64) -> ForgeResult<()> {
        let _guard = self.lifecycle.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != observed_generation && state.phase == SessionPhase::Ready {
                debug!(
                    observed = observed_generation,
                    current = state.generation,
                    "Session already re-established by another task"
                );
                return Ok(());
            }
        }
        info!(generation = observed_generation, "Reconnecting expired session");
        self.disconnect_locked().await;
        self.connect_locked().await
    }

    /// Close the push channel and forget the endpoint. Idempotent.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.disconnect_locked().await;
    }

    /// Re-fetch the catalog, re-bootstrapping on session failures. Leaves the
    /// session ready on success and disconnected on failure.
    pub async fn fetch_catalog(&self, max_retries: u32) -> ForgeResult<usize> {
        let _guard = self.lifecycle.lock().await;
        match self.fetch_catalog_locked(max_retries).await {
            Ok(count) => {
                self.state.write().await.phase = SessionPhase::Ready;
                Ok(count)
            }
            Err(e) => {
                self.disconnect_locked().await;
                Err(e)
            }
        }
    }

    async fn connect_locked(&self) -> ForgeResult<()> {
        if let Err(e) = self.bootstrap_locked().await {
            self.disconnect_locked().await;
            return Err(e);
        }
        match self.fetch_catalog_locked(self.settings.max_retries).await {
            Ok(count) => {
                self.state.write().await.phase = SessionPhase::Ready;
                info!(base_url = %self.settings.base_url, tools = count, "Session ready");
                Ok(())
            }
            Err(e) => {
                self.disconnect_locked().await;
                Err(e)
            }
        }
    }

    async fn bootstrap_locked(&self) -> ForgeResult<()> {
        {
            let mut state = self.state.write().await;
            state.phase = SessionPhase::Bootstrapping;
            if let Some(old) = state.push.take() {
                old.close();
            }
        }
        let channel = PushChannel::open(
            &self.http,
            &self.settings.sse_url(),
            &self.settings.base_url,
            self.settings.connect_timeout,
        )
        .await?;

        let mut state = self.state.write().await;
        state.push = Some(channel);
        state.generation += 1;
        debug!(generation = state.generation, "Push channel bootstrapped");
        Ok(())
    }

    async fn fetch_catalog_locked(&self, max_retries: u32) -> ForgeResult<usize> {
        let mut retries = 0;
        loop {
            self.state.write().await.phase = SessionPhase::CatalogFetching;
            match self.post_rpc(METHOD_TOOLS_LIST, json!({})).await {
                Ok(RpcReply::Success(result)) => {
                    let catalog =
                        ToolCatalog::from_list_result(&result, &self.settings.tool_prefix)
                            .map_err(|e| ForgeError::Connection(format!("tools/list: {e}")))?;
                    let count = catalog.len();
                    *self.catalog.write().await = catalog;
                    info!(tools = count, "Tool catalog loaded");
                    return Ok(count);
                }
                Ok(RpcReply::Failure(error)) => {
                    return Err(ForgeError::Connection(format!(
                        "tools/list failed: {}",
                        error_text(&error)
                    )));
                }
                Err(failure) if failure.error.is_transient() && retries < max_retries => {
                    retries += 1;
                    warn!(
                        attempt = retries,
                        max_retries,
                        error = %failure.error,
                        "Catalog fetch failed; re-bootstrapping session"
                    );
                    tokio::time::sleep(self.settings.backoff.delay_for(retries)).await;
                    if let Err(e) = self.bootstrap_locked().await {
                        warn!(error = %e, "Re-bootstrap failed");
                    }
                }
                Err(failure) => {
                    return Err(match failure.error {
                        ForgeError::Connection(m) if retries == 0 => ForgeError::Connection(m),
                        other => ForgeError::Connection(format!(
                            "tools/list failed after {retries} retries: {other}"
                        )),
                    });
                }
            }
        }
    }

    async fn disconnect_locked(&self) {
        let mut state = self.state.write().await;
        if let Some(push) = state.push.take() {
            push.close();
            debug!("Push channel closed");
        }
        if state.phase != SessionPhase::Disconnected {
            info!(base_url = %self.settings.base_url, "Session disconnected");
        }
        state.phase = SessionPhase::Disconnected;
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Send a request, reconnecting and retrying on transient failures.
    /// Returns the reply or error along with the retries spent.
    ///
    /// Exhausted session expiry escalates to `Connection`; exhausted
    /// timeouts stay `Timeout`. Non-transient errors return immediately.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        max_retries: u32,
    ) -> (ForgeResult<RpcReply>, u32) {
        let mut retries = 0;
        loop {
            match self.post_rpc(method, params.clone()).await {
                Ok(reply) => return (Ok(reply), retries),
                Err(RpcFailure { generation, error }) => {
                    if !error.is_transient() {
                        return (Err(error), retries);
                    }
                    if retries >= max_retries {
                        return (Err(escalate(error, retries)), retries);
                    }
                    retries += 1;
                    warn!(
                        method,
                        attempt = retries,
                        max_retries,
                        error = %error,
                        "Session request failed; reconnecting"
                    );
                    tokio::time::sleep(self.settings.backoff.delay_for(retries)).await;
                    if let Err(e) = self.reconnect_from(generation).await {
                        warn!(error = %e, "Reconnect failed");
                    }
                }
            }
        }
    }

    /// One request against the current endpoint, no recovery.
    ///
    /// Error payloads that name an expired session come back as
    /// `SessionExpired`, as do HTTP 401/403.
    pub async fn post_rpc(&self, method: &str, params: Value) -> Result<RpcReply, RpcFailure> {
        let (endpoint, generation, push) = {
            let state = self.state.read().await;
            match &state.push {
                Some(p) => (p.endpoint().to_string(), state.generation, p.handle()),
                None => {
                    return Err(RpcFailure {
                        generation: state.generation,
                        error: ForgeError::Connection("no session endpoint".into()),
                    })
                }
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let waiter = push.register(id);
        let result = self.exchange(&endpoint, &request, waiter).await;
        push.unregister(id);
        result.map_err(|error| RpcFailure { generation, error })
    }

    async fn exchange(
        &self,
        endpoint: &str,
        request: &JsonRpcRequest,
        waiter: Option<oneshot::Receiver<Value>>,
    ) -> ForgeResult<RpcReply> {
        let response = self
            .http
            .post(endpoint)
            .json(request)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ForgeError::SessionExpired(format!(
                "HTTP {status} from session endpoint"
            )));
        }

        let text = response.text().await.map_err(transport_error)?;
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            Err(_) if status.is_success() && (text.trim().is_empty() || status == StatusCode::ACCEPTED) => {
                debug!(id = request.id, %status, "Awaiting pushed response");
                self.await_pushed(request.id, waiter).await?
            }
            Err(e) if status.is_success() => {
                return Err(ForgeError::Decode(format!(
                    "invalid JSON from session endpoint: {e}"
                )));
            }
            Err(_) => {
                return Err(ForgeError::Connection(format!(
                    "HTTP {status}: {}",
                    truncate(&text, 200)
                )));
            }
        };
        classify(status, &body)
    }

    async fn await_pushed(
        &self,
        id: u64,
        waiter: Option<oneshot::Receiver<Value>>,
    ) -> ForgeResult<Value> {
        let Some(rx) = waiter else {
            return Err(ForgeError::Connection(
                "push channel closed; response cannot be delivered".into(),
            ));
        };
        match tokio::time::timeout(self.settings.request_timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(_)) => Err(ForgeError::Connection(
                "push channel closed before the response arrived".into(),
            )),
            Err(_) => Err(ForgeError::Timeout(format!(
                "no pushed response for request {id} within {:?}",
                self.settings.request_timeout
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Catalog and health
    // -----------------------------------------------------------------------

    pub async fn catalog(&self) -> ToolCatalog {
        self.catalog.read().await.clone()
    }

    pub async fn available_tools(&self) -> Vec<String> {
        self.catalog.read().await.available_tools()
    }

    pub async fn tool_info(&self, name: &str) -> Option<ToolDescriptor> {
        self.catalog.read().await.tool_info(name).cloned()
    }

    pub async fn all_tools(&self) -> Vec<ToolDescriptor> {
        self.catalog.read().await.all_tools()
    }

    /// Probe the well-known health paths; true on the first HTTP 200.
    pub async fn health_check(&self) -> bool {
        let base = self.settings.base_url.trim_end_matches('/');
        for path in HEALTH_PATHS {
            let url = format!("{base}{path}");
            match self.http.get(&url).timeout(HEALTH_TIMEOUT).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => {
                    debug!(url = %url, "Health check passed");
                    return true;
                }
                Ok(resp) => debug!(url = %url, status = %resp.status(), "Health probe failed"),
                Err(e) => debug!(url = %url, error = %e, "Health probe failed"),
            }
        }
        false
    }
}

/// Turn a decoded body into a reply or a failure, given the HTTP status.
fn classify(status: StatusCode, body: &Value) -> ForgeResult<RpcReply> {
    match RpcReply::decode(body) {
        Ok(RpcReply::Failure(error)) if is_session_expiry(&error) => {
            Err(ForgeError::SessionExpired(error_text(&error)))
        }
        Ok(reply) if status.is_success() => Ok(reply),
        Ok(RpcReply::Failure(error)) => Err(ForgeError::Connection(format!(
            "HTTP {status}: {}",
            error_text(&error)
        ))),
        Ok(RpcReply::Success(_)) => Err(ForgeError::Connection(format!(
            "HTTP {status} from session endpoint"
        ))),
        Err(e) if status.is_success() => Err(e),
        Err(_) => Err(ForgeError::Connection(format!(
            "HTTP {status} from session endpoint"
        ))),
    }
}

fn transport_error(e: reqwest::Error) -> ForgeError {
    if e.is_timeout() {
        ForgeError::Timeout(e.to_string())
    } else {
        ForgeError::Connection(e.to_string())
    }
}

fn escalate(error: ForgeError, retries: u32) -> ForgeError {
    match error {
        ForgeError::SessionExpired(m) => ForgeError::Connection(format!(
            "session expired and {retries} reconnects did not recover it: {m}"
        )),
        ForgeError::Timeout(m) => ForgeError::Timeout(format!("{m} (after {retries} retries)")),
        ForgeError::Connection(m) => {
            ForgeError::Connection(format!("{m} (after {retries} retries)"))
        }
        other => other,
    }
}
