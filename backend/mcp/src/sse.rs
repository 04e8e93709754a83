//! Server-pushed session channel.
//!
//! The subscription's first `endpoint` event announces the session endpoint.
//! The stream then stays open; `message` events carrying a JSON-RPC response
//! are handed to whichever request registered that id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use convoforge_core::{ForgeError, ForgeResult};
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::response_id;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

pub struct PushChannel {
    endpoint: String,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Subscribe to `sse_url` and wait for the endpoint announcement.
    pub async fn open(
        http: &Client,
        sse_url: &str,
        base_url: &str,
        timeout: Duration,
    ) -> ForgeResult<Self> {
        info!(url = %sse_url, "Opening push channel");
        let response = tokio::time::timeout(
            timeout,
            http.get(sse_url)
                .header(ACCEPT, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache")
                .send(),
        )
        .await
        .map_err(|_| ForgeError::Connection(format!("timed out subscribing to {sse_url}")))?
        .map_err(|e| ForgeError::Connection(format!("subscribe to {sse_url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForgeError::Connection(format!(
                "subscribe to {sse_url} rejected with HTTP {status}"
            )));
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let path = tokio::time::timeout(timeout, async {
            while let Some(item) = events.next().await {
                let event = item.map_err(|e| {
                    ForgeError::Connection(format!("push channel read failed: {e}"))
                })?;
                if let Some(path) = announced_endpoint(&event.event, &event.data) {
                    return Ok(path);
                }
                debug!(event = %event.event, "Ignoring event before endpoint announcement");
            }
            Err(ForgeError::Connection(
                "push channel closed before announcing an endpoint".into(),
            ))
        })
        .await
        .map_err(|_| ForgeError::Connection("no endpoint event received in time".into()))??;

        let endpoint = resolve_endpoint(base_url, &path);
        info!(endpoint = %endpoint, "Session endpoint resolved");

        let pending: PendingMap = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(route_messages(
            events,
            pending.clone(),
            closed.clone(),
            cancel.clone(),
        ));

        Ok(Self {
            endpoint,
            pending,
            closed,
            cancel,
            task,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> PushHandle {
        PushHandle {
            pending: self.pending.clone(),
            closed: self.closed.clone(),
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cheap handle used by requests to await a pushed response.
#[derive(Clone)]
pub struct PushHandle {
    pending: PendingMap,
    closed: Arc<AtomicBool>,
}

impl PushHandle {
    /// Register interest in response `id`. `None` once the channel has closed.
    pub fn register(&self, id: u64) -> Option<oneshot::Receiver<Value>> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }
        Some(rx)
    }

    pub fn unregister(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

async fn route_messages<S, E>(
    mut events: std::pin::Pin<Box<S>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<eventsource_stream::Event, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = events.next() => match item {
                Some(Ok(event)) => dispatch(&event.event, &event.data, &pending),
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel stream error");
                    break;
                }
                None => {
                    debug!("Push channel ended");
                    break;
                }
            },
        }
    }
    closed.store(true, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a closed-channel error.
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
}

fn dispatch(event: &str, data: &str, pending: &PendingMap) {
    if !(event.is_empty() || event == "message") {
        return;
    }
    let Ok(body) = serde_json::from_str::<Value>(data) else {
        debug!(data = %data, "Ignoring non-JSON push message");
        return;
    };
    let Some(id) = response_id(&body) else {
        return;
    };
    let sender = pending.lock().ok().and_then(|mut p| p.remove(&id));
    match sender {
        Some(tx) => {
            let _ = tx.send(body);
        }
        None => debug!(id, "Pushed response with no waiting request"),
    }
}

/// The endpoint path carried by an event, if it announces one.
///
/// Besides the `endpoint` event type, a bare data line holding a path is
/// accepted.
fn announced_endpoint(event: &str, data: &str) -> Option<String> {
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    if event == "endpoint" {
        return Some(data.to_string());
    }
    if (event.is_empty() || event == "message") && data.starts_with('/') {
        return Some(data.to_string());
    }
    None
}

/// Append the announced path to the base address; absolute URLs are kept.
pub fn resolve_endpoint(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_announcement_rules() {
        assert_eq!(
            announced_endpoint("endpoint", "/messages?sessionId=abc"),
            Some("/messages?sessionId=abc".into())
        );
        assert_eq!(announced_endpoint("message", "/messages?x=1"), Some("/messages?x=1".into()));
        assert_eq!(announced_endpoint("message", r#"{"id": 1}"#), None);
        assert_eq!(announced_endpoint("endpoint", "  "), None);
        assert_eq!(announced_endpoint("ping", "/x"), None);
    }

    #[test]
    fn endpoint_resolution() {
        assert_eq!(
            resolve_endpoint("https://mcp.example.io/", "/messages?s=1"),
            "https://mcp.example.io/messages?s=1"
        );
        assert_eq!(
            resolve_endpoint("https://mcp.example.io", "messages"),
            "https://mcp.example.io/messages"
        );
        assert_eq!(
            resolve_endpoint("https://a.io", "https://b.io/m"),
            "https://b.io/m"
        );
    }

    #[tokio::test]
    async fn dispatch_routes_by_id() {
        let pending: PendingMap = Arc::default();
        let handle = PushHandle {
            pending: pending.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let rx = handle.register(5).unwrap();
        dispatch("message", r#"{"jsonrpc":"2.0","id":4,"result":{}}"#, &pending);
        dispatch("message", r#"{"jsonrpc":"2.0","id":5,"result":{"ok":true}}"#, &pending);
        let body = rx.await.unwrap();
        assert_eq!(body["result"]["ok"], true);
        assert!(pending.lock().unwrap().is_empty());
    }
}
