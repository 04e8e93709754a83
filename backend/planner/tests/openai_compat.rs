use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use convoforge_core::{ChatMessage, LlmProvider, LlmRequest};
use convoforge_planner::OpenAiCompatProvider;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct Captured {
    body: Arc<Mutex<Option<Value>>>,
    auth: Arc<Mutex<Option<String>>>,
}

async fn chat(State(cap): State<Captured>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    *cap.auth.lock().await = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let wants_tools = body.get("tools").is_some();
    *cap.body.lock().await = Some(body);

    if !wants_tools {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "bad api_key: sk-abcdefghijklmnopqrstuvwxyz0123"}})),
        )
            .into_response();
    }

    Json(json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {
                        "name": "mcp__merlin_mcp_tool__get_balance",
                        "arguments": "{\"address\":\"0x1\"}"
                    }
                }]
            }
        }],
        "usage": {"total_tokens": 42}
    }))
    .into_response()
}

async fn spawn(cap: Captured) -> String {
    let app = Router::new()
        .route("/chat/completions", post(chat))
        .with_state(cap);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn request(tools: Vec<Value>) -> LlmRequest {
    LlmRequest {
        model: "deepseek-chat".into(),
        messages: vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user("What is the balance of 0x1?"),
        ],
        tools,
        max_tokens: 256,
        temperature: 0.7,
    }
}

#[tokio::test]
async fn tool_calls_are_decoded_and_request_advertises_tools() {
    let cap = Captured::default();
    let base = spawn(cap.clone()).await;
    let provider = OpenAiCompatProvider::new("sk-test")
        .with_base_url(base)
        .with_timeout(Duration::from_secs(5));

    let schema = json!({"type": "function", "function": {"name": "mcp__merlin_mcp_tool__get_balance", "parameters": {}}});
    let resp = provider.complete(&request(vec![schema])).await.unwrap();

    assert!(resp.content.is_none());
    assert_eq!(resp.tool_calls.len(), 1);
    assert_eq!(resp.tool_calls[0].id, "call_abc");
    assert_eq!(resp.tool_calls[0].parsed_arguments()["address"], "0x1");
    assert_eq!(resp.tokens_used, 42);

    let body = cap.body.lock().await.clone().unwrap();
    assert_eq!(body["tool_choice"], "auto");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["model"], "deepseek-chat");
    assert_eq!(cap.auth.lock().await.as_deref(), Some("Bearer sk-test"));
}

#[tokio::test]
async fn http_errors_become_redacted_llm_errors() {
    let cap = Captured::default();
    let base = spawn(cap.clone()).await;
    let provider = OpenAiCompatProvider::new("sk-test").with_base_url(base);

    let err = provider.complete(&request(Vec::new())).await.unwrap_err();
    assert_eq!(err.kind(), "llm");
    let text = err.to_string();
    assert!(text.contains("401"));
    assert!(!text.contains("abcdefghijklmnop"));

    let body = cap.body.lock().await.clone().unwrap();
    assert!(body.get("tools").is_none());
    assert!(body.get("tool_choice").is_none());
}
