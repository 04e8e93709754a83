mod common;

use std::sync::Arc;

use convoforge_core::{ForgeError, RetryPolicy, Speaker};
use convoforge_pipeline::{CompletionSettings, ConversationCompleter, ROUND_LIMIT_REPLY};
use convoforge_planner::MockProvider;
use serde_json::{json, Value};

use common::{question, FakeTools, PREFIX};

fn settings() -> CompletionSettings {
    let mut settings = CompletionSettings::new("deepseek-chat", "You answer blockchain questions.");
    settings.timeout_retry = RetryPolicy::immediate(2);
    settings.request_retry = RetryPolicy::immediate(2);
    settings
}

fn completer(llm: Arc<MockProvider>, tools: Arc<FakeTools>) -> ConversationCompleter {
    ConversationCompleter::new(llm, tools, settings())
}

#[tokio::test]
async fn tool_round_appends_call_observation_and_answer() {
    let llm = Arc::new(
        MockProvider::new("mock")
            .then_tool_call(
                format!("{PREFIX}get_balance"),
                json!({"address": "0xabc"}),
            )
            .then_reply("The address holds 1.5 BTC."),
    );
    let tools = Arc::new(FakeTools::default());
    let done = completer(llm.clone(), tools.clone())
        .complete(&question("What is the balance of 0xabc?"))
        .await
        .unwrap();

    let speakers: Vec<_> = done.conversations.iter().map(|t| t.from.clone()).collect();
    assert_eq!(
        speakers,
        vec![
            Speaker::System,
            Speaker::Human,
            Speaker::FunctionCall,
            Speaker::Observation,
            Speaker::Gpt,
        ]
    );

    let call: Value = serde_json::from_str(&done.conversations[2].value).unwrap();
    assert_eq!(call["name"], format!("{PREFIX}get_balance"));
    assert_eq!(call["arguments"]["address"], "0xabc");
    assert!(done.conversations[3].value.contains("1.5 BTC"));
    assert_eq!(done.conversations[4].value, "The address holds 1.5 BTC.");

    let used: Value = serde_json::from_str(done.tools.as_deref().unwrap()).unwrap();
    assert_eq!(used[0]["name"], format!("{PREFIX}get_balance"));
    assert_eq!(used[0]["description"], "Native balance of an address");

    let calls = tools.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "get_balance");

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    let follow_up = &requests[1].messages;
    let tool_message = follow_up.last().unwrap();
    assert_eq!(tool_message.role, "tool");
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_0"));
    assert_eq!(follow_up[follow_up.len() - 2].role, "assistant");
}

#[tokio::test]
async fn round_limit_closes_the_conversation() {
    let call = format!("{PREFIX}get_balance");
    let llm = Arc::new(
        MockProvider::new("mock")
            .then_tool_call(call.clone(), json!({}))
            .then_tool_call(call.clone(), json!({}))
            .then_tool_call(call, json!({})),
    );
    let tools = Arc::new(FakeTools::default());
    let mut settings = settings();
    settings.max_tool_rounds = 2;
    let done = ConversationCompleter::new(llm.clone(), tools.clone(), settings)
        .complete(&question("Keep checking my balance"))
        .await
        .unwrap();

    assert_eq!(llm.requests().len(), 2);
    assert_eq!(tools.calls.lock().unwrap().len(), 2);
    let last = done.conversations.last().unwrap();
    assert_eq!(last.from, Speaker::Gpt);
    assert_eq!(last.value, ROUND_LIMIT_REPLY);
}

#[tokio::test]
async fn unprefixed_tool_becomes_unknown_tool_observation() {
    let llm = Arc::new(
        MockProvider::new("mock")
            .then_tool_call("get_balance", json!({}))
            .then_reply("Sorry, I cannot look that up."),
    );
    let tools = Arc::new(FakeTools::default());
    let done = completer(llm, tools.clone())
        .complete(&question("Balance please"))
        .await
        .unwrap();

    assert!(tools.calls.lock().unwrap().is_empty());
    let observation = done
        .conversations
        .iter()
        .find(|t| t.from == Speaker::Observation)
        .unwrap();
    let value: Value = serde_json::from_str(&observation.value).unwrap();
    assert_eq!(value["error"], "Unknown tool: get_balance");
}

#[tokio::test]
async fn tool_missing_from_catalog_becomes_unknown_tool_observation() {
    let llm = Arc::new(
        MockProvider::new("mock")
            .then_tool_call(format!("{PREFIX}get_price"), json!({}))
            .then_reply("No price tool."),
    );
    let done = completer(llm, Arc::new(FakeTools::default()))
        .complete(&question("Price of ETH?"))
        .await
        .unwrap();

    let observation = &done.conversations[3];
    assert_eq!(observation.from, Speaker::Observation);
    assert!(observation.value.contains("Unknown tool"));
}

#[tokio::test]
async fn plain_reply_sets_empty_tool_list() {
    let llm = Arc::new(MockProvider::new("mock").then_reply("Hello there."));
    let done = completer(llm, Arc::new(FakeTools::default()))
        .complete(&question("Hi"))
        .await
        .unwrap();

    assert_eq!(done.conversations.len(), 3);
    assert_eq!(done.conversations[1].from, Speaker::Human);
    assert_eq!(done.tools.as_deref(), Some("[]"));
    assert!(done.first_tool_called().is_none());
}

#[tokio::test]
async fn transient_llm_failures_are_retried() {
    let llm = Arc::new(
        MockProvider::new("mock")
            .then(Err(ForgeError::Timeout("read timed out".into())))
            .then(Err(ForgeError::Llm {
                provider: "mock".into(),
                message: "HTTP 502".into(),
            }))
            .then_reply("Recovered."),
    );
    let done = completer(llm.clone(), Arc::new(FakeTools::default()))
        .complete(&question("Are you there?"))
        .await
        .unwrap();

    assert_eq!(llm.requests().len(), 3);
    assert_eq!(done.conversations.last().unwrap().value, "Recovered.");
}

#[tokio::test]
async fn decode_errors_are_not_retried() {
    let llm = Arc::new(
        MockProvider::new("mock")
            .then(Err(ForgeError::Decode("no choices".into())))
            .then_reply("unreachable"),
    );
    let err = completer(llm.clone(), Arc::new(FakeTools::default()))
        .complete(&question("Anything"))
        .await
        .unwrap_err();

    assert!(matches!(err, ForgeError::Decode(_)));
    assert_eq!(llm.requests().len(), 1);
}
