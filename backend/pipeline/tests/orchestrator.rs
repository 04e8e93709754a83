mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use convoforge_dedup::QuotaTracker;
use convoforge_pipeline::{BatchOrchestrator, OrchestratorSettings};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use common::{answered, question, EchoGenerator, PREFIX};

const WORDS: [&str; 8] = [
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel",
];

fn tracker(total: u64) -> Arc<Mutex<QuotaTracker>> {
    let mut ratios = IndexMap::new();
    ratios.insert("get_balance".to_string(), 1.0);
    Arc::new(Mutex::new(QuotaTracker::in_memory(total, &ratios)))
}

fn settings(max_concurrent: usize) -> OrchestratorSettings {
    OrchestratorSettings {
        enable_parallel: true,
        max_concurrent,
        item_timeout: Duration::from_millis(500),
        inter_item_pause: Duration::ZERO,
        pause_every: 5,
        tool_prefix: PREFIX.to_string(),
    }
}

#[tokio::test]
async fn concurrency_never_exceeds_the_cap() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::from_millis(40)));
    let orchestrator = BatchOrchestrator::new(generator.clone(), tracker(100), settings(3));
    let items = WORDS.iter().map(|w| question(&format!("balance {w}"))).collect();

    let outcome = orchestrator.run_batch(items, 0, &CancellationToken::new()).await;

    assert_eq!(outcome.recorded, WORDS.len());
    assert_eq!(generator.calls.load(Ordering::SeqCst), WORDS.len());
    assert!(orchestrator.gauge().peak() <= 3);
    assert!(orchestrator.gauge().peak() >= 2);
    assert_eq!(orchestrator.gauge().active(), 0);
}

#[tokio::test]
async fn completed_records_keep_input_order() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::from_millis(5)));
    let orchestrator = BatchOrchestrator::new(generator, tracker(100), settings(4));
    let items = WORDS.iter().map(|w| question(&format!("order {w}"))).collect();

    let outcome = orchestrator.run_batch(items, 10, &CancellationToken::new()).await;

    let questions: Vec<_> = outcome
        .completed
        .iter()
        .map(|r| r.user_question().unwrap().to_string())
        .collect();
    let expected: Vec<_> = WORDS.iter().map(|w| format!("order {w}")).collect();
    assert_eq!(questions, expected);
}

#[tokio::test]
async fn cancellation_lets_running_items_finish_and_starts_no_more() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::from_millis(300)));
    let orchestrator = BatchOrchestrator::new(generator.clone(), tracker(100), settings(2));
    let items = WORDS[..4]
        .iter()
        .map(|w| question(&format!("balance {w}")))
        .collect();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let outcome = orchestrator.run_batch(items, 0, &cancel).await;

    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.recorded, 2);
    assert_eq!(outcome.unstarted, 2);
    let questions: Vec<_> = outcome
        .completed
        .iter()
        .map(|r| r.user_question().unwrap().to_string())
        .collect();
    assert_eq!(questions, vec!["balance alpha", "balance bravo"]);
    assert_eq!(orchestrator.tracker().lock().unwrap().state().total_generated, 2);
}

#[tokio::test]
async fn failures_and_timeouts_do_not_sink_siblings() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::from_millis(5)));
    let orchestrator = BatchOrchestrator::new(generator, tracker(100), settings(2));
    let items = vec![
        question("balance alpha"),
        question("please fail"),
        question("very slow one"),
        question("balance bravo"),
    ];

    let outcome = orchestrator.run_batch(items, 0, &CancellationToken::new()).await;

    assert_eq!(outcome.recorded, 2);
    assert_eq!(outcome.failed, 2);
    assert_eq!(outcome.completed.len(), 2);
    assert_eq!(outcome.attempted(), 4);
}

#[tokio::test]
async fn complete_items_pass_through_and_empty_items_are_skipped() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::ZERO));
    let orchestrator = BatchOrchestrator::new(generator.clone(), tracker(100), settings(2));
    let items = vec![
        answered("already done", "yes"),
        convoforge_core::ConversationRecord::default(),
        question("balance charlie"),
    ];

    let outcome = orchestrator.run_batch(items, 0, &CancellationToken::new()).await;

    assert_eq!(outcome.passed_through, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.recorded, 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.completed[0].user_question(), Some("already done"));
    // Pass-throughs are not counted against any quota.
    let tracker = orchestrator.tracker().lock().unwrap();
    assert_eq!(tracker.state().generated("get_balance"), 1);
}

#[tokio::test]
async fn duplicates_are_generated_then_discarded() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::ZERO));
    let mut settings = settings(1);
    settings.enable_parallel = false;
    let orchestrator = BatchOrchestrator::new(generator.clone(), tracker(100), settings);
    // Same signature: digits normalize to one placeholder.
    let items = vec![question("block 100 size?"), question("block 200 size?")];

    let outcome = orchestrator.run_batch(items, 0, &CancellationToken::new()).await;

    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.recorded, 1);
    assert_eq!(outcome.discarded, 1);
    assert_eq!(outcome.completed.len(), 1);
}

#[tokio::test]
async fn items_over_quota_are_discarded() {
    let generator = Arc::new(EchoGenerator::new("get_balance", Duration::ZERO));
    let mut settings = settings(1);
    settings.enable_parallel = false;
    let orchestrator = BatchOrchestrator::new(generator, tracker(2), settings);
    let items = WORDS[..4]
        .iter()
        .map(|w| question(&format!("quota {w}")))
        .collect();

    let outcome = orchestrator.run_batch(items, 0, &CancellationToken::new()).await;

    assert_eq!(outcome.recorded, 2);
    assert_eq!(outcome.discarded, 2);
    let tracker = orchestrator.tracker().lock().unwrap();
    assert!(tracker.quota_met("get_balance"));
}

#[tokio::test]
async fn conversations_without_tools_are_categorised_as_no_tool() {
    struct Plain;

    #[async_trait::async_trait]
    impl convoforge_pipeline::Generator for Plain {
        async fn generate(
            &self,
            record: &convoforge_core::ConversationRecord,
        ) -> convoforge_core::ForgeResult<convoforge_core::ConversationRecord> {
            let mut done = record.clone();
            done.conversations.push(convoforge_core::Turn::new(
                convoforge_core::Speaker::Gpt,
                "hello",
            ));
            Ok(done)
        }
    }

    let orchestrator = BatchOrchestrator::new(Arc::new(Plain), tracker(100), settings(2));
    let outcome = orchestrator
        .run_batch(vec![question("greetings")], 0, &CancellationToken::new())
        .await;

    assert_eq!(outcome.recorded, 1);
    let tracker = orchestrator.tracker().lock().unwrap();
    assert_eq!(
        tracker.state().generated(convoforge_pipeline::NO_TOOL_CATEGORY),
        1
    );
}
