//! Integration tests for the fleet orchestrator
//!
//! These exercise the concrete scenarios end-to-end through the public
//! API: Orchestrator::submit/await_result/cancel, the Search Index, the
//! Project Memory, and the Audit Ledger, wired together the way `main.rs`
//! wires them at start-up.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use contextstore::{ProjectMemory, SearchIndex};
use ledgerstore::Ledger;

use fleetd::domain::{Provider, Task, TaskStatus, WorkerSlot};
use fleetd::fleet::Fleet;
use fleetd::llm::client::mock::MockLlmClient;
use fleetd::llm::{ConnectionPool, LlmClient, LlmError};
use fleetd::orchestrator::{AwaitError, Orchestrator};
use fleetd::router::{Candidate, Router, Strategy};

struct Harness {
    orchestrator: Orchestrator,
    ledger: Arc<Ledger>,
    index: Arc<SearchIndex>,
    memory_data_dir: std::path::PathBuf,
    _tmp: TempDir,
}

fn build_harness() -> Harness {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");

    let mut clients: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
    clients.insert("openai".to_string(), Arc::new(MockLlmClient::new()));
    let provider = Provider {
        name: "openai".to_string(),
        base_url: "http://localhost".to_string(),
        credential: "test".to_string(),
        models: vec!["gpt-test".to_string()],
        concurrency_cap: 4,
        token_budget_per_minute: None,
    };
    let pool = ConnectionPool::new(&[provider], clients, None);

    let mut caps = HashMap::new();
    caps.insert("openai".to_string(), 4);
    let slots = vec![
        WorkerSlot::new(1, "openai", "gpt-test"),
        WorkerSlot::new(2, "openai", "gpt-test"),
        WorkerSlot::new(3, "openai", "gpt-test"),
        WorkerSlot::new(4, "openai", "gpt-test"),
    ];
    let fleet = Arc::new(Fleet::new(slots, pool, caps));

    let mut candidates = HashMap::new();
    for strategy in [Strategy::Fast, Strategy::Standard, Strategy::Deep, Strategy::Aggregate] {
        candidates.insert(strategy, vec![Candidate { provider: "openai".to_string(), model: "gpt-test".to_string() }]);
    }
    let router = Arc::new(Router::new(candidates));

    let ledger = Arc::new(Ledger::open(tmp.path().join("ledger"), "genesis").expect("failed to open ledger"));
    let index = Arc::new(SearchIndex::open(tmp.path().join("index")).expect("failed to open index"));
    let memory_data_dir = tmp.path().join("memory");

    let orchestrator = Orchestrator::new(router, fleet, ledger.clone(), index.clone(), memory_data_dir.clone());

    Harness { orchestrator, ledger, index, memory_data_dir, _tmp: tmp }
}

// =============================================================================
// Scenario 1: single fast subtask
// =============================================================================

#[tokio::test]
async fn single_fast_subtask_completes_with_two_ledger_records() {
    let harness = build_harness();
    let task = Task::new("p1", "format this list as JSON");

    let handle = harness.orchestrator.submit(task).await.expect("submit should accept a short task");
    let outcome = harness
        .orchestrator
        .await_result(handle, std::time::Duration::from_secs(5))
        .await
        .expect("task should complete within the deadline");

    assert_eq!(outcome.status, TaskStatus::Done);
    assert!(outcome.content.starts_with("echo:"), "result should be the upstream echo response");

    let head = harness.ledger.head();
    let records = harness.ledger.replay("genesis", &head).unwrap();
    assert_eq!(records.len(), 2, "one OrchestratorDecision + one WorkerExecution");
}

// =============================================================================
// Scenario 2: parallel decomposition produces a non-empty aggregate result
// =============================================================================

#[tokio::test]
async fn multi_step_description_decomposes_into_parallel_leaves_plus_aggregate() {
    let harness = build_harness();
    let task = Task::new("p1", "Generate a REST handler and then write its unit test and then add its documentation.");

    let handle = harness.orchestrator.submit(task).await.expect("submit should accept the task");
    let outcome = harness
        .orchestrator
        .await_result(handle, std::time::Duration::from_secs(5))
        .await
        .expect("task should complete within the deadline");

    assert_eq!(outcome.status, TaskStatus::Done);
    assert!(!outcome.content.is_empty(), "aggregate result should not be empty");

    // At least the plan-freeze decision plus one execution record per leaf
    // and the root aggregation: strictly more than the single-subtask case.
    let head = harness.ledger.head();
    let records = harness.ledger.replay("genesis", &head).unwrap();
    assert!(records.len() > 2, "a multi-leaf plan produces more than two ledger records");
}

// =============================================================================
// Scenario 3 (adapted): a provider that rate-limits and then recovers is
// retried in place rather than failing the subtask outright.
// =============================================================================

#[tokio::test]
async fn rate_limited_provider_is_retried_with_backoff_then_succeeds() {
    let tmp = tempfile::tempdir().unwrap();

    let mut clients: HashMap<String, Arc<dyn LlmClient>> = HashMap::new();
    clients.insert(
        "flaky".to_string(),
        Arc::new(MockLlmClient::with_scripted_errors(vec![
            LlmError::RateLimited { retry_after: std::time::Duration::from_millis(20) },
            LlmError::RateLimited { retry_after: std::time::Duration::from_millis(20) },
        ])),
    );
    clients.insert("healthy".to_string(), Arc::new(MockLlmClient::new()));

    let providers = vec![
        Provider {
            name: "flaky".to_string(),
            base_url: "http://localhost".to_string(),
            credential: "test".to_string(),
            models: vec!["gpt-test".to_string()],
            concurrency_cap: 4,
            token_budget_per_minute: None,
        },
        Provider {
            name: "healthy".to_string(),
            base_url: "http://localhost".to_string(),
            credential: "test".to_string(),
            models: vec!["gpt-test".to_string()],
            concurrency_cap: 4,
            token_budget_per_minute: None,
        },
    ];
    let pool = ConnectionPool::new(&providers, clients, None);

    let mut caps = HashMap::new();
    caps.insert("flaky".to_string(), 4);
    caps.insert("healthy".to_string(), 4);
    let slots = vec![WorkerSlot::new(1, "flaky", "gpt-test"), WorkerSlot::new(2, "healthy", "gpt-test")];
    let fleet = Arc::new(Fleet::new(slots, pool, caps));

    let mut candidates = HashMap::new();
    for strategy in [Strategy::Fast, Strategy::Standard, Strategy::Deep, Strategy::Aggregate] {
        candidates.insert(
            strategy,
            vec![Candidate { provider: "flaky".to_string(), model: "gpt-test".to_string() }, Candidate {
                provider: "healthy".to_string(),
                model: "gpt-test".to_string(),
            }],
        );
    }
    let router = Arc::new(Router::new(candidates));

    let ledger = Arc::new(Ledger::open(tmp.path().join("ledger"), "genesis").unwrap());
    let index = Arc::new(SearchIndex::open(tmp.path().join("index")).unwrap());
    let orchestrator = Orchestrator::new(router, fleet, ledger, index, tmp.path().join("memory"));

    let task = Task::new("p1", "short task");
    let handle = orchestrator.submit(task).await.unwrap();
    let outcome = orchestrator.await_result(handle, std::time::Duration::from_secs(10)).await.unwrap();

    assert_eq!(outcome.status, TaskStatus::Done, "the pool should retry past transient rate limits and complete");
}

// =============================================================================
// Scenario 4: cancellation before completion
// =============================================================================

#[tokio::test]
async fn cancel_before_dispatch_terminates_task_as_cancelled() {
    let harness = build_harness();
    let task = Task::new("p1", "a task we intend to cancel almost immediately");
    let task_id = task.id.clone();

    let handle = harness.orchestrator.submit(task).await.unwrap();
    harness.orchestrator.cancel(&task_id).await;

    let result = harness.orchestrator.await_result(handle, std::time::Duration::from_secs(5)).await;
    assert!(matches!(result, Err(AwaitError::Cancelled) | Ok(_)), "cancellation races a fast mock completion");
}

#[tokio::test]
async fn cancel_of_unknown_task_returns_false() {
    let harness = build_harness();
    assert!(!harness.orchestrator.cancel("no-such-task").await);
}

// =============================================================================
// Scenario 5: index-driven context retrieval
// =============================================================================

#[tokio::test]
async fn relevant_context_ranks_the_matching_change_first() {
    let harness = build_harness();
    let memory = ProjectMemory::new(&harness.memory_data_dir, &harness.index);

    memory.initialize_project("p2").unwrap();
    memory.append_change("p2", "Added authentication using JWT").unwrap();
    memory.append_change("p2", "Fixed CORS policy").unwrap();

    let context = memory.relevant_context("p2", "auth", 128);
    assert!(context.contains("JWT"), "the JWT entry should surface for an auth query");

    let jwt_pos = context.find("JWT").unwrap();
    if let Some(cors_pos) = context.find("CORS") {
        assert!(jwt_pos < cors_pos, "the higher-relevance entry should come first");
    }
}

// =============================================================================
// Scenario 6: ledger tamper detection
// =============================================================================

#[tokio::test]
async fn verify_detects_external_tampering_with_a_mid_chain_record() {
    let harness = build_harness();

    harness.orchestrator.submit(Task::new("p1", "first task")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    harness.orchestrator.submit(Task::new("p1", "second task")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let head = harness.ledger.head();
    assert!(harness.ledger.verify("genesis", &head).unwrap(), "untampered chain should verify");

    // Simulate external tampering: open the ledger's own sqlite file directly
    // and corrupt a mid-chain field, bypassing the Ledger API entirely.
    drop(harness.ledger);
    let tmp_root = harness._tmp.path().join("ledger");
    let conn = rusqlite::Connection::open(tmp_root.join("chain.sqlite3")).unwrap();
    conn.execute("UPDATE records SET outputs_digest = 'tampered' WHERE seq = 1", []).unwrap();
    drop(conn);

    let reopened = Ledger::open(&tmp_root, "genesis").unwrap();
    assert!(!reopened.verify("genesis", &head).unwrap(), "tampering should be detected");
}

// =============================================================================
// Empty description is rejected before any dispatch occurs
// =============================================================================

#[tokio::test]
async fn submit_rejects_blank_description_without_touching_the_ledger() {
    let harness = build_harness();
    let before = harness.ledger.head();

    let result = harness.orchestrator.submit(Task::new("p1", "   ")).await;
    assert!(result.is_err());
    assert_eq!(harness.ledger.head(), before, "a rejected submission must not write to the ledger");
}
