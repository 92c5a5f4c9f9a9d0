//! Orchestrator: converts a Task into a completed result via decomposition,
//! routing, dispatch, aggregation, and audit (§4.1).
//!
//! Grounded on the source repo's `Coordinator` (`src/coordinator/core.rs`):
//! a `register()`-style entry point hands back a handle backed by a channel,
//! here a `oneshot` carrying the final outcome instead of a loop-to-loop
//! message stream. Cancellation is a per-task `Notify`, the same mechanism
//! `fleet::scheduler::SlotScheduler` already uses for interrupting a blocked
//! slot wait.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{oneshot, Mutex, Notify};
use tracing::{info, warn};

use contextstore::{ProjectMemory, SearchIndex};
use ledgerstore::{digest, Ledger, RecordDraft, RecordKind};

use crate::domain::{IdResolver, Task, TaskStatus};
use crate::fleet::{ExecuteError, Fleet, Output};
use crate::planner::{self, complexity};
use crate::router::{self, Router, RoutingDecision, Strategy};

/// Outcome of a fully-run Task: the aggregated root subtask's content.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    pub content: String,
}

/// Handle returned by `Submit`: await completion or request cancellation.
pub struct TaskHandle {
    pub task_id: String,
    result_rx: oneshot::Receiver<TaskOutcome>,
}

/// Errors `Await` can surface to the caller (§4.1 public operations).
#[derive(Debug, thiserror::Error)]
pub enum AwaitError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("task was cancelled")]
    Cancelled,
    #[error("orchestrator channel closed unexpectedly")]
    Fatal,
}

/// Drives Tasks from submission to completion. One instance per process,
/// shared behind an `Arc` across the public interfaces (§6).
pub struct Orchestrator {
    router: Arc<Router>,
    fleet: Arc<Fleet>,
    ledger: Arc<Ledger>,
    index: Arc<SearchIndex>,
    memory_data_dir: PathBuf,
    cancellations: Mutex<HashMap<String, Arc<Notify>>>,
    /// Last-known outcome per task id, for polling callers (HTTP `GET /tasks/{id}`)
    /// distinct from the one-shot `TaskHandle` returned by `submit`.
    results: Arc<Mutex<HashMap<String, TaskOutcome>>>,
}

impl Orchestrator {
    pub fn new(router: Arc<Router>, fleet: Arc<Fleet>, ledger: Arc<Ledger>, index: Arc<SearchIndex>, memory_data_dir: PathBuf) -> Self {
        Self {
            router,
            fleet,
            ledger,
            index,
            memory_data_dir,
            cancellations: Mutex::new(HashMap::new()),
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Look up the last-known outcome for `task_id`, if it has reached a
    /// terminal state (§6 `GET /tasks/{id}`).
    pub async fn status(&self, task_id: &str) -> Option<TaskOutcome> {
        self.results.lock().await.get(task_id).cloned()
    }

    /// Resolve a partial task id (hex prefix or slug substring) to the one
    /// full id it matches among tasks this process has submitted, for CLI
    /// `Status`/`Cancel` lookups. `Ok(None)` means no task matched.
    pub async fn resolve_task_id(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        let cancellations = self.cancellations.lock().await;
        let results = self.results.lock().await;
        let known: HashMap<String, String> =
            cancellations.keys().chain(results.keys()).map(|id| (id.clone(), id.clone())).collect();
        IdResolver::new(&known).resolve(reference)
    }

    /// Enqueue `task` for execution. Fails with `InvalidInput` if the
    /// description is empty (§4.1 `Submit`).
    pub async fn submit(&self, mut task: Task) -> Result<TaskHandle, crate::errors::FleetError> {
        if task.description.trim().is_empty() {
            return Err(crate::errors::FleetError::InvalidInput("task description is empty".to_string()));
        }

        task.complexity = complexity::score(&task.description, task.structured_inputs.as_ref());
        task.strategy = crate::router::Strategy::from_complexity(task.complexity, false);
        task.transition(TaskStatus::Planning);

        let plan = planner::decompose(&task);
        debug_assert!(planner::is_acyclic(&plan), "planner produced a cyclic plan");

        self.record_decision(&task, "plan-freeze", &format!("{} subtasks", plan.len()))?;

        task.transition(TaskStatus::Dispatched);

        let cancel = Arc::new(Notify::new());
        self.cancellations.lock().await.insert(task.id.clone(), cancel.clone());

        let (tx, rx) = oneshot::channel();
        let task_id = task.id.clone();

        let router = self.router.clone();
        let fleet = self.fleet.clone();
        let ledger = self.ledger.clone();
        let index = self.index.clone();
        let memory_data_dir = self.memory_data_dir.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            let outcome = run_task(task, plan, router, fleet, ledger, index, memory_data_dir, cancel).await;
            results.lock().await.insert(outcome.task_id.clone(), outcome.clone());
            let _ = tx.send(outcome);
        });

        Ok(TaskHandle { task_id, result_rx: rx })
    }

    /// Block until `handle` completes or `deadline` elapses (§4.1 `Await`).
    pub async fn await_result(&self, handle: TaskHandle, deadline: std::time::Duration) -> Result<TaskOutcome, AwaitError> {
        match tokio::time::timeout(deadline, handle.result_rx).await {
            Ok(Ok(outcome)) if outcome.status == TaskStatus::Cancelled => Err(AwaitError::Cancelled),
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(AwaitError::Fatal),
            Err(_) => Err(AwaitError::DeadlineExceeded),
        }
    }

    /// Signal cancellation for `task_id`. In-flight subtasks are allowed to
    /// complete; their results are discarded by `run_task` (§4.1 `Cancel`).
    pub async fn cancel(&self, task_id: &str) -> bool {
        if let Some(notify) = self.cancellations.lock().await.get(task_id) {
            notify.notify_waiters();
            true
        } else {
            false
        }
    }

    fn record_decision(&self, task: &Task, stage: &str, summary: &str) -> Result<(), crate::errors::FleetError> {
        let draft = RecordDraft {
            kind: RecordKind::OrchestratorDecision,
            task_id: task.id.clone(),
            inputs_digest: digest(task.description.as_bytes()),
            outputs_digest: digest(format!("{stage}: {summary}").as_bytes()),
            actor_id: "orchestrator".to_string(),
            cost_usd: None,
        };
        self.ledger.append_auto(draft)?;
        Ok(())
    }
}

/// Runs every phase of §4.1 for one Task: Route, Dispatch, Aggregate, Record.
/// Failure semantics: a leaf that exhausts retries produces a placeholder
/// failure output rather than aborting the whole plan; the root aggregation
/// decides whether the Task ultimately fails.
async fn run_task(
    mut task: Task,
    plan: planner::Plan,
    router: Arc<Router>,
    fleet: Arc<Fleet>,
    ledger: Arc<Ledger>,
    index: Arc<SearchIndex>,
    memory_data_dir: PathBuf,
    cancel: Arc<Notify>,
) -> TaskOutcome {
    let mut outputs: HashMap<String, String> = HashMap::new();
    let mut remaining: Vec<_> = plan.into_iter().collect();
    let mut any_failure = false;

    while !remaining.is_empty() {
        let completed: std::collections::HashSet<String> = outputs.keys().cloned().collect();
        let (ready, not_ready): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|s| s.is_dispatchable(&completed));
        remaining = not_ready;

        if ready.is_empty() {
            warn!(task_id = %task.id, "planner produced an undispatchable remainder; aborting");
            any_failure = true;
            break;
        }

        for subtask in ready {
            let health = fleet.provider_health().await;
            let decision = router.select(subtask.strategy, &health).unwrap_or(RoutingDecision::Degraded {
                provider: "unassigned".to_string(),
                model: "unassigned".to_string(),
            });

            // Aggregation subtasks are dispatched like any other (§4.1 "run
            // aggregation subtasks until the root produces a single Result"):
            // their description is extended with the concatenated child
            // output, compressed first if it would not fit the chosen
            // model's context (§4.3).
            let mut dispatched = subtask.clone();
            if subtask.is_aggregation {
                let merged = subtask
                    .depends_on
                    .iter()
                    .filter_map(|id| outputs.get(id))
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n---\n");

                let input = if router::fits_aggregate_context(&merged, decision.model()) {
                    merged
                } else {
                    match compress(&task.id, &merged, &router, &fleet, &cancel, &ledger).await {
                        Ok(compressed) => compressed,
                        Err(err) => {
                            warn!(task_id = %task.id, subtask_id = %subtask.id, %err, "compression subtask failed; aggregating uncompressed input");
                            merged
                        }
                    }
                };
                dispatched.description = format!("{}\n\n{input}", subtask.description);
            }

            match fleet.execute(&dispatched, &decision, subtask.strategy.timeout(), &cancel).await {
                Ok(Output { content, usage, model, .. }) => {
                    record_worker_execution(&ledger, &task.id, &dispatched.description, &content, usage.cost_usd(&model));
                    outputs.insert(subtask.id.clone(), content);
                }
                Err(ExecuteError::Cancelled) => {
                    task.transition(TaskStatus::Cancelled);
                    return TaskOutcome { task_id: task.id, status: TaskStatus::Cancelled, content: String::new() };
                }
                Err(err) => {
                    warn!(task_id = %task.id, subtask_id = %subtask.id, %err, "subtask failed");
                    let failure = format!("[failed: {err}]");
                    record_worker_execution(&ledger, &task.id, &dispatched.description, &failure, 0.0);
                    outputs.insert(subtask.id.clone(), failure);
                    any_failure = true;
                }
            }
        }
    }

    let root_content = outputs.values().last().cloned().unwrap_or_default();
    let final_status = if any_failure { TaskStatus::Failed } else { TaskStatus::Done };
    task.transition(if final_status == TaskStatus::Done { TaskStatus::Aggregating } else { TaskStatus::Failed });
    if final_status == TaskStatus::Done {
        task.transition(TaskStatus::Done);
    }

    let memory = ProjectMemory::new(&memory_data_dir, &index);
    if memory.initialize_project(&task.project).is_ok() {
        let entry = format!("Task {} completed with status {:?}", task.id, final_status);
        if let Err(err) = memory.append_change(&task.project, &entry) {
            warn!(task_id = %task.id, %err, "failed to append changelog entry");
        }
    }

    info!(task_id = %task.id, status = ?final_status, "task finished");
    TaskOutcome { task_id: task.id, status: final_status, content: root_content }
}

/// Append one `WorkerExecution` ledger record for a single dispatched
/// subtask call, with its derived cost estimate (§4.6, §10.7).
fn record_worker_execution(ledger: &Ledger, task_id: &str, input: &str, output: &str, cost_usd: f64) {
    let draft = RecordDraft {
        kind: RecordKind::WorkerExecution,
        task_id: task_id.to_string(),
        inputs_digest: digest(input.as_bytes()),
        outputs_digest: digest(output.as_bytes()),
        actor_id: "fleet".to_string(),
        cost_usd: Some(cost_usd),
    };
    if let Err(err) = ledger.append_auto(draft) {
        warn!(task_id, %err, "failed to append worker execution record");
    }
}

/// Compress `content` with an intermediate Fast-strategy subtask so it fits
/// the Aggregate strategy's chosen model context (§4.3). The compression
/// call itself is ledgered like any other dispatched subtask.
async fn compress(
    task_id: &str,
    content: &str,
    router: &Router,
    fleet: &Fleet,
    cancel: &Notify,
    ledger: &Ledger,
) -> Result<String, ExecuteError> {
    let description =
        format!("Summarize the following so it fits a smaller context window, preserving every fact a downstream aggregation step needs:\n\n{content}");
    let subtask = crate::domain::Subtask::new(task_id, description, Strategy::Fast);

    let health = fleet.provider_health().await;
    let decision = router.select(Strategy::Fast, &health).unwrap_or(RoutingDecision::Degraded {
        provider: "unassigned".to_string(),
        model: "unassigned".to_string(),
    });

    let output = fleet.execute(&subtask, &decision, Strategy::Fast.timeout(), cancel).await?;
    record_worker_execution(ledger, task_id, &subtask.description, &output.content, output.usage.cost_usd(&output.model));
    Ok(output.content)
}
