//! HTTP API (§6, enabled only when `http.listen_addr` is configured).

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use serde::{Deserialize, Serialize};

use contextstore::{Filters, ProjectMemory, SearchIndex, SourceKind};
use ledgerstore::Ledger;

use crate::domain::Task;
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub index: Arc<SearchIndex>,
    pub ledger: Arc<Ledger>,
    pub memory_data_dir: std::path::PathBuf,
}

pub fn router(state: AppState) -> AxumRouter {
    AxumRouter::new()
        .route("/tasks", post(submit_task))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}:cancel", post(cancel_task))
        .route("/search", post(search))
        .route("/memory/{project}/changes", post(append_change))
        .route("/memory/{project}/context", get(relevant_context))
        .route("/ledger/verify", get(verify_ledger))
        .with_state(state)
}

#[derive(Deserialize)]
struct SubmitRequest {
    project: String,
    description: String,
    structured_inputs: Option<serde_json::Value>,
    deadline_ms: Option<u64>,
}

#[derive(Serialize)]
struct SubmitResponse {
    task_id: String,
}

async fn submit_task(State(state): State<AppState>, Json(body): Json<SubmitRequest>) -> impl IntoResponse {
    let mut task = Task::new(body.project, body.description);
    task.structured_inputs = body.structured_inputs;
    if let Some(ms) = body.deadline_ms {
        task.deadline = Some(chrono::Utc::now() + chrono::Duration::milliseconds(ms as i64));
    }

    match state.orchestrator.submit(task).await {
        Ok(handle) => (StatusCode::ACCEPTED, Json(SubmitResponse { task_id: handle.task_id })).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: err.to_string() })).into_response(),
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct TaskStatusResponse {
    status: String,
    result: Option<String>,
    error: Option<String>,
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.orchestrator.status(&id).await {
        Some(outcome) => {
            let (result, error) = if outcome.status == crate::domain::TaskStatus::Done {
                (Some(outcome.content), None)
            } else {
                (None, Some(format!("{:?}", outcome.status)))
            };
            (StatusCode::OK, Json(TaskStatusResponse { status: format!("{:?}", outcome.status), result, error })).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(ErrorResponse { error: format!("unknown task {id}") })).into_response(),
    }
}

async fn cancel_task(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if state.orchestrator.cancel(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search(State(state): State<AppState>, Json(body): Json<SearchRequest>) -> impl IntoResponse {
    let sources: HashSet<SourceKind> = if body.sources.is_empty() {
        [SourceKind::Files, SourceKind::Memory, SourceKind::Changes].into_iter().collect()
    } else {
        body.sources
            .iter()
            .filter_map(|s| match s.as_str() {
                "files" => Some(SourceKind::Files),
                "memory" => Some(SourceKind::Memory),
                "changes" => Some(SourceKind::Changes),
                _ => None,
            })
            .collect()
    };

    let hits = state.index.search(&body.query, &sources, &Filters::default(), body.limit.unwrap_or(10));
    Json(hits).into_response()
}

#[derive(Deserialize)]
struct AppendChangeRequest {
    entry: String,
}

async fn append_change(State(state): State<AppState>, Path(project): Path<String>, Json(body): Json<AppendChangeRequest>) -> impl IntoResponse {
    let memory = ProjectMemory::new(&state.memory_data_dir, &state.index);
    match memory.append_change(&project, &body.entry) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::CONFLICT, Json(ErrorResponse { error: err.to_string() })).into_response(),
    }
}

#[derive(Deserialize)]
struct ContextQuery {
    q: String,
    budget: Option<usize>,
}

async fn relevant_context(State(state): State<AppState>, Path(project): Path<String>, Query(params): Query<ContextQuery>) -> impl IntoResponse {
    let memory = ProjectMemory::new(&state.memory_data_dir, &state.index);
    let context = memory.relevant_context(&project, &params.q, params.budget.unwrap_or(2000));
    context.into_response()
}

#[derive(Deserialize)]
struct VerifyQuery {
    from: String,
    to: String,
}

#[derive(Serialize)]
struct VerifyResponse {
    valid: bool,
}

async fn verify_ledger(State(state): State<AppState>, Query(params): Query<VerifyQuery>) -> impl IntoResponse {
    match state.ledger.verify(&params.from, &params.to) {
        Ok(valid) => Json(VerifyResponse { valid }).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: err.to_string() })).into_response(),
    }
}
