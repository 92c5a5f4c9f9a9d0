//! Task and Subtask domain types (§3), and the Task state machine (§4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::DomainId;
use crate::router::Strategy;

/// Lifecycle state of a Task. `Done | Failed | Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    New,
    Planning,
    Dispatched,
    Aggregating,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Whether `self -> next` is a legal transition (§4.1 state machine:
    /// `New -> Planning -> Dispatched -> (Aggregating)* -> Done`, any state
    /// may move to `Failed`/`Cancelled`).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskStatus::Failed | TaskStatus::Cancelled => true,
            TaskStatus::Planning => self == TaskStatus::New,
            TaskStatus::Dispatched => self == TaskStatus::Planning,
            TaskStatus::Aggregating => matches!(self, TaskStatus::Dispatched | TaskStatus::Aggregating),
            TaskStatus::Done => matches!(self, TaskStatus::Dispatched | TaskStatus::Aggregating),
            TaskStatus::New => false,
        }
    }
}

/// A unit of work submitted by a caller (§3 Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub structured_inputs: Option<serde_json::Value>,
    pub complexity: f64,
    pub strategy: Strategy,
    pub project: String,
    pub deadline: Option<DateTime<Utc>>,
    pub parent_task_id: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(project: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        let id = DomainId::new("task", &description).to_string();
        Self {
            id,
            description,
            structured_inputs: None,
            complexity: 0.0,
            strategy: Strategy::Standard,
            project: project.into(),
            deadline: None,
            parent_task_id: None,
            status: TaskStatus::New,
            created_at: Utc::now(),
        }
    }

    /// Move to `next` if legal, otherwise leave state unchanged and return false.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Kind of the last error a Subtask encountered, for retry/audit purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastErrorKind {
    None,
    Timeout,
    ProviderExhausted,
    RateLimited,
    TransientUpstream,
    InvalidInput,
}

/// A child of a Task produced by decomposition (§3 Subtask).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub task_id: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub assigned_worker: Option<String>,
    pub attempt_count: u32,
    pub last_error: LastErrorKind,
    pub strategy: Strategy,
    pub is_aggregation: bool,
}

impl Subtask {
    pub fn new(task_id: &str, description: impl Into<String>, strategy: Strategy) -> Self {
        let description = description.into();
        let id = DomainId::new("subtask", &description).to_string();
        Self {
            id,
            task_id: task_id.to_string(),
            description,
            depends_on: Vec::new(),
            assigned_worker: None,
            attempt_count: 0,
            last_error: LastErrorKind::None,
            strategy,
            is_aggregation: false,
        }
    }

    /// True once every dependency id is present in `completed`.
    pub fn is_dispatchable(&self, completed: &std::collections::HashSet<String>) -> bool {
        self.depends_on.iter().all(|dep| completed.contains(dep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_in_new_state() {
        let task = Task::new("proj", "add a feature");
        assert_eq!(task.status, TaskStatus::New);
    }

    #[test]
    fn legal_transitions_follow_state_machine() {
        let mut task = Task::new("proj", "add a feature");
        assert!(task.transition(TaskStatus::Planning));
        assert!(task.transition(TaskStatus::Dispatched));
        assert!(task.transition(TaskStatus::Aggregating));
        assert!(task.transition(TaskStatus::Done));
        assert!(task.status.is_terminal());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut task = Task::new("proj", "add a feature");
        assert!(!task.transition(TaskStatus::Done));
        assert_eq!(task.status, TaskStatus::New);
    }

    #[test]
    fn terminal_state_rejects_all_further_transitions() {
        let mut task = Task::new("proj", "add a feature");
        task.transition(TaskStatus::Cancelled);
        assert!(!task.transition(TaskStatus::Planning));
    }

    #[test]
    fn subtask_dispatchable_once_dependencies_complete() {
        let mut subtask = Subtask::new("t1", "aggregate results", Strategy::Aggregate);
        subtask.depends_on = vec!["s1".to_string(), "s2".to_string()];

        let mut completed = std::collections::HashSet::new();
        assert!(!subtask.is_dispatchable(&completed));
        completed.insert("s1".to_string());
        assert!(!subtask.is_dispatchable(&completed));
        completed.insert("s2".to_string());
        assert!(subtask.is_dispatchable(&completed));
    }
}
