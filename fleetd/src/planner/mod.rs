//! Planner: decomposes a Task into an acyclic subtask DAG (§4.1 Plan phase).
//!
//! `decompose` is a pure function of `(task, complexity)` — same inputs,
//! same subtask graph, no I/O.

pub mod complexity;

use crate::domain::{Subtask, Task};
use crate::router::Strategy;

/// One subtask plus the ids of the subtasks it depends on, already wired
/// onto the `Subtask` value itself via `depends_on`.
pub type Plan = Vec<Subtask>;

/// Decompose `task` into a dependency DAG sized by its complexity tier:
/// `< 0.25` → single subtask; `0.25..=0.7` → up to 4 parallel leaves plus one
/// aggregation subtask; `> 0.7` → up to 16 leaves plus two aggregation
/// levels (§4.1).
pub fn decompose(task: &Task) -> Plan {
    if task.complexity < 0.25 {
        return vec![leaf(task, 0, 1)];
    }

    if task.complexity <= 0.7 {
        return shallow_plan(task);
    }

    deep_plan(task)
}

fn leaf(task: &Task, index: usize, total: usize) -> Subtask {
    let strategy = Strategy::from_complexity(task.complexity, false);
    Subtask::new(&task.id, format!("[{}/{total}] {}", index + 1, task.description), strategy)
}

fn aggregation(task: &Task, description: &str, depends_on: Vec<String>) -> Subtask {
    let mut subtask = Subtask::new(&task.id, description, Strategy::Aggregate);
    subtask.is_aggregation = true;
    subtask.depends_on = depends_on;
    subtask
}

/// `0.25..=0.7`: up to 4 parallel leaves, one aggregation subtask.
fn shallow_plan(task: &Task) -> Plan {
    const MAX_LEAVES: usize = 4;
    let leaves: Vec<Subtask> = (0..MAX_LEAVES).map(|i| leaf(task, i, MAX_LEAVES)).collect();
    let leaf_ids: Vec<String> = leaves.iter().map(|s| s.id.clone()).collect();

    let root = aggregation(task, format!("Combine results for: {}", task.description), leaf_ids);

    let mut plan = leaves;
    plan.push(root);
    plan
}

/// `> 0.7`: up to 16 leaves, grouped into groups of 4, each group rolled up
/// by an intermediate aggregation subtask, then a final aggregation over
/// the intermediates (two aggregation levels).
fn deep_plan(task: &Task) -> Plan {
    const MAX_LEAVES: usize = 16;
    const GROUP_SIZE: usize = 4;

    let leaves: Vec<Subtask> = (0..MAX_LEAVES).map(|i| leaf(task, i, MAX_LEAVES)).collect();

    let mut plan: Plan = Vec::new();
    let mut intermediate_ids = Vec::new();
    for (group_index, chunk) in leaves.chunks(GROUP_SIZE).enumerate() {
        let chunk_ids: Vec<String> = chunk.iter().map(|s| s.id.clone()).collect();
        let intermediate = aggregation(task, format!("Combine group {group_index} for: {}", task.description), chunk_ids);
        intermediate_ids.push(intermediate.id.clone());
        plan.push(intermediate);
    }

    let root = aggregation(task, format!("Final combine for: {}", task.description), intermediate_ids);

    let mut full_plan = leaves;
    full_plan.extend(plan);
    full_plan.push(root);
    full_plan
}

/// True if `plan`'s dependency edges form a DAG (no subtask transitively
/// depends on itself). Used by tests and by the Orchestrator before freezing
/// a plan into the Ledger (§4.1 "the Plan must be acyclic").
pub fn is_acyclic(plan: &Plan) -> bool {
    use std::collections::{HashMap, HashSet};

    let by_id: HashMap<&str, &Subtask> = plan.iter().map(|s| (s.id.as_str(), s)).collect();

    fn visit<'a>(id: &'a str, by_id: &HashMap<&'a str, &'a Subtask>, visiting: &mut HashSet<&'a str>, done: &mut HashSet<&'a str>) -> bool {
        if done.contains(id) {
            return true;
        }
        if visiting.contains(id) {
            return false;
        }
        visiting.insert(id);
        if let Some(subtask) = by_id.get(id) {
            for dep in &subtask.depends_on {
                if !visit(dep.as_str(), by_id, visiting, done) {
                    return false;
                }
            }
        }
        visiting.remove(id);
        done.insert(id);
        true
    }

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    plan.iter().all(|s| visit(s.id.as_str(), &by_id, &mut visiting, &mut done))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_complexity(complexity: f64) -> Task {
        let mut task = Task::new("proj", "build the thing");
        task.complexity = complexity;
        task
    }

    #[test]
    fn low_complexity_yields_single_subtask() {
        let plan = decompose(&task_with_complexity(0.1));
        assert_eq!(plan.len(), 1);
        assert!(is_acyclic(&plan));
    }

    #[test]
    fn mid_complexity_yields_four_leaves_and_one_aggregation() {
        let plan = decompose(&task_with_complexity(0.5));
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.iter().filter(|s| s.is_aggregation).count(), 1);
        assert!(is_acyclic(&plan));
    }

    #[test]
    fn high_complexity_yields_two_aggregation_levels() {
        let plan = decompose(&task_with_complexity(0.9));
        assert_eq!(plan.iter().filter(|s| !s.is_aggregation).count(), 16);
        let aggregations: Vec<_> = plan.iter().filter(|s| s.is_aggregation).collect();
        assert_eq!(aggregations.len(), 5); // 4 intermediate + 1 final
        assert!(is_acyclic(&plan));

        let root = aggregations.last().unwrap();
        assert_eq!(root.depends_on.len(), 4);
    }

    #[test]
    fn decompose_is_pure_given_same_inputs() {
        let task = task_with_complexity(0.5);
        let first: Vec<String> = decompose(&task).iter().map(|s| s.description.clone()).collect();
        let second: Vec<String> = decompose(&task).iter().map(|s| s.description.clone()).collect();
        assert_eq!(first, second);
    }
}
