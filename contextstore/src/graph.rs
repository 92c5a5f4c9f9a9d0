//! Dependency graph over document identifiers (§3 Dependency Edge, §4.4 `Neighbors`).

use std::collections::{HashMap, HashSet, VecDeque};
use serde::{Deserialize, Serialize};

/// Direction to walk `Neighbors` in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Documents this one references.
    Dependencies,
    /// Documents that reference this one.
    Dependents,
}

/// Directed graph of "A references B" edges, serializable for persistence
/// alongside the rest of the index.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// outgoing[a] = { b, c, ... } meaning a references b, c, ...
    outgoing: HashMap<String, HashSet<String>>,
    /// incoming[b] = { a, ... } meaning a references b
    incoming: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all outgoing edges from `from` with `to`. Called atomically
    /// with the document update that produced them (§3 invariant).
    pub fn set_edges(&mut self, from: &str, to: impl IntoIterator<Item = String>) {
        self.remove_node(from);
        let targets: HashSet<String> = to.into_iter().collect();
        for target in &targets {
            self.incoming.entry(target.clone()).or_default().insert(from.to_string());
        }
        self.outgoing.insert(from.to_string(), targets);
    }

    /// Remove a node and every edge touching it (`Unindex`).
    pub fn remove_node(&mut self, id: &str) {
        if let Some(targets) = self.outgoing.remove(id) {
            for target in targets {
                if let Some(set) = self.incoming.get_mut(&target) {
                    set.remove(id);
                }
            }
        }
        if let Some(sources) = self.incoming.remove(id) {
            for source in sources {
                if let Some(set) = self.outgoing.get_mut(&source) {
                    set.remove(id);
                }
            }
        }
    }

    /// BFS out to `depth` hops in `direction`, terminating on cycles by
    /// tracking visited nodes rather than rejecting them (§3 invariant:
    /// "cycles are allowed and detected, not rejected").
    pub fn neighbors(&self, id: &str, direction: Direction, depth: usize) -> Vec<String> {
        let adjacency = match direction {
            Direction::Dependencies => &self.outgoing,
            Direction::Dependents => &self.incoming,
        };

        let mut visited = HashSet::new();
        visited.insert(id.to_string());
        let mut frontier = VecDeque::new();
        frontier.push_back((id.to_string(), 0usize));
        let mut result = Vec::new();

        while let Some((node, hops)) = frontier.pop_front() {
            if hops >= depth {
                continue;
            }
            let Some(edges) = adjacency.get(&node) else { continue };
            for next in edges {
                if visited.insert(next.clone()) {
                    result.push(next.clone());
                    frontier.push_back((next.clone(), hops + 1));
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_respects_depth() {
        let mut graph = DependencyGraph::new();
        graph.set_edges("a", ["b".to_string()]);
        graph.set_edges("b", ["c".to_string()]);
        graph.set_edges("c", ["d".to_string()]);

        assert_eq!(graph.neighbors("a", Direction::Dependencies, 1), vec!["b".to_string()]);
        let two_hop = graph.neighbors("a", Direction::Dependencies, 2);
        assert_eq!(two_hop, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn neighbors_terminates_on_cycle() {
        let mut graph = DependencyGraph::new();
        graph.set_edges("a", ["b".to_string()]);
        graph.set_edges("b", ["a".to_string()]);

        let result = graph.neighbors("a", Direction::Dependencies, 10);
        assert_eq!(result, vec!["b".to_string()]);
    }

    #[test]
    fn dependents_is_inverse_of_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.set_edges("a", ["b".to_string()]);

        assert_eq!(graph.neighbors("b", Direction::Dependents, 1), vec!["a".to_string()]);
    }

    #[test]
    fn remove_node_clears_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.set_edges("a", ["b".to_string()]);
        graph.remove_node("a");

        assert!(graph.neighbors("b", Direction::Dependents, 1).is_empty());
    }
}
