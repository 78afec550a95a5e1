//! Dependency graph structure and algorithms.
//!
//! Nodes are canonical package keys (`owner/repo`); an edge `a → b`
//! means `a` depends on `b`, so `b` installs first. Cycle detection uses
//! tricolor DFS so the error can name the full cycle; install ordering
//! is Kahn's algorithm, leaves first, with ties broken by first-seen
//! order.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::core::ApmError;

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently on the DFS stack.
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Directed dependency graph over package keys.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
    insertion: Vec<String>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node if not already present, preserving first-seen order.
    pub fn ensure_node(&mut self, key: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(key) {
            index
        } else {
            let index = self.graph.add_node(key.to_string());
            self.node_map.insert(key.to_string(), index);
            self.insertion.push(key.to_string());
            index
        }
    }

    /// Record that `from` depends on `to`.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Direct dependencies of `key`, in edge insertion order.
    #[must_use]
    pub fn direct_deps(&self, key: &str) -> Vec<String> {
        let Some(&idx) = self.node_map.get(key) else {
            return Vec::new();
        };
        let mut deps: Vec<String> =
            self.graph.neighbors(idx).map(|n| self.graph[n].clone()).collect();
        // petgraph iterates neighbors most-recent-first
        deps.reverse();
        deps
    }

    /// Fail with [`ApmError::CircularDependency`] naming the full cycle
    /// when the graph contains a back edge.
    pub fn detect_cycles(&self) -> Result<(), ApmError> {
        let mut colors: HashMap<NodeIndex, Color> = HashMap::new();
        let mut path: Vec<NodeIndex> = Vec::new();

        for node in self.graph.node_indices() {
            colors.insert(node, Color::White);
        }

        // Visit in insertion order so the reported cycle is stable.
        for key in &self.insertion {
            let node = self.node_map[key];
            if colors[&node] == Color::White {
                if let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path) {
                    let chain = cycle
                        .iter()
                        .map(|idx| self.graph[*idx].clone())
                        .collect::<Vec<_>>()
                        .join(" → ");
                    return Err(ApmError::CircularDependency {
                        chain,
                    });
                }
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.reverse();
        for neighbor in neighbors {
            match colors.get(&neighbor) {
                Some(Color::Gray) => {
                    let start = path.iter().position(|n| *n == neighbor).expect("on path");
                    let mut cycle = path[start..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                Some(Color::White) => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                _ => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }

    /// Topological install order, leaves first.
    ///
    /// Kahn's algorithm over outgoing edges: a node becomes available
    /// once all of its dependencies are ordered. Among available nodes
    /// the earliest-seen wins, which keeps the order stable for
    /// identical manifests.
    pub fn install_order(&self) -> Result<Vec<String>, ApmError> {
        self.detect_cycles()?;

        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, self.graph.neighbors(idx).count()))
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut placed: std::collections::HashSet<NodeIndex> = std::collections::HashSet::new();

        while order.len() < self.graph.node_count() {
            let next = self
                .insertion
                .iter()
                .map(|key| self.node_map[key])
                .find(|idx| !placed.contains(idx) && remaining[idx] == 0)
                .ok_or_else(|| ApmError::Other {
                    message: "failed to determine installation order".to_string(),
                })?;

            placed.insert(next);
            order.push(self.graph[next].clone());

            for dependent in
                self.graph.neighbors_directed(next, petgraph::Direction::Incoming)
            {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count = count.saturating_sub(1);
                }
            }
        }

        Ok(order)
    }

    /// Render the subtree rooted at `key` with box-drawing connectors.
    #[must_use]
    pub fn render_tree(&self, key: &str) -> String {
        let mut out = String::new();
        out.push_str(key);
        out.push('\n');
        let deps = self.direct_deps(key);
        let mut seen = std::collections::HashSet::new();
        seen.insert(key.to_string());
        for (i, dep) in deps.iter().enumerate() {
            self.render_subtree(dep, "", i == deps.len() - 1, &mut seen, &mut out);
        }
        out
    }

    fn render_subtree(
        &self,
        key: &str,
        prefix: &str,
        is_last: bool,
        seen: &mut std::collections::HashSet<String>,
        out: &mut String,
    ) {
        let connector = if is_last {
            "└── "
        } else {
            "├── "
        };
        out.push_str(&format!("{prefix}{connector}{key}\n"));

        if !seen.insert(key.to_string()) {
            return;
        }

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        let deps = self.direct_deps(key);
        for (i, dep) in deps.iter().enumerate() {
            self.render_subtree(dep, &child_prefix, i == deps.len() - 1, seen, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_chain_order() {
        let mut graph = DependencyGraph::new();
        // a depends on b, b depends on c
        graph.add_dependency("o/a", "o/b");
        graph.add_dependency("o/b", "o/c");

        assert!(graph.detect_cycles().is_ok());
        let order = graph.install_order().unwrap();
        assert_eq!(order, vec!["o/c", "o/b", "o/a"]);
    }

    #[test]
    fn test_cycle_detection_names_chain() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("o/a", "o/b");
        graph.add_dependency("o/b", "o/a");

        let err = graph.detect_cycles().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("o/a → o/b → o/a"), "got: {msg}");
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("o/a", "o/a");
        assert!(graph.detect_cycles().is_err());
    }

    #[test]
    fn test_diamond_order_stable() {
        let mut graph = DependencyGraph::new();
        // a -> b, a -> c, b -> d, c -> d
        graph.add_dependency("o/a", "o/b");
        graph.add_dependency("o/a", "o/c");
        graph.add_dependency("o/b", "o/d");
        graph.add_dependency("o/c", "o/d");

        let order = graph.install_order().unwrap();
        assert_eq!(order, vec!["o/d", "o/b", "o/c", "o/a"]);
    }

    #[test]
    fn test_independent_nodes_keep_first_seen_order() {
        let mut graph = DependencyGraph::new();
        graph.ensure_node("o/z");
        graph.ensure_node("o/a");

        let order = graph.install_order().unwrap();
        assert_eq!(order, vec!["o/z", "o/a"]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.detect_cycles().is_ok());
        assert!(graph.install_order().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("o/a", "o/b");
        graph.add_dependency("o/a", "o/b");
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.direct_deps("o/a"), vec!["o/b"]);
    }

    #[test]
    fn test_render_tree() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("root", "o/a");
        graph.add_dependency("root", "o/b");
        graph.add_dependency("o/a", "o/c");

        let tree = graph.render_tree("root");
        assert!(tree.contains("├── o/a"));
        assert!(tree.contains("│   └── o/c"));
        assert!(tree.contains("└── o/b"));
    }
}
