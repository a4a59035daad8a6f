//! Service dependency graph
//!
//! Built fresh for every validation run; cycles are found through
//! strongly connected components (Kosaraju: a finish-order pass followed
//! by a pass over the reversed graph). Uses petgraph for graph operations.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ConsistencyError;

/// Directed graph of `service -> dependency` edges
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service node if it is not already present
    pub fn add_service(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.node_map.insert(name.to_string(), idx);
        idx
    }

    /// Records that `from` depends on `to`
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let from = self.add_service(from);
        let to = self.add_service(to);
        self.graph.update_edge(from, to, ());
    }

    pub fn service_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// Strongly connected components as lists of service names
    pub fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect()
            })
            .collect()
    }

    /// Fails with one exemplar cycle if the graph is not a DAG
    pub fn ensure_acyclic(&self) -> Result<(), ConsistencyError> {
        match self.find_cycle() {
            Some(path) => Err(ConsistencyError::CyclicDependency { path }),
            None => Ok(()),
        }
    }

    /// An ordered path `a -> b -> ... -> a`, if any cycle exists
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        for component in kosaraju_scc(&self.graph) {
            if component.len() > 1 {
                let members: HashSet<NodeIndex> = component.iter().copied().collect();
                let start = component.iter().copied().min()?;
                return self.cycle_through(start, &members);
            }
            let idx = component[0];
            if self.graph.find_edge(idx, idx).is_some() {
                let name = self.graph[idx].clone();
                return Some(vec![name.clone(), name]);
            }
        }
        None
    }

    /// Breadth-first search inside one component for a path back to `start`
    fn cycle_through(&self, start: NodeIndex, members: &HashSet<NodeIndex>) -> Option<Vec<String>> {
        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::from([start]);

        while let Some(current) = queue.pop_front() {
            for next in self.graph.neighbors(current) {
                if next == start {
                    let mut path = vec![self.graph[start].clone()];
                    let mut cursor = current;
                    let mut tail = Vec::new();
                    while cursor != start {
                        tail.push(self.graph[cursor].clone());
                        cursor = parent[&cursor];
                    }
                    tail.reverse();
                    path.extend(tail);
                    path.push(self.graph[start].clone());
                    return Some(path);
                }
                if members.contains(&next) && seen.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}
