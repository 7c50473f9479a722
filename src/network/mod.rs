//! Raw network topology: node names, teleportation weights and weighted arcs.
//!
//! A [`Network`] is what the loaders produce and what
//! [`FlowNetwork`](crate::flow::FlowNetwork) consumes. It holds no flow
//! information yet, only the graph as read.
//!
//! Arcs are stored once per ordered pair; defining the same arc twice adds the
//! weights, which matches how Pajek files with repeated lines are usually read.

mod load;

pub use load::{load_link_list, load_pajek, read_link_list, read_pajek};

use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;
use std::fmt;

/// A directed, weighted network as loaded from disk or built in memory.
#[derive(Debug, Clone, Default)]
pub struct Network {
    names: Vec<String>,
    node_weights: Vec<f64>,
    links: BTreeMap<(usize, usize), f64>,
    aggregated_links: usize,
}

impl Network {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a network of `n` nodes named `1..=n`, each with unit weight.
    pub fn with_nodes(n: usize) -> Self {
        let mut network = Self::new();
        for i in 0..n {
            let _ = network.add_node((i + 1).to_string(), 1.0);
        }
        network
    }

    /// Add a node and return its dense index.
    ///
    /// Non-positive weights fall back to 1.
    pub fn add_node(&mut self, name: impl Into<String>, weight: f64) -> usize {
        let weight = if weight > 0.0 { weight } else { 1.0 };
        self.names.push(name.into());
        self.node_weights.push(weight);
        self.names.len() - 1
    }

    /// Add an arc. Repeated arcs aggregate their weight.
    ///
    /// Returns `false` (and ignores the arc) when the weight is not positive
    /// or an endpoint is out of range.
    pub fn add_link(&mut self, from: usize, to: usize, weight: f64) -> bool {
        let n = self.names.len();
        if weight.is_nan() || weight <= 0.0 || from >= n || to >= n {
            return false;
        }
        match self.links.get_mut(&(from, to)) {
            Some(w) => {
                *w += weight;
                self.aggregated_links += 1;
            }
            None => {
                let _ = self.links.insert((from, to), weight);
            }
        }
        true
    }

    /// Build from a petgraph directed graph with unit arc weights.
    pub fn from_digraph<N: fmt::Display, E>(graph: &DiGraph<N, E>) -> Self {
        Self::from_digraph_with(graph, |_| 1.0)
    }

    /// Build from a petgraph directed graph, reading arc weights with `weight`.
    pub fn from_digraph_with<N, E, F>(graph: &DiGraph<N, E>, weight: F) -> Self
    where
        N: fmt::Display,
        F: Fn(&E) -> f64,
    {
        let mut network = Self::new();
        for idx in graph.node_indices() {
            let _ = network.add_node(graph[idx].to_string(), 1.0);
        }
        for edge in graph.edge_references() {
            let _ = network.add_link(
                edge.source().index(),
                edge.target().index(),
                weight(edge.weight()),
            );
        }
        network
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Number of distinct arcs (after aggregation).
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Number of arc definitions folded into an existing arc.
    pub fn aggregated_link_count(&self) -> usize {
        self.aggregated_links
    }

    /// Node names, by dense index.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Teleportation weights as given (not normalized).
    pub fn node_weights(&self) -> &[f64] {
        &self.node_weights
    }

    /// Arcs in `(from, to)` order.
    pub fn links(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.links.iter().map(|(&(from, to), &w)| (from, to, w))
    }

    /// Whether the network has no nodes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_links_aggregate() {
        let mut network = Network::with_nodes(2);
        assert!(network.add_link(0, 1, 1.0));
        assert!(network.add_link(0, 1, 0.5));
        assert_eq!(network.link_count(), 1);
        assert_eq!(network.aggregated_link_count(), 1);
        let links: Vec<_> = network.links().collect();
        assert_eq!(links, vec![(0, 1, 1.5)]);
    }

    #[test]
    fn test_rejects_bad_links() {
        let mut network = Network::with_nodes(2);
        assert!(!network.add_link(0, 1, 0.0));
        assert!(!network.add_link(0, 1, -2.0));
        assert!(!network.add_link(0, 5, 1.0));
        assert_eq!(network.link_count(), 0);
    }

    #[test]
    fn test_from_digraph() {
        let mut graph = DiGraph::<&str, f64>::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let _ = graph.add_edge(a, b, 2.5);

        let unit = Network::from_digraph(&graph);
        assert_eq!(unit.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(unit.links().collect::<Vec<_>>(), vec![(0, 1, 1.0)]);

        let weighted = Network::from_digraph_with(&graph, |w| *w);
        assert_eq!(weighted.links().collect::<Vec<_>>(), vec![(0, 1, 2.5)]);
    }
}
