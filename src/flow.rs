//! Flow model: stationary random-walk flow on nodes and links.
//!
//! A random walker follows out-links with probability `1 - α` and teleports
//! with probability `α` (always, from dangling nodes). Teleportation lands on
//! node `i` with probability proportional to its node weight `τ_i`.
//!
//! ```text
//! p'(b) = (α + (1-α)·Σ_dangling p) · τ_b  +  (1-α) · Σ_a p(a) · w_ab / w_a
//! ```
//!
//! The fixed point `p` is the node `size`; the flow on link `a → b` is
//! `(1-α) · p(a) · w_ab / w_a`.
//!
//! ## Exit flow
//!
//! Everything the optimizer and the hierarchy need reduces to the exit flow of
//! a set `S` of nodes:
//!
//! ```text
//! q(S) = (α·p(S) + (1-α)·d(S)) · (1 - τ(S))  +  outside(S)  +  Σ flow(a → b), a ∈ S, b ∉ S
//! ```
//!
//! where `d` is dangling flow and `outside` is flow on links that were cut
//! away when the node array was restricted to a subnetwork.

use crate::error::{Error, Result};
use crate::network::Network;
use std::collections::{BTreeSet, HashMap};

/// Teleportation probability α.
pub const TELEPORT_PROB: f64 = 0.15;

const MIN_POWER_ITERATIONS: usize = 50;
const MAX_POWER_ITERATIONS: usize = 200;
const POWER_TOLERANCE: f64 = 1.0e-15;

/// `p · log2(p)`, with `0 · log 0 = 0`.
#[inline]
pub fn plogp(p: f64) -> f64 {
    if p > 0.0 {
        p * p.log2()
    } else {
        0.0
    }
}

/// Flow lost to teleportation out of a set with the given aggregates.
#[inline]
pub(crate) fn teleport_exit(size: f64, dangling_size: f64, teleport_weight: f64) -> f64 {
    (TELEPORT_PROB * size + (1.0 - TELEPORT_PROB) * dangling_size) * (1.0 - teleport_weight)
}

/// One node of a flow network, or one module collapsed into a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Indices (one level down) of the nodes this node stands for.
    pub members: Vec<usize>,
    /// Stationary visit probability.
    pub size: f64,
    /// Rate at which this node's codeword is used in its module's codebook:
    /// the visit rate of a leaf, the exit flow of a collapsed module.
    pub codeword_flow: f64,
    /// Normalized teleportation weight.
    pub teleport_weight: f64,
    /// Flow of members without out-links.
    pub dangling_size: f64,
    /// Flow on links leaving the current node array.
    pub outside_flow: f64,
    /// Flow on links that start and end inside this node.
    pub self_link: f64,
    /// `(target, flow)`, targets are dense indices into the same array.
    pub out_links: Vec<(usize, f64)>,
    /// `(source, flow)`, sources are dense indices into the same array.
    pub in_links: Vec<(usize, f64)>,
}

impl Node {
    /// A node standing for itself.
    pub fn new(index: usize, teleport_weight: f64) -> Self {
        Self {
            members: vec![index],
            teleport_weight,
            ..Self::default()
        }
    }

    /// Total flow on out-links within the array.
    pub fn out_flow(&self) -> f64 {
        self.out_links.iter().map(|&(_, w)| w).sum()
    }

    /// Exit flow of this node taken as a module of its own.
    pub fn exit_flow(&self) -> f64 {
        teleport_exit(self.size, self.dangling_size, self.teleport_weight)
            + self.outside_flow
            + self.out_flow()
    }
}

/// A network with stationary flow computed, ready for partitioning.
#[derive(Debug, Clone)]
pub struct FlowNetwork {
    nodes: Vec<Node>,
    names: Vec<String>,
    dropped_self_links: usize,
}

impl FlowNetwork {
    /// Compute stationary flow for a loaded network.
    ///
    /// Self-links are dropped; they never carry flow between modules.
    pub fn from_network(network: &Network) -> Result<Self> {
        let n = network.node_count();
        if n == 0 {
            return Err(Error::EmptyInput);
        }

        let total_weight: f64 = network.node_weights().iter().sum();
        let teleport: Vec<f64> = network
            .node_weights()
            .iter()
            .map(|w| w / total_weight)
            .collect();

        let mut dropped_self_links = 0;
        let mut links: Vec<(usize, usize, f64)> = Vec::with_capacity(network.link_count());
        let mut out_weight = vec![0.0; n];
        for (from, to, w) in network.links() {
            if from == to {
                dropped_self_links += 1;
                continue;
            }
            out_weight[from] += w;
            links.push((from, to, w));
        }

        let size = stationary_distribution(&teleport, &links, &out_weight);

        let mut nodes: Vec<Node> = teleport
            .iter()
            .enumerate()
            .map(|(i, &tw)| Node::new(i, tw))
            .collect();
        for (i, node) in nodes.iter_mut().enumerate() {
            node.size = size[i];
            node.codeword_flow = size[i];
            if out_weight[i] == 0.0 {
                node.dangling_size = size[i];
            }
        }
        let beta = 1.0 - TELEPORT_PROB;
        for &(from, to, w) in &links {
            let flow = beta * size[from] * w / out_weight[from];
            nodes[from].out_links.push((to, flow));
            nodes[to].in_links.push((from, flow));
        }

        Ok(Self {
            nodes,
            names: network.names().to_vec(),
            dropped_self_links,
        })
    }

    /// Nodes with flow, by dense index.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node names, by dense index.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node flows, by dense index.
    pub fn sizes(&self) -> Vec<f64> {
        self.nodes.iter().map(|n| n.size).collect()
    }

    /// Number of self-links ignored while computing flow.
    pub fn dropped_self_links(&self) -> usize {
        self.dropped_self_links
    }

    /// Code length of the trivial one-module partition: the entropy of the
    /// node visit rates.
    pub fn entropy(&self) -> f64 {
        -self.nodes.iter().map(|n| plogp(n.size)).sum::<f64>()
    }
}

fn stationary_distribution(
    teleport: &[f64],
    links: &[(usize, usize, f64)],
    out_weight: &[f64],
) -> Vec<f64> {
    let n = teleport.len();
    let beta = 1.0 - TELEPORT_PROB;
    let mut size = teleport.to_vec();
    let mut next = vec![0.0; n];

    for iteration in 0..MAX_POWER_ITERATIONS {
        let dangling: f64 = (0..n)
            .filter(|&i| out_weight[i] == 0.0)
            .map(|i| size[i])
            .sum();
        let jump = TELEPORT_PROB + beta * dangling;
        for (slot, &tw) in next.iter_mut().zip(teleport) {
            *slot = jump * tw;
        }
        for &(from, to, w) in links {
            next[to] += beta * size[from] * w / out_weight[from];
        }

        let total: f64 = next.iter().sum();
        let mut diff = 0.0;
        for (new, old) in next.iter_mut().zip(size.iter()) {
            *new /= total;
            diff += (*new - *old).abs();
        }
        std::mem::swap(&mut size, &mut next);

        if iteration + 1 >= MIN_POWER_ITERATIONS && diff < POWER_TOLERANCE {
            break;
        }
    }
    size
}

/// Exit flow of a set of nodes, all indices into `nodes`.
pub fn exit_flow(nodes: &[Node], members: &BTreeSet<usize>) -> f64 {
    let mut size = 0.0;
    let mut dangling = 0.0;
    let mut teleport = 0.0;
    let mut leaving = 0.0;
    for &i in members {
        let node = &nodes[i];
        size += node.size;
        dangling += node.dangling_size;
        teleport += node.teleport_weight;
        leaving += node.outside_flow;
        leaving += node
            .out_links
            .iter()
            .filter(|(to, _)| !members.contains(to))
            .map(|&(_, w)| w)
            .sum::<f64>();
    }
    teleport_exit(size, dangling, teleport) + leaving
}

/// A node array restricted to a subset, plus the bookkeeping to map back.
#[derive(Debug, Clone)]
pub struct SubNetwork {
    /// Restricted nodes, each standing for itself (`members == [j]`).
    pub nodes: Vec<Node>,
    /// Exit flow of the subset as a whole.
    pub exit_flow: f64,
    /// Original index → local index.
    pub renumber: HashMap<usize, usize>,
    /// Local index → original index.
    pub rev_renumber: Vec<usize>,
}

/// Restrict `nodes` to `members`.
///
/// Local indices follow the iteration order of `members`. Links to nodes
/// outside the subset are folded into `outside_flow`, so exit flows computed
/// inside the subnetwork agree with those of the full array.
pub fn induced_subnetwork<I>(nodes: &[Node], members: I) -> SubNetwork
where
    I: IntoIterator<Item = usize>,
{
    let rev_renumber: Vec<usize> = members.into_iter().collect();
    let renumber: HashMap<usize, usize> = rev_renumber
        .iter()
        .enumerate()
        .map(|(local, &orig)| (orig, local))
        .collect();
    debug_assert_eq!(
        renumber.len(),
        rev_renumber.len(),
        "induced subnetwork members must be distinct"
    );

    let mut sub_nodes = Vec::with_capacity(rev_renumber.len());
    let mut size = 0.0;
    let mut dangling = 0.0;
    let mut teleport = 0.0;
    let mut outside = 0.0;

    for (local, &orig) in rev_renumber.iter().enumerate() {
        let node = &nodes[orig];
        let mut sub = Node::new(local, node.teleport_weight);
        sub.size = node.size;
        sub.codeword_flow = node.codeword_flow;
        sub.dangling_size = node.dangling_size;
        sub.self_link = node.self_link;
        sub.outside_flow = node.outside_flow;
        for &(to, w) in &node.out_links {
            match renumber.get(&to) {
                Some(&t) => sub.out_links.push((t, w)),
                None => sub.outside_flow += w,
            }
        }
        for &(from, w) in &node.in_links {
            if let Some(&f) = renumber.get(&from) {
                sub.in_links.push((f, w));
            }
        }

        size += sub.size;
        dangling += sub.dangling_size;
        teleport += sub.teleport_weight;
        outside += sub.outside_flow;
        sub_nodes.push(sub);
    }

    SubNetwork {
        nodes: sub_nodes,
        exit_flow: teleport_exit(size, dangling, teleport) + outside,
        renumber,
        rev_renumber,
    }
}

/// Two-level map equation of an arbitrary assignment, computed directly from
/// set exit flows.
#[cfg(test)]
pub(crate) fn map_equation(nodes: &[Node], assignment: &[usize], parent_exit: f64) -> f64 {
    use std::collections::BTreeMap;

    let mut modules: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (i, &m) in assignment.iter().enumerate() {
        let _ = modules.entry(m).or_default().insert(i);
    }
    let mut exit_sum = 0.0;
    let mut exit_log_exit = 0.0;
    let mut module_terms = 0.0;
    for members in modules.values() {
        let q = exit_flow(nodes, members);
        let p: f64 = members.iter().map(|&i| nodes[i].size).sum();
        exit_sum += q;
        exit_log_exit += plogp(q);
        module_terms += plogp(q + p) - plogp(q);
    }
    let leaves: f64 = nodes.iter().map(|n| plogp(n.size)).sum();
    plogp(parent_exit + exit_sum) - plogp(parent_exit) - exit_log_exit + module_terms - leaves
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_pairs() -> FlowNetwork {
        // 1 <-> 2, 3 <-> 4, weak 2 -> 3
        let mut network = Network::with_nodes(4);
        let _ = network.add_link(0, 1, 1.0);
        let _ = network.add_link(1, 0, 1.0);
        let _ = network.add_link(2, 3, 1.0);
        let _ = network.add_link(3, 2, 1.0);
        let _ = network.add_link(1, 2, 0.1);
        FlowNetwork::from_network(&network).unwrap()
    }

    #[test]
    fn test_flow_sums_to_one() {
        let flow = two_pairs();
        let total: f64 = flow.sizes().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        // Node 3 receives the weak link, so it sees more flow than node 4.
        assert!(flow.nodes()[2].size > flow.nodes()[3].size);
    }

    #[test]
    fn test_link_flow_conserves_non_teleport_flow() {
        let flow = two_pairs();
        for node in flow.nodes() {
            let out = node.out_flow();
            assert!((out - (1.0 - TELEPORT_PROB) * node.size).abs() < 1e-12);
        }
    }

    #[test]
    fn test_dangling_nodes_carry_their_flow() {
        let mut network = Network::with_nodes(3);
        let _ = network.add_link(0, 1, 1.0);
        let _ = network.add_link(1, 2, 1.0);
        let flow = FlowNetwork::from_network(&network).unwrap();
        let sink = &flow.nodes()[2];
        assert!(sink.out_links.is_empty());
        assert_eq!(sink.dangling_size, sink.size);
        let total: f64 = flow.sizes().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_self_links_dropped() {
        let mut network = Network::with_nodes(2);
        let _ = network.add_link(0, 0, 5.0);
        let _ = network.add_link(0, 1, 1.0);
        let flow = FlowNetwork::from_network(&network).unwrap();
        assert_eq!(flow.dropped_self_links(), 1);
        assert_eq!(flow.nodes()[0].out_links.len(), 1);
    }

    #[test]
    fn test_empty_network_rejected() {
        assert_eq!(
            FlowNetwork::from_network(&Network::new()).unwrap_err(),
            Error::EmptyInput
        );
    }

    #[test]
    fn test_whole_network_has_no_exit() {
        let flow = two_pairs();
        let all: BTreeSet<usize> = (0..4).collect();
        assert!(exit_flow(flow.nodes(), &all).abs() < 1e-12);
    }

    #[test]
    fn test_induced_subnetwork_preserves_exit_flow() {
        let flow = two_pairs();
        let pair: BTreeSet<usize> = [0, 1].into_iter().collect();
        let sub = induced_subnetwork(flow.nodes(), pair.iter().copied());

        assert_eq!(sub.rev_renumber, vec![0, 1]);
        assert!((sub.exit_flow - exit_flow(flow.nodes(), &pair)).abs() < 1e-15);

        // The weak link 2 -> 3 leaves the pair and becomes outside flow.
        let weak = flow.nodes()[1]
            .out_links
            .iter()
            .find(|(to, _)| *to == 2)
            .map(|&(_, w)| w)
            .unwrap();
        assert!((sub.nodes[1].outside_flow - weak).abs() < 1e-15);
        assert_eq!(sub.nodes[1].out_links, vec![(0, flow.nodes()[1].out_links[0].1)]);

        // Single node as a module: its exit equals the exit of the singleton set.
        let single: BTreeSet<usize> = [1].into_iter().collect();
        let sub_single = induced_subnetwork(flow.nodes(), single.iter().copied());
        assert!(
            (sub_single.nodes[0].exit_flow() - exit_flow(flow.nodes(), &single)).abs() < 1e-15
        );
    }
}
