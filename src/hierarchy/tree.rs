//! Module tree produced by the hierarchical search.

use crate::flow::{exit_flow, plogp, Node};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One module of the hierarchy.
///
/// The root spans every node and sits at level 1. A node without children is
/// a bottom module; its `code_length` is the cost of its own module codebook.
/// A node with children carries the cost of the index codebook that names
/// them, so the cost of a subtree is the sum over all of its nodes
/// ([`total_code_length`](Self::total_code_length)).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeNode {
    /// Leaf indices owned by this module.
    pub members: BTreeSet<usize>,
    /// Depth, root is 1.
    pub level: usize,
    /// Code length (bits) charged at this node.
    pub code_length: f64,
    /// Summed flow of the members.
    pub size: f64,
    /// Child modules, largest flow first.
    pub next_level: Vec<TreeNode>,
    /// Local subnetwork index to leaf index, set when the members are split.
    /// Members are numbered in ascending order, so the inverse is a binary
    /// search.
    pub rev_renumber: Vec<usize>,
}

impl TreeNode {
    /// The root of a fresh search: every node in one module.
    ///
    /// A single module costs the entropy of the node flows.
    pub fn root(nodes: &[Node]) -> Self {
        Self {
            members: (0..nodes.len()).collect(),
            level: 1,
            code_length: -nodes.iter().map(|n| plogp(n.size)).sum::<f64>(),
            size: nodes.iter().map(|n| n.size).sum(),
            ..Self::default()
        }
    }

    /// A bottom module at `level` owning `members`.
    pub fn module(nodes: &[Node], members: BTreeSet<usize>, level: usize) -> Self {
        Self {
            size: members.iter().map(|&i| nodes[i].size).sum(),
            code_length: module_code_length(nodes, &members),
            members,
            level,
            ..Self::default()
        }
    }

    /// Whether this is a bottom module.
    pub fn is_leaf(&self) -> bool {
        self.next_level.is_empty()
    }

    /// Smallest member index, used to order equally sized siblings.
    pub fn smallest_member(&self) -> Option<usize> {
        self.members.iter().next().copied()
    }

    /// Cost of the whole subtree.
    pub fn total_code_length(&self) -> f64 {
        self.code_length
            + self
                .next_level
                .iter()
                .map(TreeNode::total_code_length)
                .sum::<f64>()
    }

    /// Levels below and including this node.
    pub fn depth(&self) -> usize {
        1 + self.next_level.iter().map(TreeNode::depth).max().unwrap_or(0)
    }

    /// Order children by descending size, ties by smallest member.
    pub fn sort_children(&mut self) {
        self.next_level.sort_by(compare_children);
    }

    /// Visit the bottom modules of this subtree in child order.
    pub fn for_each_leaf_module<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a TreeNode),
    {
        if self.is_leaf() {
            f(self);
        } else {
            for child in &self.next_level {
                child.for_each_leaf_module(f);
            }
        }
    }

    /// Bottom modules of this subtree in child order.
    pub fn leaf_modules(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        self.for_each_leaf_module(&mut |m| out.push(m));
        out
    }

    /// Index of the top-level module of every node in `0..n`.
    ///
    /// A tree without children puts every node in module 0.
    pub fn top_level_assignment(&self, n: usize) -> Vec<usize> {
        let mut assignment = vec![0; n];
        for (m, child) in self.next_level.iter().enumerate() {
            for &i in &child.members {
                if i < n {
                    assignment[i] = m;
                }
            }
        }
        assignment
    }
}

fn compare_children(a: &TreeNode, b: &TreeNode) -> Ordering {
    b.size
        .total_cmp(&a.size)
        .then_with(|| a.smallest_member().cmp(&b.smallest_member()))
}

/// Cost of the module codebook of `members` as a bottom module.
///
/// ```text
/// plogp(q + p) - plogp(q) - Σ_a plogp(p_a)
/// ```
pub fn module_code_length(nodes: &[Node], members: &BTreeSet<usize>) -> f64 {
    let exit = exit_flow(nodes, members);
    let size: f64 = members.iter().map(|&i| nodes[i].size).sum();
    let leaves: f64 = members.iter().map(|&i| plogp(nodes[i].size)).sum();
    plogp(exit + size) - plogp(exit) - leaves
}

/// Summary of a tree, for reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeStats {
    /// Number of bottom modules.
    pub module_count: usize,
    /// Bottom modules with more members than `large_module_limit`.
    pub large_module_count: usize,
    /// 1% of the node count, rounded down.
    pub large_module_limit: usize,
    /// Node-weighted average level of the bottom modules.
    pub ave_depth: f64,
    /// Node-weighted average size of the bottom modules.
    pub ave_size: f64,
    /// Best flat two-level code length seen by the search.
    pub two_level_code_length: f64,
}

impl TreeStats {
    /// Summarize `tree`, whose root spans `node_count` nodes.
    pub fn from_tree(tree: &TreeNode, node_count: usize, two_level_code_length: f64) -> Self {
        let large_module_limit = (0.01 * node_count as f64) as usize;
        let mut stats = Self {
            large_module_limit,
            two_level_code_length,
            ..Self::default()
        };
        tree.for_each_leaf_module(&mut |module| {
            let members = module.members.len();
            stats.module_count += 1;
            if members > large_module_limit {
                stats.large_module_count += 1;
            }
            stats.ave_depth += (module.level * members) as f64;
            stats.ave_size += (members * members) as f64;
        });
        if node_count > 0 {
            stats.ave_depth /= node_count as f64;
            stats.ave_size /= node_count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowNetwork;
    use crate::network::Network;

    fn two_pairs() -> Vec<Node> {
        let mut network = Network::with_nodes(4);
        let _ = network.add_link(0, 1, 1.0);
        let _ = network.add_link(1, 0, 1.0);
        let _ = network.add_link(2, 3, 1.0);
        let _ = network.add_link(3, 2, 1.0);
        let _ = network.add_link(1, 2, 0.1);
        FlowNetwork::from_network(&network).unwrap().nodes().to_vec()
    }

    fn set(members: &[usize]) -> BTreeSet<usize> {
        members.iter().copied().collect()
    }

    #[test]
    fn test_root_costs_entropy() {
        let nodes = two_pairs();
        let root = TreeNode::root(&nodes);
        assert_eq!(root.level, 1);
        assert_eq!(root.members.len(), 4);
        assert!((root.size - 1.0).abs() < 1e-12);
        // The whole network has no exit, so its module cost is the entropy.
        let all = set(&[0, 1, 2, 3]);
        assert!((module_code_length(&nodes, &all) - root.code_length).abs() < 1e-12);
    }

    #[test]
    fn test_sort_children_by_size_then_member() {
        let mut root = TreeNode::default();
        for (members, size) in [(vec![5], 0.2), (vec![3, 4], 0.5), (vec![1], 0.2), (vec![0], 0.1)] {
            root.next_level.push(TreeNode {
                members: set(&members),
                size,
                ..TreeNode::default()
            });
        }
        root.sort_children();
        let order: Vec<Option<usize>> = root.next_level.iter().map(|c| c.smallest_member()).collect();
        assert_eq!(order, vec![Some(3), Some(1), Some(5), Some(0)]);
    }

    #[test]
    fn test_total_code_length_and_depth() {
        let nodes = two_pairs();
        let mut root = TreeNode::root(&nodes);
        root.code_length = 0.5;
        root.next_level = vec![
            TreeNode::module(&nodes, set(&[0, 1]), 2),
            TreeNode::module(&nodes, set(&[2, 3]), 2),
        ];
        let expected = 0.5 + root.next_level[0].code_length + root.next_level[1].code_length;
        assert!((root.total_code_length() - expected).abs() < 1e-15);
        assert_eq!(root.depth(), 2);
        assert_eq!(root.leaf_modules().len(), 2);
        assert_eq!(root.top_level_assignment(4), vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_stats() {
        let nodes = two_pairs();
        let mut root = TreeNode::root(&nodes);
        let mut left = TreeNode::module(&nodes, set(&[0, 1, 2]), 2);
        left.next_level = vec![
            TreeNode::module(&nodes, set(&[0, 1]), 3),
            TreeNode::module(&nodes, set(&[2]), 3),
        ];
        root.next_level = vec![left, TreeNode::module(&nodes, set(&[3]), 2)];

        let stats = TreeStats::from_tree(&root, 4, 1.5);
        assert_eq!(stats.module_count, 3);
        assert_eq!(stats.large_module_limit, 0);
        assert_eq!(stats.large_module_count, 3);
        // Depths: 3, 3, 3, 2.
        assert!((stats.ave_depth - 11.0 / 4.0).abs() < 1e-12);
        // Sizes: 2*2 + 1 + 1.
        assert!((stats.ave_size - 6.0 / 4.0).abs() < 1e-12);
        assert_eq!(stats.two_level_code_length, 1.5);
    }
}
