//! Structural checks for module trees.
//!
//! A module tree is sound when every internal module is split exactly by its
//! children:
//! - children are pairwise disjoint
//! - their union is the parent's member set
//! - each child sits exactly one level below its parent
//!
//! Modules are identified by their preorder index, root is 0.
//!
//! # Example
//!
//! ```rust
//! use hiermap::hierarchy::HealthCheck;
//! use hiermap::{FlowNetwork, Infomap, Network};
//!
//! let mut network = Network::with_nodes(3);
//! network.add_link(0, 1, 1.0);
//! network.add_link(1, 2, 1.0);
//! let flow = FlowNetwork::from_network(&network).unwrap();
//! let result = Infomap::new().with_trials(2).run(&flow).unwrap();
//!
//! let health = result.tree.health_check();
//! if !health.is_healthy() {
//!     for issue in &health.report.issues {
//!         eprintln!("{issue}");
//!     }
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;

use super::tree::TreeNode;

/// How bad a tree issue is. Trees with `Error` or worse are unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Cosmetic, such as siblings out of size order.
    Note,
    /// Legal but wasteful structure.
    Warning,
    /// A module that does not split its members exactly.
    Error,
    /// A leaf owned twice.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

/// One problem found in a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeIssue {
    pub severity: Severity,
    pub message: &'static str,
    /// Preorder index of the module, if the issue belongs to one.
    pub module: Option<usize>,
    /// Counts or values behind the message.
    pub detail: Option<String>,
}

impl TreeIssue {
    fn new(severity: Severity, message: &'static str) -> Self {
        Self {
            severity,
            message,
            module: None,
            detail: None,
        }
    }

    fn at(mut self, module: usize) -> Self {
        self.module = Some(module);
        self
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for TreeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(module) = self.module {
            write!(f, " at module #{module}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Issues found by one check.
#[derive(Debug, Clone, Default)]
pub struct TreeReport {
    pub issues: Vec<TreeIssue>,
}

impl TreeReport {
    fn push(&mut self, issue: TreeIssue) {
        self.issues.push(issue);
    }

    /// No issue of severity `Error` or worse.
    pub fn is_healthy(&self) -> bool {
        self.worst().map_or(true, |s| s < Severity::Error)
    }

    /// No issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Severity of the worst issue.
    pub fn worst(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

impl fmt::Display for TreeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.worst() {
            None => write!(f, "module tree is sound"),
            Some(worst) => {
                writeln!(f, "{} issues, worst {worst}", self.issues.len())?;
                for issue in &self.issues {
                    writeln!(f, "  {issue}")?;
                }
                Ok(())
            }
        }
    }
}

/// Shape of a tree together with its structural issues.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub report: TreeReport,
    /// Modules in the tree, root included.
    pub module_count: usize,
    pub bottom_module_count: usize,
    /// Levels below the root.
    pub max_depth: usize,
    /// Mean number of children of internal modules.
    pub mean_branching: f64,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.report.is_healthy()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} modules ({} bottom), depth {}, {:.2} children per internal module",
            self.module_count, self.bottom_module_count, self.max_depth, self.mean_branching
        )?;
        write!(f, "{}", self.report)
    }
}

/// Types that can check their own structure.
pub trait HealthCheck {
    fn health_check(&self) -> HealthReport;

    fn is_healthy(&self) -> bool {
        self.health_check().is_healthy()
    }
}

impl HealthCheck for TreeNode {
    fn health_check(&self) -> HealthReport {
        let mut walk = Walk::default();
        if self.level != 1 {
            walk.report.push(
                TreeIssue::new(Severity::Warning, "root is not at level 1")
                    .at(0)
                    .detail(format!("level {}", self.level)),
            );
        }
        walk.visit(self);

        let internal = walk.module_count - walk.bottom_module_count;
        HealthReport {
            report: walk.report,
            module_count: walk.module_count,
            bottom_module_count: walk.bottom_module_count,
            max_depth: self.depth().saturating_sub(1),
            mean_branching: if internal == 0 {
                0.0
            } else {
                (walk.module_count - 1) as f64 / internal as f64
            },
        }
    }
}

#[derive(Default)]
struct Walk {
    report: TreeReport,
    module_count: usize,
    bottom_module_count: usize,
}

impl Walk {
    fn visit(&mut self, node: &TreeNode) {
        let id = self.module_count;
        self.module_count += 1;

        if !node.code_length.is_finite() {
            self.report.push(
                TreeIssue::new(Severity::Error, "non-finite code length")
                    .at(id)
                    .detail(node.code_length.to_string()),
            );
        }
        if node.members.is_empty() {
            self.report
                .push(TreeIssue::new(Severity::Error, "module has no members").at(id));
        }

        if node.is_leaf() {
            self.bottom_module_count += 1;
            return;
        }
        check_split(&mut self.report, id, node);
        for child in &node.next_level {
            self.visit(child);
        }
    }
}

/// Check that the children of `node` split its members exactly.
fn check_split(report: &mut TreeReport, id: usize, node: &TreeNode) {
    if node.next_level.len() == 1 {
        report.push(TreeIssue::new(Severity::Warning, "module has a single child").at(id));
    }

    let mut seen: BTreeSet<usize> = BTreeSet::new();
    let mut repeated = 0;
    let mut foreign = 0;
    let mut size = 0.0;
    for child in &node.next_level {
        if child.level != node.level + 1 {
            report.push(
                TreeIssue::new(Severity::Error, "child is not one level below its parent")
                    .at(id)
                    .detail(format!("levels {} and {}", node.level, child.level)),
            );
        }
        for &member in &child.members {
            if !seen.insert(member) {
                repeated += 1;
            }
            if !node.members.contains(&member) {
                foreign += 1;
            }
        }
        size += child.size;
    }

    if repeated > 0 {
        report.push(
            TreeIssue::new(Severity::Critical, "children share members")
                .at(id)
                .detail(format!("{repeated} repeated")),
        );
    }
    if foreign > 0 {
        report.push(
            TreeIssue::new(Severity::Error, "children own members the parent does not")
                .at(id)
                .detail(format!("{foreign} foreign")),
        );
    }
    let missing = node.members.difference(&seen).count();
    if missing > 0 {
        report.push(
            TreeIssue::new(Severity::Error, "children do not cover the parent")
                .at(id)
                .detail(format!("{missing} missing")),
        );
    }
    if (size - node.size).abs() > 1e-9 {
        report.push(
            TreeIssue::new(Severity::Warning, "child flows do not add up to the parent")
                .at(id)
                .detail(format!("{size} vs {}", node.size)),
        );
    }
    if node.next_level.windows(2).any(|w| w[0].size < w[1].size) {
        report.push(TreeIssue::new(Severity::Note, "children not ordered by flow").at(id));
    }
}

/// Check that the bottom modules of `tree` partition `0..node_count`.
pub fn validate_partition(tree: &TreeNode, node_count: usize) -> TreeReport {
    let mut report = TreeReport::default();
    let mut owner: Vec<Option<usize>> = vec![None; node_count];

    for (m, module) in tree.leaf_modules().into_iter().enumerate() {
        for &i in &module.members {
            if i >= node_count {
                report.push(
                    TreeIssue::new(Severity::Error, "member index out of range")
                        .detail(format!("{i} >= {node_count}")),
                );
                continue;
            }
            match owner[i] {
                Some(first) => report.push(
                    TreeIssue::new(Severity::Critical, "node in more than one bottom module")
                        .detail(format!("node {i} in modules {first} and {m}")),
                ),
                None => owner[i] = Some(m),
            }
        }
    }

    let unassigned: Vec<usize> = (0..node_count).filter(|&i| owner[i].is_none()).collect();
    if !unassigned.is_empty() {
        report.push(
            TreeIssue::new(Severity::Error, "nodes in no bottom module").detail(format!(
                "{} nodes, first {:?}",
                unassigned.len(),
                &unassigned[..unassigned.len().min(5)]
            )),
        );
    }

    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used, unused_results)]
mod tests {
    use super::*;
    use crate::flow::FlowNetwork;
    use crate::hierarchy::Infomap;
    use crate::network::Network;
    use proptest::prelude::*;

    fn module(members: &[usize], level: usize, size: f64) -> TreeNode {
        TreeNode {
            members: members.iter().copied().collect(),
            level,
            size,
            ..TreeNode::default()
        }
    }

    fn sound_tree() -> TreeNode {
        let mut root = module(&[0, 1, 2, 3], 1, 1.0);
        root.next_level = vec![module(&[0, 1], 2, 0.6), module(&[2, 3], 2, 0.4)];
        root
    }

    #[test]
    fn test_sound_tree_is_clean() {
        let tree = sound_tree();
        let health = tree.health_check();
        assert!(health.report.is_clean(), "{health}");
        assert_eq!(health.module_count, 3);
        assert_eq!(health.bottom_module_count, 2);
        assert_eq!(health.max_depth, 1);
        assert_eq!(health.mean_branching, 2.0);
        assert!(validate_partition(&tree, 4).is_clean());
        assert_eq!(validate_partition(&tree, 4).to_string(), "module tree is sound");
    }

    #[test]
    fn test_overlapping_children() {
        let mut tree = sound_tree();
        tree.next_level[1] = module(&[1, 2, 3], 2, 0.4);
        let health = tree.health_check();
        assert!(!health.is_healthy());
        assert_eq!(health.report.worst(), Some(Severity::Critical));
        assert!(health
            .report
            .issues
            .iter()
            .any(|i| i.severity == Severity::Critical && i.message.contains("share")));
        assert!(!validate_partition(&tree, 4).is_healthy());
    }

    #[test]
    fn test_missing_and_foreign_members() {
        let mut tree = sound_tree();
        tree.next_level[1] = module(&[2, 9], 2, 0.4);
        let health = tree.health_check();
        let messages: Vec<&str> = health.report.issues.iter().map(|i| i.message).collect();
        assert!(messages.iter().any(|m| m.contains("do not cover")));
        assert!(messages.iter().any(|m| m.contains("does not")));

        let partition = validate_partition(&tree, 4);
        assert!(partition.issues.iter().any(|i| i.message.contains("out of range")));
        assert!(partition.issues.iter().any(|i| i.message.contains("no bottom module")));
    }

    #[test]
    fn test_level_mismatch_names_the_parent() {
        let mut tree = sound_tree();
        tree.next_level[0].level = 3;
        let health = tree.health_check();
        assert!(!health.is_healthy());
        let issue = &health.report.issues[0];
        assert_eq!(issue.module, Some(0));
        assert_eq!(
            issue.to_string(),
            "error: child is not one level below its parent at module #0 (levels 1 and 3)"
        );
    }

    #[test]
    fn test_single_child_and_size_order_are_not_errors() {
        let mut root = module(&[0, 1, 2], 1, 1.0);
        root.next_level = vec![module(&[0, 1, 2], 2, 1.0)];
        let health = root.health_check();
        assert!(health.is_healthy());
        assert_eq!(health.report.worst(), Some(Severity::Warning));

        let mut tree = sound_tree();
        tree.next_level.swap(0, 1);
        let health = tree.health_check();
        assert!(health.is_healthy());
        assert_eq!(health.report.worst(), Some(Severity::Note));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn search_result_is_a_sound_tree(
            n in 2usize..12,
            raw_links in proptest::collection::vec((0usize..12, 0usize..12, 0.1f64..5.0), 1..40),
            seed in 0u64..1000,
        ) {
            let mut network = Network::with_nodes(n);
            for (from, to, w) in raw_links {
                network.add_link(from % n, to % n, w);
            }
            let flow = FlowNetwork::from_network(&network).unwrap();
            let result = Infomap::new().with_seed(seed).with_trials(2).run(&flow).unwrap();

            let health = result.tree.health_check();
            prop_assert!(health.is_healthy(), "{}", health);
            let partition = validate_partition(&result.tree, n);
            prop_assert!(partition.is_clean(), "{}", partition);
            prop_assert!((result.tree.total_code_length() - result.code_length).abs() < 1e-9);
            prop_assert!(result.code_length <= flow.entropy() + 1e-10);
        }
    }
}
