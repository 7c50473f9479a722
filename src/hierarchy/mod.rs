//! Multi-level module trees.
//!
//! # The Core Insight
//!
//! A two-level map describes a walk with one index codebook and one codebook
//! per module. Large networks often have structure at several scales, and a
//! single index codebook with hundreds of entries is expensive. Nesting helps:
//!
//! ```text
//! root index ── module 1 index ── module 1.1 codebook
//!            │                 └─ module 1.2 codebook
//!            └─ module 2 codebook
//! ```
//!
//! Each internal module carries an index codebook naming its children (plus
//! an exit word); each bottom module carries a codebook naming its nodes. The
//! cost of a tree is the sum over all of its modules, and the search keeps a
//! level only where it shortens that sum.
//!
//! # Module Overview
//!
//! - [`tree`]: [`TreeNode`], per-module costs, and [`TreeStats`]
//! - [`engine`]: the recursive search and the [`Infomap`] facade
//! - [`validate`]: structural checks ([`HealthCheck`])
//! - [`output`]: the `.tree` text format
//!
//! # Example
//!
//! ```rust
//! use hiermap::hierarchy::{Infomap, RecursionMode};
//! use hiermap::{FlowNetwork, Network};
//!
//! let mut network = Network::with_nodes(6);
//! for (a, b) in [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3)] {
//!     network.add_link(a, b, 1.0);
//! }
//! network.add_link(2, 3, 0.1);
//! let flow = FlowNetwork::from_network(&network).unwrap();
//!
//! let result = Infomap::new()
//!     .with_mode(RecursionMode::Eager { recursive: 0.0 })
//!     .with_trials(3)
//!     .run(&flow)
//!     .unwrap();
//! assert!(result.code_length <= flow.entropy());
//! ```

pub mod engine;
pub mod output;
pub mod tree;
pub mod validate;

pub use engine::{
    fast_hierarchical_partition, hierarchical_partition, repeated_hierarchical_partition,
    seed_for_trial, Best, HierarchyResult, Infomap, RecursionMode,
};
#[cfg(feature = "parallel")]
pub use engine::par_repeated_hierarchical_partition;
pub use output::{save_tree, tree_to_string, write_tree};
pub use tree::{module_code_length, TreeNode, TreeStats};
pub use validate::{validate_partition, HealthCheck, HealthReport, Severity, TreeIssue, TreeReport};
