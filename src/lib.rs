//! # hiermap
//!
//! Hierarchical map equation: multi-level, flow-based community detection for
//! directed, weighted networks.
//!
//! The pipeline runs top to bottom:
//!
//! - [`network`]: load a Pajek or link-list file into a [`Network`]
//! - [`flow`]: compute stationary random-walk flow ([`FlowNetwork`])
//! - [`community`]: two-level partitioning with the map equation
//! - [`hierarchy`]: recursive multi-level search, tree validation and output
//!
//! ```rust
//! use hiermap::{FlowNetwork, Infomap, Network};
//!
//! let mut network = Network::with_nodes(4);
//! network.add_link(0, 1, 1.0);
//! network.add_link(1, 0, 1.0);
//! network.add_link(2, 3, 1.0);
//! network.add_link(3, 2, 1.0);
//! network.add_link(1, 2, 0.1);
//!
//! let flow = FlowNetwork::from_network(&network).unwrap();
//! let result = Infomap::new().with_seed(1).with_trials(5).run(&flow).unwrap();
//! println!("{:.3} bits, {:.1}% compression", result.code_length, result.compression());
//! ```
//!
//! Trials can run on a rayon pool with the `parallel` feature.

pub mod community;
/// Error types used across `hiermap`.
pub mod error;
pub mod flow;
pub mod hierarchy;
pub mod network;

pub use community::{CommunityDetection, Greedy, LocalOptimizer};
pub use error::{Error, Result};
pub use flow::{FlowNetwork, Node};
pub use hierarchy::{HierarchyResult, Infomap, RecursionMode, TreeNode, TreeStats};
pub use network::{load_link_list, load_pajek, Network};
