//! Two-level community detection with the map equation.
//!
//! Given flow on a network, find the partition into modules that lets a
//! random walk be described in the fewest bits.
//!
//! ## The Map Equation
//!
//! A two-level code has one index codebook naming modules and one codebook
//! per module naming its nodes (plus an exit word). With `q_m` the exit flow
//! of module `m`, `p_a` the flow of node `a`, and `q_↻` the exit of the scope
//! the partition lives in (0 for a whole network):
//!
//! ```text
//! L = plogp(q_↻ + Σ q_m) - plogp(q_↻) - Σ plogp(q_m)          index
//!   + Σ [plogp(q_m + p_m) - plogp(q_m)] - Σ plogp(p_a)          modules
//! ```
//!
//! with `plogp(x) = x log2 x`. Good modules trap the walk for a long time
//! (small `q_m`), so short module codewords are rarely needed.
//!
//! Once modules are collapsed into nodes, the same terms price a coarser
//! level with each node's exit flow in place of `p_a`.
//!
//! ## Search
//!
//! - [`Greedy`]: local moves of single nodes with incremental updates of `L`,
//!   aggregation of modules into nodes, and exact recomputation on demand
//!   ([`LocalOptimizer`] is the seam).
//! - [`partition`]: drives an optimizer to convergence, alternating
//!   single-node and sub-module refinement between rounds.
//! - [`repeated_partition`]: keeps the best of several randomized runs.
//!
//! ## Usage
//!
//! ```rust
//! use hiermap::community::{partition, Greedy, LocalOptimizer};
//! use hiermap::{FlowNetwork, Network};
//! use rand::prelude::*;
//!
//! let mut network = Network::with_nodes(4);
//! network.add_link(0, 1, 1.0);
//! network.add_link(1, 0, 1.0);
//! network.add_link(2, 3, 1.0);
//! network.add_link(3, 2, 1.0);
//! network.add_link(1, 2, 0.1);
//! let flow = FlowNetwork::from_network(&network).unwrap();
//!
//! let mut greedy = Greedy::from_nodes(flow.nodes().to_vec(), 0.0);
//! partition(&mut StdRng::seed_from_u64(1), &mut greedy);
//! assert_eq!(greedy.node_count(), 2);
//! assert!(greedy.code_length() < flow.entropy());
//! ```
//!
//! ## References
//!
//! - Rosvall, Bergstrom (2008). "Maps of random walks on complex networks
//!   reveal community structure." PNAS 105, 1118.
//! - Rosvall, Bergstrom (2011). "Multilevel compression of random walks on
//!   networks reveals hierarchical organization in large integrated systems."
//!   PLoS ONE 6, e18209.

mod greedy;
pub mod partition;
mod traits;

pub use greedy::Greedy;
pub use partition::{partition, repeated_partition, MIN_CODELENGTH_IMPROVEMENT};
pub use traits::{CommunityDetection, LocalOptimizer};
