//! Community detection traits.

use crate::error::Result;
use crate::flow::Node;
use petgraph::graph::DiGraph;
use rand::Rng;

/// Trait for community detection algorithms.
pub trait CommunityDetection {
    /// Detect communities in a graph.
    ///
    /// Returns a mapping from node index to community ID.
    fn detect<N, E>(&self, graph: &DiGraph<N, E>) -> Result<Vec<usize>>;
}

/// A local search over module assignments of one flat node array.
///
/// Implementations keep the current node array, a module index per node, and
/// three running code lengths (`index + module == total`). Nodes may stand for
/// several nodes one level down (`Node::members`); after [`level`](Self::level)
/// the node array is replaced by one node per module.
///
/// Every operation is synchronous. Randomness enters only through
/// [`move_nodes`](Self::move_nodes).
pub trait LocalOptimizer: Sized {
    /// Wrap a node array. `parent_exit` is the exit flow of the scope the
    /// nodes live in (0 for a whole network). The result is ready to use.
    fn from_nodes(nodes: Vec<Node>, parent_exit: f64) -> Self;

    /// Treat the current nodes as leaves: fix the leaf entropy term and put
    /// every node in its own module.
    fn initiate(&mut self);

    /// One greedy sweep over all nodes in random order. Returns whether any
    /// node changed module.
    fn move_nodes<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool;

    /// Recompute module aggregates and code lengths from scratch.
    fn tune(&mut self);

    /// Replace the node array by one node per non-empty module, in ascending
    /// module order. `finalize` recomputes aggregates exactly; otherwise the
    /// running aggregates are carried over.
    fn level(&mut self, finalize: bool);

    /// Put every node in its own module and recompute.
    fn calibrate(&mut self);

    /// Impose a module index per node.
    fn determ_move(&mut self, assignment: &[usize]);

    /// Make every node stand for itself (`members == [i]`), so the next round
    /// treats the current modules as leaves coded by their exit flow. Follow
    /// with `initiate`.
    fn collapse_nodes(&mut self);

    /// Swap in a different node array and calibrate. Returns the old array.
    fn replace_nodes(&mut self, nodes: Vec<Node>) -> Vec<Node>;

    /// Current number of nodes.
    fn node_count(&self) -> usize;

    /// Current number of non-empty modules.
    fn module_count(&self) -> usize;

    /// Total code length in bits.
    fn code_length(&self) -> f64;

    /// Index codebook length in bits.
    fn index_length(&self) -> f64;

    /// Summed module codebook length in bits.
    fn module_length(&self) -> f64;

    /// Current node array.
    fn nodes(&self) -> &[Node];
}
