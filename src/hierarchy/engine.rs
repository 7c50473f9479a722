//! Hierarchical partition engine.
//!
//! Starting from a [`TreeNode`] that owns a set of leaves, the engine
//!
//! 1. partitions the induced subnetwork of those leaves into modules
//!    (one index codebook plus one module codebook per module),
//! 2. tries to stack further index codebooks on top, by collapsing the modules
//!    into nodes and partitioning those,
//! 3. recurses into the resulting modules,
//!
//! and keeps whatever structure describes the walk in the fewest bits. Every
//! decision goes through [`Best`], which holds a snapshot of the best tree
//! seen at that point and restores it when a candidate does not improve on it
//! by more than [`MIN_CODELENGTH_IMPROVEMENT`].
//!
//! Two recursion policies are provided as [`RecursionMode`]:
//!
//! - [`RecursionMode::Fast`]: new levels found while stacking get one flat
//!   split each; only the winning level is explored in depth.
//! - [`RecursionMode::Eager`]: every candidate level is explored in depth, and
//!   with probability `recursive` the search is repeated to escape local
//!   optima.

use super::tree::{TreeNode, TreeStats};
use crate::community::partition::{partition, repeated_partition};
use crate::community::{CommunityDetection, Greedy, LocalOptimizer, MIN_CODELENGTH_IMPROVEMENT};
use crate::error::{Error, Result};
use crate::flow::{induced_subnetwork, plogp, FlowNetwork, Node};
use crate::network::Network;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use rand::prelude::*;
use tracing::{debug, info};

/// How the engine recurses into the modules it finds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RecursionMode {
    /// Explore only the best level in depth.
    #[default]
    Fast,
    /// Explore every candidate level in depth.
    Eager {
        /// Probability, per level, of a second pass over the same children
        /// and of repeating the whole level search.
        recursive: f64,
    },
}

/// Snapshot of the best tree seen at one decision point.
#[derive(Debug, Clone)]
pub struct Best {
    tree: TreeNode,
    code_length: f64,
}

impl Best {
    /// Start from `tree` costing `code_length`.
    pub fn new(tree: &TreeNode, code_length: f64) -> Self {
        Self {
            tree: tree.clone(),
            code_length,
        }
    }

    /// Whether `candidate` beats `incumbent` by more than the tolerance.
    /// Ties are not improvements.
    pub fn improves(candidate: f64, incumbent: f64) -> bool {
        candidate < incumbent - MIN_CODELENGTH_IMPROVEMENT
    }

    /// Keep `tree` if it improves on the snapshot. Returns whether it did.
    pub fn offer(&mut self, tree: &TreeNode, code_length: f64) -> bool {
        if Self::improves(code_length, self.code_length) {
            self.tree.clone_from(tree);
            self.code_length = code_length;
            true
        } else {
            false
        }
    }

    /// Overwrite `tree` with the snapshot.
    pub fn restore(&self, tree: &mut TreeNode) {
        tree.clone_from(&self.tree);
    }

    /// Code length of the snapshot.
    pub fn code_length(&self) -> f64 {
        self.code_length
    }

    /// The snapshot itself.
    pub fn tree(&self) -> &TreeNode {
        &self.tree
    }
}

/// A converged flat partition of one tree node's members.
struct Split<O> {
    optimizer: O,
    rev_renumber: Vec<usize>,
}

impl<O: LocalOptimizer> Split<O> {
    /// Leaf indices of every module.
    fn members(&self) -> Vec<Vec<usize>> {
        self.optimizer
            .nodes()
            .iter()
            .map(|module| module.members.iter().map(|&j| self.rev_renumber[j]).collect())
            .collect()
    }
}

/// Partition the members of `map` flat, warm-started from its children.
///
/// Returns `None` when there is nothing to split.
fn split_level<O, R>(rng: &mut R, nodes: &[Node], map: &mut TreeNode) -> Option<Split<O>>
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let sub = induced_subnetwork(nodes, map.members.iter().copied());
    if sub.nodes.len() <= 1 {
        return None;
    }

    let warm_start = (!map.next_level.is_empty()).then(|| {
        let mut cluster = vec![0; sub.nodes.len()];
        for (m, child) in map.next_level.iter().enumerate() {
            for i in &child.members {
                cluster[sub.renumber[i]] = m;
            }
        }
        cluster
    });

    let mut optimizer = O::from_nodes(sub.nodes, sub.exit_flow);
    if let Some(cluster) = warm_start {
        optimizer.determ_move(&cluster);
    }
    partition(rng, &mut optimizer);

    map.rev_renumber.clone_from(&sub.rev_renumber);
    Some(Split {
        optimizer,
        rev_renumber: sub.rev_renumber,
    })
}

/// Replace the children of `map` with bottom modules owning `members`.
fn set_children(map: &mut TreeNode, nodes: &[Node], members: &[Vec<usize>]) {
    map.next_level = members
        .iter()
        .map(|m| TreeNode::module(nodes, m.iter().copied().collect(), map.level + 1))
        .collect();
    map.sort_children();
}

/// Log and record the flat split of the root.
fn report_first_level(map: &TreeNode, modules: usize, code_length: f64, two_level: &mut f64) {
    if map.level == 1 {
        info!(modules, code_length, "partitioned first level");
        if code_length < *two_level {
            *two_level = code_length;
        }
    }
}

/// Add index codebooks on top of the modules held by `optimizer` for as long
/// as the total code length keeps shrinking.
///
/// `members` are the leaf indices of the optimizer's current nodes.
/// `recurse` builds the subtree of every new module and returns its cost.
fn stack_index_codebooks<O, R, F>(
    rng: &mut R,
    nodes: &[Node],
    map: &mut TreeNode,
    optimizer: &mut O,
    mut members: Vec<Vec<usize>>,
    best: &mut Best,
    mut recurse: F,
) where
    O: LocalOptimizer,
    R: Rng + ?Sized,
    F: FnMut(&mut R, &mut TreeNode) -> f64,
{
    let mut previous = 2 * optimizer.node_count();
    while optimizer.node_count() > 1 && optimizer.node_count() != previous {
        previous = optimizer.node_count();
        optimizer.collapse_nodes();
        optimizer.initiate();
        partition(rng, optimizer);

        let modules = optimizer.node_count();
        if modules <= 1 || modules == previous {
            if map.level == 1 {
                info!("no coarser index codebook found");
            }
            continue;
        }

        let stacked: Vec<Vec<usize>> = optimizer
            .nodes()
            .iter()
            .map(|module| {
                module
                    .members
                    .iter()
                    .flat_map(|&k| members[k].iter().copied())
                    .collect()
            })
            .collect();
        members = stacked;

        set_children(map, nodes, &members);
        map.code_length = optimizer.index_length();
        let mut code_length = map.code_length;
        for child in &mut map.next_level {
            code_length += recurse(rng, child);
        }

        if map.level == 1 {
            info!(modules, code_length, "tried additional index codebook");
        } else {
            debug!(level = map.level, modules, code_length, "tried additional index codebook");
        }
        if !best.offer(map, code_length) {
            break;
        }
    }
}

/// Build the hierarchy under `map`, exploring only the best level in depth.
///
/// With `deep == false` only a flat split of the members is made. Returns the
/// code length of the subtree, which is never longer than the subtree `map`
/// held on entry (or its flat split) by more than the tolerance.
pub fn fast_hierarchical_partition<O, R>(
    rng: &mut R,
    nodes: &[Node],
    map: &mut TreeNode,
    two_level: &mut f64,
    deep: bool,
) -> f64
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let baseline = map.total_code_length();
    let Some(mut split) = split_level::<O, R>(rng, nodes, map) else {
        return baseline;
    };

    let modules = split.optimizer.node_count();
    let sub_code_length = split.optimizer.code_length();
    report_first_level(map, modules, sub_code_length, two_level);
    if modules == 1 || Best::improves(baseline, sub_code_length) {
        return baseline;
    }

    let members = split.members();
    set_children(map, nodes, &members);
    map.code_length = split.optimizer.index_length();
    let mut best = Best::new(map, sub_code_length);
    if !deep {
        return sub_code_length;
    }

    stack_index_codebooks(
        rng,
        nodes,
        map,
        &mut split.optimizer,
        members,
        &mut best,
        |rng, child| fast_hierarchical_partition::<O, R>(rng, nodes, child, two_level, false),
    );
    best.restore(map);

    let mut code_length = map.code_length;
    for child in &mut map.next_level {
        code_length += fast_hierarchical_partition::<O, R>(rng, nodes, child, two_level, true);
    }
    if !best.offer(map, code_length) {
        best.restore(map);
    }
    best.code_length()
}

/// Build the hierarchy under `map`, exploring every candidate level in depth.
///
/// After each pass over the level, the search is repeated with probability
/// `recursive` for as long as passes keep improving.
pub fn hierarchical_partition<O, R>(
    rng: &mut R,
    nodes: &[Node],
    map: &mut TreeNode,
    recursive: f64,
    two_level: &mut f64,
) -> f64
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let mut overall = eager_pass::<O, R>(rng, nodes, map, recursive, two_level);
    while rng.random::<f64>() < recursive {
        let pass = eager_pass::<O, R>(rng, nodes, map, recursive, two_level);
        if !overall.offer(pass.tree(), pass.code_length()) {
            break;
        }
    }
    overall.restore(map);
    overall.code_length()
}

fn eager_pass<O, R>(
    rng: &mut R,
    nodes: &[Node],
    map: &mut TreeNode,
    recursive: f64,
    two_level: &mut f64,
) -> Best
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let baseline = map.total_code_length();
    let Some(mut split) = split_level::<O, R>(rng, nodes, map) else {
        return Best::new(map, baseline);
    };

    let modules = split.optimizer.node_count();
    let sub_code_length = split.optimizer.code_length();
    report_first_level(map, modules, sub_code_length, two_level);
    if modules == 1 || Best::improves(baseline, sub_code_length) {
        return Best::new(map, baseline);
    }

    let members = split.members();
    set_children(map, nodes, &members);
    map.code_length = split.optimizer.index_length();
    let mut best = Best::new(map, sub_code_length);

    let code_length = recurse_children::<O, R>(rng, nodes, map, recursive, two_level);
    let _ = best.offer(map, code_length);
    if rng.random::<f64>() < recursive {
        let code_length = recurse_children::<O, R>(rng, nodes, map, recursive, two_level);
        let _ = best.offer(map, code_length);
    }

    stack_index_codebooks(
        rng,
        nodes,
        map,
        &mut split.optimizer,
        members,
        &mut best,
        |rng, child| hierarchical_partition::<O, R>(rng, nodes, child, recursive, two_level),
    );
    best.restore(map);
    best
}

fn recurse_children<O, R>(
    rng: &mut R,
    nodes: &[Node],
    map: &mut TreeNode,
    recursive: f64,
    two_level: &mut f64,
) -> f64
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let mut code_length = map.code_length;
    for child in &mut map.next_level {
        code_length += hierarchical_partition::<O, R>(rng, nodes, child, recursive, two_level);
    }
    code_length
}

fn run_mode<O, R>(
    rng: &mut R,
    nodes: &[Node],
    tree: &mut TreeNode,
    mode: RecursionMode,
    two_level: &mut f64,
) -> f64
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    match mode {
        RecursionMode::Fast => fast_hierarchical_partition::<O, R>(rng, nodes, tree, two_level, true),
        RecursionMode::Eager { recursive } => {
            hierarchical_partition::<O, R>(rng, nodes, tree, recursive, two_level)
        }
    }
}

/// Best hierarchy found by a search.
#[derive(Debug, Clone)]
pub struct HierarchyResult {
    /// The module tree; its root spans every node.
    pub tree: TreeNode,
    /// Code length of the tree in bits.
    pub code_length: f64,
    /// Summary of the tree.
    pub stats: TreeStats,
    /// Code length without any modules (entropy of the node flows).
    pub uncompressed_code_length: f64,
}

impl HierarchyResult {
    /// Percent saved relative to the uncompressed code length.
    pub fn compression(&self) -> f64 {
        if self.uncompressed_code_length > 0.0 {
            100.0 * (1.0 - self.code_length / self.uncompressed_code_length)
        } else {
            0.0
        }
    }

    /// Percent saved relative to the best two-level partition.
    pub fn two_level_gain(&self) -> f64 {
        if self.code_length > 0.0 {
            100.0 * (self.stats.two_level_code_length - self.code_length) / self.code_length
        } else {
            0.0
        }
    }

    /// Top-level module of every node.
    pub fn top_level_modules(&self) -> Vec<usize> {
        self.tree.top_level_assignment(self.tree.members.len())
    }
}

/// Running best over trials.
struct TrialTracker {
    node_count: usize,
    uncompressed_code_length: f64,
    two_level: f64,
    best: Option<(TreeNode, f64)>,
}

impl TrialTracker {
    fn new(nodes: &[Node]) -> Self {
        Self {
            node_count: nodes.len(),
            uncompressed_code_length: -nodes.iter().map(|n| plogp(n.size)).sum::<f64>(),
            two_level: f64::INFINITY,
            best: None,
        }
    }

    fn two_level(&self) -> f64 {
        if self.two_level.is_finite() {
            self.two_level
        } else {
            self.uncompressed_code_length
        }
    }

    fn consider<F>(&mut self, tree: TreeNode, code_length: f64, sink: &mut F) -> Result<()>
    where
        F: FnMut(&TreeNode, f64, &TreeStats) -> Result<()>,
    {
        if self.best.as_ref().is_some_and(|(_, shortest)| code_length >= *shortest) {
            return Ok(());
        }
        let stats = TreeStats::from_tree(&tree, self.node_count, self.two_level());
        info!(
            code_length,
            modules = stats.module_count,
            large_modules = stats.large_module_count,
            ave_depth = stats.ave_depth,
            ave_size = stats.ave_size,
            "new best hierarchy"
        );
        sink(&tree, code_length, &stats)?;
        self.best = Some((tree, code_length));
        Ok(())
    }

    fn finish(self) -> Result<HierarchyResult> {
        let two_level = self.two_level();
        let (tree, code_length) = self.best.ok_or(Error::InvalidParameter {
            name: "trials",
            message: "must be at least 1",
        })?;
        let stats = TreeStats::from_tree(&tree, self.node_count, two_level);
        Ok(HierarchyResult {
            tree,
            code_length,
            stats,
            uncompressed_code_length: self.uncompressed_code_length,
        })
    }
}

/// Run the hierarchical search `trials` times and keep the shortest tree.
///
/// Trials share `rng` in sequence. `sink` sees every new best tree with its
/// code length and statistics; an error from it aborts the search.
pub fn repeated_hierarchical_partition<O, R, F>(
    rng: &mut R,
    nodes: &[Node],
    trials: usize,
    mode: RecursionMode,
    mut sink: F,
) -> Result<HierarchyResult>
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
    F: FnMut(&TreeNode, f64, &TreeStats) -> Result<()>,
{
    let mut tracker = TrialTracker::new(nodes);
    for trial in 0..trials {
        info!(attempt = trial + 1, trials, "hierarchical attempt");
        let mut tree = TreeNode::root(nodes);
        let code_length = run_mode::<O, R>(rng, nodes, &mut tree, mode, &mut tracker.two_level);
        info!(attempt = trial + 1, code_length, "attempt finished");
        tracker.consider(tree, code_length, &mut sink)?;
    }
    tracker.finish()
}

/// Seed of trial `trial` derived from a base seed (SplitMix64 mixing).
pub fn seed_for_trial(base_seed: u64, trial: u64) -> u64 {
    if trial == 0 {
        return base_seed;
    }
    let mut z = base_seed ^ trial.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// [`repeated_hierarchical_partition`] with trials on the rayon pool.
///
/// Trial `t` draws from its own generator seeded with
/// [`seed_for_trial`]`(seed, t)`, so results do not depend on scheduling.
/// The best tree is chosen in trial order.
#[cfg(feature = "parallel")]
pub fn par_repeated_hierarchical_partition<O, F>(
    seed: u64,
    nodes: &[Node],
    trials: usize,
    mode: RecursionMode,
    mut sink: F,
) -> Result<HierarchyResult>
where
    O: LocalOptimizer,
    F: FnMut(&TreeNode, f64, &TreeStats) -> Result<()>,
{
    use rayon::prelude::*;

    let outcomes: Vec<(TreeNode, f64, f64)> = (0..trials)
        .into_par_iter()
        .map(|trial| {
            let mut rng = StdRng::seed_from_u64(seed_for_trial(seed, trial as u64));
            let mut tree = TreeNode::root(nodes);
            let mut two_level = f64::INFINITY;
            let code_length =
                run_mode::<O, StdRng>(&mut rng, nodes, &mut tree, mode, &mut two_level);
            (tree, code_length, two_level)
        })
        .collect();

    let mut tracker = TrialTracker::new(nodes);
    for (tree, code_length, two_level) in outcomes {
        tracker.two_level = tracker.two_level.min(two_level);
        tracker.consider(tree, code_length, &mut sink)?;
    }
    tracker.finish()
}

/// Hierarchical map-equation community detection.
///
/// ```rust
/// use hiermap::{FlowNetwork, Infomap, Network};
///
/// let mut network = Network::with_nodes(4);
/// network.add_link(0, 1, 1.0);
/// network.add_link(1, 0, 1.0);
/// network.add_link(2, 3, 1.0);
/// network.add_link(3, 2, 1.0);
/// network.add_link(1, 2, 0.1);
///
/// let flow = FlowNetwork::from_network(&network).unwrap();
/// let result = Infomap::new().with_seed(7).with_trials(5).run(&flow).unwrap();
/// assert_eq!(result.tree.next_level.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Infomap {
    seed: u64,
    trials: usize,
    mode: RecursionMode,
}

impl Infomap {
    /// Create a detector with default settings.
    pub fn new() -> Self {
        Self {
            seed: 42,
            trials: 10,
            mode: RecursionMode::Fast,
        }
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of independent trials.
    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    /// Set the recursion mode.
    pub fn with_mode(mut self, mode: RecursionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use eager recursion with the given repeat probability.
    pub fn with_recursive(mut self, recursive: f64) -> Self {
        self.mode = RecursionMode::Eager { recursive };
        self
    }

    /// Configured recursion mode.
    pub fn mode(&self) -> RecursionMode {
        self.mode
    }

    fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(Error::InvalidParameter {
                name: "trials",
                message: "must be at least 1",
            });
        }
        if let RecursionMode::Eager { recursive } = self.mode {
            if !(0.0..=1.0).contains(&recursive) {
                return Err(Error::InvalidParameter {
                    name: "recursive",
                    message: "must be in [0, 1]",
                });
            }
        }
        Ok(())
    }

    /// Search for the shortest hierarchy.
    pub fn run(&self, flow: &FlowNetwork) -> Result<HierarchyResult> {
        self.run_with_sink(flow, |_, _, _| Ok(()))
    }

    /// Search for the shortest hierarchy, handing every new best to `sink`.
    pub fn run_with_sink<F>(&self, flow: &FlowNetwork, sink: F) -> Result<HierarchyResult>
    where
        F: FnMut(&TreeNode, f64, &TreeStats) -> Result<()>,
    {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        repeated_hierarchical_partition::<Greedy, _, _>(
            &mut rng,
            flow.nodes(),
            self.trials,
            self.mode,
            sink,
        )
    }

    /// Like [`run_with_sink`](Self::run_with_sink), with trials in parallel.
    #[cfg(feature = "parallel")]
    pub fn par_run_with_sink<F>(&self, flow: &FlowNetwork, sink: F) -> Result<HierarchyResult>
    where
        F: FnMut(&TreeNode, f64, &TreeStats) -> Result<()>,
    {
        self.validate()?;
        par_repeated_hierarchical_partition::<Greedy, _>(
            self.seed,
            flow.nodes(),
            self.trials,
            self.mode,
            sink,
        )
    }

    /// Best flat partition, as a tree of depth at most two.
    pub fn run_two_level(&self, flow: &FlowNetwork) -> Result<HierarchyResult> {
        self.validate()?;
        let nodes = flow.nodes();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut greedy = Greedy::from_nodes(nodes.to_vec(), 0.0);
        repeated_partition(&mut rng, &mut greedy, self.trials);

        let mut tree = TreeNode::root(nodes);
        if greedy.node_count() > 1 {
            let members: Vec<Vec<usize>> =
                greedy.nodes().iter().map(|m| m.members.clone()).collect();
            set_children(&mut tree, nodes, &members);
            tree.code_length = greedy.index_length();
        }
        let code_length = tree.total_code_length();
        info!(modules = greedy.node_count(), code_length, "two-level partition");

        let stats = TreeStats::from_tree(&tree, nodes.len(), code_length);
        Ok(HierarchyResult {
            tree,
            code_length,
            stats,
            uncompressed_code_length: flow.entropy(),
        })
    }

    /// Best flat partition: module index of every node.
    pub fn detect_two_level(&self, flow: &FlowNetwork) -> Result<Vec<usize>> {
        Ok(self.run_two_level(flow)?.top_level_modules())
    }
}

impl Default for Infomap {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunityDetection for Infomap {
    fn detect<N, E>(&self, graph: &DiGraph<N, E>) -> Result<Vec<usize>> {
        let n = graph.node_count();
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        let mut network = Network::with_nodes(n);
        for edge in graph.edge_references() {
            let _ = network.add_link(edge.source().index(), edge.target().index(), 1.0);
        }
        let flow = FlowNetwork::from_network(&network)?;
        Ok(self.run(&flow)?.top_level_modules())
    }
}
