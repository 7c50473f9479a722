//! Single-level partition driver and multi-trial search.
//!
//! [`partition`] drives a [`LocalOptimizer`] to a converged two-level
//! partition. Plain sweeps of node moves get stuck once modules have formed,
//! so the outer loop alternates two escapes:
//!
//! - **Odd iterations**: restart from the flat nodes, seeded with the current
//!   assignment, so single nodes can leave modules they were merged into.
//! - **Even iterations**: partition every module on its own, then move the
//!   resulting sub-modules as units between the current modules.
//!
//! [`repeated_partition`] runs the driver from fresh copies of the same nodes
//! and keeps the shortest result.

use super::traits::LocalOptimizer;
use crate::flow::{induced_subnetwork, Node};
use rand::Rng;
use tracing::debug;

/// Smallest code-length decrease (bits) that counts as an improvement.
pub const MIN_CODELENGTH_IMPROVEMENT: f64 = 1.0e-10;

const MAX_OUTER_ITERATIONS: usize = 20;
const TUNE_INTERVAL: usize = 10;

/// Drive `optimizer` to a converged partition of its current nodes.
///
/// A module assignment already imposed with `determ_move` is used as the
/// starting point. If the current nodes are modules of an earlier run (their
/// `members` are not `[i]`), they are partitioned as units and the optimizer
/// keeps their leaves as members. On return the optimizer holds one node per
/// module.
pub fn partition<O, R>(rng: &mut R, optimizer: &mut O)
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    if optimizer.node_count() <= 1 {
        return;
    }
    with_units(optimizer, |optimizer| partition_units(rng, optimizer));
}

/// Whether every node stands for itself.
fn is_flat(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .enumerate()
        .all(|(i, node)| node.members.as_slice() == [i])
}

/// Run `search` on nodes that stand for themselves.
///
/// Module nodes are swapped for unit copies first; the modules `search` finds
/// are then applied to the original nodes, so their members stay leaf indices.
/// An assignment imposed on module nodes is not carried into `search`.
fn with_units<O, F>(optimizer: &mut O, search: F)
where
    O: LocalOptimizer,
    F: FnOnce(&mut O),
{
    if is_flat(optimizer.nodes()) {
        search(optimizer);
        return;
    }
    let units: Vec<Node> = optimizer
        .nodes()
        .iter()
        .enumerate()
        .map(|(i, node)| Node {
            members: vec![i],
            ..node.clone()
        })
        .collect();
    let modules = optimizer.replace_nodes(units);
    search(optimizer);
    let assignment = assignment_of(optimizer.nodes(), modules.len());
    let _ = optimizer.replace_nodes(modules);
    optimizer.determ_move(&assignment);
    optimizer.level(true);
}

fn partition_units<O, R>(rng: &mut R, optimizer: &mut O)
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let n = optimizer.node_count();
    if n <= 1 {
        return;
    }
    let flat: Vec<Node> = optimizer.nodes().to_vec();

    let mut iteration = 0;
    loop {
        let mut outer_old = optimizer.code_length();

        if iteration > 0 && iteration % 2 == 0 && optimizer.node_count() > 1 {
            let (sub_move_to, move_to) =
                partition_modules::<O, R>(rng, optimizer.nodes(), &flat);
            let _ = optimizer.replace_nodes(flat.clone());
            optimizer.determ_move(&sub_move_to);
            optimizer.level(false);
            optimizer.determ_move(&move_to);
            outer_old = optimizer.code_length();
            debug!(
                iteration = iteration + 1,
                sub_modules = move_to.len(),
                "moving sub-modules"
            );
        } else if iteration > 0 {
            let move_to = assignment_of(optimizer.nodes(), n);
            let _ = optimizer.replace_nodes(flat.clone());
            optimizer.determ_move(&move_to);
        }

        loop {
            let old = optimizer.code_length();
            let mut sweeps = 0;
            loop {
                let before = optimizer.code_length();
                let moved = optimizer.move_nodes(rng);
                sweeps += 1;
                let settled = !moved
                    || (optimizer.code_length() - before).abs() < MIN_CODELENGTH_IMPROVEMENT;
                if sweeps % TUNE_INTERVAL == 0 {
                    optimizer.tune();
                }
                if settled {
                    break;
                }
            }
            optimizer.level(true);
            if old - optimizer.code_length() <= MIN_CODELENGTH_IMPROVEMENT {
                break;
            }
        }

        iteration += 1;
        debug!(
            iteration,
            modules = optimizer.node_count(),
            code_length = optimizer.code_length(),
            "partition iteration"
        );
        if outer_old - optimizer.code_length() <= MIN_CODELENGTH_IMPROVEMENT
            || iteration >= MAX_OUTER_ITERATIONS
        {
            break;
        }
    }
}

/// Split every module into sub-modules.
///
/// Returns the sub-module of every flat node and the module every sub-module
/// came from.
fn partition_modules<O, R>(
    rng: &mut R,
    modules: &[Node],
    flat: &[Node],
) -> (Vec<usize>, Vec<usize>)
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let mut sub_move_to = vec![0; flat.len()];
    let mut move_to = Vec::with_capacity(flat.len());

    for (i, module) in modules.iter().enumerate() {
        if module.members.len() > 1 {
            let mut members = module.members.clone();
            members.sort_unstable();
            let sub = induced_subnetwork(flat, members);
            let mut sub_optimizer = O::from_nodes(sub.nodes, 0.0);
            partition_units(rng, &mut sub_optimizer);
            for sub_module in sub_optimizer.nodes() {
                for &j in &sub_module.members {
                    sub_move_to[sub.rev_renumber[j]] = move_to.len();
                }
                move_to.push(i);
            }
        } else {
            for &j in &module.members {
                sub_move_to[j] = move_to.len();
            }
            move_to.push(i);
        }
    }
    (sub_move_to, move_to)
}

/// Module index of every flat node, read from the members of module nodes.
pub(crate) fn assignment_of(modules: &[Node], n: usize) -> Vec<usize> {
    let mut assignment = vec![0; n];
    for (m, module) in modules.iter().enumerate() {
        for &i in &module.members {
            assignment[i] = m;
        }
    }
    assignment
}

/// Run [`partition`] `trials` times from fresh copies of the current nodes and
/// commit the shortest result.
///
/// Trials share `rng` in sequence. On return the optimizer holds one node per
/// module of the best trial.
pub fn repeated_partition<O, R>(rng: &mut R, optimizer: &mut O, trials: usize)
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    with_units(optimizer, |optimizer| repeated_units(rng, optimizer, trials));
}

fn repeated_units<O, R>(rng: &mut R, optimizer: &mut O, trials: usize)
where
    O: LocalOptimizer,
    R: Rng + ?Sized,
{
    let n = optimizer.node_count();
    let flat: Vec<Node> = optimizer.nodes().to_vec();
    let mut best: Option<(f64, Vec<usize>)> = None;

    for trial in 0..trials {
        let _ = optimizer.replace_nodes(flat.clone());
        partition_units(rng, optimizer);
        let code_length = optimizer.code_length();
        debug!(
            trial = trial + 1,
            trials,
            modules = optimizer.node_count(),
            code_length,
            "two-level trial"
        );
        if best.as_ref().map_or(true, |(shortest, _)| code_length < *shortest) {
            best = Some((code_length, assignment_of(optimizer.nodes(), n)));
        }
    }

    let _ = optimizer.replace_nodes(flat);
    if let Some((_, cluster)) = best {
        optimizer.determ_move(&cluster);
    }
    optimizer.level(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::Greedy;
    use crate::flow::{map_equation, FlowNetwork};
    use crate::network::Network;
    use rand::prelude::*;

    fn two_pairs() -> Vec<Node> {
        let mut network = Network::with_nodes(4);
        let _ = network.add_link(0, 1, 1.0);
        let _ = network.add_link(1, 0, 1.0);
        let _ = network.add_link(2, 3, 1.0);
        let _ = network.add_link(3, 2, 1.0);
        let _ = network.add_link(1, 2, 0.1);
        FlowNetwork::from_network(&network).unwrap().nodes().to_vec()
    }

    /// Cliques of `size` nodes, each linked weakly to the next.
    fn ring_of_cliques(cliques: usize, size: usize) -> Vec<Node> {
        let mut network = Network::with_nodes(cliques * size);
        for c in 0..cliques {
            for i in 0..size {
                for j in 0..size {
                    if i != j {
                        let _ = network.add_link(c * size + i, c * size + j, 1.0);
                    }
                }
            }
            let next = (c + 1) % cliques;
            let _ = network.add_link(c * size, next * size + 1, 0.1);
            let _ = network.add_link(next * size + 1, c * size, 0.1);
        }
        FlowNetwork::from_network(&network).unwrap().nodes().to_vec()
    }

    fn sorted_modules(optimizer: &Greedy) -> Vec<Vec<usize>> {
        let mut modules: Vec<Vec<usize>> = optimizer
            .nodes()
            .iter()
            .map(|m| {
                let mut members = m.members.clone();
                members.sort_unstable();
                members
            })
            .collect();
        modules.sort();
        modules
    }

    #[test]
    fn test_single_node_is_unchanged() {
        let nodes = FlowNetwork::from_network(&Network::with_nodes(1))
            .unwrap()
            .nodes()
            .to_vec();
        let mut greedy = Greedy::from_nodes(nodes, 0.0);
        let before = greedy.code_length();
        partition(&mut StdRng::seed_from_u64(1), &mut greedy);
        assert_eq!(greedy.node_count(), 1);
        assert_eq!(greedy.code_length(), before);
    }

    #[test]
    fn test_two_pairs() {
        let nodes = two_pairs();
        let mut greedy = Greedy::from_nodes(nodes.clone(), 0.0);
        partition(&mut StdRng::seed_from_u64(42), &mut greedy);
        assert_eq!(sorted_modules(&greedy), vec![vec![0, 1], vec![2, 3]]);
        let expected = map_equation(&nodes, &[0, 0, 1, 1], 0.0);
        assert!((greedy.code_length() - expected).abs() < 1e-10);
    }

    #[test]
    fn test_ring_of_cliques() {
        let nodes = ring_of_cliques(5, 4);
        let mut greedy = Greedy::from_nodes(nodes, 0.0);
        partition(&mut StdRng::seed_from_u64(7), &mut greedy);
        let expected: Vec<Vec<usize>> = (0..5).map(|c| (c * 4..c * 4 + 4).collect()).collect();
        assert_eq!(sorted_modules(&greedy), expected);
    }

    #[test]
    fn test_partition_is_a_fixed_point() {
        let nodes = ring_of_cliques(5, 4);
        let mut greedy = Greedy::from_nodes(nodes.clone(), 0.0);
        let mut rng = StdRng::seed_from_u64(5);
        partition(&mut rng, &mut greedy);
        let converged = greedy.code_length();

        // Re-enter the driver warm-started from the converged assignment.
        let assignment = assignment_of(greedy.nodes(), nodes.len());
        let _ = greedy.replace_nodes(nodes);
        greedy.determ_move(&assignment);
        assert!((greedy.code_length() - converged).abs() < 1e-10);
        partition(&mut rng, &mut greedy);
        assert!((greedy.code_length() - converged).abs() < 1e-10);
    }

    #[test]
    fn test_partition_twice_keeps_converged_modules() {
        let nodes = ring_of_cliques(5, 4);
        let mut greedy = Greedy::from_nodes(nodes.clone(), 0.0);
        let mut rng = StdRng::seed_from_u64(5);
        partition(&mut rng, &mut greedy);
        let converged = greedy.code_length();
        let modules = sorted_modules(&greedy);

        partition(&mut rng, &mut greedy);
        assert!((greedy.code_length() - converged).abs() <= 1e-10);
        assert_eq!(sorted_modules(&greedy), modules);
        let expected = map_equation(&nodes, &assignment_of(greedy.nodes(), nodes.len()), 0.0);
        assert!((greedy.code_length() - expected).abs() < 1e-10);

        repeated_partition(&mut rng, &mut greedy, 3);
        assert_eq!(sorted_modules(&greedy), modules);
    }

    #[test]
    fn test_one_trial_equals_direct_partition() {
        let nodes = ring_of_cliques(4, 3);

        let mut direct = Greedy::from_nodes(nodes.clone(), 0.0);
        partition(&mut StdRng::seed_from_u64(99), &mut direct);

        let mut repeated = Greedy::from_nodes(nodes, 0.0);
        repeated_partition(&mut StdRng::seed_from_u64(99), &mut repeated, 1);

        assert!((direct.code_length() - repeated.code_length()).abs() < 1e-10);
        assert_eq!(sorted_modules(&direct), sorted_modules(&repeated));
    }

    #[test]
    fn test_repeated_partition_keeps_best() {
        let nodes = ring_of_cliques(4, 4);
        let mut greedy = Greedy::from_nodes(nodes.clone(), 0.0);
        repeated_partition(&mut StdRng::seed_from_u64(3), &mut greedy, 5);
        let committed = map_equation(&nodes, &assignment_of(greedy.nodes(), nodes.len()), 0.0);
        assert!((greedy.code_length() - committed).abs() < 1e-10);
        assert_eq!(greedy.node_count(), 4);
    }

    #[test]
    fn test_assignment_of() {
        let modules = vec![
            Node {
                members: vec![2, 0],
                ..Node::default()
            },
            Node {
                members: vec![1],
                ..Node::default()
            },
        ];
        assert_eq!(assignment_of(&modules, 3), vec![0, 1, 0]);
    }
}
