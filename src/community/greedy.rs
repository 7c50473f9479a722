//! Greedy map-equation optimizer.
//!
//! Nodes are moved one at a time to the neighbouring module that shortens the
//! code length the most, in the style of the Louvain local-moving phase but
//! with the map equation as objective.
//!
//! ## Objective
//!
//! For a scope with exit flow `q_M` (0 for a whole network) split into
//! modules `m` with exit `q_m`:
//!
//! ```text
//! L_index  = plogp(q_M + Σ q_m) - plogp(q_M) - Σ plogp(q_m)
//! L_module = Σ plogp(q_m + w_m) - Σ plogp(q_m) - Σ_a plogp(w_a)
//! ```
//!
//! `w_a` is the [codeword flow](Node::codeword_flow) of node `a` and `w_m`
//! its sum over a module. For leaves it is the visit rate `p_a`, which gives
//! the two-level map equation. After [`collapse_nodes`](LocalOptimizer::collapse_nodes)
//! every node is a module whose codeword marks an exit, so `w_a = q_a` and
//! `L_module` becomes the cost of the index codebooks stacked between the
//! scope and those modules.
//!
//! The last term runs over the nodes fixed by `initiate` and stays constant
//! while modules are merged, so it is computed once.
//!
//! ## Incremental moves
//!
//! Each module keeps its summed flow, dangling flow, teleport weight and the
//! flow on links that leave it. Moving node `a` from `old` to `new` only
//! touches those two modules:
//!
//! ```text
//! links_out(old \ a) = links_out(old) - outside(a) - (out(a) - out(a → old)) + in(old → a)
//! links_out(new ∪ a) = links_out(new) + outside(a) + (out(a) - out(a → new)) - in(new → a)
//! ```
//!
//! `tune` recomputes everything exactly to clear accumulated rounding.

use super::traits::LocalOptimizer;
use crate::flow::{plogp, teleport_exit, Node};
use rand::seq::SliceRandom;
use rand::Rng;

/// Smallest code-length decrease that counts as an improving move.
const MIN_SINGLE_NODE_IMPROVEMENT: f64 = 1.0e-16;

/// Per-module aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Module {
    members: usize,
    size: f64,
    codeword_flow: f64,
    dangling_size: f64,
    teleport_weight: f64,
    link_exit: f64,
    exit: f64,
}

impl Module {
    fn refresh_exit(&mut self) {
        self.exit = teleport_exit(self.size, self.dangling_size, self.teleport_weight)
            + self.link_exit;
    }
}

/// Greedy local optimizer for the (hierarchical) map equation.
#[derive(Debug, Clone)]
pub struct Greedy {
    nodes: Vec<Node>,
    parent_exit: f64,
    leaf_term: f64,

    node_module: Vec<usize>,
    modules: Vec<Module>,
    module_count: usize,

    exit_sum: f64,
    exit_log_exit: f64,
    flow_log_flow: f64,

    index_length: f64,
    module_length: f64,

    // Scratch space for move_nodes, indexed by module.
    flow_to: Vec<f64>,
    flow_from: Vec<f64>,
    touched: Vec<usize>,
}

impl Greedy {
    /// Module index of every node.
    pub fn assignment(&self) -> &[usize] {
        &self.node_module
    }

    /// Exit flow of the scope this optimizer works in.
    pub fn parent_exit(&self) -> f64 {
        self.parent_exit
    }

    fn refresh_lengths(&mut self) {
        self.index_length = plogp(self.parent_exit + self.exit_sum)
            - plogp(self.parent_exit)
            - self.exit_log_exit;
        self.module_length = -self.exit_log_exit + self.flow_log_flow - self.leaf_term;
    }

    /// Rebuild every module aggregate from `node_module`.
    fn recompute(&mut self) {
        let n = self.nodes.len();
        let slots = self
            .node_module
            .iter()
            .max()
            .map_or(0, |&m| m + 1)
            .max(n);
        self.modules.clear();
        self.modules.resize(slots, Module::default());

        for (a, node) in self.nodes.iter().enumerate() {
            let m = self.node_module[a];
            let module = &mut self.modules[m];
            module.members += 1;
            module.size += node.size;
            module.codeword_flow += node.codeword_flow;
            module.dangling_size += node.dangling_size;
            module.teleport_weight += node.teleport_weight;
            module.link_exit += node.outside_flow;
            for &(b, w) in &node.out_links {
                if self.node_module[b] != m {
                    module.link_exit += w;
                }
            }
        }

        self.module_count = 0;
        self.exit_sum = 0.0;
        self.exit_log_exit = 0.0;
        self.flow_log_flow = 0.0;
        for module in self.modules.iter_mut().filter(|m| m.members > 0) {
            module.refresh_exit();
            self.module_count += 1;
            self.exit_sum += module.exit;
            self.exit_log_exit += plogp(module.exit);
            self.flow_log_flow += plogp(module.exit + module.codeword_flow);
        }
        self.refresh_lengths();
        self.reset_scratch();
    }

    fn reset_scratch(&mut self) {
        let slots = self.modules.len();
        self.flow_to.clear();
        self.flow_to.resize(slots, 0.0);
        self.flow_from.clear();
        self.flow_from.resize(slots, 0.0);
        self.touched.clear();
    }

    /// Accumulate flow between node `a` and its neighbouring modules.
    fn gather_neighbours(&mut self, a: usize) {
        let node = &self.nodes[a];
        for &(b, w) in &node.out_links {
            let m = self.node_module[b];
            if self.flow_to[m] == 0.0 && self.flow_from[m] == 0.0 && !self.touched.contains(&m) {
                self.touched.push(m);
            }
            self.flow_to[m] += w;
        }
        for &(b, w) in &node.in_links {
            let m = self.node_module[b];
            if self.flow_to[m] == 0.0 && self.flow_from[m] == 0.0 && !self.touched.contains(&m) {
                self.touched.push(m);
            }
            self.flow_from[m] += w;
        }
    }

    fn clear_neighbours(&mut self) {
        for &m in &self.touched {
            self.flow_to[m] = 0.0;
            self.flow_from[m] = 0.0;
        }
        self.touched.clear();
    }

    /// Module `old` after removing node `a`.
    fn without(&self, a: usize, old: usize) -> Module {
        let node = &self.nodes[a];
        let mut module = self.modules[old];
        if module.members == 1 {
            return Module::default();
        }
        module.members -= 1;
        module.size -= node.size;
        module.codeword_flow -= node.codeword_flow;
        module.dangling_size -= node.dangling_size;
        module.teleport_weight -= node.teleport_weight;
        module.link_exit += -node.outside_flow - (node.out_flow() - self.flow_to[old])
            + self.flow_from[old];
        module.refresh_exit();
        module
    }

    /// Module `new` after adding node `a`.
    fn with(&self, a: usize, new: usize) -> Module {
        let node = &self.nodes[a];
        let mut module = self.modules[new];
        module.members += 1;
        module.size += node.size;
        module.codeword_flow += node.codeword_flow;
        module.dangling_size += node.dangling_size;
        module.teleport_weight += node.teleport_weight;
        module.link_exit += node.outside_flow + (node.out_flow() - self.flow_to[new])
            - self.flow_from[new];
        module.refresh_exit();
        module
    }

    /// Code length change of replacing `(old, new)` by `(old2, new2)`.
    fn delta(&self, old: &Module, new: &Module, old2: &Module, new2: &Module) -> f64 {
        let exit_sum = self.exit_sum - old.exit - new.exit + old2.exit + new2.exit;
        let delta_exit_log_exit =
            plogp(old2.exit) + plogp(new2.exit) - plogp(old.exit) - plogp(new.exit);
        let delta_flow_log_flow = plogp(old2.exit + old2.codeword_flow)
            + plogp(new2.exit + new2.codeword_flow)
            - plogp(old.exit + old.codeword_flow)
            - plogp(new.exit + new.codeword_flow);
        let delta_index = plogp(self.parent_exit + exit_sum)
            - plogp(self.parent_exit + self.exit_sum)
            - delta_exit_log_exit;
        delta_index - delta_exit_log_exit + delta_flow_log_flow
    }

    fn commit_move(&mut self, a: usize, old: usize, new: usize, old2: Module, new2: Module) {
        let before = [self.modules[old], self.modules[new]];
        for module in before.iter().filter(|m| m.members > 0) {
            self.exit_sum -= module.exit;
            self.exit_log_exit -= plogp(module.exit);
            self.flow_log_flow -= plogp(module.exit + module.codeword_flow);
        }
        for module in [&old2, &new2].into_iter().filter(|m| m.members > 0) {
            self.exit_sum += module.exit;
            self.exit_log_exit += plogp(module.exit);
            self.flow_log_flow += plogp(module.exit + module.codeword_flow);
        }
        if old2.members == 0 {
            self.module_count -= 1;
        }
        self.modules[old] = old2;
        self.modules[new] = new2;
        self.node_module[a] = new;
        self.refresh_lengths();
    }
}

impl LocalOptimizer for Greedy {
    fn from_nodes(nodes: Vec<Node>, parent_exit: f64) -> Self {
        let mut greedy = Self {
            nodes,
            parent_exit,
            leaf_term: 0.0,
            node_module: Vec::new(),
            modules: Vec::new(),
            module_count: 0,
            exit_sum: 0.0,
            exit_log_exit: 0.0,
            flow_log_flow: 0.0,
            index_length: 0.0,
            module_length: 0.0,
            flow_to: Vec::new(),
            flow_from: Vec::new(),
            touched: Vec::new(),
        };
        greedy.initiate();
        greedy
    }

    fn initiate(&mut self) {
        self.leaf_term = self.nodes.iter().map(|n| plogp(n.codeword_flow)).sum();
        self.calibrate();
    }

    fn move_nodes<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let mut order: Vec<usize> = (0..self.nodes.len()).collect();
        order.shuffle(rng);

        let mut moved = false;
        for a in order {
            let old = self.node_module[a];
            self.gather_neighbours(a);

            let old_module = self.modules[old];
            let old2 = self.without(a, old);
            let mut best: Option<(usize, Module, f64)> = None;
            for &new in &self.touched {
                if new == old {
                    continue;
                }
                let new_module = self.modules[new];
                let new2 = self.with(a, new);
                let delta = self.delta(&old_module, &new_module, &old2, &new2);
                if delta < -MIN_SINGLE_NODE_IMPROVEMENT
                    && best.as_ref().map_or(true, |&(_, _, d)| delta < d)
                {
                    best = Some((new, new2, delta));
                }
            }

            if let Some((new, new2, _)) = best {
                self.commit_move(a, old, new, old2, new2);
                moved = true;
            }
            self.clear_neighbours();
        }
        moved
    }

    fn tune(&mut self) {
        self.recompute();
    }

    fn level(&mut self, finalize: bool) {
        let slots = self.modules.len();
        let mut new_index = vec![usize::MAX; slots];
        let mut kept: Vec<usize> = Vec::with_capacity(self.module_count);
        for (m, module) in self.modules.iter().enumerate() {
            if module.members > 0 {
                new_index[m] = kept.len();
                kept.push(m);
            }
        }

        let mut aggregated = vec![Node::default(); kept.len()];
        let mut links: Vec<(usize, usize, f64)> = Vec::new();
        for (a, node) in self.nodes.iter().enumerate() {
            let k = new_index[self.node_module[a]];
            let target = &mut aggregated[k];
            target.members.extend_from_slice(&node.members);
            target.size += node.size;
            target.codeword_flow += node.codeword_flow;
            target.dangling_size += node.dangling_size;
            target.teleport_weight += node.teleport_weight;
            target.outside_flow += node.outside_flow;
            target.self_link += node.self_link;
            for &(b, w) in &node.out_links {
                let kb = new_index[self.node_module[b]];
                if kb == k {
                    target.self_link += w;
                } else {
                    links.push((k, kb, w));
                }
            }
        }

        links.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        let mut merged: Vec<(usize, usize, f64)> = Vec::with_capacity(links.len());
        for (from, to, w) in links {
            match merged.last_mut() {
                Some(last) if last.0 == from && last.1 == to => last.2 += w,
                _ => merged.push((from, to, w)),
            }
        }
        for (from, to, w) in merged {
            aggregated[from].out_links.push((to, w));
            aggregated[to].in_links.push((from, w));
        }

        let carried: Vec<Module> = kept.iter().map(|&m| self.modules[m]).collect();
        self.nodes = aggregated;
        self.node_module = (0..self.nodes.len()).collect();

        if finalize {
            self.recompute();
        } else {
            self.modules = carried;
            for module in &mut self.modules {
                module.members = 1;
            }
            self.module_count = self.modules.len();
            self.refresh_lengths();
            self.reset_scratch();
        }
    }

    fn calibrate(&mut self) {
        self.node_module = (0..self.nodes.len()).collect();
        self.recompute();
    }

    fn determ_move(&mut self, assignment: &[usize]) {
        debug_assert_eq!(assignment.len(), self.nodes.len());
        self.node_module.clear();
        self.node_module.extend_from_slice(assignment);
        self.recompute();
    }

    fn collapse_nodes(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.codeword_flow = node.exit_flow();
            node.members = vec![i];
        }
    }

    fn replace_nodes(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let old = std::mem::replace(&mut self.nodes, nodes);
        self.calibrate();
        old
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn module_count(&self) -> usize {
        self.module_count
    }

    fn code_length(&self) -> f64 {
        self.index_length + self.module_length
    }

    fn index_length(&self) -> f64 {
        self.index_length
    }

    fn module_length(&self) -> f64 {
        self.module_length
    }

    fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}
