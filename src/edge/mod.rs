#![allow(dead_code)]

// EdgeHolder wraps EdgeStores for the pair potentials and messages
// between two NodeHolders of sizes R1 and R2. EdgeHolders never own their
// NodeHolders (see spec.md's design notes on ownership): every method
// that needs a node's belief takes it as a borrow, so the solver is free
// to hold both NodeHolders directly instead of threading raw
// back-pointers through the edge holder.

use std::collections::HashMap;

use crate::node::NodeHolder;
use crate::store::EdgeStore;

const EPS: f64 = 1e-10;

// One entry of the inverse map used for derivative propagation:
// (source_edge_number, flat rotamer-pair index, edge index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeLoc {
    pub source_edge_num: usize,
    pub flat_index: usize,
    pub edge_index: usize,
}

pub struct EdgeHolder<const R1: usize, const R2: usize> {
    prob: EdgeStore,        // width R1*R2
    cur_belief: EdgeStore,  // width R1+R2
    old_belief: EdgeStore,  // width R1+R2
    marginal: EdgeStore,    // width R1*R2
    edge_indices1: Vec<usize>,
    edge_indices2: Vec<usize>,
    nodes_to_edge: HashMap<u64, usize>,
    edge_loc: Vec<EdgeLoc>,
    n_edge: usize,
    capacity: usize,
}

impl<const R1: usize, const R2: usize> EdgeHolder<R1, R2> {
    pub fn new(capacity: usize) -> Self {
        EdgeHolder {
            prob: EdgeStore::new(R1 * R2, capacity),
            cur_belief: EdgeStore::new(R1 + R2, capacity),
            old_belief: EdgeStore::new(R1 + R2, capacity),
            marginal: EdgeStore::new(R1 * R2, capacity),
            edge_indices1: Vec::with_capacity(capacity),
            edge_indices2: Vec::with_capacity(capacity),
            nodes_to_edge: HashMap::with_capacity(capacity),
            edge_loc: Vec::new(),
            n_edge: 0,
            capacity,
        }
    }

    pub fn n_edge(&self) -> usize {
        self.n_edge
    }

    pub fn edge_loc(&self) -> &[EdgeLoc] {
        &self.edge_loc
    }

    pub fn edge_endpoints(&self, e: usize) -> (usize, usize) {
        (self.edge_indices1[e], self.edge_indices2[e])
    }

    pub fn marginal_at(&self, comp: usize, e: usize) -> f64 {
        self.marginal.get(comp, e)
    }

    pub fn prob_at(&self, comp: usize, e: usize) -> f64 {
        self.prob.get(comp, e)
    }

    // Clears `n_edge`, the dedup map, and `edge_loc`. Per spec.md, the
    // underlying prob/belief buffers are not explicitly cleared here:
    // `add_to_edge` initializes a new edge's prob row to 1 on first use,
    // and `solve_for_marginals` re-seeds the belief buffers before each
    // solve.
    pub fn reset(&mut self) {
        self.n_edge = 0;
        self.nodes_to_edge.clear();
        self.edge_loc.clear();
        self.edge_indices1.clear();
        self.edge_indices2.clear();
    }

    // Seeds `old_belief` to 1 for every live edge, used once at the start
    // of `solve_for_marginals`.
    pub fn seed_old_belief_to_one(&mut self) {
        for e in 0..self.n_edge {
            self.old_belief.set_vector_at(e, &vec![1.0; R1 + R2]);
        }
    }

    // Registers a contribution to the edge between node slots
    // `node_slot1`/`node_slot2` (canonically ordered so the smaller-`n_rot`
    // residue is side 1). `residue_key1`/`residue_key2` identify the
    // residue pair for deduplication (see `ids::residue_key`) — distinct
    // from `rot1`/`rot2`, which select which entry of this edge's R1xR2
    // table the contribution multiplies into.
    pub fn add_to_edge(
        &mut self,
        source_edge_num: usize,
        prob_value: f64,
        residue_key1: u32,
        node_slot1: usize,
        rot1: usize,
        residue_key2: u32,
        node_slot2: usize,
        rot2: usize,
    ) {
        debug_assert!(rot1 < R1 && rot2 < R2);

        let key = crate::ids::edge_key(residue_key1, residue_key2);
        let idx = *self.nodes_to_edge.entry(key).or_insert_with(|| {
            let idx = self.n_edge;
            self.n_edge += 1;
            idx
        });

        if idx == self.edge_indices1.len() {
            self.edge_indices1.push(node_slot1);
            self.edge_indices2.push(node_slot2);
            self.prob.set_vector_at(idx, &vec![1.0; R1 * R2]);
        }

        let flat_index = rot1 * R2 + rot2;
        let updated = self.prob.get(flat_index, idx) * prob_value;
        self.prob.set(flat_index, idx, updated);

        self.edge_loc.push(EdgeLoc {
            source_edge_num,
            flat_index,
            edge_index: idx,
        });
    }

    // Folds a singleton-rotamer (R1 == 1) edge's factor into node 2's
    // prob, eliminating the edge from BP. Only meaningful when R1 == 1.
    pub fn move_edge_prob_to_node2(&self, nodes2: &mut NodeHolder<R2>) {
        debug_assert_eq!(R1, 1);
        for e in 0..self.n_edge {
            let node_slot = self.edge_indices2[e];
            for r in 0..R2 {
                let factor = self.prob.get(r, e);
                nodes2.mul_prob(r, node_slot, factor);
            }
        }
    }

    // Divides each edge's R1*R2 entries by their max.
    pub fn standardize_probs(&mut self) {
        for e in 0..self.n_edge {
            let max = (0..R1 * R2)
                .map(|comp| self.prob.get(comp, e))
                .fold(f64::MIN, f64::max)
                .max(EPS);
            for comp in 0..R1 * R2 {
                let value = self.prob.get(comp, e) / max;
                self.prob.set(comp, e, value);
            }
        }
    }

    pub fn swap_beliefs(&mut self) {
        self.cur_belief.swap(&mut self.old_belief);
    }

    pub fn max_deviation(&self) -> f64 {
        let mut max_dev = 0.0_f64;
        for e in 0..self.n_edge {
            for comp in 0..R1 + R2 {
                let diff = self.cur_belief.get(comp, e) - self.old_belief.get(comp, e);
                max_dev = max_dev.max(diff);
            }
        }
        max_dev
    }

    // Computes one edge's new pair of cavity-adjusted messages from the
    // previous sweep's node and edge beliefs. Shared by both
    // `update_beliefs` (endpoints in two distinct NodeHolders) and
    // `update_beliefs_self` (endpoints sharing one NodeHolder): the
    // borrow pattern differs between those two callers, but the message
    // arithmetic from spec.md's update_beliefs contract does not.
    fn new_messages(
        &self,
        e: usize,
        old_node1: &[f64],
        old_msg1: &[f64],
        old_node2: &[f64],
        old_msg2: &[f64],
    ) -> ([f64; R1], [f64; R2]) {
        // Cavity messages: divide the node belief by the message it
        // previously sent out, so that message is not double counted
        // when it comes back multiplied by psi.
        let mut cavity1 = [0.0_f64; R1];
        for r1 in 0..R1 {
            cavity1[r1] = safe_div(old_node1[r1], old_msg1[r1]);
        }
        let mut cavity2 = [0.0_f64; R2];
        for r2 in 0..R2 {
            cavity2[r2] = safe_div(old_node2[r2], old_msg2[r2]);
        }

        // m_cur_{1->e} = psi . cavity2  (psi treated as R1 x R2)
        let mut new_msg1 = [0.0_f64; R1];
        for r1 in 0..R1 {
            let mut acc = 0.0;
            for r2 in 0..R2 {
                acc += self.prob.get(r1 * R2 + r2, e) * cavity2[r2];
            }
            new_msg1[r1] = acc;
        }
        // m_cur_{2->e} = cavity1 . psi
        let mut new_msg2 = [0.0_f64; R2];
        for r2 in 0..R2 {
            let mut acc = 0.0;
            for r1 in 0..R1 {
                acc += cavity1[r1] * self.prob.get(r1 * R2 + r2, e);
            }
            new_msg2[r2] = acc;
        }

        rescale_by_max(&mut new_msg1);
        rescale_by_max(&mut new_msg2);
        (new_msg1, new_msg2)
    }

    fn damped_edge_belief(
        new_msg1: &[f64; R1],
        old_msg1: &[f64],
        new_msg2: &[f64; R2],
        old_msg2: &[f64],
        damping: f64,
    ) -> Vec<f64> {
        let mut belief = Vec::with_capacity(R1 + R2);
        for r1 in 0..R1 {
            belief.push((1.0 - damping) * new_msg1[r1] + damping * old_msg1[r1]);
        }
        for r2 in 0..R2 {
            belief.push((1.0 - damping) * new_msg2[r2] + damping * old_msg2[r2]);
        }
        belief
    }

    // One asynchronous BP sweep over all edges, in ascending index order,
    // updating both endpoint node beliefs in place as each edge is
    // visited. This traversal order is load-bearing for the iteration
    // trajectory and must not be parallelized or reordered. Use this
    // variant when the two endpoints live in distinct NodeHolders (R1 !=
    // R2); when both sides share one NodeHolder<R>, use
    // `update_beliefs_self` instead.
    pub fn update_beliefs(
        &mut self,
        nodes1: &mut NodeHolder<R1>,
        nodes2: &mut NodeHolder<R2>,
        damping: f64,
    ) {
        for e in 0..self.n_edge {
            let (n1, n2) = self.edge_endpoints(e);

            let old_node1 = nodes1.old_belief_column(n1);
            let old_node2 = nodes2.old_belief_column(n2);
            let old_edge = self.old_belief.vector_at(e);
            let (old_msg1, old_msg2) = old_edge.split_at(R1);

            let (new_msg1, new_msg2) =
                self.new_messages(e, &old_node1, old_msg1, &old_node2, old_msg2);

            let new_edge_belief =
                Self::damped_edge_belief(&new_msg1, old_msg1, &new_msg2, old_msg2, damping);
            self.cur_belief.set_vector_at(e, &new_edge_belief);

            let mut updated1 = [0.0_f64; R1];
            for r1 in 0..R1 {
                updated1[r1] = new_msg1[r1] * nodes1.cur_belief(r1, n1);
            }
            approx_normalize(&mut updated1);
            nodes1.set_cur_belief_column(n1, &updated1);

            let mut updated2 = [0.0_f64; R2];
            for r2 in 0..R2 {
                updated2[r2] = new_msg2[r2] * nodes2.cur_belief(r2, n2);
            }
            approx_normalize(&mut updated2);
            nodes2.set_cur_belief_column(n2, &updated2);
        }
    }

    // For each edge, removes the self-message double-counting from the
    // converged node beliefs, multiplies outer-product-style into psi,
    // and L1-normalizes into `marginal`.
    pub fn calculate_marginals(&mut self, nodes1: &NodeHolder<R1>, nodes2: &NodeHolder<R2>) {
        for e in 0..self.n_edge {
            let (n1, n2) = self.edge_endpoints(e);
            let belief1 = nodes1.cur_belief_column(n1);
            let belief2 = nodes2.cur_belief_column(n2);
            let edge_belief = self.cur_belief.vector_at(e);
            let (msg1, msg2) = edge_belief.split_at(R1);

            let mut bc1 = [0.0_f64; R1];
            for r1 in 0..R1 {
                bc1[r1] = belief1[r1] / (msg1[r1] + EPS);
            }
            let mut bc2 = [0.0_f64; R2];
            for r2 in 0..R2 {
                bc2[r2] = belief2[r2] / (msg2[r2] + EPS);
            }

            let mut joint = vec![0.0_f64; R1 * R2];
            let mut sum = 0.0;
            for r1 in 0..R1 {
                for r2 in 0..R2 {
                    let value = self.prob.get(r1 * R2 + r2, e) * bc1[r1] * bc2[r2];
                    joint[r1 * R2 + r2] = value;
                    sum += value;
                }
            }
            let sum = sum.max(EPS);
            for value in joint.iter_mut() {
                *value /= sum;
            }
            self.marginal.set_vector_at(e, &joint);
        }
    }

    // Bethe pair contribution:
    // Sum_{r1,r2} mu[r1,r2,e] * log((mu + eps) / (psi*b1[r1]*b2[r2] + eps)),
    // where b1/b2 are the (already-normalized) node current beliefs.
    pub fn edge_free_energy(&self, e: usize, nodes1: &NodeHolder<R1>, nodes2: &NodeHolder<R2>) -> f64 {
        let (n1, n2) = self.edge_endpoints(e);
        let belief1 = nodes1.cur_belief_column(n1);
        let belief2 = nodes2.cur_belief_column(n2);

        let mut total = 0.0;
        for r1 in 0..R1 {
            for r2 in 0..R2 {
                let mu = self.marginal.get(r1 * R2 + r2, e);
                let psi = self.prob.get(r1 * R2 + r2, e);
                let denom = psi * belief1[r1] * belief2[r2] + EPS;
                total += mu * ((mu + EPS) / denom).ln();
            }
        }
        total
    }
}

impl<const R: usize> EdgeHolder<R, R> {
    // Same-holder variant of `update_beliefs`, for edges whose two
    // endpoints are both slots of one shared NodeHolder<R> (the edges33
    // case: two alphabet-size-3 residues). Rust will not let two
    // `&mut NodeHolder<R>` parameters alias the same object, so this takes
    // a single `&mut NodeHolder<R>` and uses `cur_belief_pair_mut` to get
    // disjoint views into both endpoint columns at once.
    pub fn update_beliefs_self(&mut self, nodes: &mut NodeHolder<R>, damping: f64) {
        for e in 0..self.n_edge {
            let (n1, n2) = self.edge_endpoints(e);
            debug_assert_ne!(n1, n2);

            let old_node1 = nodes.old_belief_column(n1);
            let old_node2 = nodes.old_belief_column(n2);
            let old_edge = self.old_belief.vector_at(e);
            let (old_msg1, old_msg2) = old_edge.split_at(R);

            let (new_msg1, new_msg2) =
                self.new_messages(e, &old_node1, old_msg1, &old_node2, old_msg2);

            let new_edge_belief =
                Self::damped_edge_belief(&new_msg1, old_msg1, &new_msg2, old_msg2, damping);
            self.cur_belief.set_vector_at(e, &new_edge_belief);

            let (mut col1, mut col2) = nodes.cur_belief_pair_mut(n1, n2);
            let mut updated1 = [0.0_f64; R];
            for r in 0..R {
                updated1[r] = new_msg1[r] * col1[r];
            }
            approx_normalize(&mut updated1);
            col1.iter_mut().zip(updated1.iter()).for_each(|(dst, &src)| *dst = src);

            let mut updated2 = [0.0_f64; R];
            for r in 0..R {
                updated2[r] = new_msg2[r] * col2[r];
            }
            approx_normalize(&mut updated2);
            col2.iter_mut().zip(updated2.iter()).for_each(|(dst, &src)| *dst = src);
        }
    }
}

// Componentwise-safe reciprocal-style division: a zero denominator is
// replaced by EPS rather than propagating infinities/NaNs.
fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < EPS {
        numerator / EPS
    } else {
        numerator / denominator
    }
}

fn rescale_by_max(values: &mut [f64]) {
    let max = values.iter().cloned().fold(f64::MIN, f64::max).max(EPS);
    for value in values.iter_mut() {
        *value /= max;
    }
}

fn approx_normalize(values: &mut [f64]) {
    let max = values.iter().cloned().fold(f64::MIN, f64::max).max(EPS);
    for value in values.iter_mut() {
        *value /= max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_to_edge_dedups_by_residue_pair_not_by_rotamer() {
        let mut holder = EdgeHolder::<3, 3>::new(4);
        let res_a = crate::ids::residue_key(crate::ids::encode(0, 3, 0));
        let res_b = crate::ids::residue_key(crate::ids::encode(1, 3, 0));

        for rot1 in 0..3 {
            for rot2 in 0..3 {
                holder.add_to_edge(0, 2.0, res_a, 0, rot1, res_b, 1, rot2);
            }
        }

        assert_eq!(holder.n_edge(), 1);
        for comp in 0..9 {
            assert_eq!(holder.prob_at(comp, 0), 2.0);
        }
    }

    #[test]
    fn add_to_edge_accumulates_multiplicatively_for_repeated_rot_pair() {
        let mut holder = EdgeHolder::<3, 3>::new(2);
        let res_a = crate::ids::residue_key(crate::ids::encode(0, 3, 0));
        let res_b = crate::ids::residue_key(crate::ids::encode(1, 3, 0));
        holder.add_to_edge(0, 2.0, res_a, 0, 0, res_b, 1, 0);
        holder.add_to_edge(1, 3.0, res_a, 0, 0, res_b, 1, 0);
        assert_eq!(holder.prob_at(0, 0), 6.0);
    }

    #[test]
    fn add_to_edge_is_order_independent_up_to_float_commutativity() {
        let res_a = crate::ids::residue_key(crate::ids::encode(0, 3, 0));
        let res_b = crate::ids::residue_key(crate::ids::encode(1, 3, 0));

        let contributions = [(0usize, 1usize, 2.0), (1, 2, 3.0), (0, 0, 4.0)];

        let mut forward = EdgeHolder::<3, 3>::new(2);
        for &(rot1, rot2, value) in contributions.iter() {
            forward.add_to_edge(0, value, res_a, 0, rot1, res_b, 1, rot2);
        }

        let mut reversed = EdgeHolder::<3, 3>::new(2);
        for &(rot1, rot2, value) in contributions.iter().rev() {
            reversed.add_to_edge(0, value, res_a, 0, rot1, res_b, 1, rot2);
        }

        for comp in 0..9 {
            assert!((forward.prob_at(comp, 0) - reversed.prob_at(comp, 0)).abs() < 1e-12);
        }
    }

    #[test]
    fn move_edge_prob_to_node2_folds_singleton_edge_into_node() {
        let mut edges13 = EdgeHolder::<1, 3>::new(1);
        let res_a = crate::ids::residue_key(crate::ids::encode(0, 1, 0));
        let res_b = crate::ids::residue_key(crate::ids::encode(1, 3, 0));
        // Favor rotamer 0 of node 2 by a factor of 10.
        edges13.add_to_edge(0, 10.0, res_a, 0, 0, res_b, 0, 0);
        edges13.add_to_edge(0, 1.0, res_a, 0, 0, res_b, 0, 1);
        edges13.add_to_edge(0, 1.0, res_a, 0, 0, res_b, 0, 2);

        let mut nodes2 = NodeHolder::<3>::new(1);
        nodes2.reset();
        edges13.move_edge_prob_to_node2(&mut nodes2);

        assert_eq!(nodes2.prob(0, 0), 10.0);
        assert_eq!(nodes2.prob(1, 0), 1.0);
        assert_eq!(nodes2.prob(2, 0), 1.0);
    }

    #[test]
    fn calculate_marginals_sums_to_one() {
        let mut edges = EdgeHolder::<3, 3>::new(1);
        let res_a = crate::ids::residue_key(crate::ids::encode(0, 3, 0));
        let res_b = crate::ids::residue_key(crate::ids::encode(1, 3, 0));
        for r1 in 0..3 {
            for r2 in 0..3 {
                let value = if r1 == r2 { 1.0 } else { (-1.0_f64).exp() };
                edges.add_to_edge(0, value, res_a, 0, r1, res_b, 1, r2);
            }
        }

        let mut nodes1 = NodeHolder::<3>::new(1);
        let mut nodes2 = NodeHolder::<3>::new(1);
        nodes1.reset();
        nodes2.reset();
        nodes1.set_cur_belief_column(0, &[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);
        nodes2.set_cur_belief_column(0, &[1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]);

        edges.calculate_marginals(&nodes1, &nodes2);

        let sum: f64 = (0..9).map(|comp| edges.marginal_at(comp, 0)).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn update_beliefs_self_updates_both_endpoints_sharing_one_holder() {
        // Both endpoints of this edge are slots 0 and 1 of a single
        // NodeHolder<3>, exercising the aliasing-safe same-holder path.
        let mut edges = EdgeHolder::<3, 3>::new(1);
        let res_a = crate::ids::residue_key(crate::ids::encode(0, 3, 0));
        let res_b = crate::ids::residue_key(crate::ids::encode(1, 3, 0));
        for r1 in 0..3 {
            for r2 in 0..3 {
                let value = if r1 == r2 { 2.0 } else { 1.0 };
                edges.add_to_edge(0, value, res_a, 0, r1, res_b, 1, r2);
            }
        }

        let mut nodes = NodeHolder::<3>::new(2);
        nodes.reset();
        nodes.seed_old_belief_from_prob();
        nodes.seed_cur_belief_from_prob();
        edges.seed_old_belief_to_one();

        edges.update_beliefs_self(&mut nodes, 0.0);

        let belief1 = nodes.cur_belief_column(0);
        let belief2 = nodes.cur_belief_column(1);
        assert!(belief1.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(belief2.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(belief1.iter().cloned().fold(f64::MIN, f64::max) > 0.0);
        assert!(belief2.iter().cloned().fold(f64::MIN, f64::max) > 0.0);
    }
}
