#![allow(dead_code)]

// RotamerSolver glues the storage/BP layers into one evaluation cycle:
// fill_holders -> solve_for_marginals -> propagate_derivatives ->
// (optional) calculate_energy_from_marginals. It owns both NodeHolders and
// all three EdgeHolders and drives the interaction graph and prob_node
// collaborators purely through their traits.

use log::warn;

use crate::config::BpConfig;
use crate::edge::EdgeHolder;
use crate::error::{Result, RotamerError};
use crate::ids::{self, ResidueAlphabet};
use crate::interaction_graph::{InteractionGraph, ProbNode};
use crate::node::NodeHolder;

// Damping used for the single warm-up sweep before the main BP loop, kept
// distinct from the configured steady-state damping.
const WARMUP_DAMPING: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    MarginalsOnly,
    WithPotential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputeOutcome {
    pub iterations: usize,
    pub max_deviation: f64,
    pub potential: Option<f64>,
}

pub struct RotamerSolver {
    config: BpConfig,
    nodes1: NodeHolder<1>,
    nodes3: NodeHolder<3>,
    edges11: EdgeHolder<1, 1>,
    edges13: EdgeHolder<1, 3>,
    edges33: EdgeHolder<3, 3>,
}

impl RotamerSolver {
    // Pre-allocates both node holders and all three edge holders at the
    // given capacities; nothing allocates in the hot loop afterwards.
    // Capacities should come from the maximum n_elem/n_edge the caller's
    // input id set can ever produce.
    pub fn new(
        config: BpConfig,
        max_elem1: usize,
        max_elem3: usize,
        max_edge11: usize,
        max_edge13: usize,
        max_edge33: usize,
    ) -> Result<Self> {
        Ok(RotamerSolver {
            config,
            nodes1: NodeHolder::new(max_elem1),
            nodes3: NodeHolder::new(max_elem3),
            edges11: EdgeHolder::new(max_edge11),
            edges13: EdgeHolder::new(max_edge13),
            edges33: EdgeHolder::new(max_edge33),
        })
    }

    pub fn config(&self) -> &BpConfig {
        &self.config
    }

    // Resets every holder, multiplies one-body energies into node priors,
    // and accumulates pairwise potentials into the appropriate edge
    // holder (canonicalizing so the smaller-n_rot residue is endpoint 1).
    // Folds (1,3) edges into nodes3's prior so they never enter BP.
    pub fn fill_holders<G: InteractionGraph, P: ProbNode>(
        &mut self,
        igraph: &G,
        prob_nodes: &[P],
    ) -> Result<()> {
        self.nodes1.reset();
        self.nodes3.reset();
        self.edges11.reset();
        self.edges13.reset();
        self.edges33.reset();

        for n in 0..igraph.n_elem1() {
            let info = ids::decode(igraph.id1(n))?;
            let bead_index = igraph.loc1(n);
            for pn in prob_nodes.iter() {
                if bead_index >= pn.len() {
                    return Err(RotamerError::ShapeMismatch {
                        expected: pn.len(),
                        found: bead_index + 1,
                        what: "prob_node element count vs. position node bead index",
                    });
                }
            }
            let e1: f64 = prob_nodes.iter().map(|pn| pn.value(0, bead_index)).sum();
            let factor = (-e1).exp();
            match ResidueAlphabet::from_n_rot(info.n_rot)? {
                ResidueAlphabet::One => {
                    self.nodes1
                        .mul_prob(0, info.residue_index as usize, factor);
                }
                ResidueAlphabet::Three => {
                    self.nodes3
                        .mul_prob(info.rot as usize, info.residue_index as usize, factor);
                }
            }
        }

        for e in 0..igraph.n_edge() {
            let (bead1, bead2) = igraph.edge_endpoints(e);
            let raw1 = igraph.id1(bead1);
            let raw2 = igraph.id1(bead2);
            let mut info1 = ids::decode(raw1)?;
            let mut info2 = ids::decode(raw2)?;
            let mut key1 = ids::residue_key(raw1);
            let mut key2 = ids::residue_key(raw2);
            if info1.n_rot > info2.n_rot {
                std::mem::swap(&mut info1, &mut info2);
                std::mem::swap(&mut key1, &mut key2);
            }

            let prob_value = (-igraph.edge_value(e)).exp();
            let r1 = info1.residue_index as usize;
            let r2 = info2.residue_index as usize;
            let rot1 = info1.rot as usize;
            let rot2 = info2.rot as usize;

            match (
                ResidueAlphabet::from_n_rot(info1.n_rot)?,
                ResidueAlphabet::from_n_rot(info2.n_rot)?,
            ) {
                (ResidueAlphabet::One, ResidueAlphabet::One) => {
                    self.edges11
                        .add_to_edge(e, prob_value, key1, r1, rot1, key2, r2, rot2);
                }
                (ResidueAlphabet::One, ResidueAlphabet::Three) => {
                    self.edges13
                        .add_to_edge(e, prob_value, key1, r1, rot1, key2, r2, rot2);
                }
                (ResidueAlphabet::Three, ResidueAlphabet::Three) => {
                    self.edges33
                        .add_to_edge(e, prob_value, key1, r1, rot1, key2, r2, rot2);
                }
                (ResidueAlphabet::Three, ResidueAlphabet::One) => {
                    unreachable!("endpoints are canonicalized so n_rot1 <= n_rot2")
                }
            }
        }

        self.edges13.move_edge_prob_to_node2(&mut self.nodes3);
        Ok(())
    }

    // Runs loopy BP to convergence (or until max_iter) and converts the
    // converged beliefs into marginals. Only nodes3/edges33 iterate:
    // edges11 is a scalar fold and edges13 was already folded into
    // nodes3's prior by `fill_holders`, so neither participates in the
    // per-edge sweep.
    pub fn solve_for_marginals(&mut self) -> (usize, f64) {
        self.nodes1.seed_old_belief_from_prob();
        self.nodes1.seed_cur_belief_from_prob();
        self.nodes3.seed_old_belief_from_prob();
        self.nodes3.seed_cur_belief_from_prob();
        self.edges33.seed_old_belief_to_one();

        self.edges33
            .update_beliefs_self(&mut self.nodes3, WARMUP_DAMPING);
        self.nodes3.swap_beliefs();

        let damping = self.config.damping();
        let chunk = self.config.iteration_chunk_size();
        let max_iter = self.config.max_iter();

        let mut iter = 0usize;
        let mut max_deviation = f64::INFINITY;
        while iter < max_iter {
            for _ in 0..chunk {
                if iter >= max_iter {
                    break;
                }
                self.nodes3.swap_beliefs();
                self.edges33.swap_beliefs();
                self.edges33.update_beliefs_self(&mut self.nodes3, damping);
                self.nodes3.finish_belief_update(damping);
                iter += 1;
            }
            max_deviation = self.nodes3.max_deviation().max(self.edges33.max_deviation());
            if max_deviation <= self.config.tol() {
                break;
            }
        }

        self.nodes1.calculate_marginals();
        self.nodes3.calculate_marginals();
        self.edges33.calculate_marginals(&self.nodes3, &self.nodes3);

        (iter, max_deviation)
    }

    // Writes back per-source-edge sensitivities and per-bead occupation
    // probabilities. Must run after `solve_for_marginals`.
    pub fn propagate_derivatives<G: InteractionGraph, P: ProbNode>(
        &self,
        igraph: &mut G,
        prob_nodes: &mut [P],
    ) {
        for loc in self.edges11.edge_loc() {
            igraph.set_edge_sensitivity(loc.source_edge_num, 1.0);
        }
        for loc in self.edges13.edge_loc() {
            let (_, n2) = self.edges13.edge_endpoints(loc.edge_index);
            let sensitivity = self.nodes3.cur_belief(loc.flat_index, n2);
            igraph.set_edge_sensitivity(loc.source_edge_num, sensitivity);
        }
        for loc in self.edges33.edge_loc() {
            let sensitivity = self.edges33.marginal_at(loc.flat_index, loc.edge_index);
            igraph.set_edge_sensitivity(loc.source_edge_num, sensitivity);
        }

        for n in 0..igraph.n_elem1() {
            let info = match ids::decode(igraph.id1(n)) {
                Ok(info) => info,
                Err(_) => continue,
            };
            let occupation = match ResidueAlphabet::from_n_rot(info.n_rot) {
                Ok(ResidueAlphabet::One) => {
                    self.nodes1.cur_belief(0, info.residue_index as usize)
                }
                Ok(ResidueAlphabet::Three) => self
                    .nodes3
                    .cur_belief(info.rot as usize, info.residue_index as usize),
                Err(_) => continue,
            };
            let slot = igraph.loc1(n);
            for prob_node in prob_nodes.iter_mut() {
                prob_node.set_deriv(0, slot, occupation);
            }
        }
    }

    // Bethe free energy of the converged marginals: node terms for both
    // alphabet sizes, the scalar (1,1) pair log-potential, and the (3,3)
    // pair Bethe term. (1,3) pairs were already absorbed into nodes3's
    // prior and must not be counted again.
    pub fn calculate_energy_from_marginals(&self) -> f64 {
        let mut energy = 0.0;
        for i in 0..self.nodes1.n_elem() {
            energy += self.nodes1.node_free_energy(i);
        }
        for i in 0..self.nodes3.n_elem() {
            energy += self.nodes3.node_free_energy(i);
        }
        for e in 0..self.edges11.n_edge() {
            energy += -self.edges11.prob_at(0, e).ln();
        }
        for e in 0..self.edges33.n_edge() {
            energy += self.edges33.edge_free_energy(e, &self.nodes3, &self.nodes3);
        }
        energy
    }

    // Runs one full evaluation cycle. The only entry point external
    // callers (the outer minimizer) are expected to use once per
    // evaluation; it is not itself an outer optimization loop.
    pub fn compute_value<G: InteractionGraph, P: ProbNode>(
        &mut self,
        igraph: &mut G,
        prob_nodes: &mut [P],
        mode: EvalMode,
    ) -> Result<ComputeOutcome> {
        self.fill_holders(&*igraph, &*prob_nodes)?;
        let (iterations, max_deviation) = self.solve_for_marginals();
        if iterations >= self.config.max_iter() && max_deviation > self.config.tol() {
            warn!(
                "rotamer BP did not converge in {} iterations (max_deviation={:.3e} > tol={:.3e})",
                iterations, max_deviation, self.config.tol()
            );
        }
        self.propagate_derivatives(igraph, prob_nodes);
        let potential = match mode {
            EvalMode::MarginalsOnly => None,
            EvalMode::WithPotential => Some(self.calculate_energy_from_marginals()),
        };
        Ok(ComputeOutcome {
            iterations,
            max_deviation,
            potential,
        })
    }

    // Per-residue free energies: single-node contribution plus half of
    // each incident edge's contribution, indexed by the first bead of
    // each residue in `igraph`'s bead order.
    pub fn residue_free_energies<G: InteractionGraph>(&self, igraph: &G) -> Vec<f64> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        // nodes3's residue-slot index doesn't line up with `out`'s
        // position (out also holds n_rot=1 residues interleaved in
        // first-appearance order), so track the mapping explicitly
        // rather than assuming the two index spaces coincide.
        let mut nodes3_positions: std::collections::HashMap<usize, usize> =
            std::collections::HashMap::new();

        for n in 0..igraph.n_elem1() {
            let info = match ids::decode(igraph.id1(n)) {
                Ok(info) => info,
                Err(_) => continue,
            };
            let key = (info.n_rot, info.residue_index);
            if !seen.insert(key) {
                continue;
            }
            let residue_index = info.residue_index as usize;
            let node_fe = match ResidueAlphabet::from_n_rot(info.n_rot) {
                Ok(ResidueAlphabet::One) => self.nodes1.node_free_energy(residue_index),
                Ok(ResidueAlphabet::Three) => {
                    nodes3_positions.insert(residue_index, out.len());
                    self.nodes3.node_free_energy(residue_index)
                }
                Err(_) => continue,
            };
            out.push(node_fe);
        }

        for e in 0..self.edges33.n_edge() {
            let fe = self.edges33.edge_free_energy(e, &self.nodes3, &self.nodes3);
            let (n1, n2) = self.edges33.edge_endpoints(e);
            if let Some(&pos1) = nodes3_positions.get(&n1) {
                out[pos1] += fe / 2.0;
            }
            if let Some(&pos2) = nodes3_positions.get(&n2) {
                out[pos2] += fe / 2.0;
            }
        }

        out
    }

    // Expected single-body energy of `prob_node_index` under the
    // converged marginal, i.e. Sum over beads of occupation * one-body
    // value for that provider.
    pub fn rotamer_1body_energy<G: InteractionGraph, P: ProbNode>(
        &self,
        igraph: &G,
        prob_nodes: &[P],
        prob_node_index: usize,
    ) -> f64 {
        let provider = &prob_nodes[prob_node_index];
        let mut total = 0.0;
        for n in 0..igraph.n_elem1() {
            let info = match ids::decode(igraph.id1(n)) {
                Ok(info) => info,
                Err(_) => continue,
            };
            let occupation = match ResidueAlphabet::from_n_rot(info.n_rot) {
                Ok(ResidueAlphabet::One) => {
                    self.nodes1.cur_belief(0, info.residue_index as usize)
                }
                Ok(ResidueAlphabet::Three) => self
                    .nodes3
                    .cur_belief(info.rot as usize, info.residue_index as usize),
                Err(_) => continue,
            };
            let bead_index = igraph.loc1(n);
            total += occupation * provider.value(0, bead_index);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction_graph::test_doubles::{FakeInteractionGraph, FakeProbNode};

    fn config(damping: f64, max_iter: usize, tol: f64, chunk: usize) -> BpConfig {
        BpConfig::new(damping, max_iter, tol, chunk).unwrap()
    }

    // A prob_node shorter than the position node's bead indices must raise
    // ShapeMismatch at fill_holders rather than panicking on out-of-bounds
    // indexing (spec.md §7).
    #[test]
    fn fill_holders_rejects_undersized_prob_node() {
        let mut solver =
            RotamerSolver::new(config(0.2, 100, 1e-6, 4), 1, 0, 0, 0, 0).unwrap();
        let igraph = FakeInteractionGraph::new(vec![ids::encode(0, 1, 0)], vec![2]);
        let prob_nodes = vec![FakeProbNode::new(vec![0.0, 0.0])];

        let result = solver.fill_holders(&igraph, &prob_nodes);
        assert!(matches!(
            result,
            Err(RotamerError::ShapeMismatch { expected: 2, found: 3, .. })
        ));
    }

    // S1: one residue, n_rot=1, no edges, zero one-body energy.
    #[test]
    fn scenario_s1_trivial_single_residue() {
        let mut solver =
            RotamerSolver::new(config(0.2, 100, 1e-6, 4), 1, 0, 0, 0, 0).unwrap();
        let mut igraph = FakeInteractionGraph::new(vec![ids::encode(0, 1, 0)], vec![0]);
        let mut prob_nodes = vec![FakeProbNode::new(vec![0.0])];

        let outcome = solver
            .compute_value(&mut igraph, &mut prob_nodes, EvalMode::WithPotential)
            .unwrap();

        assert!(outcome.potential.unwrap().abs() < 1e-6);
        assert!((prob_nodes[0].derivs[0] - 1.0).abs() < 1e-6);
    }

    // S2: two 3-rot residues, no edge. E[r,i] = [0, log 2, log 4].
    #[test]
    fn scenario_s2_two_independent_three_rot_residues() {
        let mut solver =
            RotamerSolver::new(config(0.2, 100, 1e-6, 4), 0, 2, 0, 0, 0).unwrap();
        let ids_vec = vec![
            ids::encode(0, 3, 0),
            ids::encode(0, 3, 1),
            ids::encode(0, 3, 2),
            ids::encode(1, 3, 0),
            ids::encode(1, 3, 1),
            ids::encode(1, 3, 2),
        ];
        let locs = vec![0, 1, 2, 3, 4, 5];
        let mut igraph = FakeInteractionGraph::new(ids_vec, locs);
        let mut prob_nodes = vec![FakeProbNode::new(vec![
            0.0,
            2.0_f64.ln(),
            4.0_f64.ln(),
            0.0,
            2.0_f64.ln(),
            4.0_f64.ln(),
        ])];

        let outcome = solver
            .compute_value(&mut igraph, &mut prob_nodes, EvalMode::WithPotential)
            .unwrap();

        let expected_marginal = [4.0 / 7.0, 2.0 / 7.0, 1.0 / 7.0];
        for r in 0..3 {
            assert!((solver.nodes3.cur_belief(r, 0) - expected_marginal[r]).abs() < 1e-9);
            assert!((solver.nodes3.cur_belief(r, 1) - expected_marginal[r]).abs() < 1e-9);
        }
        let expected_potential = -2.0 * (7.0_f64 / 4.0).ln();
        assert!((outcome.potential.unwrap() - expected_potential).abs() < 1e-8);
    }

    // S3: (1,3) edge favoring B's rotamer 0 by delta E = log 10. After
    // move_edge_prob_to_node2, B's marginal should be (10, 1, 1)/12.
    #[test]
    fn scenario_s3_singleton_edge_folds_into_node() {
        let mut solver =
            RotamerSolver::new(config(0.2, 100, 1e-6, 4), 1, 1, 0, 1, 0).unwrap();
        let ids_vec = vec![
            ids::encode(0, 1, 0),
            ids::encode(0, 3, 0),
            ids::encode(0, 3, 1),
            ids::encode(0, 3, 2),
        ];
        let locs = vec![0, 1, 2, 3];
        let mut igraph = FakeInteractionGraph::new(ids_vec, locs);
        igraph.add_edge(0, 1, 0.0);
        igraph.add_edge(0, 2, 10.0_f64.ln());
        igraph.add_edge(0, 3, 10.0_f64.ln());
        let mut prob_nodes = vec![FakeProbNode::new(vec![0.0, 0.0, 0.0, 0.0])];

        solver
            .compute_value(&mut igraph, &mut prob_nodes, EvalMode::MarginalsOnly)
            .unwrap();

        let expected = [10.0 / 12.0, 1.0 / 12.0, 1.0 / 12.0];
        for r in 0..3 {
            assert!((solver.nodes3.cur_belief(r, 0) - expected[r]).abs() < 1e-9);
        }
    }

    // S4: two 3-rot residues with a (3,3) edge favoring matching rotamers.
    #[test]
    fn scenario_s4_converges_with_diagonal_enrichment() {
        let mut solver =
            RotamerSolver::new(config(0.2, 500, 1e-8, 4), 0, 2, 0, 0, 1).unwrap();
        let ids_vec = vec![
            ids::encode(0, 3, 0),
            ids::encode(0, 3, 1),
            ids::encode(0, 3, 2),
            ids::encode(1, 3, 0),
            ids::encode(1, 3, 1),
            ids::encode(1, 3, 2),
        ];
        let locs = vec![0, 1, 2, 3, 4, 5];
        let mut igraph = FakeInteractionGraph::new(ids_vec, locs);
        for r1 in 0..3 {
            for r2 in 0..3 {
                let value = if r1 == r2 { 0.0 } else { 1.0 };
                igraph.add_edge(r1, 3 + r2, value);
            }
        }
        let mut prob_nodes = vec![FakeProbNode::new(vec![0.0; 6])];

        let outcome = solver
            .compute_value(&mut igraph, &mut prob_nodes, EvalMode::MarginalsOnly)
            .unwrap();

        assert!(outcome.max_deviation <= 1e-8);
        let sum: f64 = (0..3).map(|r| solver.nodes3.cur_belief(r, 0)).sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(solver.nodes3.cur_belief(0, 0) > solver.nodes3.cur_belief(1, 0));
    }
}
