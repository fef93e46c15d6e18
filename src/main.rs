// Demonstrative harness: builds a few synthetic bead graphs, runs the
// rotamer BP solver over each, and logs the outcome. Stands in for the
// teacher's "load instance -> construct -> run -> log" main loop, minus
// the on-disk instance format this crate has no use for.

use log::{debug, info};

use rotamer_bp::config::BpConfig;
use rotamer_bp::ids;
use rotamer_bp::interaction_graph::test_doubles::{FakeInteractionGraph, FakeProbNode};
use rotamer_bp::solver::{EvalMode, RotamerSolver};

fn main() {
    env_logger::init();
    debug!("rotamer BP demo harness starting");

    run_single_singleton_residue();
    run_two_independent_three_rot_residues();
    run_frustrated_three_cycle();
}

// One residue, n_rot=1, no edges, zero one-body energy: the trivial
// fixed point, potential should be ~0.
fn run_single_singleton_residue() {
    let mut solver =
        RotamerSolver::new(BpConfig::default(), 1, 0, 0, 0, 0).expect("valid config");
    let mut igraph = FakeInteractionGraph::new(vec![ids::encode(0, 1, 0)], vec![0]);
    let mut prob_nodes = vec![FakeProbNode::new(vec![0.0])];

    let outcome = solver
        .compute_value(&mut igraph, &mut prob_nodes, EvalMode::WithPotential)
        .expect("fill_holders succeeds on well-formed ids");

    info!(
        "scenario=trivial-singleton iterations={} potential={:.6}",
        outcome.iterations,
        outcome.potential.unwrap_or(f64::NAN)
    );
}

// Two three-rotamer residues with no edge between them: marginals should
// settle at the prior distribution implied by their one-body energies.
fn run_two_independent_three_rot_residues() {
    let mut solver =
        RotamerSolver::new(BpConfig::default(), 0, 2, 0, 0, 0).expect("valid config");
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
    let energies = vec![
        0.0,
        2.0_f64.ln(),
        4.0_f64.ln(),
        0.0,
        2.0_f64.ln(),
        4.0_f64.ln(),
    ];
    let mut prob_nodes = vec![FakeProbNode::new(energies)];

    let outcome = solver
        .compute_value(&mut igraph, &mut prob_nodes, EvalMode::WithPotential)
        .expect("fill_holders succeeds on well-formed ids");

    info!(
        "scenario=independent-3rot iterations={} max_deviation={:.3e} potential={:.6}",
        outcome.iterations,
        outcome.max_deviation,
        outcome.potential.unwrap_or(f64::NAN)
    );
}

// Frustrated 3-cycle of (3,3) edges with anti-correlating potentials:
// exercises the non-convergence path. The solver must still return
// well-formed, L1-normalized marginals even when it never settles below
// `tol` before `max_iter`.
fn run_frustrated_three_cycle() {
    let config = BpConfig::new(0.1, 50, 1e-10, 1).expect("valid config");
    let mut solver = RotamerSolver::new(config, 0, 3, 0, 0, 3).expect("valid config");

    let ids_vec = vec![
        ids::encode(0, 3, 0),
        ids::encode(0, 3, 1),
        ids::encode(0, 3, 2),
        ids::encode(1, 3, 0),
        ids::encode(1, 3, 1),
        ids::encode(1, 3, 2),
        ids::encode(2, 3, 0),
        ids::encode(2, 3, 1),
        ids::encode(2, 3, 2),
    ];
    let locs = (0..9).collect();
    let mut igraph = FakeInteractionGraph::new(ids_vec, locs);

    // Anti-correlating: favor r1 != r2 on each edge of the 3-cycle.
    let residues = [(0, 3), (3, 6), (6, 0)];
    for &(base1, base2) in residues.iter() {
        for r1 in 0..3 {
            for r2 in 0..3 {
                let value = if r1 == r2 { 1.0 } else { 0.0 };
                igraph.add_edge(base1 + r1, base2 + r2, value);
            }
        }
    }
    let mut prob_nodes = vec![FakeProbNode::new(vec![0.0; 9])];

    let outcome = solver
        .compute_value(&mut igraph, &mut prob_nodes, EvalMode::MarginalsOnly)
        .expect("fill_holders succeeds on well-formed ids");

    info!(
        "scenario=frustrated-3-cycle iterations={} max_deviation={:.3e}",
        outcome.iterations, outcome.max_deviation
    );
}
