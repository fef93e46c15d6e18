#![allow(dead_code)]

// Registration surface: a named constructor analogous to a plugin
// registry's node-creation entry, binding the string key "rotamer" to the
// one bead type this crate knows how to build a solver for. The outer
// engine's config group and position node remain external; this module
// only resolves the name and hands scalars to `RotamerSolver::new`.

use crate::config::BpConfig;
use crate::error::{Result, RotamerError};
use crate::solver::RotamerSolver;

pub const ROTAMER_NODE_NAME: &str = "rotamer";

// Stand-in for the outer engine's position-node handle: the capacity
// hints this crate needs to pre-size its holders, derived from the
// maximum `n_elem`/`n_edge` the position node's id set can ever produce.
pub trait PositionNode {
    fn max_elem1(&self) -> usize;
    fn max_elem3(&self) -> usize;
    fn max_edge11(&self) -> usize;
    fn max_edge13(&self) -> usize;
    fn max_edge33(&self) -> usize;
}

// Named constructor for the default bead type, taking `(config_group,
// position_node, prob_node_0, prob_node_1, …)` per spec.md §6 — the
// prob_node handles themselves are supplied per evaluation via
// `RotamerSolver::compute_value`, so only their count is checked here.
pub fn create_node<N: PositionNode>(
    name: &str,
    config: BpConfig,
    position_node: &N,
    prob_node_count: usize,
) -> Result<RotamerSolver> {
    if name != ROTAMER_NODE_NAME {
        return Err(RotamerError::InvalidConfig {
            field: "name",
            reason: "unknown bead type (only \"rotamer\" is registered)",
        });
    }
    if prob_node_count == 0 {
        return Err(RotamerError::ConfigMissing {
            field: "prob_nodes",
        });
    }

    RotamerSolver::new(
        config,
        position_node.max_elem1(),
        position_node.max_elem3(),
        position_node.max_edge11(),
        position_node.max_edge13(),
        position_node.max_edge33(),
    )
}
