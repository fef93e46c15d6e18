#![allow(dead_code)]

// Traits for the two external collaborators this crate drives but does
// not own: the pair interaction graph and the single-body probability
// providers. Production implementations live in the outer molecular
// mechanics engine; this crate only ever sees them through these traits.

// Supplies packed bead ids and pairwise edge values, and receives
// per-source-edge sensitivities written back by `propagate_derivatives`.
pub trait InteractionGraph {
    // Number of beads known to this graph.
    fn n_elem1(&self) -> usize;

    // Packed rotamer id of bead `n` (see `crate::ids`).
    fn id1(&self, n: usize) -> u32;

    // Index into the `prob_nodes` arrays for bead `n`.
    fn loc1(&self, n: usize) -> usize;

    // Number of candidate pairwise edges this graph has evaluated.
    fn n_edge(&self) -> usize;

    // The two bead indices (into the `id1`/`loc1` arrays) an edge connects.
    fn edge_endpoints(&self, e: usize) -> (usize, usize);

    // The raw pairwise potential value for edge `e`, fed through
    // `exp(-value)` by `fill_holders` before being multiplied into an
    // edge's prob table.
    fn edge_value(&self, e: usize) -> f64;

    // Writes back dE/d(edge_value) for the source edge `src_edge`.
    fn set_edge_sensitivity(&mut self, src_edge: usize, value: f64);
}

// Supplies additive per-bead one-body energies and receives per-bead
// occupation probabilities in their derivative slots.
pub trait ProbNode {
    // Number of bead elements this provider holds values for. Checked
    // against the position node's bead indices at the start of
    // `fill_holders` so a mismatched provider raises `ShapeMismatch`
    // there rather than panicking deeper in the one-body energy sum.
    fn len(&self) -> usize;

    // One-body energy contribution of component `component` for bead
    // `bead_index`.
    fn value(&self, component: usize, bead_index: usize) -> f64;

    // Writes the occupation probability (dFreeEnergy/dE1) for component
    // `component`, slot `slot`.
    fn set_deriv(&mut self, component: usize, slot: usize, value: f64);
}

// Minimal in-memory implementations used by this crate's own tests and by
// the demo harness in `main.rs`. Not meant to resemble a production
// pair-interaction graph or one-body provider. Kept as a regular (not
// `#[cfg(test)]`) module so integration tests under `tests/`, which link
// against the compiled rlib rather than the `--cfg test` build, can use it
// too.
pub mod test_doubles {
    use super::{InteractionGraph, ProbNode};

    pub struct FakeInteractionGraph {
        pub ids: Vec<u32>,
        pub locs: Vec<usize>,
        pub edges: Vec<(usize, usize)>,
        pub edge_values: Vec<f64>,
        pub sensitivities: Vec<f64>,
    }

    impl FakeInteractionGraph {
        pub fn new(ids: Vec<u32>, locs: Vec<usize>) -> Self {
            FakeInteractionGraph {
                ids,
                locs,
                edges: Vec::new(),
                edge_values: Vec::new(),
                sensitivities: Vec::new(),
            }
        }

        pub fn add_edge(&mut self, bead1: usize, bead2: usize, value: f64) -> usize {
            let idx = self.edges.len();
            self.edges.push((bead1, bead2));
            self.edge_values.push(value);
            self.sensitivities.push(0.0);
            idx
        }
    }

    impl InteractionGraph for FakeInteractionGraph {
        fn n_elem1(&self) -> usize {
            self.ids.len()
        }

        fn id1(&self, n: usize) -> u32 {
            self.ids[n]
        }

        fn loc1(&self, n: usize) -> usize {
            self.locs[n]
        }

        fn n_edge(&self) -> usize {
            self.edges.len()
        }

        fn edge_endpoints(&self, e: usize) -> (usize, usize) {
            self.edges[e]
        }

        fn edge_value(&self, e: usize) -> f64 {
            self.edge_values[e]
        }

        fn set_edge_sensitivity(&mut self, src_edge: usize, value: f64) {
            self.sensitivities[src_edge] = value;
        }
    }

    pub struct FakeProbNode {
        pub values: Vec<f64>,
        pub derivs: Vec<f64>,
    }

    impl FakeProbNode {
        pub fn new(values: Vec<f64>) -> Self {
            let derivs = vec![0.0; values.len()];
            FakeProbNode { values, derivs }
        }
    }

    impl ProbNode for FakeProbNode {
        fn len(&self) -> usize {
            self.values.len()
        }

        fn value(&self, _component: usize, bead_index: usize) -> f64 {
            self.values[bead_index]
        }

        fn set_deriv(&mut self, _component: usize, slot: usize, value: f64) {
            self.derivs[slot] = value;
        }
    }
}
