#![allow(dead_code)]

// A 2-D array of shape (R, E), storing R floats per element for E
// elements, row-major over R. Backed by `ndarray::Array2` so per-element
// (column) and per-component (row) slices are plain views with no extra
// bookkeeping.

use ndarray::{Array2, ArrayView1, ArrayViewMut1, Axis};

#[derive(Debug, Clone)]
pub struct NodeStore {
    data: Array2<f64>, // shape (r, e)
}

impl NodeStore {
    pub fn new(r: usize, e: usize) -> Self {
        NodeStore {
            data: Array2::zeros((r, e)),
        }
    }

    pub fn num_components(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn num_elements(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    pub fn get(&self, comp: usize, elem: usize) -> f64 {
        self.data[[comp, elem]]
    }

    pub fn set(&mut self, comp: usize, elem: usize, value: f64) {
        self.data[[comp, elem]] = value;
    }

    // All R components of a single element, e.g. the belief vector at
    // residue `elem`.
    pub fn column(&self, elem: usize) -> ArrayView1<f64> {
        self.data.index_axis(Axis(1), elem)
    }

    pub fn column_mut(&mut self, elem: usize) -> ArrayViewMut1<f64> {
        self.data.index_axis_mut(Axis(1), elem)
    }

    // Two disjoint mutable column views, for writing both endpoints of
    // an edge whose two residues happen to live in the same NodeStore
    // (e.g. both sides of a 3-vs-3 rotamer edge). Panics if `i == j`,
    // which should never happen since an edge never connects a residue
    // to itself.
    pub fn column_pair_mut(&mut self, i: usize, j: usize) -> (ArrayViewMut1<f64>, ArrayViewMut1<f64>) {
        debug_assert_ne!(i, j);
        self.data.multi_slice_mut((
            ndarray::s![.., i],
            ndarray::s![.., j],
        ))
    }

    // One component across all elements.
    pub fn row(&self, comp: usize) -> ArrayView1<f64> {
        self.data.index_axis(Axis(0), comp)
    }

    pub fn row_mut(&mut self, comp: usize) -> ArrayViewMut1<f64> {
        self.data.index_axis_mut(Axis(0), comp)
    }

    // Swaps contents with `other` in constant time (pointer/metadata
    // swap on the underlying buffers).
    pub fn swap(&mut self, other: &mut NodeStore) {
        std::mem::swap(&mut self.data, &mut other.data);
    }
}
