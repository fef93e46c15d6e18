#![allow(dead_code)]

// AoSoA-packed array with lane width 4: W floats per element for E'
// elements, padded up to a multiple of 4. For any quad `q = e / 4`, the
// block `[q*W*4 .. q*W*4 + W*4)` holds component 0 of 4 elements, then
// component 1 of 4 elements, and so on. This makes a whole-vector load of
// one lane-aligned element's W components a single contiguous read, which
// is the hot path inside the BP inner kernel.

const LANE: usize = 4;

#[derive(Debug, Clone)]
pub struct EdgeStore {
    w: usize,
    e_padded: usize, // capacity, always a multiple of LANE
    data: Vec<f64>,
}

impl EdgeStore {
    pub fn new(w: usize, e_capacity: usize) -> Self {
        let e_padded = Self::pad(e_capacity);
        EdgeStore {
            w,
            e_padded,
            data: vec![0.0; w * e_padded],
        }
    }

    fn pad(e: usize) -> usize {
        (e + LANE - 1) / LANE * LANE
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn capacity(&self) -> usize {
        self.e_padded
    }

    pub fn fill(&mut self, value: f64) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    fn scalar_index(&self, comp: usize, e: usize) -> usize {
        debug_assert!(comp < self.w);
        debug_assert!(e < self.e_padded);
        let quad_base = (e - e % LANE) * self.w;
        quad_base + comp * LANE + e % LANE
    }

    pub fn get(&self, comp: usize, e: usize) -> f64 {
        self.data[self.scalar_index(comp, e)]
    }

    pub fn set(&mut self, comp: usize, e: usize, value: f64) {
        let idx = self.scalar_index(comp, e);
        self.data[idx] = value;
    }

    // Whole-vector load of all W components for element `e`, via the
    // scalar path. Used off the hot loop (tests, diagnostics); the BP
    // inner kernel should prefer `lane`/`set_lane` on a lane-aligned quad.
    pub fn vector_at(&self, e: usize) -> Vec<f64> {
        (0..self.w).map(|comp| self.get(comp, e)).collect()
    }

    pub fn set_vector_at(&mut self, e: usize, values: &[f64]) {
        debug_assert_eq!(values.len(), self.w);
        for (comp, &value) in values.iter().enumerate() {
            self.set(comp, e, value);
        }
    }

    // One vectorizable load: the 4 values of component `comp` across the
    // 4 elements of quad `quad` (i.e. elements `[quad*4, quad*4+4)`).
    pub fn lane(&self, comp: usize, quad: usize) -> [f64; 4] {
        let base = quad * LANE * self.w + comp * LANE;
        [
            self.data[base],
            self.data[base + 1],
            self.data[base + 2],
            self.data[base + 3],
        ]
    }

    pub fn set_lane(&mut self, comp: usize, quad: usize, values: [f64; 4]) {
        let base = quad * LANE * self.w + comp * LANE;
        self.data[base..base + LANE].copy_from_slice(&values);
    }

    pub fn swap(&mut self, other: &mut EdgeStore) {
        debug_assert_eq!(self.w, other.w);
        std::mem::swap(&mut self.data, &mut other.data);
        std::mem::swap(&mut self.e_padded, &mut other.e_padded);
    }
}
