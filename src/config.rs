#![allow(dead_code)]

// Construction-time tunables for the BP solver, read once and never
// mutated afterwards. Mirrors the teacher's `SolverOptions`: a builder of
// setters plus a `default()` with conservative values, except validation
// here is fallible (`ConfigMissing`/`InvalidConfig`) rather than assumed,
// since these values originate outside this crate.

use crate::error::{Result, RotamerError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpConfig {
    damping: f64,
    max_iter: usize,
    tol: f64,
    iteration_chunk_size: usize,
}

impl BpConfig {
    // Validates the four tunables and returns a ready-to-use config.
    pub fn new(
        damping: f64,
        max_iter: usize,
        tol: f64,
        iteration_chunk_size: usize,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&damping) {
            return Err(RotamerError::InvalidConfig {
                field: "damping",
                reason: "must be in [0, 1]",
            });
        }
        if max_iter == 0 {
            return Err(RotamerError::InvalidConfig {
                field: "max_iter",
                reason: "must be positive",
            });
        }
        if !(tol > 0.0) {
            return Err(RotamerError::InvalidConfig {
                field: "tol",
                reason: "must be positive",
            });
        }
        if iteration_chunk_size == 0 || iteration_chunk_size > max_iter {
            return Err(RotamerError::InvalidConfig {
                field: "iteration_chunk_size",
                reason: "must be positive and at most max_iter",
            });
        }

        Ok(BpConfig {
            damping,
            max_iter,
            tol,
            iteration_chunk_size,
        })
    }

    // Builds a config from an optional config-group-style lookup, raising
    // `ConfigMissing` for whichever of the four fields is absent. Mirrors
    // how the outer engine's config group resolves attributes by name
    // before handing this crate plain scalars.
    pub fn from_optional_fields(
        damping: Option<f64>,
        max_iter: Option<usize>,
        tol: Option<f64>,
        iteration_chunk_size: Option<usize>,
    ) -> Result<Self> {
        let damping = damping.ok_or(RotamerError::ConfigMissing { field: "damping" })?;
        let max_iter = max_iter.ok_or(RotamerError::ConfigMissing { field: "max_iter" })?;
        let tol = tol.ok_or(RotamerError::ConfigMissing { field: "tol" })?;
        let iteration_chunk_size = iteration_chunk_size.ok_or(RotamerError::ConfigMissing {
            field: "iteration_chunk_size",
        })?;
        Self::new(damping, max_iter, tol, iteration_chunk_size)
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn tol(&self) -> f64 {
        self.tol
    }

    pub fn iteration_chunk_size(&self) -> usize {
        self.iteration_chunk_size
    }
}

impl Default for BpConfig {
    // Conservative defaults for a loopy-BP fixed point iteration: mild
    // damping, a generous iteration cap, and a chunked convergence check
    // every 4 sweeps so `max_deviation` isn't recomputed every iteration.
    fn default() -> Self {
        BpConfig {
            damping: 0.2,
            max_iter: 1000,
            tol: 1e-5,
            iteration_chunk_size: 4,
        }
    }
}
