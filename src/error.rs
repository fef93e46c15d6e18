#![allow(dead_code)]

// Error taxonomy for the rotamer BP core. `NonConvergence` deliberately
// has no variant here: spec treats it as a recoverable outcome, reported
// as `(iter, max_deviation)` from `solve_for_marginals` plus a logged
// warning, never as an `Err`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RotamerError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RotamerError {
    #[error("rotamer index {rot} is out of range for alphabet size {n_rot}")]
    InvalidRotamerId { rot: u32, n_rot: u32 },

    #[error("unsupported rotamer alphabet size {n_rot} (only 1 and 3 are implemented)")]
    UnsupportedAlphabetSize { n_rot: u32 },

    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        expected: usize,
        found: usize,
        what: &'static str,
    },

    #[error("missing required configuration field `{field}`")]
    ConfigMissing { field: &'static str },

    #[error("configuration field `{field}` has invalid value: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_a_readable_message() {
        let err = RotamerError::InvalidRotamerId { rot: 3, n_rot: 3 };
        assert_eq!(
            err.to_string(),
            "rotamer index 3 is out of range for alphabet size 3"
        );
    }
}
