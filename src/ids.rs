#![allow(dead_code)]

// Packed rotamer-id encoding shared between this crate and the external
// interaction graph. From least to most significant bit: `rot`, `n_rot`,
// `residue_index`, each `ID_FIELD_BITS` wide. The core never inspects
// anything above `residue_index`.
//
// The id itself is a `u32` (matches `InteractionGraph::id1`), so the two
// low fields must leave `residue_index` a non-negative number of bits:
// `2 * ID_FIELD_BITS` must be strictly less than 32. 8 bits per field is
// far more than `rot`/`n_rot` ever need (both stay under `UPPER_ROT`) and
// still leaves `residue_index` the top 16 bits of the id.

use crate::error::RotamerError;

// Width in bits of the `rot` and `n_rot` sub-fields packed into a bead id.
// `residue_index` takes whatever is left above `2 * ID_FIELD_BITS`.
pub const ID_FIELD_BITS: u32 = 8;

// One past the largest supported rotamer-alphabet size. Only 1 and 3 are
// actually implemented; other values are rejected at decode time.
pub const UPPER_ROT: u32 = 4;

const FIELD_MASK: u32 = (1 << ID_FIELD_BITS) - 1;

// `residue_index` occupies whatever is left above the two low fields —
// wider than `FIELD_MASK`, since it's the id's top field rather than a
// fixed `ID_FIELD_BITS`-wide slot.
const RESIDUE_INDEX_MASK: u32 = (1 << (32 - 2 * ID_FIELD_BITS)) - 1;

// A decoded bead id: which residue it belongs to, the size of that
// residue's rotamer alphabet, and the bead's current rotamer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedId {
    pub rot: u32,
    pub n_rot: u32,
    pub residue_index: u32,
}

// The two alphabet sizes this crate specializes storage and BP kernels
// for. `n_rot` values outside {1, 3} are a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueAlphabet {
    One,
    Three,
}

impl ResidueAlphabet {
    pub fn size(self) -> usize {
        match self {
            ResidueAlphabet::One => 1,
            ResidueAlphabet::Three => 3,
        }
    }

    pub fn from_n_rot(n_rot: u32) -> Result<Self, RotamerError> {
        match n_rot {
            1 => Ok(ResidueAlphabet::One),
            3 => Ok(ResidueAlphabet::Three),
            _ => Err(RotamerError::UnsupportedAlphabetSize { n_rot }),
        }
    }
}

// Packs a rotamer id from its three fields. Used by tests and by synthetic
// interaction graphs; the real graph produces ids in its own format.
pub fn encode(residue_index: u32, n_rot: u32, rot: u32) -> u32 {
    debug_assert!(rot < n_rot);
    debug_assert!(residue_index <= RESIDUE_INDEX_MASK && n_rot <= FIELD_MASK);
    (residue_index << (2 * ID_FIELD_BITS)) | (n_rot << ID_FIELD_BITS) | rot
}

// Decodes a packed bead id, validating both invariants from the data
// model: `n_rot` is one of the supported alphabet sizes, and `rot < n_rot`.
pub fn decode(id: u32) -> Result<DecodedId, RotamerError> {
    let rot = id & FIELD_MASK;
    let n_rot = (id >> ID_FIELD_BITS) & FIELD_MASK;
    let residue_index = id >> (2 * ID_FIELD_BITS);

    ResidueAlphabet::from_n_rot(n_rot)?;
    if rot >= n_rot {
        return Err(RotamerError::InvalidRotamerId { rot, n_rot });
    }

    Ok(DecodedId {
        rot,
        n_rot,
        residue_index,
    })
}

// Composite dedup key for a bead pair, shared by all three EdgeHolder
// instantiations so the `add_to_edge` dedup convention cannot drift
// between them. `id1` occupies the high 32 bits, per the "at least 32
// bits total" requirement.
//
// Takes residue-level ids (see `residue_key`), not raw bead ids: multiple
// beads with different `rot` contribute to the same edge (the prob table
// for that edge has one entry per (rot1, rot2) pair and is filled in by
// repeated `add_to_edge` calls), so `rot` must not participate in the
// dedup key or every bead pair would allocate its own edge.
pub fn edge_key(residue_id1: u32, residue_id2: u32) -> u64 {
    ((residue_id1 as u64) << 32) | residue_id2 as u64
}

// Strips the `rot` sub-field from a packed bead id, leaving only the
// `(n_rot, residue_index)` portion that identifies the residue itself.
pub fn residue_key(id: u32) -> u32 {
    id & !FIELD_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let id = encode(7, 3, 2);
        let decoded = decode(id).unwrap();
        assert_eq!(decoded.residue_index, 7);
        assert_eq!(decoded.n_rot, 3);
        assert_eq!(decoded.rot, 2);
    }

    #[test]
    fn rejects_rot_out_of_range() {
        // Hand-construct rather than going through encode(), which would
        // itself assert in debug builds.
        let bad = (5u32 << (2 * ID_FIELD_BITS)) | (3u32 << ID_FIELD_BITS) | 3u32;
        assert!(matches!(
            decode(bad),
            Err(RotamerError::InvalidRotamerId { rot: 3, n_rot: 3 })
        ));
    }

    #[test]
    fn rejects_unsupported_alphabet_size() {
        let bad = (0u32 << (2 * ID_FIELD_BITS)) | (2u32 << ID_FIELD_BITS) | 0u32;
        assert!(matches!(
            decode(bad),
            Err(RotamerError::UnsupportedAlphabetSize { n_rot: 2 })
        ));

        let too_big = (0u32 << (2 * ID_FIELD_BITS)) | (UPPER_ROT << ID_FIELD_BITS) | 0u32;
        assert!(matches!(
            decode(too_big),
            Err(RotamerError::UnsupportedAlphabetSize { .. })
        ));
    }

    #[test]
    fn edge_key_is_order_sensitive() {
        assert_ne!(edge_key(1, 2), edge_key(2, 1));
        assert_eq!(edge_key(1, 2), edge_key(1, 2));
    }

    #[test]
    fn residue_key_masks_out_rot() {
        let a = encode(3, 3, 0);
        let b = encode(3, 3, 2);
        assert_ne!(a, b);
        assert_eq!(residue_key(a), residue_key(b));
    }

    #[test]
    fn residue_alphabet_from_n_rot() {
        assert_eq!(ResidueAlphabet::from_n_rot(1).unwrap(), ResidueAlphabet::One);
        assert_eq!(
            ResidueAlphabet::from_n_rot(3).unwrap(),
            ResidueAlphabet::Three
        );
        assert!(ResidueAlphabet::from_n_rot(2).is_err());
    }
}
