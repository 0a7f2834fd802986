// Packed classification grid for one region.
//
// Each voxel takes two bits in `classes` (four voxels per byte, low bits
// first) plus one bit in the `known` mask. A voxel whose known bit is clear
// reads as `Unknown` regardless of its class bits; clearing a voxel zeroes
// its class bits too so that equal grids compare equal.
//
// Out-of-range indices are a caller bug; the cache always derives indices
// from `RegionCoord::local_index`, which cannot exceed `REGION_VOLUME`.
//
// See also: `codec.rs` for how a grid is persisted, `waymark_nav::cache`
// for the copy-on-write ownership wrapped around it.

use crate::types::{Classification, REGION_VOLUME};

const CLASS_BYTES: usize = REGION_VOLUME / 4;
const KNOWN_WORDS: usize = REGION_VOLUME / 64;

/// Dense 2-bit classification array with a known mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionGrid {
    classes: Vec<u8>,
    known: Vec<u64>,
    known_count: u32,
}

impl Default for RegionGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionGrid {
    /// An all-unknown grid.
    pub fn new() -> Self {
        Self {
            classes: vec![0; CLASS_BYTES],
            known: vec![0; KNOWN_WORDS],
            known_count: 0,
        }
    }

    pub fn get(&self, index: usize) -> Classification {
        if !self.is_known(index) {
            return Classification::Unknown;
        }
        let byte = self.classes[index >> 2];
        Classification::from_bits(byte >> ((index & 3) * 2))
    }

    /// Record a classification. Setting `Unknown` clears the voxel.
    pub fn set(&mut self, index: usize, classification: Classification) {
        let Some(bits) = classification.bits() else {
            self.clear(index);
            return;
        };
        let shift = (index & 3) * 2;
        let byte = &mut self.classes[index >> 2];
        *byte = (*byte & !(0b11 << shift)) | (bits << shift);
        if !self.is_known(index) {
            self.known[index >> 6] |= 1u64 << (index & 63);
            self.known_count += 1;
        }
    }

    /// Forget a voxel. Returns `true` if it was known.
    pub fn clear(&mut self, index: usize) -> bool {
        if !self.is_known(index) {
            return false;
        }
        self.known[index >> 6] &= !(1u64 << (index & 63));
        self.classes[index >> 2] &= !(0b11 << ((index & 3) * 2));
        self.known_count -= 1;
        true
    }

    pub fn is_known(&self, index: usize) -> bool {
        self.known[index >> 6] & (1u64 << (index & 63)) != 0
    }

    /// Number of voxels with an observation.
    pub fn known_count(&self) -> u32 {
        self.known_count
    }

    /// True when nothing in the region has been observed.
    pub fn is_empty(&self) -> bool {
        self.known_count == 0
    }

    /// Copy every known voxel of `other` into voxels that are unknown here.
    /// Voxels already known in `self` win. Used when a region paged in from
    /// storage arrives after live observations were recorded in it.
    pub fn fill_unknown_from(&mut self, other: &RegionGrid) {
        for index in 0..REGION_VOLUME {
            if !self.is_known(index) && other.is_known(index) {
                self.set(index, other.get(index));
            }
        }
    }

    /// Raw packed class bytes (four voxels per byte).
    pub fn class_bytes(&self) -> &[u8] {
        &self.classes
    }

    /// Raw known mask as little-endian 64-bit words.
    pub fn known_words(&self) -> &[u64] {
        &self.known
    }

    /// Rebuild a grid from raw parts. Returns `None` if either slice has the
    /// wrong length.
    pub fn from_raw(classes: Vec<u8>, known: Vec<u64>) -> Option<Self> {
        if classes.len() != CLASS_BYTES || known.len() != KNOWN_WORDS {
            return None;
        }
        let known_count = known.iter().map(|w| w.count_ones()).sum();
        let mut grid = Self {
            classes,
            known,
            known_count,
        };
        // Normalise class bits of unknown voxels.
        for index in 0..REGION_VOLUME {
            if !grid.is_known(index) {
                grid.classes[index >> 2] &= !(0b11 << ((index & 3) * 2));
            }
        }
        Some(grid)
    }

    /// Iterate `(index, classification)` over every voxel, unknowns included.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Classification)> + '_ {
        (0..REGION_VOLUME).map(move |i| (i, self.get(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid_is_all_unknown() {
        let grid = RegionGrid::new();
        assert!(grid.is_empty());
        assert!(grid.iter().all(|(_, c)| c == Classification::Unknown));
    }

    #[test]
    fn set_get_and_overwrite() {
        let mut grid = RegionGrid::new();
        grid.set(5, Classification::Solid);
        grid.set(6, Classification::Water);
        assert_eq!(grid.get(5), Classification::Solid);
        assert_eq!(grid.get(6), Classification::Water);
        assert_eq!(grid.get(4), Classification::Unknown);
        assert_eq!(grid.known_count(), 2);

        grid.set(5, Classification::Air);
        assert_eq!(grid.get(5), Classification::Air);
        assert_eq!(grid.known_count(), 2);
    }

    #[test]
    fn air_is_distinct_from_unknown() {
        let mut grid = RegionGrid::new();
        grid.set(100, Classification::Air);
        assert!(grid.is_known(100));
        assert_eq!(grid.get(100), Classification::Air);
        assert_eq!(grid.get(101), Classification::Unknown);
    }

    #[test]
    fn clear_forgets_and_normalises() {
        let mut a = RegionGrid::new();
        a.set(7, Classification::Avoid);
        assert!(a.clear(7));
        assert!(!a.clear(7));
        assert_eq!(a.get(7), Classification::Unknown);
        assert_eq!(a, RegionGrid::new());
    }

    #[test]
    fn setting_unknown_clears() {
        let mut grid = RegionGrid::new();
        grid.set(9, Classification::Solid);
        grid.set(9, Classification::Unknown);
        assert!(grid.is_empty());
    }

    #[test]
    fn fill_unknown_keeps_live_observations() {
        let mut live = RegionGrid::new();
        live.set(1, Classification::Solid);

        let mut stored = RegionGrid::new();
        stored.set(1, Classification::Air);
        stored.set(2, Classification::Water);

        live.fill_unknown_from(&stored);
        assert_eq!(live.get(1), Classification::Solid);
        assert_eq!(live.get(2), Classification::Water);
        assert_eq!(live.known_count(), 2);
    }

    #[test]
    fn from_raw_rejects_bad_lengths_and_recounts() {
        assert!(RegionGrid::from_raw(vec![0; 3], vec![0; KNOWN_WORDS]).is_none());
        let mut known = vec![0u64; KNOWN_WORDS];
        known[0] = 0b101;
        let grid = RegionGrid::from_raw(vec![0xFF; CLASS_BYTES], known).unwrap();
        assert_eq!(grid.known_count(), 2);
        assert_eq!(grid.get(0), Classification::Avoid);
        assert_eq!(grid.get(1), Classification::Unknown);
        // Unknown voxels had their class bits zeroed.
        assert_eq!(grid.class_bytes()[0] & 0b1100, 0);
    }
}
