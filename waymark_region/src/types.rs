// Shared types for region-level terrain caching.
//
// `Classification` is the small pathing tag stored per voxel. Four of its
// values are "observed" tags that fit in two bits; `Unknown` is the absence
// of an observation and is tracked separately by the grid's known mask.
//
// `RegionCoord` addresses an aligned 16x16x16 cube. Voxel-to-region mapping
// uses arithmetic shifts so negative coordinates land in the right region
// (voxel -1 is in region -1, not region 0).

use serde::{Deserialize, Serialize};
use std::fmt;

/// log2 of the region edge length.
pub const REGION_SHIFT: u32 = 4;

/// Region edge length in voxels.
pub const REGION_SIZE: i32 = 1 << REGION_SHIFT;

/// Voxels per region.
pub const REGION_VOLUME: usize = (REGION_SIZE * REGION_SIZE * REGION_SIZE) as usize;

const REGION_MASK: i32 = REGION_SIZE - 1;

/// Pathing classification of a single voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// Empty space the agent can occupy.
    Air,
    /// Anything the agent cannot pass through and can stand on.
    Solid,
    /// Swimmable fluid.
    Water,
    /// Passable in principle but must never be entered (hazards, lava, fire).
    Avoid,
    /// Not yet observed.
    #[default]
    Unknown,
}

impl Classification {
    /// Two-bit code for observed tags. `None` for `Unknown`, which has no
    /// two-bit encoding.
    pub fn bits(self) -> Option<u8> {
        match self {
            Self::Air => Some(0),
            Self::Solid => Some(1),
            Self::Water => Some(2),
            Self::Avoid => Some(3),
            Self::Unknown => None,
        }
    }

    /// Inverse of `bits()`. Only the low two bits are read.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Air,
            1 => Self::Solid,
            2 => Self::Water,
            _ => Self::Avoid,
        }
    }

    /// Symbol used by the run-length codec, where `Unknown` is 4.
    pub fn symbol(self) -> u8 {
        self.bits().unwrap_or(4)
    }

    pub fn from_symbol(symbol: u8) -> Option<Self> {
        match symbol {
            0..=3 => Some(Self::from_bits(symbol)),
            4 => Some(Self::Unknown),
            _ => None,
        }
    }

    /// True for tags the agent's body may occupy.
    pub fn is_passable(self) -> bool {
        matches!(self, Self::Air | Self::Water)
    }

    /// True for tags that can support the agent from below.
    pub fn is_support(self) -> bool {
        self == Self::Solid
    }

    /// True for tags that must never be entered.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Solid | Self::Avoid)
    }
}

/// Identifies one world/dimension. Cached regions are partitioned by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DimensionId(pub i32);

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dim{}", self.0)
    }
}

/// Coordinate of an aligned region, in region units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RegionCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The region containing voxel `(x, y, z)`.
    pub const fn containing(x: i32, y: i32, z: i32) -> Self {
        Self {
            x: x >> REGION_SHIFT,
            y: y >> REGION_SHIFT,
            z: z >> REGION_SHIFT,
        }
    }

    /// Voxel coordinate of this region's minimum corner.
    pub const fn origin(self) -> (i32, i32, i32) {
        (
            self.x << REGION_SHIFT,
            self.y << REGION_SHIFT,
            self.z << REGION_SHIFT,
        )
    }

    /// Flat index of voxel `(x, y, z)` within its region:
    /// `lx + lz * 16 + ly * 256`.
    pub const fn local_index(x: i32, y: i32, z: i32) -> usize {
        let lx = (x & REGION_MASK) as usize;
        let ly = (y & REGION_MASK) as usize;
        let lz = (z & REGION_MASK) as usize;
        lx + lz * REGION_SIZE as usize + ly * (REGION_SIZE * REGION_SIZE) as usize
    }

    /// Chebyshev distance in region units.
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
            .max((self.z - other.z).unsigned_abs())
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r({}, {}, {})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_cover_every_observed_tag() {
        for c in [
            Classification::Air,
            Classification::Solid,
            Classification::Water,
            Classification::Avoid,
        ] {
            let bits = c.bits().unwrap();
            assert!(bits < 4);
            assert_eq!(Classification::from_bits(bits), c);
        }
        assert_eq!(Classification::Unknown.bits(), None);
    }

    #[test]
    fn symbol_roundtrip_includes_unknown() {
        assert_eq!(Classification::Unknown.symbol(), 4);
        assert_eq!(Classification::from_symbol(4), Some(Classification::Unknown));
        assert_eq!(Classification::from_symbol(5), None);
    }

    #[test]
    fn negative_voxels_map_to_negative_regions() {
        assert_eq!(RegionCoord::containing(-1, 0, 0), RegionCoord::new(-1, 0, 0));
        assert_eq!(RegionCoord::containing(-16, 15, 16), RegionCoord::new(-1, 0, 1));
        assert_eq!(RegionCoord::containing(-17, -17, 0), RegionCoord::new(-2, -2, 0));
    }

    #[test]
    fn local_index_is_within_volume_and_unique_per_region() {
        let mut seen = vec![false; REGION_VOLUME];
        for y in -16..0 {
            for z in 32..48 {
                for x in -48..-32 {
                    let i = RegionCoord::local_index(x, y, z);
                    assert!(!seen[i], "duplicate local index {i}");
                    seen[i] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn origin_is_inverse_of_containing() {
        let r = RegionCoord::new(-3, 4, 7);
        let (x, y, z) = r.origin();
        assert_eq!(RegionCoord::containing(x, y, z), r);
        assert_eq!(RegionCoord::containing(x + 15, y + 15, z + 15), r);
    }

    #[test]
    fn chebyshev_distance_takes_largest_axis() {
        let a = RegionCoord::new(0, 0, 0);
        assert_eq!(a.chebyshev_distance(RegionCoord::new(2, -5, 1)), 5);
    }
}
