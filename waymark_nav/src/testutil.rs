// Shared test fixtures: a sparse voxel world usable both as a cache view
// and as host terrain.

use crate::cache::ClassificationView;
use crate::host::TerrainSource;
use crate::types::VoxelCoord;
use rustc_hash::FxHashMap;
use waymark_region::Classification;

/// Sparse terrain: anything not set reads as `default`.
#[derive(Clone, Debug)]
pub(crate) struct SparseTerrain {
    pub voxels: FxHashMap<VoxelCoord, Classification>,
    pub default: Classification,
}

impl SparseTerrain {
    pub fn new() -> Self {
        Self {
            voxels: FxHashMap::default(),
            default: Classification::Unknown,
        }
    }

    /// A solid floor at y=63 over x,z in `-half..=half`, open air from 64 to
    /// 70, and a hollow from 50 to 62 above a second floor at 49 (so digging
    /// through the top floor exposes a drop).
    pub fn flat(half: i32) -> Self {
        let mut terrain = Self::new();
        for x in -half..=half {
            for z in -half..=half {
                terrain.set(VoxelCoord::new(x, 49, z), Classification::Solid);
                for y in 50..=62 {
                    terrain.set(VoxelCoord::new(x, y, z), Classification::Air);
                }
                terrain.set(VoxelCoord::new(x, 63, z), Classification::Solid);
                for y in 64..=70 {
                    terrain.set(VoxelCoord::new(x, y, z), Classification::Air);
                }
            }
        }
        terrain
    }

    pub fn set(&mut self, pos: VoxelCoord, class: Classification) {
        self.voxels.insert(pos, class);
    }

    pub fn remove(&mut self, pos: VoxelCoord) {
        self.voxels.remove(&pos);
    }

    /// Set every voxel in the inclusive box `a..=b`.
    pub fn fill(&mut self, a: VoxelCoord, b: VoxelCoord, class: Classification) {
        for x in a.x.min(b.x)..=a.x.max(b.x) {
            for y in a.y.min(b.y)..=a.y.max(b.y) {
                for z in a.z.min(b.z)..=a.z.max(b.z) {
                    self.set(VoxelCoord::new(x, y, z), class);
                }
            }
        }
    }
}

impl ClassificationView for SparseTerrain {
    fn classify(&self, pos: VoxelCoord) -> Classification {
        self.voxels.get(&pos).copied().unwrap_or(self.default)
    }
}

impl TerrainSource for SparseTerrain {
    fn classification_of(&self, pos: VoxelCoord) -> Classification {
        self.classify(pos)
    }
}
