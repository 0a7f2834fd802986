// Per-chunk occupancy octrees for the flight planner.
//
// The flight variant asks one question millions of times: is this point
// inside something solid? Answering from the voxel cache would hash a
// region key per sample, so flight keeps its own index. Each 16x16 chunk
// column in XZ is split into 16³ cubes over the configured Y band, and each
// cube is a small octree whose leaves are uniformly empty or uniformly full.
// Open sky and solid ground collapse to a single leaf.
//
// `OccupancyIndex` maps chunk columns to immutable `ChunkOctrees` behind
// `Arc`s under an `RwLock`, so planners on other threads share it.
// Ingestion samples a `ClassificationView` (SOLID and AVOID count as
// occupied) and builds chunks in parallel with rayon.
//
// `OccupancyCursor` is a per-query accessor with a one-entry chunk cache:
// consecutive samples in the same chunk column skip the index lookup
// entirely, and `lookups()` counts how many times it had to go to the index.
// Points outside the Y band read as empty. Chunks missing from the index
// read as empty unless `unknown_chunk_solid` is set.
//
// See also: `trajectory.rs` which samples segments through a cursor.

use crate::cache::ClassificationView;
use crate::types::{Vec3, VoxelCoord};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};

const CUBE: i32 = 16;

/// Chunk column key: `(x >> 4, z >> 4)`.
pub type ChunkKey = (i32, i32);

pub fn chunk_key(x: i32, z: i32) -> ChunkKey {
    (x >> 4, z >> 4)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum OctNode {
    Empty,
    Full,
    Branch(Box<[OctNode; 8]>),
}

impl OctNode {
    /// Build the node covering the cube of side `size` at local `origin`.
    fn build(solid: &[bool], origin: (usize, usize, usize), size: usize) -> Self {
        if size == 1 {
            return if solid[cube_index(origin.0, origin.1, origin.2)] {
                OctNode::Full
            } else {
                OctNode::Empty
            };
        }
        let half = size / 2;
        let children: [OctNode; 8] = std::array::from_fn(|octant| {
            let child = (
                origin.0 + (octant & 1) * half,
                origin.1 + ((octant >> 1) & 1) * half,
                origin.2 + ((octant >> 2) & 1) * half,
            );
            OctNode::build(solid, child, half)
        });
        if children.iter().all(|c| *c == OctNode::Empty) {
            OctNode::Empty
        } else if children.iter().all(|c| *c == OctNode::Full) {
            OctNode::Full
        } else {
            OctNode::Branch(Box::new(children))
        }
    }

    fn is_solid(&self, x: usize, y: usize, z: usize) -> bool {
        let mut node = self;
        let mut half = CUBE as usize / 2;
        loop {
            match node {
                OctNode::Empty => return false,
                OctNode::Full => return true,
                OctNode::Branch(children) => {
                    let octant = usize::from(x & half != 0)
                        | usize::from(y & half != 0) << 1
                        | usize::from(z & half != 0) << 2;
                    node = &children[octant];
                    half /= 2;
                }
            }
        }
    }

    fn node_count(&self) -> usize {
        match self {
            OctNode::Branch(children) => 1 + children.iter().map(OctNode::node_count).sum::<usize>(),
            _ => 1,
        }
    }
}

fn cube_index(x: usize, y: usize, z: usize) -> usize {
    x + z * CUBE as usize + y * (CUBE * CUBE) as usize
}

/// Octrees for one chunk column, bottom cube first.
#[derive(Clone, Debug)]
pub struct ChunkOctrees {
    cubes: Vec<OctNode>,
}

impl ChunkOctrees {
    /// Sample the chunk column `key` from `view` over `min_y..min_y + 16 * cubes`.
    fn sample(view: &(impl ClassificationView + ?Sized), key: ChunkKey, min_y: i32, cubes: usize) -> Self {
        let (ox, oz) = (key.0 * CUBE, key.1 * CUBE);
        let mut solid = vec![false; (CUBE * CUBE * CUBE) as usize];
        let cubes = (0..cubes)
            .map(|c| {
                let oy = min_y + c as i32 * CUBE;
                for y in 0..CUBE {
                    for z in 0..CUBE {
                        for x in 0..CUBE {
                            let pos = VoxelCoord::new(ox + x, oy + y, oz + z);
                            solid[cube_index(x as usize, y as usize, z as usize)] =
                                view.classify(pos).is_blocking();
                        }
                    }
                }
                OctNode::build(&solid, (0, 0, 0), CUBE as usize)
            })
            .collect();
        Self { cubes }
    }

    /// Total octree nodes, for diagnostics.
    pub fn node_count(&self) -> usize {
        self.cubes.iter().map(OctNode::node_count).sum()
    }
}

/// Shared chunk-column occupancy index over a fixed Y band.
#[derive(Debug)]
pub struct OccupancyIndex {
    min_y: i32,
    max_y: i32,
    unknown_chunk_solid: bool,
    chunks: RwLock<FxHashMap<ChunkKey, Arc<ChunkOctrees>>>,
}

impl OccupancyIndex {
    pub fn new(min_y: i32, max_y: i32, unknown_chunk_solid: bool) -> Self {
        Self {
            min_y,
            max_y,
            unknown_chunk_solid,
            chunks: RwLock::new(FxHashMap::default()),
        }
    }

    fn cubes_per_chunk(&self) -> usize {
        ((self.max_y - self.min_y) / CUBE + 1) as usize
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn chunk(&self, key: ChunkKey) -> Option<Arc<ChunkOctrees>> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Build and store the given chunk columns from `view`, in parallel.
    /// Columns already present are rebuilt.
    pub fn ingest<V>(&self, view: &V, keys: &[ChunkKey])
    where
        V: ClassificationView + Sync + ?Sized,
    {
        let cubes = self.cubes_per_chunk();
        let built: Vec<(ChunkKey, Arc<ChunkOctrees>)> = keys
            .par_iter()
            .map(|&key| (key, Arc::new(ChunkOctrees::sample(view, key, self.min_y, cubes))))
            .collect();
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        for (key, octrees) in built {
            chunks.insert(key, octrees);
        }
    }

    /// Drop the column containing `pos` so the next flight re-ingests it.
    pub fn invalidate(&self, pos: VoxelCoord) {
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chunk_key(pos.x, pos.z));
    }

    pub fn cursor(&self) -> OccupancyCursor<'_> {
        OccupancyCursor {
            index: self,
            cached: None,
            lookups: 0,
        }
    }
}

/// Point-query accessor with a one-entry chunk cache.
pub struct OccupancyCursor<'a> {
    index: &'a OccupancyIndex,
    cached: Option<(ChunkKey, Option<Arc<ChunkOctrees>>)>,
    lookups: u64,
}

impl OccupancyCursor<'_> {
    pub fn is_solid_voxel(&mut self, x: i32, y: i32, z: i32) -> bool {
        if y < self.index.min_y || y > self.index.max_y {
            return false;
        }
        let key = chunk_key(x, z);
        if self.cached.as_ref().is_none_or(|(cached, _)| *cached != key) {
            self.lookups += 1;
            self.cached = Some((key, self.index.chunk(key)));
        }
        let Some((_, Some(chunk))) = &self.cached else {
            return self.index.unknown_chunk_solid;
        };
        let rel_y = y - self.index.min_y;
        let Some(cube) = chunk.cubes.get((rel_y / CUBE) as usize) else {
            return false;
        };
        cube.is_solid(
            (x & (CUBE - 1)) as usize,
            (rel_y % CUBE) as usize,
            (z & (CUBE - 1)) as usize,
        )
    }

    pub fn is_solid(&mut self, p: Vec3) -> bool {
        let v = p.voxel();
        self.is_solid_voxel(v.x, v.y, v.z)
    }

    /// Index lookups performed (cache misses).
    pub fn lookups(&self) -> u64 {
        self.lookups
    }
}
