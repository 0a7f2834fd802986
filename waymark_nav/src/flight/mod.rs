// Long-range flight variant.
//
// Flight trades the voxel movement graph for a coarse binary occupancy field
// and a continuous trajectory search. `octree` holds the per-chunk occupancy
// index and its caching cursor; `trajectory` plans waypoint lines through
// it. The navigator feeds the index from cache snapshots and executes the
// resulting plan as a path of `Fly` movements.
//
// See also: `navigator.rs` (`submit_flight`).

pub mod octree;
pub mod trajectory;

pub use octree::{ChunkKey, ChunkOctrees, OccupancyCursor, OccupancyIndex, chunk_key};
pub use trajectory::{FlightPlan, SegmentProbe, plan_flight};
