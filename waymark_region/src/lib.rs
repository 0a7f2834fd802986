// waymark_region: the on-disk and in-memory shape of cached terrain.
//
// This crate owns everything about a single region of cached voxel
// classifications: the tag enum, region addressing, the packed grid, the
// versioned binary record the grid is persisted as, and the storage trait
// the cache pages through. It knows nothing about pathfinding.
//
// Module overview:
// - `types.rs`: `Classification`, `DimensionId`, `RegionCoord`, region
//               geometry constants.
// - `grid.rs`:  `RegionGrid`, a 2-bit class array plus known mask.
// - `codec.rs`: Versioned record encode/decode (dense or run-length payload,
//               CRC-32 trailer). Unknown versions fail closed.
// - `store.rs`: `RegionStore` trait with in-memory and directory-backed
//               implementations.
//
// Dependencies: `crc32fast` for the record checksum, `thiserror` for
// `CodecError`, `log` for store diagnostics.

pub mod codec;
pub mod grid;
pub mod store;
pub mod types;

pub use codec::{CodecError, decode_region, encode_region};
pub use grid::RegionGrid;
pub use store::{DirRegionStore, MemoryRegionStore, RegionStore};
pub use types::{Classification, DimensionId, REGION_SIZE, REGION_VOLUME, RegionCoord};
