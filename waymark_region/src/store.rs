// Persistent storage for encoded region records.
//
// `RegionStore` is the narrow interface the cache pages through: load the
// bytes for `(dimension, region)` if any were saved, or save new bytes. The
// store does not interpret the bytes; `codec.rs` does. Implementations must
// be `Send + Sync` because the cache calls them from its I/O thread.
//
// Two implementations:
// - `MemoryRegionStore`: a mutex-guarded `BTreeMap`, for tests and for hosts
//   that persist nothing.
// - `DirRegionStore`: one file per region under `<root>/dim_<id>/`, named
//   `r.<x>.<y>.<z>.wmr`. Writes go to a temporary sibling and are renamed into
//   place so a crash mid-write never leaves a truncated record behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::types::{DimensionId, RegionCoord};

/// Byte-level persistence for region records.
pub trait RegionStore: Send + Sync {
    /// Fetch the stored record, or `None` if the region was never saved.
    fn load(&self, dimension: DimensionId, coord: RegionCoord) -> io::Result<Option<Vec<u8>>>;

    /// Store a record, replacing any previous one.
    fn save(&self, dimension: DimensionId, coord: RegionCoord, bytes: &[u8]) -> io::Result<()>;
}

/// In-memory store. Survives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryRegionStore {
    records: Mutex<BTreeMap<(DimensionId, RegionCoord), Vec<u8>>>,
}

impl MemoryRegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite a record directly, bypassing the codec. Test hook for
    /// corrupt-record handling.
    pub fn insert_raw(&self, dimension: DimensionId, coord: RegionCoord, bytes: Vec<u8>) {
        self.lock().insert((dimension, coord), bytes);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(DimensionId, RegionCoord), Vec<u8>>> {
        // A panic while holding the lock cannot leave a half-written map
        // entry, so a poisoned lock is still usable.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RegionStore for MemoryRegionStore {
    fn load(&self, dimension: DimensionId, coord: RegionCoord) -> io::Result<Option<Vec<u8>>> {
        Ok(self.lock().get(&(dimension, coord)).cloned())
    }

    fn save(&self, dimension: DimensionId, coord: RegionCoord, bytes: &[u8]) -> io::Result<()> {
        self.lock().insert((dimension, coord), bytes.to_vec());
        Ok(())
    }
}

/// Directory-backed store: one file per region.
#[derive(Debug, Clone)]
pub struct DirRegionStore {
    root: PathBuf,
}

impl DirRegionStore {
    /// Use `root` as the cache directory. It is created lazily on first save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn region_path(&self, dimension: DimensionId, coord: RegionCoord) -> PathBuf {
        self.root
            .join(format!("dim_{}", dimension.0))
            .join(format!("r.{}.{}.{}.wmr", coord.x, coord.y, coord.z))
    }
}

impl RegionStore for DirRegionStore {
    fn load(&self, dimension: DimensionId, coord: RegionCoord) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.region_path(dimension, coord)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, dimension: DimensionId, coord: RegionCoord, bytes: &[u8]) -> io::Result<()> {
        let path = self.region_path(dimension, coord);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("wmr.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path).inspect_err(|e| {
            log::warn!("region store: rename {} failed: {e}", tmp.display());
        })
    }
}
