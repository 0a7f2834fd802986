// Paged world cache: the engine's only view of terrain.
//
// `WorldCache` holds one `RegionGrid` per resident 16³ region, keyed by
// `RegionCoord`, for a single dimension. It is owned by the tick thread and
// is the only thing that mutates cached terrain. Searches read terrain
// through `CacheSnapshot`, an immutable view taken at search start.
//
// Copy-on-write: the region map and every grid sit behind `Arc`s. A snapshot
// clones the outer `Arc` only. Later writes go through `Arc::make_mut`,
// which copies the map (and then the single touched grid) the first time it
// is written after a snapshot, so a running search never observes a
// half-applied update and the tick thread never waits on a reader.
//
// Lookup order for `classify(pos)`:
// 1. The AVOID overlay (positions the retry ledger gave up on).
// 2. The resident region, if that voxel is known.
// 3. `DimensionProfile` synthesis: below `min_y` is AVOID (void), above
//    `max_y` is AIR, the floor and roof bands are SOLID.
// 4. Otherwise UNKNOWN.
// Classification never mutates; observed values always beat synthesized
// ones.
//
// Observation: `observe()` records a sample (UNKNOWN clears it). Block-change
// notifications call `invalidate()`, which clears the voxel and queues it
// for re-sampling; `refresh_observations()` drains that queue against the
// host's `TerrainSource` and scans a few whole regions near the agent each
// tick, nearest first, so the cache learns terrain it has not seen yet.
//
// Paging: `maintain()` evicts regions beyond `keep_radius` (and the farthest
// ones beyond `max_resident_regions`), handing their encoded bytes to a
// dedicated I/O thread, and asks that thread to load stored records for
// absent regions within `load_radius`. Results are pumped back on the tick
// thread without blocking. A loaded record only fills voxels that are still
// UNKNOWN, so live observations always win. A record that fails to decode is
// logged and treated as a miss.
//
// See also: `waymark_region` for the grid, codec and store, `graph.rs` which
// reads terrain through `ClassificationView`, `navigator.rs` which drives
// observation and paging once per tick.

use crate::config::{CacheParams, DimensionProfile};
use crate::host::TerrainSource;
use crate::types::VoxelCoord;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use waymark_region::{
    Classification, DimensionId, REGION_SIZE, RegionCoord, RegionGrid, RegionStore, decode_region,
    encode_region,
};

type RegionMap = FxHashMap<RegionCoord, Arc<RegionGrid>>;

/// Read-only terrain queries. Implemented by the live cache and by
/// snapshots, so the movement graph works against either.
pub trait ClassificationView {
    fn classify(&self, pos: VoxelCoord) -> Classification;
}

/// Lookup shared by the cache and its snapshots.
fn classify_in(
    regions: &RegionMap,
    avoid: &FxHashSet<VoxelCoord>,
    profile: &DimensionProfile,
    pos: VoxelCoord,
) -> Classification {
    if avoid.contains(&pos) {
        return Classification::Avoid;
    }
    let observed = regions
        .get(&pos.region())
        .map(|grid| grid.get(RegionCoord::local_index(pos.x, pos.y, pos.z)))
        .unwrap_or(Classification::Unknown);
    if observed != Classification::Unknown {
        return observed;
    }
    synthesize(profile, pos).unwrap_or(Classification::Unknown)
}

/// Classification implied by the dimension's generation rules alone.
pub fn synthesize(profile: &DimensionProfile, pos: VoxelCoord) -> Option<Classification> {
    let in_band = |band: Option<(i32, i32)>| band.is_some_and(|(lo, hi)| (lo..=hi).contains(&pos.y));
    if pos.y < profile.min_y {
        Some(Classification::Avoid)
    } else if pos.y > profile.max_y {
        Some(Classification::Air)
    } else if in_band(profile.floor_band) || in_band(profile.roof_band) {
        Some(Classification::Solid)
    } else {
        None
    }
}

/// Immutable view of the cache at one instant.
#[derive(Clone, Debug)]
pub struct CacheSnapshot {
    regions: Arc<RegionMap>,
    avoid: Arc<FxHashSet<VoxelCoord>>,
    profile: DimensionProfile,
}

impl CacheSnapshot {
    pub fn resident_regions(&self) -> usize {
        self.regions.len()
    }

    /// Coordinates of every region the snapshot holds, in no order.
    pub fn region_coords(&self) -> impl Iterator<Item = RegionCoord> + '_ {
        self.regions.keys().copied()
    }
}

impl ClassificationView for CacheSnapshot {
    fn classify(&self, pos: VoxelCoord) -> Classification {
        classify_in(&self.regions, &self.avoid, &self.profile, pos)
    }
}

/// Counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub resident_regions: usize,
    pub observations: u64,
    pub invalidations: u64,
    pub region_scans: u64,
    pub loads_requested: u64,
    pub loads_applied: u64,
    pub saves_requested: u64,
    pub load_failures: u64,
    pub save_failures: u64,
    pub decode_failures: u64,
}

// ---------------------------------------------------------------------------
// I/O thread
// ---------------------------------------------------------------------------

enum IoRequest {
    Load(RegionCoord),
    Save(RegionCoord, Vec<u8>),
    Shutdown,
}

enum IoResult {
    Loaded {
        coord: RegionCoord,
        outcome: io::Result<Option<Vec<u8>>>,
    },
    Saved {
        coord: RegionCoord,
        outcome: io::Result<()>,
    },
}

/// Owns the storage thread. Requests are served in order.
struct RegionIo {
    requests: Sender<IoRequest>,
    results: Receiver<IoResult>,
    handle: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl RegionIo {
    fn spawn(store: Arc<dyn RegionStore>, dimension: DimensionId) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<IoRequest>();
        let (result_tx, result_rx) = mpsc::channel::<IoResult>();
        let handle = thread::Builder::new()
            .name(format!("waymark-io-{dimension}"))
            .spawn(move || {
                for request in request_rx {
                    let result = match request {
                        IoRequest::Load(coord) => IoResult::Loaded {
                            coord,
                            outcome: store.load(dimension, coord),
                        },
                        IoRequest::Save(coord, bytes) => IoResult::Saved {
                            coord,
                            outcome: store.save(dimension, coord, &bytes),
                        },
                        IoRequest::Shutdown => break,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("cache: failed to spawn I/O thread: {e}");
                None
            }
        };
        Self {
            requests: request_tx,
            results: result_rx,
            handle,
            in_flight: 0,
        }
    }

    fn send(&mut self, request: IoRequest) -> bool {
        if self.requests.send(request).is_ok() {
            self.in_flight += 1;
            true
        } else {
            log::warn!("cache: I/O thread is gone, request dropped");
            false
        }
    }

    fn try_next(&mut self) -> Option<IoResult> {
        match self.results.try_recv() {
            Ok(result) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = 0;
                None
            }
        }
    }

    fn next_before(&mut self, deadline: Instant) -> Option<IoResult> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.results.recv_timeout(wait) {
            Ok(result) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(result)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.in_flight = 0;
                None
            }
        }
    }
}

impl Drop for RegionIo {
    fn drop(&mut self) {
        let _ = self.requests.send(IoRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// WorldCache
// ---------------------------------------------------------------------------

pub struct WorldCache {
    dimension: DimensionId,
    params: CacheParams,
    regions: Arc<RegionMap>,
    avoid: Arc<FxHashSet<VoxelCoord>>,
    /// Voxels invalidated by block changes, awaiting re-sampling.
    dirty: FxHashSet<VoxelCoord>,
    /// Regions sampled from the live world; `false` if some voxels were not
    /// loaded by the host at the time.
    scanned: FxHashMap<RegionCoord, bool>,
    /// Regions whose stored record has been merged or found absent.
    store_checked: FxHashSet<RegionCoord>,
    pending_loads: FxHashSet<RegionCoord>,
    center: Option<RegionCoord>,
    io: RegionIo,
    stats: CacheStats,
}

impl WorldCache {
    pub fn new(dimension: DimensionId, params: CacheParams, store: Arc<dyn RegionStore>) -> Self {
        Self {
            dimension,
            params,
            regions: Arc::new(RegionMap::default()),
            avoid: Arc::new(FxHashSet::default()),
            dirty: FxHashSet::default(),
            scanned: FxHashMap::default(),
            store_checked: FxHashSet::default(),
            pending_loads: FxHashSet::default(),
            center: None,
            io: RegionIo::spawn(store, dimension),
            stats: CacheStats::default(),
        }
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    pub fn profile(&self) -> &DimensionProfile {
        &self.params.profile
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            regions: Arc::clone(&self.regions),
            avoid: Arc::clone(&self.avoid),
            profile: self.params.profile.clone(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            resident_regions: self.regions.len(),
            ..self.stats
        }
    }

    pub fn is_resident(&self, coord: RegionCoord) -> bool {
        self.regions.contains_key(&coord)
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Record a sample of the live world. `Unknown` invalidates.
    pub fn observe(&mut self, pos: VoxelCoord, class: Classification) {
        if class == Classification::Unknown {
            self.invalidate(pos);
            return;
        }
        let grid = Arc::make_mut(&mut self.regions)
            .entry(pos.region())
            .or_insert_with(|| Arc::new(RegionGrid::new()));
        Arc::make_mut(grid).set(RegionCoord::local_index(pos.x, pos.y, pos.z), class);
        self.stats.observations += 1;
    }

    /// Forget a voxel and queue it for re-sampling. Returns whether a known
    /// value was cleared.
    pub fn invalidate(&mut self, pos: VoxelCoord) -> bool {
        self.dirty.insert(pos);
        self.stats.invalidations += 1;
        let region = pos.region();
        let index = RegionCoord::local_index(pos.x, pos.y, pos.z);
        let known = self
            .regions
            .get(&region)
            .is_some_and(|grid| grid.is_known(index));
        if !known {
            return false;
        }
        if let Some(grid) = Arc::make_mut(&mut self.regions).get_mut(&region) {
            Arc::make_mut(grid).clear(index)
        } else {
            false
        }
    }

    /// Number of voxels waiting to be re-sampled.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Re-sample invalidated voxels, then scan up to `region_scans_per_tick`
    /// regions around `agent` that have not been fully sampled yet.
    pub fn refresh_observations(&mut self, terrain: &dyn TerrainSource, agent: VoxelCoord) {
        let dirty: Vec<VoxelCoord> = self.dirty.drain().collect();
        for pos in dirty {
            let class = terrain.classification_of(pos);
            if class != Classification::Unknown {
                self.observe(pos, class);
            }
        }

        let center = agent.region();
        let r = self.params.scan_radius as i32;
        let mut candidates = Vec::new();
        for dy in -r..=r {
            for dz in -r..=r {
                for dx in -r..=r {
                    let coord = RegionCoord::new(center.x + dx, center.y + dy, center.z + dz);
                    if !self.region_in_band(coord) {
                        continue;
                    }
                    let retry = match self.scanned.get(&coord) {
                        Some(true) => continue,
                        Some(false) => 1u8,
                        None => 0u8,
                    };
                    candidates.push((retry, coord.chebyshev_distance(center), coord));
                }
            }
        }
        candidates.sort_unstable();
        for (_, _, coord) in candidates.into_iter().take(self.params.region_scans_per_tick) {
            self.scan_region(terrain, coord);
        }
    }

    fn scan_region(&mut self, terrain: &dyn TerrainSource, coord: RegionCoord) {
        let (ox, oy, oz) = coord.origin();
        let mut grid = self
            .regions
            .get(&coord)
            .map(|grid| RegionGrid::clone(grid))
            .unwrap_or_default();
        let mut complete = true;
        let mut sampled = 0u64;
        for y in oy..oy + REGION_SIZE {
            for z in oz..oz + REGION_SIZE {
                for x in ox..ox + REGION_SIZE {
                    let class = terrain.classification_of(VoxelCoord::new(x, y, z));
                    if class == Classification::Unknown {
                        complete = false;
                        continue;
                    }
                    grid.set(RegionCoord::local_index(x, y, z), class);
                    sampled += 1;
                }
            }
        }
        if !grid.is_empty() {
            Arc::make_mut(&mut self.regions).insert(coord, Arc::new(grid));
        }
        self.scanned.insert(coord, complete);
        self.stats.region_scans += 1;
        self.stats.observations += sampled;
        log::trace!("cache: scanned {coord} ({sampled} voxels, complete={complete})");
    }

    fn region_in_band(&self, coord: RegionCoord) -> bool {
        let lo = self.params.profile.min_y >> 4;
        let hi = self.params.profile.max_y >> 4;
        (lo..=hi).contains(&coord.y)
    }

    // -----------------------------------------------------------------------
    // AVOID overlay
    // -----------------------------------------------------------------------

    /// Force `pos` to read as AVOID until `clear_avoid_marks()`.
    pub fn mark_avoid(&mut self, pos: VoxelCoord) {
        Arc::make_mut(&mut self.avoid).insert(pos);
    }

    pub fn is_avoid_marked(&self, pos: VoxelCoord) -> bool {
        self.avoid.contains(&pos)
    }

    pub fn clear_avoid_marks(&mut self) {
        if !self.avoid.is_empty() {
            self.avoid = Arc::new(FxHashSet::default());
        }
    }

    // -----------------------------------------------------------------------
    // Paging
    // -----------------------------------------------------------------------

    /// Evict distant regions, request loads for nearby ones, and apply any
    /// finished I/O. Never blocks.
    pub fn maintain(&mut self, agent: VoxelCoord) {
        let center = agent.region();
        self.center = Some(center);
        self.evict_around(center);
        self.request_loads_around(center);
        self.pump_io();
    }

    fn evict_around(&mut self, center: RegionCoord) {
        let keep = self.params.keep_radius;
        self.store_checked
            .retain(|coord| coord.chebyshev_distance(center) <= keep);
        self.scanned
            .retain(|coord, _| coord.chebyshev_distance(center) <= keep);

        let mut by_distance: Vec<(u32, RegionCoord)> = self
            .regions
            .keys()
            .map(|&coord| (coord.chebyshev_distance(center), coord))
            .collect();
        // Farthest first; coordinate order breaks ties deterministically.
        by_distance.sort_unstable_by(|a, b| b.cmp(a));

        let mut resident = by_distance.len();
        let mut evicted = Vec::new();
        for (distance, coord) in by_distance {
            if distance <= keep && resident <= self.params.max_resident_regions {
                break;
            }
            evicted.push(coord);
            resident -= 1;
        }
        if evicted.is_empty() {
            return;
        }

        let regions = Arc::make_mut(&mut self.regions);
        let mut outgoing = Vec::with_capacity(evicted.len());
        for coord in evicted {
            if let Some(grid) = regions.remove(&coord)
                && !grid.is_empty()
            {
                outgoing.push((coord, encode_region(self.dimension, coord, &grid)));
            }
            self.scanned.remove(&coord);
            self.store_checked.remove(&coord);
        }
        log::debug!("cache: evicting {} regions around {center}", outgoing.len());
        for (coord, bytes) in outgoing {
            if self.io.send(IoRequest::Save(coord, bytes)) {
                self.stats.saves_requested += 1;
            }
        }
    }

    fn request_loads_around(&mut self, center: RegionCoord) {
        let r = self.params.load_radius as i32;
        for dy in -r..=r {
            for dz in -r..=r {
                for dx in -r..=r {
                    let coord = RegionCoord::new(center.x + dx, center.y + dy, center.z + dz);
                    if !self.region_in_band(coord)
                        || self.store_checked.contains(&coord)
                        || self.pending_loads.contains(&coord)
                    {
                        continue;
                    }
                    if self.io.send(IoRequest::Load(coord)) {
                        self.pending_loads.insert(coord);
                        self.stats.loads_requested += 1;
                    }
                }
            }
        }
    }

    /// Apply finished I/O without blocking.
    pub fn pump_io(&mut self) {
        while let Some(result) = self.io.try_next() {
            self.apply_io(result);
        }
    }

    /// Block until every outstanding I/O request has finished or `timeout`
    /// elapses. Returns whether the queue drained.
    pub fn wait_for_io(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.io.in_flight > 0 {
            match self.io.next_before(deadline) {
                Some(result) => self.apply_io(result),
                None => return self.io.in_flight == 0,
            }
        }
        true
    }

    fn apply_io(&mut self, result: IoResult) {
        match result {
            IoResult::Saved { coord, outcome } => {
                if let Err(e) = outcome {
                    self.stats.save_failures += 1;
                    log::warn!("cache: saving {} {coord} failed: {e}", self.dimension);
                }
            }
            IoResult::Loaded { coord, outcome } => {
                self.pending_loads.remove(&coord);
                let out_of_range = self
                    .center
                    .is_some_and(|c| coord.chebyshev_distance(c) > self.params.keep_radius);
                if out_of_range {
                    return;
                }
                self.store_checked.insert(coord);
                match outcome {
                    Ok(Some(bytes)) => self.merge_loaded(coord, &bytes),
                    Ok(None) => {}
                    Err(e) => {
                        self.stats.load_failures += 1;
                        log::warn!("cache: loading {} {coord} failed: {e}", self.dimension);
                    }
                }
            }
        }
    }

    fn merge_loaded(&mut self, coord: RegionCoord, bytes: &[u8]) {
        let loaded = match decode_region(bytes, self.dimension, coord) {
            Ok(grid) => grid,
            Err(e) => {
                self.stats.decode_failures += 1;
                log::warn!("cache: discarding stored {} {coord}: {e}", self.dimension);
                return;
            }
        };
        let regions = Arc::make_mut(&mut self.regions);
        match regions.get_mut(&coord) {
            Some(grid) => Arc::make_mut(grid).fill_unknown_from(&loaded),
            None if !loaded.is_empty() => {
                regions.insert(coord, Arc::new(loaded));
            }
            None => {}
        }
        self.stats.loads_applied += 1;
    }

    /// Persist every resident region and stop the I/O thread.
    pub fn close(mut self, timeout: Duration) -> CacheStats {
        let outgoing: Vec<(RegionCoord, Vec<u8>)> = self
            .regions
            .iter()
            .filter(|(_, grid)| !grid.is_empty())
            .map(|(&coord, grid)| (coord, encode_region(self.dimension, coord, grid)))
            .collect();
        for (coord, bytes) in outgoing {
            if self.io.send(IoRequest::Save(coord, bytes)) {
                self.stats.saves_requested += 1;
            }
        }
        if !self.wait_for_io(timeout) {
            log::warn!(
                "cache: {} I/O requests still pending at close",
                self.io.in_flight
            );
        }
        self.stats()
    }
}

impl ClassificationView for WorldCache {
    fn classify(&self, pos: VoxelCoord) -> Classification {
        classify_in(&self.regions, &self.avoid, &self.params.profile, pos)
    }
}
