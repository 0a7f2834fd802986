// The engine facade: one navigator per agent per dimension.
//
// `Navigator` owns the world cache, the movement graph, the search worker,
// the active `PathExecutor`, the retry ledger and the flight occupancy
// index, and drives them all from `tick()`. Hosts submit goals, feed block
// changes, and call `tick()` once per simulation tick with their terrain
// and agent sensor; each tick returns the primitive inputs to apply and the
// narrative events that happened.
//
// Tick order:
// 1. Observation and paging: re-sample dirty voxels, scan nearby regions,
//    evict/load regions, pump finished I/O.
// 2. A pending cancel ends the episode once the current movement is safe to
//    abandon.
// 3. A newly submitted goal starts its first search from the agent.
// 4. At most one search delivery is installed. A fresh path replaces the
//    executing one (deferred while the current movement is unsafe to
//    abandon); a continuation is spliced onto the executing provisional
//    path.
// 5. The executor steps. A failed movement charges the retry ledger at its
//    destination; a position out of retries is marked AVOID in the cache.
//    Either way a fresh search starts from the agent's current voxel.
// 6. Plan-ahead: a provisional path with few movements left gets a
//    continuation search from its end.
// 7. Arrival: with the path exhausted and the agent standing in the goal,
//    the episode ends as reached.
//
// Termination: every fresh search after the first counts as a replan, and
// an episode that exceeds `max_replans_per_goal` gives up. Searches that
// keep returning empty best-effort paths, or that cannot be started at all,
// give up as no-progress. Each episode ends with exactly one `EpisodeEnded`
// event.
//
// See also: `executor.rs`, `worker.rs`, `retry.rs`, `flight/` for the
// pieces, `event.rs` for what gets reported.

use crate::cache::{CacheSnapshot, CacheStats, WorldCache};
use crate::config::{PathingConfig, RetryResetPolicy};
use crate::cost::CostModel;
use crate::error::ConfigError;
use crate::event::{EpisodeOutcome, GiveUpReason, NavEvent, NavEventKind};
use crate::executor::{ExecStep, PathExecutor};
use crate::flight::{ChunkKey, OccupancyIndex, chunk_key, plan_flight};
use crate::goal::Goal;
use crate::graph::MovementGraph;
use crate::host::{AgentAction, AgentSensor, BlockChange, TerrainSource};
use crate::path::Path;
use crate::pathfinding::{FrontierSnapshot, SearchReport, SearchRequest, SearchResult, find_path};
use crate::retry::RetryLedger;
use crate::types::{Vec3, VoxelCoord};
use crate::worker::{JobPurpose, SearchTask, SearchWorker, WorkerMode};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use waymark_region::{DimensionId, RegionStore};

/// Consecutive empty best-effort results before an episode gives up.
const MAX_STALLED_SEARCHES: u32 = 3;

/// Extra chunks on each side of the straight flight line fed to the
/// occupancy index.
const FLIGHT_CORRIDOR_CHUNKS: i32 = 2;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifies one submitted goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoalHandle(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub enum EpisodeStatus {
    /// Nothing has been submitted yet.
    Idle,
    /// A goal is active and its path is being searched for.
    Searching,
    /// A goal is active and a path is executing.
    Executing,
    /// The last episode ended.
    Ended(EpisodeOutcome),
}

/// What one tick asks of the host, and what happened.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub actions: Vec<AgentAction>,
    pub events: Vec<NavEvent>,
}

#[derive(Clone, Debug)]
enum Target {
    Walk(Goal),
    Fly { point: Vec3, goal: Goal },
}

impl Target {
    fn goal(&self) -> &Goal {
        match self {
            Target::Walk(goal) | Target::Fly { goal, .. } => goal,
        }
    }
}

struct Episode {
    handle: GoalHandle,
    target: Target,
    needs_search: bool,
    installed_once: bool,
    cancel_requested: bool,
    replans: u32,
    stalled: u32,
}

pub struct Navigator {
    config: PathingConfig,
    graph: Arc<MovementGraph>,
    cache: WorldCache,
    worker: SearchWorker,
    executor: Option<PathExecutor>,
    /// Fresh path waiting for the current movement to become safe to drop.
    pending: Option<Path>,
    episode: Option<Episode>,
    last_outcome: Option<EpisodeOutcome>,
    retries: RetryLedger,
    occupancy: Arc<OccupancyIndex>,
    events: Vec<NavEvent>,
    tick: u64,
    next_handle: u64,
}

impl Navigator {
    pub fn new(
        config: PathingConfig,
        dimension: DimensionId,
        store: Arc<dyn RegionStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cost = Arc::new(CostModel::new(&config.physics, &config.costs));
        let graph = Arc::new(MovementGraph::new(cost, config.graph.clone()));
        let mode = if config.execution.background_search {
            WorkerMode::Background
        } else {
            WorkerMode::Inline
        };
        let occupancy = Arc::new(OccupancyIndex::new(
            config.flight.min_y,
            config.flight.max_y,
            config.flight.unknown_chunk_solid,
        ));
        log::info!("navigator: starting in {dimension} with {mode:?} search");
        Ok(Self {
            cache: WorldCache::new(dimension, config.cache.clone(), store),
            retries: RetryLedger::new(config.retry.max_retries),
            graph,
            worker: SearchWorker::new(mode),
            executor: None,
            pending: None,
            episode: None,
            last_outcome: None,
            occupancy,
            events: Vec::new(),
            tick: 0,
            next_handle: 1,
            config,
        })
    }

    pub fn config(&self) -> &PathingConfig {
        &self.config
    }

    pub fn cache(&self) -> &WorldCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut WorldCache {
        &mut self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn retries(&self) -> &RetryLedger {
        &self.retries
    }

    pub fn occupancy(&self) -> &Arc<OccupancyIndex> {
        &self.occupancy
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    // -----------------------------------------------------------------------
    // Host-facing API
    // -----------------------------------------------------------------------

    /// Start walking toward `goal`. Any active episode ends as canceled; its
    /// path keeps executing until the new path can safely replace it.
    pub fn submit_goal(&mut self, goal: Goal) -> GoalHandle {
        self.begin(Target::Walk(goal))
    }

    /// Start flying toward `point` through the occupancy index.
    pub fn submit_flight(&mut self, point: Vec3) -> GoalHandle {
        let radius = self.config.flight.arrival_radius.max(1.0).ceil() as u32;
        let goal = Goal::Near {
            center: point.voxel(),
            radius,
        };
        self.begin(Target::Fly { point, goal })
    }

    fn begin(&mut self, target: Target) -> GoalHandle {
        if self.episode.is_some() {
            self.finish(EpisodeOutcome::Canceled);
        }
        let handle = GoalHandle(self.next_handle);
        self.next_handle += 1;
        self.cache.clear_avoid_marks();
        self.emit(NavEventKind::GoalSubmitted {
            goal: target.goal().clone(),
        });
        log::info!("navigator: goal {} submitted as #{}", target.goal(), handle.0);
        self.episode = Some(Episode {
            handle,
            target,
            needs_search: true,
            installed_once: false,
            cancel_requested: false,
            replans: 0,
            stalled: 0,
        });
        handle
    }

    /// Ask to stop the episode started by `handle`. The stop takes effect on
    /// a tick where the current movement is safe to abandon. Returns false
    /// if `handle` is not the active episode.
    pub fn cancel(&mut self, handle: GoalHandle) -> bool {
        match self.episode.as_mut() {
            Some(episode) if episode.handle == handle => {
                episode.cancel_requested = true;
                self.worker.cancel();
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn active_goal(&self) -> Option<(GoalHandle, &Goal)> {
        self.episode
            .as_ref()
            .map(|episode| (episode.handle, episode.target.goal()))
    }

    /// The executing path, shared read-only.
    pub fn current_path(&self) -> Option<Arc<Path>> {
        self.executor.as_ref().map(|exec| Arc::clone(exec.path()))
    }

    /// Index of the executing movement within `current_path()`.
    pub fn current_index(&self) -> Option<usize> {
        self.executor.as_ref().map(PathExecutor::index)
    }

    /// Ticks left on the executing path, plus a heuristic estimate past its
    /// end when it is provisional. NaN when nothing is executing.
    pub fn estimated_ticks_to_goal(&self) -> f64 {
        let (Some(episode), Some(exec)) = (&self.episode, &self.executor) else {
            return f64::NAN;
        };
        let remaining = exec.remaining_cost();
        let path = exec.path();
        if !path.is_provisional() {
            return remaining;
        }
        let beyond = match &episode.target {
            Target::Walk(goal) => {
                goal.heuristic(self.graph.cost_model(), path.end(), self.graph.euclidean())
            }
            Target::Fly { point, .. } => {
                path.end().center().distance(*point) * self.config.flight.ticks_per_block
            }
        };
        remaining + beyond
    }

    /// Latest open-set sample from the running search, for debug views.
    pub fn frontier_snapshot(&self) -> Option<FrontierSnapshot> {
        self.worker.frontier()
    }

    pub fn is_searching(&self) -> bool {
        self.worker.is_searching()
    }

    pub fn episode_status(&self) -> EpisodeStatus {
        match (&self.episode, &self.last_outcome) {
            (Some(_), _) if self.executor.is_some() => EpisodeStatus::Executing,
            (Some(_), _) => EpisodeStatus::Searching,
            (None, Some(outcome)) => EpisodeStatus::Ended(outcome.clone()),
            (None, None) => EpisodeStatus::Idle,
        }
    }

    /// Feed an observed world change. The cache forgets the voxel until it
    /// is re-sampled and the flight index drops the containing column.
    pub fn handle_block_change(&mut self, change: BlockChange) {
        log::trace!(
            "navigator: block change at {} ({:?} -> {:?})",
            change.position,
            change.before,
            change.after
        );
        self.cache.invalidate(change.position);
        self.occupancy.invalidate(change.position);
    }

    /// Stop searching, persist the cache, and return its final counters.
    pub fn close(mut self) -> CacheStats {
        self.worker.shutdown();
        self.cache.close(CLOSE_TIMEOUT)
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    pub fn tick(&mut self, terrain: &dyn TerrainSource, sensor: &dyn AgentSensor) -> TickReport {
        self.tick += 1;
        let mut actions = Vec::new();
        let position = sensor.agent_position();
        let agent = position.voxel();

        self.cache.refresh_observations(terrain, agent);
        self.cache.maintain(agent);
        self.cache.pump_io();

        if self.episode.as_ref().is_some_and(|e| e.cancel_requested) && self.safe_to_cancel(sensor) {
            self.halt(&mut actions);
            self.finish(EpisodeOutcome::Canceled);
        }

        if let Some(episode) = self.episode.as_mut()
            && episode.needs_search
            && !episode.cancel_requested
        {
            episode.needs_search = false;
            self.start_search(JobPurpose::Fresh, position, &mut actions);
        }

        self.install_delivery(sensor, agent, &mut actions);
        if self.pending.is_some()
            && self.safe_to_cancel(sensor)
            && let Some(path) = self.pending.take()
        {
            self.install(path, agent);
        }

        self.step_executor(sensor, position, &mut actions);
        self.plan_ahead(&mut actions);
        self.check_arrival(agent, position, &mut actions);

        TickReport {
            actions,
            events: std::mem::take(&mut self.events),
        }
    }

    fn safe_to_cancel(&self, sensor: &dyn AgentSensor) -> bool {
        self.executor
            .as_ref()
            .is_none_or(|exec| exec.safe_to_cancel(sensor))
    }

    fn emit(&mut self, kind: NavEventKind) {
        log::debug!("navigator: tick {} {kind:?}", self.tick);
        self.events.push(NavEvent {
            tick: self.tick,
            kind,
        });
    }

    /// Drop the executing path, releasing input if it was mid-movement.
    fn halt(&mut self, actions: &mut Vec<AgentAction>) {
        if let Some(mut exec) = self.executor.take()
            && !exec.is_finished()
        {
            exec.cancel(actions);
        }
    }

    /// End the active episode with `outcome`.
    fn finish(&mut self, outcome: EpisodeOutcome) {
        let Some(episode) = self.episode.take() else {
            return;
        };
        self.worker.cancel();
        self.pending = None;
        log::info!(
            "navigator: goal #{} ended: {outcome:?} after {} replans",
            episode.handle.0,
            episode.replans
        );
        self.emit(NavEventKind::EpisodeEnded {
            outcome: outcome.clone(),
        });
        self.last_outcome = Some(outcome);
    }

    fn give_up(&mut self, reason: GiveUpReason, actions: &mut Vec<AgentAction>) {
        self.halt(actions);
        self.finish(EpisodeOutcome::GaveUp { reason });
    }

    // -----------------------------------------------------------------------
    // Searching
    // -----------------------------------------------------------------------

    fn start_search(&mut self, purpose: JobPurpose, origin: Vec3, actions: &mut Vec<AgentAction>) {
        let Some(episode) = &self.episode else {
            return;
        };
        let task: SearchTask = match &episode.target {
            Target::Walk(goal) => {
                let request = SearchRequest {
                    start: origin.voxel(),
                    goal: goal.clone(),
                    params: self.config.search.clone(),
                };
                let snapshot = self.cache.snapshot();
                let graph = Arc::clone(&self.graph);
                Box::new(move |cancel, publish| find_path(&snapshot, &graph, &request, cancel, publish))
            }
            Target::Fly { point, .. } => {
                let snapshot = self.cache.snapshot();
                let index = Arc::clone(&self.occupancy);
                let params = self.config.flight.clone();
                let target = *point;
                Box::new(move |cancel, _| {
                    let started = Instant::now();
                    let missing: Vec<ChunkKey> = flight_chunks(&snapshot, origin, target)
                        .into_iter()
                        .filter(|&key| !index.contains(key))
                        .collect();
                    index.ingest(&snapshot, &missing);
                    let plan = plan_flight(&index, &params, origin, target, cancel);
                    let result = if cancel.is_canceled() {
                        SearchResult::Canceled
                    } else {
                        match plan.into_path(params.ticks_per_block) {
                            Some(path) if path.is_provisional() => SearchResult::Provisional(path),
                            Some(path) => SearchResult::Complete(path),
                            None => SearchResult::Unreachable,
                        }
                    };
                    SearchReport {
                        result,
                        expanded: plan.expanded,
                        elapsed: started.elapsed(),
                    }
                })
            }
        };
        log::debug!("navigator: {purpose:?} search from {}", origin.voxel());
        if let Err(e) = self.worker.submit(purpose, task) {
            log::warn!("navigator: could not start {purpose:?} search: {e}");
            if self.stall() {
                self.give_up(GiveUpReason::NoProgress, actions);
            } else if purpose == JobPurpose::Fresh
                && let Some(episode) = self.episode.as_mut()
            {
                episode.needs_search = true;
            }
        }
    }

    /// Count a fresh search toward the episode's replan cap and start it
    /// from the agent.
    fn replan(&mut self, position: Vec3, actions: &mut Vec<AgentAction>) {
        let max = self.config.retry.max_replans_per_goal;
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        if episode.cancel_requested {
            self.halt(actions);
            self.finish(EpisodeOutcome::Canceled);
            return;
        }
        episode.replans += 1;
        let replans = episode.replans;
        if replans > max {
            self.give_up(GiveUpReason::TooManyReplans, actions);
            return;
        }
        self.emit(NavEventKind::Replanning {
            from: position.voxel(),
            replans,
        });
        self.start_search(JobPurpose::Fresh, position, actions);
    }

    /// Note a search that made no progress. Returns true if the episode
    /// should give up.
    fn stall(&mut self) -> bool {
        self.episode.as_mut().is_some_and(|episode| {
            episode.stalled += 1;
            episode.stalled >= MAX_STALLED_SEARCHES
        })
    }

    fn install_delivery(&mut self, sensor: &dyn AgentSensor, agent: VoxelCoord, actions: &mut Vec<AgentAction>) {
        if self.episode.is_none() {
            return;
        }
        let Some(delivery) = self.worker.take_delivery() else {
            return;
        };
        let SearchReport {
            result, expanded, ..
        } = delivery.report;
        log::debug!(
            "navigator: {:?} search finished after {expanded} expansions",
            delivery.purpose
        );
        let position = sensor.agent_position();
        match (result, delivery.purpose) {
            (SearchResult::Canceled, _) => {}
            (SearchResult::Unreachable, JobPurpose::Fresh) => {
                self.give_up(GiveUpReason::Unreachable, actions);
            }
            (SearchResult::Unreachable, JobPurpose::Continuation) => {
                // The provisional end is a dead end; look again from here.
                self.replan(position, actions);
            }
            (SearchResult::Complete(path) | SearchResult::Provisional(path), purpose) => {
                let no_progress = path.is_empty() && path.is_provisional();
                if no_progress {
                    if self.stall() {
                        self.give_up(GiveUpReason::NoProgress, actions);
                    } else if purpose == JobPurpose::Fresh || self.executor.is_none() {
                        self.replan(position, actions);
                    }
                    return;
                }
                if let Some(episode) = self.episode.as_mut() {
                    episode.stalled = 0;
                }
                match purpose {
                    JobPurpose::Fresh if self.safe_to_cancel(sensor) => self.install(path, agent),
                    JobPurpose::Fresh => {
                        log::debug!("navigator: deferring new path until the current move lands");
                        self.pending = Some(path);
                    }
                    JobPurpose::Continuation => self.extend(path),
                }
            }
        }
    }

    fn install(&mut self, path: Path, agent: VoxelCoord) {
        let Some(episode) = self.episode.as_mut() else {
            return;
        };
        let reset = match self.config.retry.reset_policy {
            RetryResetPolicy::NewGoalOnly => !episode.installed_once,
            RetryResetPolicy::EveryInstalledPath => true,
        };
        episode.installed_once = true;
        if reset {
            self.retries.reset();
        }
        let index = path.index_starting_at(agent, 0).unwrap_or(0);
        let (movements, cost, provisional) = (path.len(), path.total_cost(), path.is_provisional());
        self.executor = Some(PathExecutor::starting_at(
            Arc::new(path),
            index,
            self.config.execution.clone(),
            self.config.costs.allow_sprint,
        ));
        self.emit(NavEventKind::PathInstalled {
            movements,
            cost,
            provisional,
        });
    }

    fn extend(&mut self, next: Path) {
        let Some(exec) = self.executor.as_mut() else {
            return;
        };
        let Some(spliced) = exec.path().splice(&next) else {
            log::debug!(
                "navigator: continuation from {} does not meet path end {}",
                next.start(),
                exec.path().end()
            );
            return;
        };
        let provisional = spliced.is_provisional();
        exec.extend(Arc::new(spliced));
        self.emit(NavEventKind::PathExtended {
            added: next.len(),
            provisional,
        });
    }

    /// Search past the end of a provisional path before the agent gets there.
    fn plan_ahead(&mut self, actions: &mut Vec<AgentAction>) {
        if self.worker.is_searching() || self.pending.is_some() {
            return;
        }
        let Some(episode) = &self.episode else {
            return;
        };
        if episode.cancel_requested {
            return;
        }
        let Some(exec) = &self.executor else {
            return;
        };
        let path = exec.path();
        if !path.is_provisional() || exec.remaining() > self.config.execution.plan_ahead_movements {
            return;
        }
        let origin = match episode.target {
            Target::Walk(_) => path.end().feet_center(),
            Target::Fly { .. } => path.end().center(),
        };
        self.start_search(JobPurpose::Continuation, origin, actions);
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    fn step_executor(&mut self, sensor: &dyn AgentSensor, position: Vec3, actions: &mut Vec<AgentAction>) {
        let Some(exec) = self.executor.as_mut() else {
            return;
        };
        match exec.tick(&self.cache, sensor, actions) {
            ExecStep::Running => {}
            ExecStep::Advanced { completed } | ExecStep::Finished {
                completed: Some(completed),
            } => {
                self.emit(NavEventKind::MovementCompleted {
                    movement: completed,
                });
            }
            ExecStep::Finished { completed: None } => {}
            ExecStep::Failed { movement, status } => {
                let retries = self.retries.record_failure(movement.dest);
                log::debug!("navigator: {movement} failed with {status:?} ({retries} retries)");
                self.emit(NavEventKind::MovementFailed {
                    movement,
                    status,
                    retries,
                });
                if !self.retries.can_retry(movement.dest) {
                    log::info!("navigator: giving up on {}, marking it AVOID", movement.dest);
                    self.cache.mark_avoid(movement.dest);
                    self.emit(NavEventKind::PositionAbandoned {
                        position: movement.dest,
                    });
                }
                self.executor = None;
                self.replan(position, actions);
            }
        }
    }

    fn check_arrival(&mut self, agent: VoxelCoord, position: Vec3, actions: &mut Vec<AgentAction>) {
        let Some(episode) = &self.episode else {
            return;
        };
        let Some(exec) = &self.executor else {
            return;
        };
        if !exec.is_finished() || self.pending.is_some() {
            return;
        }
        if episode.target.goal().is_satisfied(agent) {
            self.executor = None;
            self.finish(EpisodeOutcome::Reached);
            return;
        }
        // A provisional path is followed up by plan-ahead. A complete one
        // that ends short of the goal means the agent drifted; look again.
        if !exec.path().is_provisional() && !self.worker.is_searching() {
            self.executor = None;
            self.replan(position, actions);
        }
    }
}

/// Chunk columns a flight from `start` to `target` should have indexed: a
/// corridor around the straight line plus every column the cache holds
/// terrain for inside the bounding box.
fn flight_chunks(snapshot: &CacheSnapshot, start: Vec3, target: Vec3) -> Vec<ChunkKey> {
    let mut keys = FxHashSet::default();
    let samples = (start.distance(target) / 8.0).ceil().max(1.0) as u32;
    for s in 0..=samples {
        let p = start.lerp(target, f64::from(s) / f64::from(samples));
        let (cx, cz) = chunk_key(p.x.floor() as i32, p.z.floor() as i32);
        for dx in -FLIGHT_CORRIDOR_CHUNKS..=FLIGHT_CORRIDOR_CHUNKS {
            for dz in -FLIGHT_CORRIDOR_CHUNKS..=FLIGHT_CORRIDOR_CHUNKS {
                keys.insert((cx + dx, cz + dz));
            }
        }
    }
    let (lo_x, lo_z) = chunk_key(start.x.min(target.x).floor() as i32, start.z.min(target.z).floor() as i32);
    let (hi_x, hi_z) = chunk_key(start.x.max(target.x).floor() as i32, start.z.max(target.z).floor() as i32);
    for coord in snapshot.region_coords() {
        let key = (coord.x, coord.z);
        let margin = FLIGHT_CORRIDOR_CHUNKS;
        if (lo_x - margin..=hi_x + margin).contains(&key.0) && (lo_z - margin..=hi_z + margin).contains(&key.1) {
            keys.insert(key);
        }
    }
    let mut keys: Vec<ChunkKey> = keys.into_iter().collect();
    keys.sort_unstable();
    keys
}
