// Headless host for exercising the navigator end to end.
//
// Provides the two things a real game would: a world the engine can sample
// (`TestWorld`, a dense classification box implementing `TerrainSource`)
// and a body that responds to inputs (`SimulatedAgent`, implementing
// `AgentSensor`). `Scenario` ties them to a real `Navigator` and steps all
// three in lockstep, recording every event.
//
// The agent is deliberately crude. It moves at a fixed speed toward the
// latest `MoveToward` target, rising before moving across and moving across
// before dropping, so ascents read as jumps and descents as falls. It stops
// instead of entering a voxel that is not passable. There is no gravity; a
// flying agent moves in straight lines.
//
// See also: `tests/end_to_end.rs` for the scenarios, `main.rs` for the
// `walkthrough` binary.

use std::sync::Arc;

use waymark_nav::cache::ClassificationView;
use waymark_nav::config::{CacheParams, PathingConfig};
use waymark_nav::{
    AgentAction, AgentSensor, BlockChange, Classification, DimensionId, EpisodeOutcome, Movement,
    NavEvent, NavEventKind, Navigator, TerrainSource, TickReport, Vec3, VoxelCoord,
};
use waymark_region::{MemoryRegionStore, RegionStore};

/// Default walking speed of the simulated agent, in blocks per tick.
pub const AGENT_SPEED: f64 = 0.5;

// ---------------------------------------------------------------------------
// TestWorld
// ---------------------------------------------------------------------------

/// A dense box of voxels. Anything outside reads as `Unknown`, like terrain
/// the host has not loaded.
#[derive(Clone, Debug)]
pub struct TestWorld {
    min: VoxelCoord,
    size: (i32, i32, i32),
    cells: Vec<Classification>,
}

impl TestWorld {
    /// A box spanning `min..=max` filled with `fill`.
    pub fn new(min: VoxelCoord, max: VoxelCoord, fill: Classification) -> Self {
        let size = (max.x - min.x + 1, max.y - min.y + 1, max.z - min.z + 1);
        assert!(size.0 > 0 && size.1 > 0 && size.2 > 0, "empty world box");
        let len = (size.0 * size.1 * size.2) as usize;
        Self {
            min,
            size,
            cells: vec![fill; len],
        }
    }

    /// Open air over `-half..=half` in X and Z from y=48 to y=80, with a
    /// solid floor at y=63 and solid below it.
    pub fn flat(half: i32) -> Self {
        let mut world = Self::new(
            VoxelCoord::new(-half, 48, -half),
            VoxelCoord::new(half, 80, half),
            Classification::Air,
        );
        world.fill(
            VoxelCoord::new(-half, 48, -half),
            VoxelCoord::new(half, 63, half),
            Classification::Solid,
        );
        world
    }

    fn index(&self, pos: VoxelCoord) -> Option<usize> {
        let (x, y, z) = (pos.x - self.min.x, pos.y - self.min.y, pos.z - self.min.z);
        let (sx, sy, sz) = self.size;
        if x < 0 || y < 0 || z < 0 || x >= sx || y >= sy || z >= sz {
            return None;
        }
        Some((x + z * sx + y * sx * sz) as usize)
    }

    pub fn get(&self, pos: VoxelCoord) -> Classification {
        self.index(pos)
            .map_or(Classification::Unknown, |i| self.cells[i])
    }

    /// Set one voxel. Positions outside the box are ignored.
    pub fn set(&mut self, pos: VoxelCoord, class: Classification) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = class;
        }
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

    /// Whether a body with feet at `p` fits.
    pub fn body_fits(&self, p: Vec3) -> bool {
        let feet = p.voxel();
        self.get(feet).is_passable() && self.get(feet.up(1)).is_passable()
    }
}

impl TerrainSource for TestWorld {
    fn classification_of(&self, pos: VoxelCoord) -> Classification {
        self.get(pos)
    }
}

impl ClassificationView for TestWorld {
    fn classify(&self, pos: VoxelCoord) -> Classification {
        self.get(pos)
    }
}

// ---------------------------------------------------------------------------
// SimulatedAgent
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct SimulatedAgent {
    position: Vec3,
    velocity: Vec3,
    /// Blocks per tick along each leg of a move.
    pub speed: f64,
    /// Move in straight lines instead of rise-across-drop legs.
    pub flying: bool,
    target: Option<Vec3>,
}

impl SimulatedAgent {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            speed: AGENT_SPEED,
            flying: false,
            target: None,
        }
    }

    /// An agent standing in `feet`.
    pub fn standing_at(feet: VoxelCoord) -> Self {
        Self::new(feet.feet_center())
    }

    pub fn voxel(&self) -> VoxelCoord {
        self.position.voxel()
    }

    /// Apply one tick of input, then move.
    pub fn apply(&mut self, world: &TestWorld, actions: &[AgentAction]) {
        for action in actions {
            match *action {
                AgentAction::MoveToward { target, .. } => self.target = Some(target),
                AgentAction::Stop => self.target = None,
                AgentAction::LookAt(_) | AgentAction::Jump | AgentAction::Sink => {}
            }
        }
        let before = self.position;
        if let Some(target) = self.target {
            let next = self.next_position(target);
            if world.body_fits(next) {
                self.position = next;
            } else {
                log::trace!("agent: blocked at {} heading for {target}", self.position);
            }
        }
        self.velocity = self.position - before;
    }

    fn next_position(&self, target: Vec3) -> Vec3 {
        let p = self.position;
        let toward = |from: Vec3, to: Vec3| {
            let delta = to - from;
            let len = delta.length();
            if len <= self.speed { to } else { from + delta * (self.speed / len) }
        };
        if self.flying {
            return toward(p, target);
        }
        let level = Vec3::new(target.x, p.y, target.z);
        if target.y > p.y + 1e-9 {
            // Rise in place first.
            toward(p, Vec3::new(p.x, target.y, p.z))
        } else if (level - p).horizontal_length() > 1e-9 {
            toward(p, level)
        } else {
            toward(p, target)
        }
    }
}

impl AgentSensor for SimulatedAgent {
    fn agent_position(&self) -> Vec3 {
        self.position
    }

    fn agent_velocity(&self) -> Vec3 {
        self.velocity
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Configuration tuned for deterministic tests: inline search, no
/// wall-clock ceiling, and a cache that scans everything near the agent on
/// the first tick.
pub fn test_config() -> PathingConfig {
    let mut config = PathingConfig::default();
    config.execution.background_search = false;
    config.search.max_millis = None;
    config.cache = CacheParams {
        scan_radius: 1,
        region_scans_per_tick: 27,
        ..CacheParams::default()
    };
    config
}

pub struct Scenario {
    pub world: TestWorld,
    pub agent: SimulatedAgent,
    pub navigator: Navigator,
    events: Vec<NavEvent>,
}

impl Scenario {
    /// Panics if `config` does not validate.
    pub fn new(world: TestWorld, start: VoxelCoord, config: PathingConfig) -> Self {
        Self::with_store(world, start, config, Arc::new(MemoryRegionStore::new()))
    }

    pub fn with_store(
        world: TestWorld,
        start: VoxelCoord,
        config: PathingConfig,
        store: Arc<dyn RegionStore>,
    ) -> Self {
        let navigator =
            Navigator::new(config, DimensionId(0), store).expect("scenario config is valid");
        Self {
            world,
            agent: SimulatedAgent::standing_at(start),
            navigator,
            events: Vec::new(),
        }
    }

    /// One tick: navigator, then agent.
    pub fn step(&mut self) -> TickReport {
        let report = self.navigator.tick(&self.world, &self.agent);
        self.agent.apply(&self.world, &report.actions);
        self.events.extend(report.events.iter().cloned());
        report
    }

    /// Step until an episode ends or `limit` ticks pass.
    pub fn run(&mut self, limit: u32) -> Option<EpisodeOutcome> {
        for _ in 0..limit {
            let report = self.step();
            let ended = report.events.iter().find_map(|e| match &e.kind {
                NavEventKind::EpisodeEnded { outcome } => Some(outcome.clone()),
                _ => None,
            });
            if ended.is_some() {
                return ended;
            }
        }
        None
    }

    /// Change the world and tell the navigator about it.
    pub fn set_block(&mut self, position: VoxelCoord, class: Classification) {
        let before = self.world.get(position);
        self.world.set(position, class);
        self.navigator.handle_block_change(BlockChange {
            position,
            before,
            after: class,
        });
    }

    pub fn events(&self) -> &[NavEvent] {
        &self.events
    }

    pub fn completed_movements(&self) -> Vec<Movement> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                NavEventKind::MovementCompleted { movement } => Some(movement),
                _ => None,
            })
            .collect()
    }

    pub fn agent_voxel(&self) -> VoxelCoord {
        self.agent.voxel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_outside_box_is_unknown() {
        let world = TestWorld::flat(4);
        assert_eq!(world.get(VoxelCoord::new(0, 63, 0)), Classification::Solid);
        assert_eq!(world.get(VoxelCoord::new(0, 64, 0)), Classification::Air);
        assert_eq!(world.get(VoxelCoord::new(5, 64, 0)), Classification::Unknown);
    }

    #[test]
    fn agent_rises_before_moving_across() {
        let world = TestWorld::flat(4);
        let mut agent = SimulatedAgent::standing_at(VoxelCoord::new(0, 64, 0));
        let target = VoxelCoord::new(1, 65, 0).feet_center();
        agent.apply(&world, &[AgentAction::MoveToward { target, sprint: false }]);
        assert_eq!(agent.agent_position(), Vec3::new(0.5, 64.5, 0.5));
        assert!(!agent.on_ground());
        agent.apply(&world, &[]);
        agent.apply(&world, &[]);
        agent.apply(&world, &[]);
        assert_eq!(agent.agent_position(), target);
    }

    #[test]
    fn agent_stops_at_walls() {
        let mut world = TestWorld::flat(4);
        world.set(VoxelCoord::new(1, 64, 0), Classification::Solid);
        let mut agent = SimulatedAgent::standing_at(VoxelCoord::new(0, 64, 0));
        let target = VoxelCoord::new(1, 64, 0).feet_center();
        for _ in 0..4 {
            agent.apply(&world, &[AgentAction::MoveToward { target, sprint: false }]);
        }
        assert_eq!(agent.voxel(), VoxelCoord::new(0, 64, 0));
        assert!(agent.on_ground());
    }
}
