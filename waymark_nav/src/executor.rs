// Path execution: drives the agent through one movement per step.
//
// `PathExecutor` walks an installed `Path` movement by movement. Each
// movement goes PREPPING -> RUNNING -> one terminal status:
//
// - PREPPING issues the look/move inputs and becomes RUNNING in the same
//   tick.
// - RUNNING checks, in order:
//   1. Arrival (horizontal distance to the destination centre within
//      `arrival_tolerance`, feet within half a block vertically; flight
//      uses a 3D radius) -> SUCCESS. The next movement is prepped on the
//      same tick so input never stalls between movements.
//   2. The destination feet voxel now reads SOLID or AVOID -> UNREACHABLE.
//   3. Any other footprint voxel now blocks -> FAILED.
//   4. The agent left the movement's envelope by more than
//      `off_course_tolerance` -> FAILED.
//   5. More ticks spent than `max(cost * multiplier, min_tick_budget)`
//      -> COST_TOO_HIGH.
//   Otherwise it keeps issuing inputs.
//
// Timing: the tick a path is installed preps its first movement, so that
// tick belongs to the search. An agent that covers one movement per tick
// then completes movement k on the k-th tick after installation, and a
// path of N movements reports SUCCESS for its last one on tick N.
//
// Cancellation is only safe when the agent is not mid-air in a ballistic
// move; `safe_to_cancel` reports that so the navigator can defer swapping
// paths until the landing.
//
// See also: `movement.rs` for footprints, `navigator.rs` which reacts to
// step results.

use crate::cache::ClassificationView;
use crate::config::ExecutionParams;
use crate::host::{AgentAction, AgentSensor};
use crate::movement::{MoveKind, Movement, MovementStatus};
use crate::path::Path;
use crate::types::Vec3;
use std::sync::Arc;

/// Outcome of one executor tick.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecStep {
    /// A movement is in progress.
    Running,
    /// `completed` finished; the next movement (if any) has been started.
    Advanced { completed: Movement },
    /// The last movement finished.
    Finished { completed: Option<Movement> },
    /// The current movement failed with `status`.
    Failed {
        movement: Movement,
        status: MovementStatus,
    },
}

pub struct PathExecutor {
    path: Arc<Path>,
    index: usize,
    status: MovementStatus,
    ticks_in_movement: u32,
    params: ExecutionParams,
    sprint: bool,
}

impl PathExecutor {
    pub fn new(path: Arc<Path>, params: ExecutionParams, sprint: bool) -> Self {
        Self::starting_at(path, 0, params, sprint)
    }

    /// Begin at movement `index` (used when the agent is already partway
    /// along a freshly delivered path).
    pub fn starting_at(path: Arc<Path>, index: usize, params: ExecutionParams, sprint: bool) -> Self {
        Self {
            path,
            index,
            status: MovementStatus::Prepping,
            ticks_in_movement: 0,
            params,
            sprint,
        }
    }

    pub fn path(&self) -> &Arc<Path> {
        &self.path
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> MovementStatus {
        self.status
    }

    pub fn current(&self) -> Option<&Movement> {
        self.path.get(self.index)
    }

    /// Movements not yet completed, the current one included.
    pub fn remaining(&self) -> usize {
        self.path.len().saturating_sub(self.index)
    }

    pub fn remaining_cost(&self) -> f64 {
        self.path.remaining_cost(self.index)
    }

    pub fn is_finished(&self) -> bool {
        self.index >= self.path.len()
    }

    /// Swap in a path that extends the current one. Indices are preserved,
    /// so `extended` must have the current path as a prefix.
    /// A finished executor picks up at the first new movement.
    pub fn extend(&mut self, extended: Arc<Path>) {
        self.path = extended;
        if self.status == MovementStatus::Success && !self.is_finished() {
            self.status = MovementStatus::Prepping;
        }
    }

    /// Whether the path can be dropped without stranding the agent mid-air.
    pub fn safe_to_cancel(&self, sensor: &dyn AgentSensor) -> bool {
        match self.current() {
            Some(movement) if self.status == MovementStatus::Running => {
                !(movement.kind.is_airborne() && self.ticks_in_movement > 0 && !sensor.on_ground())
            }
            _ => true,
        }
    }

    /// Stop executing; emits a `Stop` input.
    pub fn cancel(&mut self, actions: &mut Vec<AgentAction>) {
        self.status = MovementStatus::Canceled;
        actions.push(AgentAction::Stop);
    }

    /// Advance one tick against the live cache and sensor.
    pub fn tick(
        &mut self,
        view: &(impl ClassificationView + ?Sized),
        sensor: &dyn AgentSensor,
        actions: &mut Vec<AgentAction>,
    ) -> ExecStep {
        let Some(movement) = self.current().copied() else {
            return ExecStep::Finished { completed: None };
        };

        if self.status == MovementStatus::Prepping {
            self.prep(&movement, actions);
            return ExecStep::Running;
        }
        if self.status.is_terminal() {
            return ExecStep::Failed {
                movement,
                status: self.status,
            };
        }

        self.ticks_in_movement += 1;
        let position = sensor.agent_position();

        if self.arrived(&movement, position) {
            self.status = MovementStatus::Success;
            self.index += 1;
            return match self.current().copied() {
                Some(next) => {
                    self.prep(&next, actions);
                    ExecStep::Advanced {
                        completed: movement,
                    }
                }
                None => {
                    actions.push(AgentAction::Stop);
                    ExecStep::Finished {
                        completed: Some(movement),
                    }
                }
            };
        }

        if let Some(status) = self.check_blocked(view, &movement) {
            return self.fail(movement, status, actions);
        }
        if self.off_course(&movement, position) {
            log::debug!("executor: off course at {position} during {movement}");
            return self.fail(movement, MovementStatus::Failed, actions);
        }
        let budget = (movement.cost * self.params.tick_budget_multiplier)
            .max(f64::from(self.params.min_tick_budget));
        if f64::from(self.ticks_in_movement) > budget {
            log::debug!("executor: {movement} over budget ({budget:.0} ticks)");
            return self.fail(movement, MovementStatus::CostTooHigh, actions);
        }

        self.steer(&movement, sensor.on_ground(), actions);
        ExecStep::Running
    }

    fn prep(&mut self, movement: &Movement, actions: &mut Vec<AgentAction>) {
        self.ticks_in_movement = 0;
        self.status = MovementStatus::Running;
        actions.push(AgentAction::LookAt(movement.target()));
        self.steer(movement, true, actions);
    }

    fn steer(&self, movement: &Movement, on_ground: bool, actions: &mut Vec<AgentAction>) {
        let sprint = self.sprint
            && matches!(
                movement.kind,
                MoveKind::Traverse | MoveKind::Diagonal | MoveKind::Parkour { .. }
            );
        actions.push(AgentAction::MoveToward {
            target: movement.target(),
            sprint,
        });
        if movement.kind.needs_jump() && on_ground {
            actions.push(AgentAction::Jump);
        }
        if movement.kind == MoveKind::SwimDown {
            actions.push(AgentAction::Sink);
        }
    }

    fn fail(
        &mut self,
        movement: Movement,
        status: MovementStatus,
        actions: &mut Vec<AgentAction>,
    ) -> ExecStep {
        self.status = status;
        actions.push(AgentAction::Stop);
        ExecStep::Failed { movement, status }
    }

    fn arrived(&self, movement: &Movement, position: Vec3) -> bool {
        let target = movement.target();
        if movement.kind == MoveKind::Fly {
            return position.distance(target) <= self.params.fly_arrival_radius;
        }
        let horizontal = (position - target).horizontal_length();
        horizontal <= self.params.arrival_tolerance && (position.y - target.y).abs() < 0.5
    }

    fn check_blocked(
        &self,
        view: &(impl ClassificationView + ?Sized),
        movement: &Movement,
    ) -> Option<MovementStatus> {
        let footprint = movement.footprint();
        let (dest, rest) = footprint.split_first()?;
        if view.classify(*dest).is_blocking() {
            return Some(MovementStatus::Unreachable);
        }
        if rest.iter().any(|&pos| view.classify(pos).is_blocking()) {
            return Some(MovementStatus::Failed);
        }
        None
    }

    /// Outside the box spanned by source and destination, grown by the
    /// tolerance (plus jump headroom upward).
    fn off_course(&self, movement: &Movement, position: Vec3) -> bool {
        let a = movement.src.feet_center();
        let b = movement.target();
        let tol = self.params.off_course_tolerance;
        let outside = |p: f64, lo: f64, hi: f64, below: f64, above: f64| {
            p < lo.min(hi) - below || p > lo.max(hi) + above
        };
        outside(position.x, a.x, b.x, tol, tol)
            || outside(position.z, a.z, b.z, tol, tol)
            || outside(position.y, a.y, b.y, tol, tol + 1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SparseTerrain;
    use crate::types::VoxelCoord;
    use std::cell::Cell;
    use waymark_region::Classification;

    struct FakeAgent {
        position: Cell<Vec3>,
        velocity: Cell<Vec3>,
    }

    impl FakeAgent {
        fn at(pos: VoxelCoord) -> Self {
            Self {
                position: Cell::new(pos.feet_center()),
                velocity: Cell::new(Vec3::ZERO),
            }
        }

        fn put(&self, p: Vec3) {
            self.position.set(p);
        }
    }

    impl AgentSensor for FakeAgent {
        fn agent_position(&self) -> Vec3 {
            self.position.get()
        }

        fn agent_velocity(&self) -> Vec3 {
            self.velocity.get()
        }
    }

    fn walk_path(start: VoxelCoord, steps: i32) -> Arc<Path> {
        let moves = (0..steps)
            .map(|i| {
                let from = start.offset(i, 0, 0);
                Movement::new(MoveKind::Traverse, from, from.offset(1, 0, 0), 4.0)
            })
            .collect();
        Arc::new(Path::new(start, moves, false).unwrap())
    }

    fn executor(path: Arc<Path>) -> PathExecutor {
        PathExecutor::new(path, ExecutionParams::default(), true)
    }

    const START: VoxelCoord = VoxelCoord::new(0, 64, 0);

    #[test]
    fn prepping_issues_inputs_and_runs() {
        let terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let mut exec = executor(walk_path(START, 2));
        let mut actions = Vec::new();
        assert_eq!(exec.tick(&terrain, &agent, &mut actions), ExecStep::Running);
        assert_eq!(exec.status(), MovementStatus::Running);
        assert!(matches!(actions[0], AgentAction::LookAt(_)));
        assert!(matches!(
            actions[1],
            AgentAction::MoveToward { sprint: true, .. }
        ));
    }

    #[test]
    fn arrival_advances_and_preps_next_on_same_tick() {
        let terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let path = walk_path(START, 2);
        let mut exec = executor(path.clone());
        let mut actions = Vec::new();
        exec.tick(&terrain, &agent, &mut actions);

        agent.put(START.offset(1, 0, 0).feet_center());
        actions.clear();
        let step = exec.tick(&terrain, &agent, &mut actions);
        assert_eq!(
            step,
            ExecStep::Advanced {
                completed: path.movements()[0]
            }
        );
        assert_eq!(exec.index(), 1);
        assert!(actions.iter().any(|a| matches!(a, AgentAction::MoveToward { .. })));

        agent.put(START.offset(2, 0, 0).feet_center());
        let step = exec.tick(&terrain, &agent, &mut actions);
        assert!(matches!(step, ExecStep::Finished { completed: Some(_) }));
        assert!(exec.is_finished());
    }

    #[test]
    fn blocked_destination_is_unreachable() {
        let mut terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let mut exec = executor(walk_path(START, 1));
        let mut actions = Vec::new();
        exec.tick(&terrain, &agent, &mut actions);
        terrain.set(START.offset(1, 0, 0), Classification::Solid);
        let step = exec.tick(&terrain, &agent, &mut actions);
        assert!(matches!(
            step,
            ExecStep::Failed {
                status: MovementStatus::Unreachable,
                ..
            }
        ));
        assert_eq!(actions.last(), Some(&AgentAction::Stop));
    }

    #[test]
    fn blocked_headroom_fails() {
        let mut terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let mut exec = executor(walk_path(START, 1));
        let mut actions = Vec::new();
        exec.tick(&terrain, &agent, &mut actions);
        terrain.set(START.offset(1, 1, 0), Classification::Solid);
        let step = exec.tick(&terrain, &agent, &mut actions);
        assert!(matches!(
            step,
            ExecStep::Failed {
                status: MovementStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn drifting_off_course_fails() {
        let terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let mut exec = executor(walk_path(START, 1));
        let mut actions = Vec::new();
        exec.tick(&terrain, &agent, &mut actions);
        agent.put(Vec3::new(0.5, 64.0, 5.0));
        let step = exec.tick(&terrain, &agent, &mut actions);
        assert!(matches!(
            step,
            ExecStep::Failed {
                status: MovementStatus::Failed,
                ..
            }
        ));
    }

    #[test]
    fn stalling_exceeds_tick_budget() {
        let terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let params = ExecutionParams {
            min_tick_budget: 5,
            tick_budget_multiplier: 1.0,
            ..ExecutionParams::default()
        };
        let mut exec = PathExecutor::new(walk_path(START, 1), params, false);
        let mut actions = Vec::new();
        exec.tick(&terrain, &agent, &mut actions);
        let mut last = ExecStep::Running;
        for _ in 0..6 {
            last = exec.tick(&terrain, &agent, &mut actions);
        }
        assert!(matches!(
            last,
            ExecStep::Failed {
                status: MovementStatus::CostTooHigh,
                ..
            }
        ));
    }

    #[test]
    fn airborne_moves_defer_cancellation() {
        let terrain = SparseTerrain::flat(8);
        let agent = FakeAgent::at(START);
        let ascend = Movement::new(MoveKind::Ascend, START, START.offset(1, 1, 0), 8.0);
        let path = Arc::new(Path::new(START, vec![ascend], false).unwrap());
        let mut exec = executor(path);
        let mut actions = Vec::new();
        exec.tick(&terrain, &agent, &mut actions);
        assert!(actions.contains(&AgentAction::Jump));
        assert!(exec.safe_to_cancel(&agent));

        agent.put(Vec3::new(0.9, 64.6, 0.5));
        agent.velocity.set(Vec3::new(0.1, 0.3, 0.0));
        exec.tick(&terrain, &agent, &mut actions);
        assert!(!exec.safe_to_cancel(&agent));

        agent.velocity.set(Vec3::ZERO);
        assert!(exec.safe_to_cancel(&agent));
    }
}
