// End-to-end navigation scenarios.
//
// Each test builds a `TestWorld`, drops a `SimulatedAgent` into it, drives a
// real `Navigator` tick by tick through `Scenario`, and checks the events and
// where the agent ended up. Searches run inline so every run is identical.
//
// See also: `src/lib.rs` for the harness.

use std::sync::Arc;
use std::time::Duration;

use waymark_nav::flight::OccupancyIndex;
use waymark_nav::{
    Classification, ClassificationView, EpisodeOutcome, GiveUpReason, Goal, MoveKind,
    MovementStatus, NavEventKind, Vec3, VoxelCoord,
};
use waymark_region::DirRegionStore;
use waymark_scenarios::{Scenario, TestWorld, test_config};

const START: VoxelCoord = VoxelCoord::new(0, 64, 0);

#[test]
fn flat_floor_walk_uses_only_level_moves() {
    let mut scenario = Scenario::new(TestWorld::flat(16), START, test_config());
    let goal = VoxelCoord::new(10, 64, 10);
    scenario.navigator.submit_goal(Goal::Block(goal));

    assert_eq!(scenario.run(200), Some(EpisodeOutcome::Reached));
    assert_eq!(scenario.agent_voxel(), goal);
    let moves = scenario.completed_movements();
    assert!(!moves.is_empty());
    assert!(
        moves
            .iter()
            .all(|m| matches!(m.kind, MoveKind::Traverse | MoveKind::Diagonal)),
        "{moves:?}"
    );
    // Ten diagonal steps is the cheapest way there.
    assert_eq!(moves.len(), 10);
}

#[test]
fn fast_agent_completes_one_movement_per_tick() {
    let mut scenario = Scenario::new(TestWorld::flat(16), START, test_config());
    scenario.agent.speed = 10.0;
    let goal = VoxelCoord::new(10, 64, 10);
    scenario.navigator.submit_goal(Goal::Block(goal));
    assert_eq!(scenario.run(50), Some(EpisodeOutcome::Reached));

    let installed = scenario
        .events()
        .iter()
        .find_map(|e| matches!(e.kind, NavEventKind::PathInstalled { .. }).then_some(e.tick))
        .expect("a path was installed");
    let completed: Vec<u64> = scenario
        .events()
        .iter()
        .filter(|e| matches!(e.kind, NavEventKind::MovementCompleted { .. }))
        .map(|e| e.tick)
        .collect();
    assert_eq!(completed, (installed + 1..=installed + 10).collect::<Vec<_>>());
    let ended = scenario
        .events()
        .iter()
        .find_map(|e| matches!(e.kind, NavEventKind::EpisodeEnded { .. }).then_some(e.tick));
    assert_eq!(ended, Some(installed + 10));
    assert_eq!(scenario.agent_voxel(), goal);
}

#[test]
fn block_appearing_on_route_fails_and_reroutes() {
    let mut scenario = Scenario::new(TestWorld::flat(16), START, test_config());
    let goal = VoxelCoord::new(8, 64, 0);
    scenario.navigator.submit_goal(Goal::Block(goal));

    // Once the agent is walking into (3,64,0), close the head-level voxel
    // two blocks further along the straight route.
    let blocked = VoxelCoord::new(5, 64, 0);
    for _ in 0..100 {
        scenario.step();
        let path = scenario.navigator.current_path().unwrap();
        let index = scenario.navigator.current_index().unwrap();
        if path.get(index).is_some_and(|m| m.dest == VoxelCoord::new(3, 64, 0)) {
            break;
        }
    }
    assert!(scenario.navigator.current_path().unwrap().positions().any(|p| p == blocked));
    scenario.set_block(blocked.up(1), Classification::Solid);

    assert_eq!(scenario.run(300), Some(EpisodeOutcome::Reached));
    assert_eq!(scenario.agent_voxel(), goal);

    let failure = scenario
        .events()
        .iter()
        .find_map(|e| match e.kind {
            NavEventKind::MovementFailed {
                movement,
                status,
                retries,
            } => Some((movement, status, retries)),
            _ => None,
        })
        .expect("the in-flight movement failed");
    assert_eq!(failure.0.dest, blocked);
    assert_eq!(failure.1, MovementStatus::Failed);
    assert_eq!(failure.2, 1);
    assert_eq!(scenario.navigator.retries().failures(blocked), 1);
    assert!(
        scenario
            .events()
            .iter()
            .any(|e| matches!(e.kind, NavEventKind::Replanning { replans: 1, .. }))
    );
    assert!(
        scenario
            .completed_movements()
            .iter()
            .all(|m| m.dest != blocked)
    );
}

#[test]
fn staircase_climb() {
    let mut world = TestWorld::flat(12);
    for step in 0..3 {
        world.fill(
            VoxelCoord::new(2 + step, 64, -1),
            VoxelCoord::new(2 + step, 64 + step, 1),
            Classification::Solid,
        );
    }
    let mut scenario = Scenario::new(world, START, test_config());
    let goal = VoxelCoord::new(4, 67, 0);
    scenario.navigator.submit_goal(Goal::Block(goal));

    assert_eq!(scenario.run(300), Some(EpisodeOutcome::Reached));
    assert_eq!(scenario.agent_voxel(), goal);
    let ascents = scenario
        .completed_movements()
        .iter()
        .filter(|m| m.kind == MoveKind::Ascend)
        .count();
    assert_eq!(ascents, 3);
}

#[test]
fn walled_in_goal_gives_up_unreachable() {
    let mut world = TestWorld::flat(12);
    world.fill(
        VoxelCoord::new(4, 64, 4),
        VoxelCoord::new(8, 70, 8),
        Classification::Solid,
    );
    world.fill(
        VoxelCoord::new(5, 64, 5),
        VoxelCoord::new(7, 66, 7),
        Classification::Air,
    );
    let mut scenario = Scenario::new(world, START, test_config());
    scenario
        .navigator
        .submit_goal(Goal::Block(VoxelCoord::new(6, 64, 6)));

    assert_eq!(
        scenario.run(20),
        Some(EpisodeOutcome::GaveUp {
            reason: GiveUpReason::Unreachable
        })
    );
    assert_eq!(scenario.agent_voxel(), START);
}

#[test]
fn flight_over_a_wall() {
    // A wall across the whole world; going over is far shorter than
    // going around its ends.
    let mut world = TestWorld::new(
        VoxelCoord::new(-16, 40, -40),
        VoxelCoord::new(47, 100, 40),
        Classification::Air,
    );
    world.fill(
        VoxelCoord::new(-16, 40, -40),
        VoxelCoord::new(47, 63, 40),
        Classification::Solid,
    );
    world.fill(
        VoxelCoord::new(15, 64, -40),
        VoxelCoord::new(16, 72, 40),
        Classification::Solid,
    );
    let mut scenario = Scenario::new(world, START, test_config());
    scenario.agent.flying = true;
    scenario.agent.speed = 1.0;
    let target = Vec3::new(32.5, 66.5, 0.5);
    scenario.navigator.submit_flight(target);

    assert_eq!(scenario.run(600), Some(EpisodeOutcome::Reached));
    let moves = scenario.completed_movements();
    assert!(moves.iter().all(|m| m.kind == MoveKind::Fly));
    assert!(moves.len() >= 2, "a wall needs at least one turn: {moves:?}");
    assert!(scenario.agent.voxel().distance(target.voxel()) <= 4.0);
    assert!(
        scenario
            .completed_movements()
            .iter()
            .any(|m| m.dest.y > 72)
    );
}

#[test]
fn octree_cursor_caches_the_last_chunk() {
    let world = TestWorld::flat(20);
    let index = OccupancyIndex::new(0, 127, false);
    index.ingest(&world, &[(0, 0), (1, 0)]);

    let mut cursor = index.cursor();
    assert!(cursor.is_solid_voxel(3, 63, 3));
    assert!(!cursor.is_solid_voxel(12, 64, 9));
    assert_eq!(cursor.lookups(), 1);
    assert!(!cursor.is_solid_voxel(17, 64, 9));
    assert_eq!(cursor.lookups(), 2);
    assert!(!cursor.is_solid_voxel(5, 200, 5));
    assert_eq!(cursor.lookups(), 2);
}

#[test]
fn cached_regions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DirRegionStore::new(dir.path()));

    let mut first = Scenario::with_store(TestWorld::flat(8), START, test_config(), store.clone());
    first.step();
    let stats = first.navigator.close();
    assert!(stats.saves_requested > 0);
    assert_eq!(stats.save_failures, 0);

    // Same store, but the host has nothing loaded this time.
    let empty = TestWorld::new(START, START, Classification::Unknown);
    let mut second = Scenario::with_store(empty, START, test_config(), store);
    second.step();
    assert!(second.navigator.cache_mut().wait_for_io(Duration::from_secs(5)));
    let cache = second.navigator.cache();
    assert_eq!(cache.classify(VoxelCoord::new(0, 63, 0)), Classification::Solid);
    assert_eq!(cache.classify(VoxelCoord::new(2, 65, -3)), Classification::Air);
    assert!(cache.stats().loads_applied > 0);
}
