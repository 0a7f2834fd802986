// A* search over the implicit movement graph.
//
// Uses a `BinaryHeap` open set (min-heap via reversed ordering). Entries
// order by f-score, then by the template priority of the move that reached
// the node, then by insertion sequence, so equal-cost ties resolve the same
// way every run. Node records live in a `Vec` indexed through an
// `FxHashMap` keyed by the packed voxel coordinate.
//
// The heuristic (`Goal::heuristic` over `CostModel`) is a per-axis weighted
// distance whose weights are the cheapest per-block price of any template.
// It is consistent, so a closed node is never reopened and the first time a
// goal node is popped its path is optimal.
//
// Budgets: a search stops after `max_nodes` expansions or `max_millis` of
// wall clock and returns a provisional path toward the expanded node with
// the lowest heuristic (ties by lower cost). That path can be empty if no
// expanded node improves on the start. A search whose frontier empties
// before reaching the goal returns `Unreachable`. The cancel token is polled
// every `cancel_check_interval` expansions.
//
// Every `frontier_publish_interval` expansions a `FrontierSnapshot` is
// handed to the caller's callback for debug views.
//
// See also: `graph.rs` for successor generation, `worker.rs` which runs
// searches off the tick thread.

use crate::cache::ClassificationView;
use crate::config::SearchParams;
use crate::goal::Goal;
use crate::graph::MovementGraph;
use crate::movement::Movement;
use crate::path::Path;
use crate::types::VoxelCoord;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

/// Cooperative cancellation flag shared between a search and its owner.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// What to search for.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub start: VoxelCoord,
    pub goal: Goal,
    pub params: SearchParams,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchResult {
    /// Reached the goal. The path is optimal for the snapshot searched.
    Complete(Path),
    /// Stopped on a budget; best-effort path toward the goal.
    Provisional(Path),
    /// The frontier emptied without reaching the goal.
    Unreachable,
    Canceled,
}

impl SearchResult {
    pub fn path(&self) -> Option<&Path> {
        match self {
            SearchResult::Complete(path) | SearchResult::Provisional(path) => Some(path),
            SearchResult::Unreachable | SearchResult::Canceled => None,
        }
    }
}

/// Result plus accounting.
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub result: SearchResult,
    pub expanded: usize,
    pub elapsed: Duration,
}

/// Partial view of a running search.
#[derive(Clone, Debug, PartialEq)]
pub struct FrontierSnapshot {
    pub expanded: usize,
    /// Best-effort position so far.
    pub best: VoxelCoord,
    /// A sample of open-set positions.
    pub open: Vec<VoxelCoord>,
}

struct NodeRecord {
    pos: VoxelCoord,
    g: f64,
    h: f64,
    came_from: Option<(u32, Movement)>,
    closed: bool,
}

/// Entry in the A* open set (min-heap via reversed ordering).
struct OpenEntry {
    node: u32,
    f_score: f64,
    priority: u8,
    seq: u64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap: smallest f_score is "greatest", then the
        // preferred template, then the oldest entry.
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.priority.cmp(&self.priority))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Search state for one invocation.
struct Search<'a, V: ?Sized> {
    view: &'a V,
    graph: &'a MovementGraph,
    goal: &'a Goal,
    nodes: Vec<NodeRecord>,
    index: FxHashMap<u64, u32>,
    open: BinaryHeap<OpenEntry>,
    seq: u64,
    best: u32,
}

impl<'a, V: ClassificationView + ?Sized> Search<'a, V> {
    fn heuristic(&self, pos: VoxelCoord) -> f64 {
        self.goal
            .heuristic(self.graph.cost_model(), pos, self.graph.euclidean())
    }

    fn push(&mut self, node: u32, priority: u8) {
        let record = &self.nodes[node as usize];
        self.open.push(OpenEntry {
            node,
            f_score: record.g + record.h,
            priority,
            seq: self.seq,
        });
        self.seq += 1;
    }

    /// Index of the record for `pos`, creating it if new.
    fn node_for(&mut self, pos: VoxelCoord) -> u32 {
        if let Some(&idx) = self.index.get(&pos.pack()) {
            return idx;
        }
        let idx = self.nodes.len() as u32;
        let h = self.heuristic(pos);
        self.nodes.push(NodeRecord {
            pos,
            g: f64::INFINITY,
            h,
            came_from: None,
            closed: false,
        });
        self.index.insert(pos.pack(), idx);
        idx
    }

    fn is_better_best(&self, candidate: u32) -> bool {
        let c = &self.nodes[candidate as usize];
        let b = &self.nodes[self.best as usize];
        c.h.total_cmp(&b.h)
            .then_with(|| c.g.total_cmp(&b.g))
            .is_lt()
    }

    fn reconstruct(&self, end: u32, provisional: bool) -> Path {
        let mut movements = Vec::new();
        let mut at = end;
        while let Some((parent, movement)) = self.nodes[at as usize].came_from {
            movements.push(movement);
            at = parent;
        }
        movements.reverse();
        let start = self.nodes[at as usize].pos;
        // Parent links always chain, so construction cannot fail.
        Path::new(start, movements, provisional).unwrap_or_else(|| Path::empty(start, provisional))
    }

    fn snapshot(&self, expanded: usize, sample: usize) -> FrontierSnapshot {
        FrontierSnapshot {
            expanded,
            best: self.nodes[self.best as usize].pos,
            open: self
                .open
                .iter()
                .take(sample)
                .map(|entry| self.nodes[entry.node as usize].pos)
                .collect(),
        }
    }
}

/// Run A* from `request.start` toward `request.goal` against `view`.
pub fn find_path<V: ClassificationView + ?Sized>(
    view: &V,
    graph: &MovementGraph,
    request: &SearchRequest,
    cancel: &CancelToken,
    on_frontier: &mut dyn FnMut(FrontierSnapshot),
) -> SearchReport {
    let started = Instant::now();
    if request.goal.is_unsatisfiable() {
        log::debug!("search: {} can never be satisfied", request.goal);
        return SearchReport {
            result: SearchResult::Unreachable,
            expanded: 0,
            elapsed: started.elapsed(),
        };
    }
    let params = &request.params;
    let mut search = Search {
        view,
        graph,
        goal: &request.goal,
        nodes: Vec::new(),
        index: FxHashMap::default(),
        open: BinaryHeap::new(),
        seq: 0,
        best: 0,
    };
    let start = search.node_for(request.start);
    search.nodes[start as usize].g = 0.0;
    search.push(start, 0);

    let mut expanded = 0usize;
    let mut successors = Vec::with_capacity(32);
    let finish = |result, expanded| SearchReport {
        result,
        expanded,
        elapsed: started.elapsed(),
    };

    while let Some(entry) = search.open.pop() {
        let current = entry.node;
        let ci = current as usize;
        if search.nodes[ci].closed {
            continue;
        }
        search.nodes[ci].closed = true;

        let pos = search.nodes[ci].pos;
        if search.goal.is_satisfied(pos) {
            let path = search.reconstruct(current, false);
            log::debug!(
                "search: reached {} in {expanded} expansions, cost {:.1}",
                search.goal,
                path.total_cost()
            );
            return finish(SearchResult::Complete(path), expanded);
        }

        if search.is_better_best(current) {
            search.best = current;
        }

        expanded += 1;
        if expanded % params.cancel_check_interval == 0 {
            if cancel.is_canceled() {
                log::debug!("search: canceled after {expanded} expansions");
                return finish(SearchResult::Canceled, expanded);
            }
            let out_of_time = params
                .max_millis
                .is_some_and(|ms| started.elapsed() >= Duration::from_millis(ms));
            if out_of_time {
                log::debug!("search: time budget hit after {expanded} expansions");
                let path = search.reconstruct(search.best, true);
                return finish(SearchResult::Provisional(path), expanded);
            }
        }
        if params.frontier_publish_interval > 0 && expanded % params.frontier_publish_interval == 0
        {
            on_frontier(search.snapshot(expanded, params.frontier_sample));
        }
        if expanded >= params.max_nodes {
            log::debug!("search: node budget hit, best effort toward {}", search.goal);
            let path = search.reconstruct(search.best, true);
            return finish(SearchResult::Provisional(path), expanded);
        }

        let current_g = search.nodes[ci].g;
        successors.clear();
        graph.successors(search.view, pos, &mut successors);
        for movement in successors.drain(..) {
            let neighbor = search.node_for(movement.dest);
            let ni = neighbor as usize;
            if search.nodes[ni].closed {
                continue;
            }
            let tentative_g = current_g + movement.cost;
            if tentative_g < search.nodes[ni].g {
                search.nodes[ni].g = tentative_g;
                search.nodes[ni].came_from = Some((current, movement));
                search.push(neighbor, movement.kind.priority());
            }
        }
    }

    if cancel.is_canceled() {
        return finish(SearchResult::Canceled, expanded);
    }
    log::debug!(
        "search: {} unreachable from {} after {expanded} expansions",
        request.goal,
        request.start
    );
    finish(SearchResult::Unreachable, expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GraphParams, MoveCostParams, PhysicsParams};
    use crate::cost::CostModel;
    use crate::movement::MoveKind;
    use crate::testutil::SparseTerrain;
    use rustc_hash::FxHashSet;
    use waymark_region::Classification;

    fn graph() -> MovementGraph {
        let cost = CostModel::new(&PhysicsParams::default(), &MoveCostParams::default());
        MovementGraph::new(Arc::new(cost), GraphParams::default())
    }

    fn request(start: VoxelCoord, goal: Goal) -> SearchRequest {
        SearchRequest {
            start,
            goal,
            params: SearchParams {
                max_millis: None,
                ..SearchParams::default()
            },
        }
    }

    fn run(terrain: &SparseTerrain, req: &SearchRequest) -> SearchReport {
        find_path(terrain, &graph(), req, &CancelToken::new(), &mut |_| {})
    }

    /// Uniform-cost search over the same graph, for optimality checks.
    fn brute_force_cost(terrain: &SparseTerrain, start: VoxelCoord, goal: &Goal) -> Option<f64> {
        let graph = graph();
        let mut best: FxHashMap<VoxelCoord, f64> = FxHashMap::default();
        let mut done: FxHashSet<VoxelCoord> = FxHashSet::default();
        best.insert(start, 0.0);
        let mut out = Vec::new();
        loop {
            let next = best
                .iter()
                .filter(|(p, _)| !done.contains(*p))
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(&p, &c)| (p, c));
            let (pos, cost) = next?;
            if goal.is_satisfied(pos) {
                return Some(cost);
            }
            done.insert(pos);
            out.clear();
            graph.successors(terrain, pos, &mut out);
            for mv in &out {
                let c = cost + mv.cost;
                let entry = best.entry(mv.dest).or_insert(f64::INFINITY);
                if c < *entry {
                    *entry = c;
                }
            }
        }
    }

    /// Flat ground with a two-high wall (climbable by a step at its
    /// middle), a one-deep pit and a two-deep pit.
    fn obstacle_course() -> SparseTerrain {
        let mut terrain = SparseTerrain::flat(6);
        terrain.fill(
            VoxelCoord::new(2, 64, -3),
            VoxelCoord::new(2, 65, 3),
            Classification::Solid,
        );
        terrain.set(VoxelCoord::new(1, 64, 0), Classification::Solid);
        terrain.set(VoxelCoord::new(0, 63, 3), Classification::Air);
        terrain.set(VoxelCoord::new(0, 62, 3), Classification::Solid);
        terrain.set(VoxelCoord::new(-3, 63, -1), Classification::Air);
        terrain.set(VoxelCoord::new(-3, 61, -1), Classification::Solid);
        terrain
    }

    #[test]
    fn start_at_goal_is_an_empty_complete_path() {
        let terrain = SparseTerrain::flat(4);
        let start = VoxelCoord::new(0, 64, 0);
        let report = run(&terrain, &request(start, Goal::Block(start)));
        match report.result {
            SearchResult::Complete(path) => assert!(path.is_empty()),
            other => panic!("expected complete, got {other:?}"),
        }
    }

    #[test]
    fn straight_line_on_flat_ground() {
        let terrain = SparseTerrain::flat(12);
        let start = VoxelCoord::new(0, 64, 0);
        let goal = VoxelCoord::new(10, 64, 10);
        let report = run(&terrain, &request(start, Goal::Block(goal)));
        let SearchResult::Complete(path) = report.result else {
            panic!("expected complete path");
        };
        assert_eq!(path.end(), goal);
        assert!(path
            .movements()
            .iter()
            .all(|m| matches!(m.kind, MoveKind::Traverse | MoveKind::Diagonal)));
        // Ten diagonal steps is optimal.
        assert_eq!(path.len(), 10);
        let sum: f64 = path.movements().iter().map(|m| m.cost).sum();
        assert_eq!(path.total_cost(), sum);
    }

    #[test]
    fn matches_brute_force_optimum() {
        let terrain = obstacle_course();
        let start = VoxelCoord::new(-4, 64, -4);
        for goal in [
            Goal::Block(VoxelCoord::new(4, 64, 4)),
            Goal::Block(VoxelCoord::new(2, 66, 0)),
            Goal::Block(VoxelCoord::new(0, 63, 3)),
            Goal::Block(VoxelCoord::new(-3, 62, -1)),
            Goal::Near {
                center: VoxelCoord::new(5, 64, -5),
                radius: 1,
            },
        ] {
            let expected = brute_force_cost(&terrain, start, &goal).expect("reachable");
            let report = run(&terrain, &request(start, goal.clone()));
            let SearchResult::Complete(path) = report.result else {
                panic!("{goal}: expected complete");
            };
            assert!(
                (path.total_cost() - expected).abs() < 1e-6,
                "{goal}: A* {} vs brute force {expected}",
                path.total_cost()
            );
        }
    }

    #[test]
    fn walled_in_start_is_unreachable() {
        let mut terrain = SparseTerrain::flat(10);
        for i in -2..=2 {
            for (x, z) in [(i, -2), (i, 2), (-2, i), (2, i)] {
                terrain.fill(
                    VoxelCoord::new(x, 64, z),
                    VoxelCoord::new(x, 65, z),
                    Classification::Solid,
                );
            }
        }
        let start = VoxelCoord::new(0, 64, 0);
        let report = run(&terrain, &request(start, Goal::Block(VoxelCoord::new(8, 64, 8))));
        assert_eq!(report.result, SearchResult::Unreachable);
        assert!(report.expanded > 0);
    }

    #[test]
    fn node_budget_yields_provisional_progress() {
        let terrain = SparseTerrain::flat(40);
        let start = VoxelCoord::new(0, 64, 0);
        let goal = VoxelCoord::new(35, 64, 0);
        let mut req = request(start, Goal::Block(goal));
        req.params.max_nodes = 10;
        let report = run(&terrain, &req);
        let SearchResult::Provisional(path) = report.result else {
            panic!("expected provisional");
        };
        assert!(path.is_provisional());
        assert!(path.end().manhattan_distance(goal) < start.manhattan_distance(goal));
        assert_eq!(report.expanded, 10);
    }

    #[test]
    fn canceled_token_stops_search() {
        let terrain = SparseTerrain::flat(20);
        let start = VoxelCoord::new(0, 64, 0);
        let mut req = request(start, Goal::Block(VoxelCoord::new(18, 64, 18)));
        req.params.cancel_check_interval = 1;
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = find_path(&terrain, &graph(), &req, &cancel, &mut |_| {});
        assert_eq!(report.result, SearchResult::Canceled);
    }

    #[test]
    fn searches_are_deterministic() {
        let terrain = obstacle_course();
        let req = request(VoxelCoord::new(-5, 64, 5), Goal::Block(VoxelCoord::new(5, 64, -5)));
        let a = run(&terrain, &req);
        let b = run(&terrain, &req);
        assert_eq!(a.result, b.result);
        assert_eq!(a.expanded, b.expanded);
    }

    #[test]
    fn frontier_snapshots_are_published() {
        let terrain = SparseTerrain::flat(20);
        let mut req = request(VoxelCoord::new(0, 64, 0), Goal::Block(VoxelCoord::new(100, 64, 0)));
        req.params.frontier_publish_interval = 8;
        req.params.frontier_sample = 4;
        let mut snapshots = Vec::new();
        let report = find_path(&terrain, &graph(), &req, &CancelToken::new(), &mut |s| {
            snapshots.push(s)
        });
        assert_eq!(report.result, SearchResult::Unreachable);
        assert!(!snapshots.is_empty());
        assert!(snapshots.iter().all(|s| s.open.len() <= 4));
        assert_eq!(snapshots[0].expanded, 8);
    }

    #[test]
    fn empty_any_of_is_unreachable_without_searching() {
        let terrain = SparseTerrain::flat(6);
        let report = run(&terrain, &request(VoxelCoord::new(0, 64, 0), Goal::AnyOf(vec![])));
        assert_eq!(report.result, SearchResult::Unreachable);
        assert_eq!(report.expanded, 0);
    }
}
