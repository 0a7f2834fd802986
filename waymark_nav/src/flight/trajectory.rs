// Continuous-space trajectory search for the flight variant.
//
// The planner runs A* over a lattice anchored at the start point: nodes are
// `start + (i, j, k) * step` for integer offsets, and every node links to
// its 26 neighbours. An edge is usable when the straight segment between
// its endpoints is clear, checked by sampling every `sample_spacing` blocks
// and probing a cube of points `clearance` blocks around each sample
// through an `OccupancyCursor`. The clearance envelope is waived within
// `clearance` of the start and target so the agent can take off from and
// land on solid ground.
//
// Edge cost is Euclidean length and the heuristic is straight-line distance
// to the target, so the lattice search is optimal within the lattice. A
// node within `arrival_radius` of the target completes the search; the
// target itself is appended when the last hop to it is clear. On node
// budget or cancellation the plan ends at the expanded node nearest the
// target and is marked incomplete. A lattice that runs out of open nodes
// first marks the plan exhausted: the target cannot be reached from the
// start at this step and clearance, and no path is produced from it.
//
// The raw lattice route is then string-pulled: from each kept waypoint the
// farthest later waypoint with a clear segment becomes the next one.
//
// See also: `octree.rs` for occupancy, `navigator.rs` which turns a
// `FlightPlan` into a path of fly movements.

use super::octree::{OccupancyCursor, OccupancyIndex};
use crate::config::FlightParams;
use crate::movement::{MoveKind, Movement};
use crate::path::Path;
use crate::pathfinding::CancelToken;
use crate::types::Vec3;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const CANCEL_CHECK_INTERVAL: usize = 64;

/// Result of one flight search. `waypoints[0]` is the start point.
#[derive(Clone, Debug, PartialEq)]
pub struct FlightPlan {
    pub waypoints: Vec<Vec3>,
    /// False when the plan stops short of the target (budget or cancel).
    pub complete: bool,
    /// Every lattice node reachable from the start was expanded without
    /// getting near the target.
    pub exhausted: bool,
    pub expanded: usize,
}

impl FlightPlan {
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn end(&self) -> Option<Vec3> {
        self.waypoints.last().copied()
    }

    /// Length of the flight line in blocks.
    pub fn distance(&self) -> f64 {
        self.waypoints.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// One `Fly` movement per waypoint hop, between the voxels containing
    /// the waypoints. Hops that stay inside one voxel are merged away.
    /// Incomplete plans produce provisional paths; exhausted plans produce
    /// none.
    pub fn into_path(&self, ticks_per_block: f64) -> Option<Path> {
        if self.exhausted {
            return None;
        }
        let first = self.waypoints.first()?;
        let start = first.voxel();
        let mut movements = Vec::with_capacity(self.waypoints.len());
        let mut at = start;
        for waypoint in &self.waypoints[1..] {
            let dest = waypoint.voxel();
            if dest == at {
                continue;
            }
            let cost = at.center().distance(dest.center()) * ticks_per_block;
            movements.push(Movement::new(MoveKind::Fly, at, dest, cost));
            at = dest;
        }
        Path::new(start, movements, !self.complete)
    }
}

type Lattice = (i32, i32, i32);

struct Node {
    lattice: Lattice,
    pos: Vec3,
    g: f64,
    h: f64,
    parent: Option<u32>,
    closed: bool,
}

#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    f: f64,
    seq: u64,
    node: u32,
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
    // Reversed so `BinaryHeap` pops the lowest f first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Clearance-aware segment sampler over an occupancy index.
pub struct SegmentProbe<'a> {
    cursor: OccupancyCursor<'a>,
    clearance: f64,
    spacing: f64,
    exempt: [Vec3; 2],
}

impl<'a> SegmentProbe<'a> {
    pub fn new(index: &'a OccupancyIndex, params: &FlightParams, start: Vec3, target: Vec3) -> Self {
        Self {
            cursor: index.cursor(),
            clearance: params.clearance.max(0.0),
            spacing: params.sample_spacing.max(0.05),
            exempt: [start, target],
        }
    }

    fn point_clear(&mut self, p: Vec3) -> bool {
        if self.cursor.is_solid(p) {
            return false;
        }
        let c = self.clearance;
        if c == 0.0 || self.exempt.iter().any(|e| e.distance(p) <= c) {
            return true;
        }
        for dx in [-c, 0.0, c] {
            for dy in [-c, 0.0, c] {
                for dz in [-c, 0.0, c] {
                    if self.cursor.is_solid(p + Vec3::new(dx, dy, dz)) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Whether the straight segment `a -> b` keeps its clearance.
    pub fn segment_clear(&mut self, a: Vec3, b: Vec3) -> bool {
        let samples = (a.distance(b) / self.spacing).ceil().max(1.0) as u32;
        (0..=samples).all(|s| self.point_clear(a.lerp(b, f64::from(s) / f64::from(samples))))
    }

    /// Index lookups made so far.
    pub fn lookups(&self) -> u64 {
        self.cursor.lookups()
    }
}

/// Search for a flight line from `start` to `target` through `index`.
pub fn plan_flight(
    index: &OccupancyIndex,
    params: &FlightParams,
    start: Vec3,
    target: Vec3,
    cancel: &CancelToken,
) -> FlightPlan {
    let mut probe = SegmentProbe::new(index, params, start, target);
    let step = params.step.max(0.25);
    let (min_y, max_y) = (f64::from(params.min_y), f64::from(params.max_y) + 1.0);

    let mut nodes = vec![Node {
        lattice: (0, 0, 0),
        pos: start,
        g: 0.0,
        h: start.distance(target),
        parent: None,
        closed: false,
    }];
    let mut by_lattice: FxHashMap<Lattice, u32> = FxHashMap::default();
    by_lattice.insert((0, 0, 0), 0);
    let mut open = BinaryHeap::new();
    open.push(OpenEntry {
        f: nodes[0].h,
        seq: 0,
        node: 0,
    });
    let mut seq = 1u64;
    let mut best = 0u32;
    let mut expanded = 0usize;
    let mut exhausted = false;

    let reached = loop {
        if expanded % CANCEL_CHECK_INTERVAL == 0 && cancel.is_canceled() {
            log::debug!("flight: canceled after {expanded} expansions");
            break None;
        }
        if expanded >= params.max_nodes {
            log::debug!("flight: node budget hit, best {:.1} from target", nodes[best as usize].h);
            break None;
        }
        let Some(entry) = open.pop() else {
            log::debug!("flight: lattice exhausted after {expanded} expansions");
            exhausted = true;
            break None;
        };
        let current = entry.node;
        let node = &mut nodes[current as usize];
        if node.closed {
            continue;
        }
        node.closed = true;
        expanded += 1;
        let (lattice, pos, g, h) = (node.lattice, node.pos, node.g, node.h);
        if h < nodes[best as usize].h {
            best = current;
        }
        if h <= params.arrival_radius {
            break Some(current);
        }

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if (dx, dy, dz) == (0, 0, 0) {
                        continue;
                    }
                    let next = (lattice.0 + dx, lattice.1 + dy, lattice.2 + dz);
                    let next_pos = start
                        + Vec3::new(f64::from(next.0), f64::from(next.1), f64::from(next.2)) * step;
                    if next_pos.y < min_y || next_pos.y > max_y {
                        continue;
                    }
                    let tentative = g + pos.distance(next_pos);
                    let existing = by_lattice.get(&next).copied();
                    if let Some(id) = existing {
                        let known = &nodes[id as usize];
                        if known.closed || known.g <= tentative {
                            continue;
                        }
                    }
                    if !probe.segment_clear(pos, next_pos) {
                        continue;
                    }
                    let id = match existing {
                        Some(id) => id,
                        None => {
                            let id = nodes.len() as u32;
                            nodes.push(Node {
                                lattice: next,
                                pos: next_pos,
                                g: f64::INFINITY,
                                h: next_pos.distance(target),
                                parent: None,
                                closed: false,
                            });
                            by_lattice.insert(next, id);
                            id
                        }
                    };
                    let n = &mut nodes[id as usize];
                    n.g = tentative;
                    n.parent = Some(current);
                    open.push(OpenEntry {
                        f: tentative + n.h,
                        seq,
                        node: id,
                    });
                    seq += 1;
                }
            }
        }
    };

    let end = reached.unwrap_or(best);
    let mut route = Vec::new();
    let mut at = Some(end);
    while let Some(id) = at {
        let node = &nodes[id as usize];
        route.push(node.pos);
        at = node.parent;
    }
    route.reverse();

    let complete = reached.is_some();
    if complete
        && let Some(&last) = route.last()
        && last.distance(target) > 1e-6
        && probe.segment_clear(last, target)
    {
        route.push(target);
    }

    let waypoints = smooth(&mut probe, route);
    log::debug!(
        "flight: {} waypoints, {expanded} expansions, complete={complete}, exhausted={exhausted}, {} lookups",
        waypoints.len(),
        probe.lookups()
    );
    FlightPlan {
        waypoints,
        complete,
        exhausted,
        expanded,
    }
}

/// Line-of-sight string pulling over a clear route.
fn smooth(probe: &mut SegmentProbe<'_>, route: Vec<Vec3>) -> Vec<Vec3> {
    if route.len() <= 2 {
        return route;
    }
    let mut out = vec![route[0]];
    let mut i = 0;
    while i + 1 < route.len() {
        let mut j = route.len() - 1;
        while j > i + 1 && !probe.segment_clear(route[i], route[j]) {
            j -= 1;
        }
        out.push(route[j]);
        i = j;
    }
    out
}
