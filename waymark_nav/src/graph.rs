// Movement graph: implicit successor generation over cached terrain.
//
// Nodes are standing positions (feet voxels). The graph is never built
// explicitly; `MovementGraph::successors` enumerates the movements valid
// from one position against a `ClassificationView`, which during search is
// a `CacheSnapshot`. Generation is read-only.
//
// Validity rules, shared by every template:
// - Voxels the body sweeps through must be passable (AIR or WATER).
//   SOLID or AVOID anywhere in the sweep rejects the move.
// - Voxels the agent lands on must be SOLID, or the destination must be in
//   or on WATER.
// - An UNKNOWN voxel in either role is treated optimistically, adding
//   `unknown_penalty` to the cost, up to `unknown_tolerance` per move.
//   Past the tolerance the move is rejected, so with the default of zero
//   the search never plans through unobserved terrain.
// - A destination next to an AVOID voxel costs `avoid_adjacent_penalty`
//   extra.
//
// Moves are generated in template priority order (walk, diagonal, swim,
// drop, jump) and, within a template, in `CARDINALS`/`DIAGONALS` order.
// Together with the open set's FIFO tie-break this makes the whole search
// deterministic for a fixed snapshot.
//
// See also: `movement.rs` for the templates and their footprints,
// `cost.rs` for prices, `pathfinding.rs` which drives expansion.

use crate::cache::ClassificationView;
use crate::config::GraphParams;
use crate::cost::CostModel;
use crate::movement::{MoveKind, Movement};
use crate::types::{CARDINALS, DIAGONALS, VoxelCoord};
use std::sync::Arc;
use waymark_region::Classification;

/// Accumulates the uncertainty of one candidate move.
#[derive(Default)]
struct Sweep {
    unknown: u32,
}

impl Sweep {
    /// Body must fit through `pos`.
    fn clear(&mut self, view: &(impl ClassificationView + ?Sized), pos: VoxelCoord) -> bool {
        match view.classify(pos) {
            Classification::Air | Classification::Water => true,
            Classification::Unknown => {
                self.unknown += 1;
                true
            }
            Classification::Solid | Classification::Avoid => false,
        }
    }

    fn all_clear(
        &mut self,
        view: &(impl ClassificationView + ?Sized),
        voxels: &[VoxelCoord],
    ) -> bool {
        voxels.iter().all(|&pos| self.clear(view, pos))
    }

    /// Something under `feet` will hold the agent: solid ground, or the
    /// agent is in or on water.
    fn supported(&mut self, view: &(impl ClassificationView + ?Sized), feet: VoxelCoord) -> bool {
        if view.classify(feet) == Classification::Water {
            return true;
        }
        match view.classify(feet.down(1)) {
            Classification::Solid | Classification::Water => true,
            Classification::Unknown => {
                self.unknown += 1;
                true
            }
            Classification::Air | Classification::Avoid => false,
        }
    }
}

/// Successor generator for one config.
#[derive(Clone, Debug)]
pub struct MovementGraph {
    cost: Arc<CostModel>,
    params: GraphParams,
}

impl MovementGraph {
    pub fn new(cost: Arc<CostModel>, params: GraphParams) -> Self {
        Self { cost, params }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    /// Whether the heuristic should use Euclidean horizontal distance.
    pub fn euclidean(&self) -> bool {
        self.params.allow_diagonal
    }

    /// Whether an agent can stand at `pos` right now.
    pub fn is_standable(&self, view: &(impl ClassificationView + ?Sized), pos: VoxelCoord) -> bool {
        let passable = |p| view.classify(p).is_passable();
        let water_or_ground = view.classify(pos) == Classification::Water
            || matches!(
                view.classify(pos.down(1)),
                Classification::Solid | Classification::Water
            );
        passable(pos) && passable(pos.up(1)) && water_or_ground
    }

    /// Append every valid movement from `from` to `out`.
    pub fn successors(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        out: &mut Vec<Movement>,
    ) {
        let in_water = view.classify(from) == Classification::Water;

        for (dx, dz) in CARDINALS {
            self.push_traverse(view, from, dx, dz, in_water, out);
        }
        if self.params.allow_diagonal {
            for (dx, dz) in DIAGONALS {
                self.push_diagonal(view, from, dx, dz, in_water, out);
            }
        }
        if in_water {
            self.push_swim(view, from, out);
        }
        for (dx, dz) in CARDINALS {
            self.push_drop(view, from, dx, dz, out);
        }
        for (dx, dz) in CARDINALS {
            self.push_ascend(view, from, dx, dz, out);
        }
        if self.params.allow_parkour && !in_water {
            for (dx, dz) in CARDINALS {
                self.push_parkour(view, from, dx, dz, out);
            }
        }
    }

    /// Apply the uncertainty and AVOID-adjacency surcharges and emit.
    fn finish(
        &self,
        view: &(impl ClassificationView + ?Sized),
        sweep: Sweep,
        mut movement: Movement,
        out: &mut Vec<Movement>,
    ) {
        if sweep.unknown > self.params.unknown_tolerance {
            return;
        }
        movement.cost += f64::from(sweep.unknown) * self.params.unknown_penalty;
        let dest = movement.dest;
        let near_avoid = CARDINALS
            .iter()
            .any(|&(dx, dz)| view.classify(dest.offset(dx, 0, dz)) == Classification::Avoid);
        if near_avoid {
            movement.cost += self.params.avoid_adjacent_penalty;
        }
        out.push(movement);
    }

    fn push_traverse(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        dx: i32,
        dz: i32,
        in_water: bool,
        out: &mut Vec<Movement>,
    ) {
        let dest = from.offset(dx, 0, dz);
        let mut sweep = Sweep::default();
        if !sweep.all_clear(view, &[dest, dest.up(1)]) {
            return;
        }
        // Open air under the destination is a drop, not a walk.
        if !sweep.supported(view, dest) {
            return;
        }
        let wet = in_water || view.classify(dest) == Classification::Water;
        let movement = Movement::new(MoveKind::Traverse, from, dest, self.cost.traverse(wet));
        self.finish(view, sweep, movement, out);
    }

    fn push_diagonal(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        dx: i32,
        dz: i32,
        in_water: bool,
        out: &mut Vec<Movement>,
    ) {
        let dest = from.offset(dx, 0, dz);
        let a = from.offset(dx, 0, 0);
        let b = from.offset(0, 0, dz);
        let mut sweep = Sweep::default();
        if !sweep.all_clear(view, &[dest, dest.up(1), a, a.up(1), b, b.up(1)]) {
            return;
        }
        if !sweep.supported(view, dest) {
            return;
        }
        let wet = in_water || view.classify(dest) == Classification::Water;
        let movement = Movement::new(MoveKind::Diagonal, from, dest, self.cost.diagonal(wet));
        self.finish(view, sweep, movement, out);
    }

    fn push_swim(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        out: &mut Vec<Movement>,
    ) {
        let up = from.up(1);
        let mut sweep = Sweep::default();
        if sweep.all_clear(view, &[up, up.up(1)]) {
            let movement = Movement::new(MoveKind::SwimUp, from, up, self.cost.swim_vertical());
            self.finish(view, sweep, movement, out);
        }
        let down = from.down(1);
        if view.classify(down) == Classification::Water {
            let movement = Movement::new(MoveKind::SwimDown, from, down, self.cost.swim_vertical());
            self.finish(view, Sweep::default(), movement, out);
        }
    }

    /// Step into a neighbouring column whose floor is missing and drop until
    /// something catches the agent.
    fn push_drop(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        dx: i32,
        dz: i32,
        out: &mut Vec<Movement>,
    ) {
        let column = from.offset(dx, 0, dz);
        let mut sweep = Sweep::default();
        if !sweep.all_clear(view, &[column, column.up(1)]) {
            return;
        }
        let max_depth = self.params.max_safe_fall.max(self.params.max_water_fall) + 1;
        for depth in 1..=max_depth {
            let cell = column.down(depth as i32);
            match view.classify(cell) {
                Classification::Water => {
                    if depth > self.params.max_water_fall {
                        return;
                    }
                    let movement = Movement::new(drop_kind(depth), from, cell, self.drop_cost(depth));
                    self.finish(view, sweep, movement, out);
                    return;
                }
                Classification::Solid => {
                    let landed = depth - 1;
                    // No drop at all means a plain traverse covers it.
                    if landed == 0 || landed > self.params.max_safe_fall {
                        return;
                    }
                    let dest = column.down(landed as i32);
                    let movement = Movement::new(drop_kind(landed), from, dest, self.drop_cost(landed));
                    self.finish(view, sweep, movement, out);
                    return;
                }
                Classification::Air => {}
                Classification::Unknown => {
                    sweep.unknown += 1;
                    if sweep.unknown > self.params.unknown_tolerance {
                        return;
                    }
                }
                Classification::Avoid => return,
            }
        }
    }

    fn drop_cost(&self, blocks: u32) -> f64 {
        if blocks == 1 {
            self.cost.descend()
        } else {
            self.cost.fall(blocks)
        }
    }

    fn push_ascend(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        dx: i32,
        dz: i32,
        out: &mut Vec<Movement>,
    ) {
        let step = from.offset(dx, 0, dz);
        let dest = step.up(1);
        let mut sweep = Sweep::default();
        match view.classify(step) {
            Classification::Solid => {}
            Classification::Unknown => sweep.unknown += 1,
            _ => return,
        }
        if !sweep.all_clear(view, &[from.up(2), dest, dest.up(1)]) {
            return;
        }
        let movement = Movement::new(MoveKind::Ascend, from, dest, self.cost.ascend());
        self.finish(view, sweep, movement, out);
    }

    /// Running jump over one to `max_parkour_gap` floorless columns onto
    /// solid ground at the same height. Only the nearest landing is emitted.
    fn push_parkour(
        &self,
        view: &(impl ClassificationView + ?Sized),
        from: VoxelCoord,
        dx: i32,
        dz: i32,
        out: &mut Vec<Movement>,
    ) {
        let mut sweep = Sweep::default();
        if !sweep.clear(view, from.up(2)) {
            return;
        }
        for gap in 1..=self.params.max_parkour_gap {
            let column = from.offset(dx * gap as i32, 0, dz * gap as i32);
            if !sweep.all_clear(view, &[column, column.up(1), column.up(2)]) {
                return;
            }
            // A floor in the gap means walking works.
            match view.classify(column.down(1)) {
                Classification::Air | Classification::Avoid => {}
                Classification::Unknown => sweep.unknown += 1,
                Classification::Solid | Classification::Water => return,
            }
            let landing = column.offset(dx, 0, dz);
            let mut landing_sweep = Sweep {
                unknown: sweep.unknown,
            };
            if !landing_sweep.all_clear(view, &[landing, landing.up(1), landing.up(2)]) {
                continue;
            }
            if view.classify(landing.down(1)) == Classification::Solid {
                let kind = MoveKind::Parkour { gap };
                let movement = Movement::new(kind, from, landing, self.cost.parkour(gap));
                self.finish(view, landing_sweep, movement, out);
                return;
            }
        }
    }
}

fn drop_kind(blocks: u32) -> MoveKind {
    if blocks == 1 {
        MoveKind::Descend
    } else {
        MoveKind::Fall { blocks }
    }
}
