// Search goals.
//
// A `Goal` is a predicate over feet positions plus an admissible lower bound
// on the remaining displacement. The bound is per-axis (horizontal, up,
// down) so `CostModel::heuristic` can price each axis at its cheapest rate.
//
// Horizontal distance is Euclidean when diagonal moves are enabled and
// Manhattan otherwise. Both are lower bounds on the horizontal length of any
// path made of that move set's steps.
//
// See also: `cost.rs` for the heuristic, `pathfinding.rs` which tests goals
// when a node is popped.

use crate::cost::{CostModel, Displacement};
use crate::types::VoxelCoord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    /// Stand exactly at this position.
    Block(VoxelCoord),
    /// Stand anywhere within `radius` blocks (Euclidean) of `center`.
    Near { center: VoxelCoord, radius: u32 },
    /// Reach this column at any height.
    Xz { x: i32, z: i32 },
    /// Reach this height anywhere.
    YLevel(i32),
    /// Reach any of these.
    AnyOf(Vec<Goal>),
}

impl Goal {
    pub fn is_satisfied(&self, pos: VoxelCoord) -> bool {
        match self {
            Goal::Block(target) => pos == *target,
            Goal::Near { center, radius } => {
                let dx = i64::from(pos.x - center.x);
                let dy = i64::from(pos.y - center.y);
                let dz = i64::from(pos.z - center.z);
                let r = i64::from(*radius);
                dx * dx + dy * dy + dz * dz <= r * r
            }
            Goal::Xz { x, z } => pos.x == *x && pos.z == *z,
            Goal::YLevel(y) => pos.y == *y,
            Goal::AnyOf(goals) => goals.iter().any(|g| g.is_satisfied(pos)),
        }
    }

    /// True when no position can satisfy the goal: an `AnyOf` with no
    /// satisfiable member.
    pub fn is_unsatisfiable(&self) -> bool {
        match self {
            Goal::AnyOf(goals) => goals.iter().all(Goal::is_unsatisfiable),
            _ => false,
        }
    }

    /// Admissible estimate of the ticks from `pos` to this goal.
    pub fn heuristic(&self, model: &CostModel, pos: VoxelCoord, euclidean: bool) -> f64 {
        match self {
            Goal::AnyOf(goals) => goals
                .iter()
                .map(|g| g.heuristic(model, pos, euclidean))
                .fold(f64::INFINITY, f64::min),
            single => single
                .displacement(pos, euclidean)
                .map_or(0.0, |d| model.heuristic(d)),
        }
    }

    fn displacement(&self, pos: VoxelCoord, euclidean: bool) -> Option<Displacement> {
        let (dx, dy, dz) = match self {
            Goal::Block(target) => (target.x - pos.x, target.y - pos.y, target.z - pos.z),
            Goal::Near { center, radius } => {
                // Any point in the ball lies in the box of the same radius,
                // so shrinking each axis by the radius stays admissible.
                let r = *radius as i32;
                let shrink = |d: i32| d.signum() * (d.abs() - r).max(0);
                (
                    shrink(center.x - pos.x),
                    shrink(center.y - pos.y),
                    shrink(center.z - pos.z),
                )
            }
            Goal::Xz { x, z } => (x - pos.x, 0, z - pos.z),
            Goal::YLevel(y) => (0, y - pos.y, 0),
            Goal::AnyOf(_) => return None,
        };
        let (fx, fz) = (f64::from(dx.abs()), f64::from(dz.abs()));
        let horizontal = if euclidean {
            (fx * fx + fz * fz).sqrt()
        } else {
            fx + fz
        };
        Some(Displacement {
            horizontal,
            up: f64::from(dy.max(0)),
            down: f64::from((-dy).max(0)),
        })
    }

    /// A representative position, for logging and debug views.
    pub fn anchor(&self) -> Option<VoxelCoord> {
        match self {
            Goal::Block(pos) => Some(*pos),
            Goal::Near { center, .. } => Some(*center),
            Goal::Xz { .. } | Goal::YLevel(_) => None,
            Goal::AnyOf(goals) => goals.iter().find_map(Goal::anchor),
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Block(pos) => write!(f, "block {pos}"),
            Goal::Near { center, radius } => write!(f, "within {radius} of {center}"),
            Goal::Xz { x, z } => write!(f, "column ({x}, {z})"),
            Goal::YLevel(y) => write!(f, "y={y}"),
            Goal::AnyOf(goals) => write!(f, "any of {} goals", goals.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MoveCostParams, PhysicsParams};

    fn model() -> CostModel {
        CostModel::new(&PhysicsParams::default(), &MoveCostParams::default())
    }

    #[test]
    fn block_goal_is_exact() {
        let goal = Goal::Block(VoxelCoord::new(1, 2, 3));
        assert!(goal.is_satisfied(VoxelCoord::new(1, 2, 3)));
        assert!(!goal.is_satisfied(VoxelCoord::new(1, 3, 3)));
        assert_eq!(goal.heuristic(&model(), VoxelCoord::new(1, 2, 3), true), 0.0);
    }

    #[test]
    fn near_goal_bound_is_zero_inside_ball() {
        let center = VoxelCoord::new(0, 64, 0);
        let goal = Goal::Near { center, radius: 3 };
        let inside = VoxelCoord::new(2, 64, 2);
        assert!(goal.is_satisfied(inside));
        assert_eq!(goal.heuristic(&model(), inside, true), 0.0);
        let corner = VoxelCoord::new(3, 64, 3);
        assert!(!goal.is_satisfied(corner));
        assert!(goal.heuristic(&model(), VoxelCoord::new(10, 64, 0), true) > 0.0);
    }

    #[test]
    fn xz_and_y_level_ignore_the_other_axes() {
        let m = model();
        let xz = Goal::Xz { x: 5, z: 5 };
        assert!(xz.is_satisfied(VoxelCoord::new(5, 200, 5)));
        assert_eq!(xz.heuristic(&m, VoxelCoord::new(5, 10, 5), true), 0.0);

        let y = Goal::YLevel(12);
        assert!(y.is_satisfied(VoxelCoord::new(-100, 12, 40)));
        assert_eq!(y.heuristic(&m, VoxelCoord::new(1000, 12, 1000), true), 0.0);
        assert!(y.heuristic(&m, VoxelCoord::new(0, 20, 0), true) > 0.0);
    }

    #[test]
    fn any_of_takes_the_nearest() {
        let m = model();
        let a = Goal::Block(VoxelCoord::new(10, 64, 0));
        let b = Goal::Block(VoxelCoord::new(2, 64, 0));
        let from = VoxelCoord::new(0, 64, 0);
        let any = Goal::AnyOf(vec![a.clone(), b.clone()]);
        assert_eq!(any.heuristic(&m, from, true), b.heuristic(&m, from, true));
        assert!(any.is_satisfied(VoxelCoord::new(10, 64, 0)));
        assert_eq!(any.anchor(), Some(VoxelCoord::new(10, 64, 0)));
    }

    #[test]
    fn manhattan_bound_dominates_euclidean() {
        let m = model();
        let goal = Goal::Block(VoxelCoord::new(6, 64, 8));
        let from = VoxelCoord::new(0, 64, 0);
        assert!(goal.heuristic(&m, from, false) > goal.heuristic(&m, from, true));
    }

    #[test]
    fn empty_any_of_is_unsatisfiable() {
        let empty = Goal::AnyOf(vec![]);
        assert!(empty.is_unsatisfiable());
        assert!(Goal::AnyOf(vec![Goal::AnyOf(vec![])]).is_unsatisfiable());
        assert!(!Goal::AnyOf(vec![Goal::YLevel(70)]).is_unsatisfiable());
        assert!(!empty.is_satisfied(VoxelCoord::new(0, 64, 0)));
    }
}
