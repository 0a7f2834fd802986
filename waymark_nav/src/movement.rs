// Primitive movements: the edges of the movement graph.
//
// A `Movement` is one instance of a closed set of templates (`MoveKind`)
// between two standing positions, with its tick cost fixed when the graph
// generated it. Positions are feet voxels; the agent is two voxels tall, so
// a standing position needs its feet and head voxels passable.
//
// Each movement knows its footprint: every voxel the agent's body sweeps
// through while performing it. The graph checks the footprint when it
// generates the edge, and execution re-checks it against the live cache
// every tick so a block placed in the way fails the movement promptly.
//
// Templates carry a fixed preference order used to break cost ties in the
// open set: plain walking first, then diagonal walking, swimming, dropping,
// jumping, and flight last.
//
// See also: `graph.rs` which generates movements, `executor.rs` which runs
// them.

use crate::types::{Vec3, VoxelCoord};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Movement template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveKind {
    /// One block to a cardinal neighbour at the same height.
    Traverse,
    /// One block diagonally at the same height.
    Diagonal,
    /// Jump up one block onto a cardinal neighbour.
    Ascend,
    /// Step off onto a cardinal neighbour one block lower.
    Descend,
    /// Step off a ledge and drop two or more blocks.
    Fall { blocks: u32 },
    /// Running jump across `gap` empty columns, landing at the same height.
    Parkour { gap: u32 },
    SwimUp,
    SwimDown,
    /// One straight segment of a flight trajectory.
    Fly,
}

impl MoveKind {
    /// Tie-break rank in the open set. Lower is preferred.
    pub fn priority(self) -> u8 {
        match self {
            MoveKind::Traverse => 0,
            MoveKind::Diagonal => 1,
            MoveKind::SwimUp | MoveKind::SwimDown => 2,
            MoveKind::Descend | MoveKind::Fall { .. } => 3,
            MoveKind::Ascend | MoveKind::Parkour { .. } => 4,
            MoveKind::Fly => 5,
        }
    }

    /// True for moves with a ballistic phase that cannot be interrupted
    /// without leaving the agent mid-air.
    pub fn is_airborne(self) -> bool {
        matches!(
            self,
            MoveKind::Ascend | MoveKind::Descend | MoveKind::Fall { .. } | MoveKind::Parkour { .. }
        )
    }

    /// True for moves that need the jump input.
    pub fn needs_jump(self) -> bool {
        matches!(self, MoveKind::Ascend | MoveKind::Parkour { .. } | MoveKind::SwimUp)
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveKind::Fall { blocks } => write!(f, "Fall({blocks})"),
            MoveKind::Parkour { gap } => write!(f, "Parkour({gap})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// One edge of a path.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub kind: MoveKind,
    pub src: VoxelCoord,
    pub dest: VoxelCoord,
    /// Estimated ticks to perform, including any uncertainty penalties.
    pub cost: f64,
}

impl Movement {
    pub fn new(kind: MoveKind, src: VoxelCoord, dest: VoxelCoord, cost: f64) -> Self {
        Self {
            kind,
            src,
            dest,
            cost,
        }
    }

    /// Point the agent steers toward.
    pub fn target(&self) -> Vec3 {
        match self.kind {
            MoveKind::Fly => self.dest.center(),
            _ => self.dest.feet_center(),
        }
    }

    /// Voxels the body occupies during the move that must stay passable,
    /// destination feet first.
    pub fn footprint(&self) -> SmallVec<[VoxelCoord; 12]> {
        let (src, dest) = (self.src, self.dest);
        let mut out: SmallVec<[VoxelCoord; 12]> = SmallVec::new();
        out.push(dest);
        match self.kind {
            MoveKind::Traverse | MoveKind::SwimUp | MoveKind::Fly => {
                out.push(dest.up(1));
            }
            MoveKind::SwimDown => {}
            MoveKind::Diagonal => {
                out.push(dest.up(1));
                for corner in [
                    VoxelCoord::new(dest.x, src.y, src.z),
                    VoxelCoord::new(src.x, src.y, dest.z),
                ] {
                    out.push(corner);
                    out.push(corner.up(1));
                }
            }
            MoveKind::Ascend => {
                out.push(dest.up(1));
                out.push(src.up(2));
            }
            MoveKind::Descend => {
                out.push(dest.up(1));
                out.push(dest.up(2));
            }
            MoveKind::Fall { blocks } => {
                for k in 1..=blocks as i32 + 1 {
                    out.push(dest.up(k));
                }
            }
            MoveKind::Parkour { gap } => {
                out.push(dest.up(1));
                out.push(dest.up(2));
                out.push(src.up(2));
                let (dx, dz) = self.direction();
                for k in 1..=gap as i32 {
                    let column = src.offset(dx * k, 0, dz * k);
                    out.push(column);
                    out.push(column.up(1));
                    out.push(column.up(2));
                }
            }
        }
        out
    }

    /// The voxel that must be solid under the destination, if any.
    pub fn support(&self) -> Option<VoxelCoord> {
        match self.kind {
            MoveKind::Traverse
            | MoveKind::Diagonal
            | MoveKind::Ascend
            | MoveKind::Parkour { .. } => Some(self.dest.down(1)),
            _ => None,
        }
    }

    /// Unit horizontal step from source toward destination.
    pub fn direction(&self) -> (i32, i32) {
        (
            (self.dest.x - self.src.x).signum(),
            (self.dest.z - self.src.z).signum(),
        )
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({:.1}t)",
            self.kind, self.src, self.dest, self.cost
        )
    }
}

/// Execution state of the current movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementStatus {
    /// Orienting and issuing the first input.
    Prepping,
    Running,
    Success,
    /// Stopped at the navigator's request.
    Canceled,
    /// The destination itself is now blocked.
    Unreachable,
    /// The movement exceeded its tick budget.
    CostTooHigh,
    /// Something in the way or the agent drifted off course.
    Failed,
}

impl MovementStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MovementStatus::Prepping | MovementStatus::Running)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            MovementStatus::Unreachable | MovementStatus::CostTooHigh | MovementStatus::Failed
        )
    }
}
