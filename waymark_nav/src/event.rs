// Navigation events: the narrative of one goal episode.
//
// The navigator emits a `NavEvent` for every decision a host or debug view
// might care about: a goal arriving, a path being installed or extended, a
// movement finishing or failing, a position being given up on, and the
// episode's single terminal outcome. Events are returned from each tick in
// order of occurrence and are also logged at `debug`.
//
// See also: `navigator.rs` which emits these.

use crate::goal::Goal;
use crate::movement::{Movement, MovementStatus};
use crate::types::VoxelCoord;
use serde::{Deserialize, Serialize};

/// How a goal episode ended. Exactly one per submitted goal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EpisodeOutcome {
    /// The agent stands in the goal.
    Reached,
    /// No further progress is possible.
    GaveUp { reason: GiveUpReason },
    /// The host canceled, or submitted a different goal.
    Canceled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GiveUpReason {
    /// The search exhausted every reachable position.
    Unreachable,
    /// The per-goal re-search cap was hit.
    TooManyReplans,
    /// Searches keep returning no progress toward the goal.
    NoProgress,
}

/// An event emitted on a specific tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavEvent {
    pub tick: u64,
    pub kind: NavEventKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NavEventKind {
    GoalSubmitted { goal: Goal },
    /// A fresh path replaced whatever was executing.
    PathInstalled {
        movements: usize,
        cost: f64,
        provisional: bool,
    },
    /// A continuation was appended to the executing provisional path.
    PathExtended { added: usize, provisional: bool },
    MovementCompleted { movement: Movement },
    MovementFailed {
        movement: Movement,
        status: MovementStatus,
        retries: u32,
    },
    /// The retry ledger gave up on a position; it now reads as AVOID.
    PositionAbandoned { position: VoxelCoord },
    /// A new search was started from the agent's position.
    Replanning { from: VoxelCoord, replans: u32 },
    EpisodeEnded { outcome: EpisodeOutcome },
}
