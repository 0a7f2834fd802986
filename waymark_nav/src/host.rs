// Narrow capabilities the host environment injects into the engine.
//
// The engine never touches host world or entity types. Everything it reads
// comes through `TerrainSource` (ground-truth voxel classification, sampled
// only by the cache's observation pass) and `AgentSensor` (the agent's
// current position and velocity, read by execution each tick). Everything
// it asks the agent to do comes back out as `AgentAction`s in the tick
// report, which the host adapter translates into real input.
//
// Block-change notifications arrive as `BlockChange` values through
// `Navigator::handle_block_change`.

use crate::types::{Vec3, VoxelCoord};
use serde::{Deserialize, Serialize};
use waymark_region::Classification;

/// Ground-truth sampling of the live world.
pub trait TerrainSource {
    /// Classification of the voxel at `pos`, or `Unknown` if the host does
    /// not currently have that part of the world loaded.
    fn classification_of(&self, pos: VoxelCoord) -> Classification;
}

/// Live agent state.
pub trait AgentSensor {
    /// Feet position in world units.
    fn agent_position(&self) -> Vec3;

    /// Velocity in blocks per tick.
    fn agent_velocity(&self) -> Vec3;

    /// True when the agent is standing on something. The default infers it
    /// from vertical velocity, which is good enough for hosts that do not
    /// report ground contact.
    fn on_ground(&self) -> bool {
        self.agent_velocity().y.abs() < 1e-3
    }
}

/// An observed change to a single voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChange {
    pub position: VoxelCoord,
    pub before: Classification,
    pub after: Classification,
}

/// Primitive input the engine asks the host to apply this tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AgentAction {
    /// Orient toward a point.
    LookAt(Vec3),
    /// Press movement input toward a point.
    MoveToward { target: Vec3, sprint: bool },
    /// Press jump this tick.
    Jump,
    /// Hold the swim-down input this tick.
    Sink,
    /// Release all movement input.
    Stop,
}
