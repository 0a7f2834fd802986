// waymark_nav: voxel pathfinding and movement execution.
//
// This crate is the decision engine that turns "get to there" into a
// stream of primitive agent inputs. It reads the world only through the
// narrow host traits in `host.rs`, keeps its own paged memory of observed
// terrain, searches a physically grounded movement graph, and executes the
// result one movement at a time, re-planning on failure with a bounded
// retry budget.
//
// Module overview:
// - `types.rs`:       VoxelCoord (with u64 packing), Vec3.
// - `config.rs`:      PathingConfig and its parameter groups, loaded from JSON.
// - `error.rs`:       ConfigError.
// - `host.rs`:        TerrainSource, AgentSensor, BlockChange, AgentAction.
// - `cache.rs`:       WorldCache (copy-on-write regions, observation, paging
//                     via an I/O thread), CacheSnapshot, ClassificationView.
// - `cost.rs`:        Fall tables and per-template tick costs, heuristic weights.
// - `movement.rs`:    MoveKind templates, Movement, MovementStatus.
// - `goal.rs`:        Goal predicates and admissible lower bounds.
// - `graph.rs`:       MovementGraph successor generation.
// - `path.rs`:        Immutable Path with splicing.
// - `pathfinding.rs`: A* with node budgets, best-effort results, cancellation.
// - `worker.rs`:      SearchWorker: background or inline jobs, single-slot mailbox.
// - `executor.rs`:    PathExecutor movement state machine.
// - `retry.rs`:       RetryLedger.
// - `event.rs`:       NavEvent narrative and episode outcomes.
// - `flight/`:        Occupancy octrees and the continuous trajectory search.
// - `navigator.rs`:   Navigator, the per-tick facade tying it all together.
//
// Threading: the navigator and cache live on the host's tick thread. Only
// searches leave it, and they read an immutable `CacheSnapshot`.

pub mod cache;
pub mod config;
pub mod cost;
pub mod error;
pub mod event;
pub mod executor;
pub mod flight;
pub mod goal;
pub mod graph;
pub mod host;
pub mod movement;
pub mod navigator;
pub mod path;
pub mod pathfinding;
pub mod retry;
pub mod types;
pub mod worker;

#[cfg(test)]
mod testutil;

pub use cache::{CacheSnapshot, CacheStats, ClassificationView, WorldCache};
pub use config::PathingConfig;
pub use error::ConfigError;
pub use event::{EpisodeOutcome, GiveUpReason, NavEvent, NavEventKind};
pub use goal::Goal;
pub use host::{AgentAction, AgentSensor, BlockChange, TerrainSource};
pub use movement::{MoveKind, Movement, MovementStatus};
pub use navigator::{EpisodeStatus, GoalHandle, Navigator, TickReport};
pub use path::Path;
pub use types::{Vec3, VoxelCoord};
pub use waymark_region::{Classification, DimensionId};
