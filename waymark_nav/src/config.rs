// Data-driven engine configuration.
//
// All tunable parameters live in `PathingConfig`, loaded from JSON by the
// host (or built from `Default`). The engine never hardcodes a tuning
// constant outside this file. Parameters are grouped by the component that
// reads them:
//
// - `PhysicsParams`:   gravity and terminal velocity feeding the fall table.
// - `MoveCostParams`:  per-block walking/sprinting/swimming times.
// - `GraphParams`:     which move templates are enabled and how UNKNOWN and
//                      AVOID-adjacent voxels are treated during expansion.
// - `SearchParams`:    node and wall-clock ceilings for one search episode.
// - `CacheParams`:     paging radii, resident cap, observation scan budget,
//                      and the `DimensionProfile` generation rules.
// - `ExecutionParams`: arrival/off-course tolerances and tick budgets.
// - `RetryParams`:     retry ceiling, reset policy, per-goal replan cap.
// - `FlightParams`:    the long-range flight variant's band and lattice.
//
// Every group carries `#[serde(default)]`, so a JSON file only needs the
// fields it overrides.
//
// See also: `cost.rs` which turns `PhysicsParams`/`MoveCostParams` into the
// precomputed `CostModel`, `navigator.rs` which owns the config.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Kinematics the fall table is integrated from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    /// Downward acceleration in blocks per tick per tick.
    pub gravity: f64,
    /// Maximum downward speed in blocks per tick.
    pub terminal_velocity: f64,
    /// Largest whole-block fall the table covers (bounded by world height).
    pub fall_table_max: u32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            gravity: 0.08,
            terminal_velocity: 3.92,
            fall_table_max: 4096,
        }
    }
}

/// Ticks per block for the ground-level gaits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveCostParams {
    pub walk_ticks_per_block: f64,
    pub sprint_ticks_per_block: f64,
    pub water_ticks_per_block: f64,
    /// Use the sprint gait for flat and diagonal walking.
    pub allow_sprint: bool,
    /// Fraction of a block walk spent stepping off a ledge before the fall
    /// begins. The remainder is spent re-centring after landing.
    pub walk_off_edge_fraction: f64,
}

impl Default for MoveCostParams {
    fn default() -> Self {
        Self {
            walk_ticks_per_block: 20.0 / 4.317,
            sprint_ticks_per_block: 20.0 / 5.612,
            water_ticks_per_block: 20.0 / 2.2,
            allow_sprint: true,
            walk_off_edge_fraction: 0.8,
        }
    }
}

/// Which moves exist and how uncertain terrain is treated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    pub allow_diagonal: bool,
    pub allow_parkour: bool,
    /// Widest gap a parkour jump may clear (1..=3).
    pub max_parkour_gap: u32,
    /// Deepest drop onto solid ground that does not hurt the agent.
    pub max_safe_fall: u32,
    /// Deepest drop allowed when landing in water.
    pub max_water_fall: u32,
    /// Maximum UNKNOWN voxels a single move may sweep through. Zero means
    /// moves never enter unobserved terrain.
    pub unknown_tolerance: u32,
    /// Added cost per UNKNOWN voxel a move sweeps through.
    pub unknown_penalty: f64,
    /// Added cost when a move's destination touches an AVOID voxel.
    pub avoid_adjacent_penalty: f64,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            allow_diagonal: true,
            allow_parkour: true,
            max_parkour_gap: 3,
            max_safe_fall: 3,
            max_water_fall: 64,
            unknown_tolerance: 0,
            unknown_penalty: 2.0,
            avoid_adjacent_penalty: 2.0,
        }
    }
}

/// Per-invocation compute ceilings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Node expansions before the search gives up and returns best-effort.
    pub max_nodes: usize,
    /// Wall-clock ceiling in milliseconds. `None` means nodes only, which
    /// keeps results reproducible.
    pub max_millis: Option<u64>,
    /// Expansions between cancellation-flag checks.
    pub cancel_check_interval: usize,
    /// Expansions between frontier snapshots for debug views.
    pub frontier_publish_interval: usize,
    /// Open-set positions included in a frontier snapshot.
    pub frontier_sample: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_nodes: 60_000,
            max_millis: Some(2_000),
            cancel_check_interval: 64,
            frontier_publish_interval: 2_048,
            frontier_sample: 256,
        }
    }
}

/// Rules for synthesizing classifications of never-observed voxels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionProfile {
    /// Lowest buildable Y. Everything below reads as AVOID (the void).
    pub min_y: i32,
    /// Highest buildable Y. Everything above reads as AIR.
    pub max_y: i32,
    /// Inclusive Y band that is always solid at the bottom of the world.
    pub floor_band: Option<(i32, i32)>,
    /// Inclusive Y band that is always solid at the top of the world.
    pub roof_band: Option<(i32, i32)>,
}

impl Default for DimensionProfile {
    fn default() -> Self {
        Self::overworld()
    }
}

impl DimensionProfile {
    /// Open-sky world with a bedrock floor row.
    pub fn overworld() -> Self {
        Self {
            min_y: 0,
            max_y: 255,
            floor_band: Some((0, 0)),
            roof_band: None,
        }
    }

    /// Enclosed world with bedrock floor and roof rows, Y 0..=127.
    pub fn nether() -> Self {
        Self {
            min_y: 0,
            max_y: 127,
            floor_band: Some((0, 0)),
            roof_band: Some((127, 127)),
        }
    }
}

/// Region paging and observation budgets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    /// Regions farther than this (Chebyshev, in regions) are paged out.
    pub keep_radius: u32,
    /// Regions within this radius are paged in from storage if absent.
    pub load_radius: u32,
    /// Hard cap on resident regions; farthest are evicted first.
    pub max_resident_regions: usize,
    /// Radius (in regions) around the agent sampled from the live world.
    pub scan_radius: u32,
    /// Full-region samples of the live world per tick.
    pub region_scans_per_tick: usize,
    pub profile: DimensionProfile,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            keep_radius: 8,
            load_radius: 4,
            max_resident_regions: 4_096,
            scan_radius: 2,
            region_scans_per_tick: 4,
            profile: DimensionProfile::default(),
        }
    }
}

/// Movement execution tolerances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionParams {
    /// Horizontal distance from the destination centre that counts as
    /// arrival.
    pub arrival_tolerance: f64,
    /// Distance outside a movement's bounding envelope that counts as
    /// off-course.
    pub off_course_tolerance: f64,
    /// A movement fails after `cost * multiplier` ticks (or the minimum).
    pub tick_budget_multiplier: f64,
    pub min_tick_budget: u32,
    /// When a provisional path has this many movements left, the next
    /// segment is searched for.
    pub plan_ahead_movements: usize,
    /// Run searches on a worker thread instead of inline on the tick.
    pub background_search: bool,
    /// Distance from a flight waypoint that counts as reaching it.
    pub fly_arrival_radius: f64,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            arrival_tolerance: 0.35,
            off_course_tolerance: 1.5,
            tick_budget_multiplier: 3.0,
            min_tick_budget: 20,
            plan_ahead_movements: 5,
            background_search: true,
            fly_arrival_radius: 1.5,
        }
    }
}

/// When the retry ledger is cleared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryResetPolicy {
    /// Only when the first path toward a newly submitted goal is installed.
    NewGoalOnly,
    /// Whenever any freshly searched path is installed, including re-searches
    /// toward an unchanged goal. Tolerates transient lag at the cost of a
    /// weaker termination bound (the per-goal replan cap still applies).
    EveryInstalledPath,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryParams {
    /// Failures at one position before it is treated as blocked.
    pub max_retries: u32,
    pub reset_policy: RetryResetPolicy,
    /// Re-searches per goal before the episode gives up outright.
    pub max_replans_per_goal: u32,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_retries: 3,
            reset_policy: RetryResetPolicy::NewGoalOnly,
            max_replans_per_goal: 64,
        }
    }
}

/// Long-range flight variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightParams {
    /// Inclusive vertical band the occupancy index covers.
    pub min_y: i32,
    pub max_y: i32,
    /// Lattice step between trajectory nodes, in blocks.
    pub step: f64,
    /// Minimum free distance kept around the flight line, in blocks.
    pub clearance: f64,
    /// Spacing of collision samples along a segment, in blocks.
    pub sample_spacing: f64,
    pub max_nodes: usize,
    /// Distance from the target that completes the flight.
    pub arrival_radius: f64,
    pub ticks_per_block: f64,
    /// Treat chunks missing from the index as solid instead of open.
    pub unknown_chunk_solid: bool,
}

impl Default for FlightParams {
    fn default() -> Self {
        Self {
            min_y: 0,
            max_y: 127,
            step: 4.0,
            clearance: 1.0,
            sample_spacing: 0.5,
            max_nodes: 20_000,
            arrival_radius: 4.0,
            ticks_per_block: 20.0 / 30.0,
            unknown_chunk_solid: false,
        }
    }
}

/// Top-level engine configuration. Loaded once per world session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathingConfig {
    pub physics: PhysicsParams,
    pub costs: MoveCostParams,
    pub graph: GraphParams,
    pub search: SearchParams,
    pub cache: CacheParams,
    pub execution: ExecutionParams,
    pub retry: RetryParams,
    pub flight: FlightParams,
}

impl PathingConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("physics.gravity", self.physics.gravity),
            ("physics.terminal_velocity", self.physics.terminal_velocity),
            ("costs.walk_ticks_per_block", self.costs.walk_ticks_per_block),
            ("costs.sprint_ticks_per_block", self.costs.sprint_ticks_per_block),
            ("costs.water_ticks_per_block", self.costs.water_ticks_per_block),
            ("flight.step", self.flight.step),
            ("flight.sample_spacing", self.flight.sample_spacing),
            ("flight.ticks_per_block", self.flight.ticks_per_block),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if !(0.0..1.0).contains(&self.costs.walk_off_edge_fraction) {
            return Err(ConfigError::Invalid(
                "costs.walk_off_edge_fraction must be in [0, 1)".into(),
            ));
        }
        if self.physics.fall_table_max == 0 {
            return Err(ConfigError::Invalid("physics.fall_table_max must be nonzero".into()));
        }
        if self.graph.max_parkour_gap > 3 {
            return Err(ConfigError::Invalid("graph.max_parkour_gap must be at most 3".into()));
        }
        if self.search.max_nodes == 0 || self.search.cancel_check_interval == 0 {
            return Err(ConfigError::Invalid("search budgets must be nonzero".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be nonzero".into()));
        }
        if self.flight.min_y > self.flight.max_y {
            return Err(ConfigError::Invalid("flight band is empty".into()));
        }
        if self.cache.profile.min_y > self.cache.profile.max_y {
            return Err(ConfigError::Invalid("dimension profile Y range is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_serializes() {
        let config = PathingConfig::default();
        config.validate().unwrap();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: PathingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let json = r#"{
            "retry": { "max_retries": 5 },
            "execution": { "background_search": false },
            "cache": { "profile": { "min_y": 0, "max_y": 127, "roof_band": [127, 127] } }
        }"#;
        let config = PathingConfig::from_json(json).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.reset_policy, RetryResetPolicy::NewGoalOnly);
        assert!(!config.execution.background_search);
        assert_eq!(config.cache.profile.roof_band, Some((127, 127)));
        // Untouched groups keep their defaults.
        assert_eq!(config.physics, PhysicsParams::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let json = r#"{ "physics": { "gravity": 0.0 } }"#;
        assert!(matches!(
            PathingConfig::from_json(json),
            Err(ConfigError::Invalid(_))
        ));
        let json = r#"{ "retry": { "max_retries": 0 } }"#;
        assert!(PathingConfig::from_json(json).is_err());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            PathingConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn reset_policy_loads_by_name() {
        let json = r#"{ "retry": { "reset_policy": "EveryInstalledPath" } }"#;
        let config = PathingConfig::from_json(json).unwrap();
        assert_eq!(config.retry.reset_policy, RetryResetPolicy::EveryInstalledPath);
    }
}
