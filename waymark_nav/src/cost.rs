// Tick-cost model for primitive moves.
//
// Every cost is in ticks. Ground gaits are constants (ticks per block) from
// `MoveCostParams`; falling is derived from kinematics. Velocity follows
// `v(t+1) = min(v(t) + gravity, terminal)` starting from rest, distance is
// the running sum of velocities, and `ticks_to_fall(d)` inverts that sum
// with linear interpolation inside the tick where the distance is crossed.
// `fall_distance_after(t)` is the exact inverse of that interpolation, so
// the two round-trip to floating-point precision.
//
// `CostModel` precomputes `fall_table[n]` for every whole-block fall up to
// `fall_table_max` once per config and is immutable afterwards; it is
// shared across search threads behind an `Arc`.
//
// The model also owns the admissible heuristic. Each move's cost is at least
// `horizontal * min_h + up * min_up + down * min_down` for its own
// displacement, where the three rates are the cheapest per-block prices any
// move template charges along that axis. Summed over a path and combined with
// the triangle inequality, that makes the same expression over the remaining
// displacement a lower bound on the remaining cost.
//
// See also: `graph.rs` which prices each move template with these numbers,
// `goal.rs` which supplies displacement lower bounds.

use crate::config::{MoveCostParams, PhysicsParams};

/// Ticks needed to fall `distance` blocks from rest, with fractional-tick
/// interpolation in the final tick.
pub fn ticks_to_fall(physics: &PhysicsParams, distance: f64) -> f64 {
    if distance <= 0.0 {
        return 0.0;
    }
    let mut fallen = 0.0;
    let mut velocity = 0.0;
    let mut tick = 0u64;
    loop {
        velocity = next_velocity(physics, velocity);
        tick += 1;
        if fallen + velocity >= distance {
            return (tick - 1) as f64 + (distance - fallen) / velocity;
        }
        fallen += velocity;
    }
}

/// Blocks fallen from rest after `ticks` ticks, interpolating linearly
/// within a partial tick. Inverse of `ticks_to_fall`.
pub fn fall_distance_after(physics: &PhysicsParams, ticks: f64) -> f64 {
    if ticks <= 0.0 {
        return 0.0;
    }
    let whole = ticks.floor() as u64;
    let frac = ticks - whole as f64;
    let mut fallen = 0.0;
    let mut velocity = 0.0;
    for _ in 0..whole {
        velocity = next_velocity(physics, velocity);
        fallen += velocity;
    }
    if frac > 0.0 {
        fallen += frac * next_velocity(physics, velocity);
    }
    fallen
}

fn next_velocity(physics: &PhysicsParams, velocity: f64) -> f64 {
    (velocity + physics.gravity).min(physics.terminal_velocity)
}

/// Per-axis lower bound on the displacement still to cover.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Displacement {
    /// Horizontal distance in blocks (Euclidean or Manhattan, per move set).
    pub horizontal: f64,
    /// Blocks to climb.
    pub up: f64,
    /// Blocks to descend.
    pub down: f64,
}

/// Precomputed, immutable cost tables and per-move prices.
#[derive(Clone, Debug)]
pub struct CostModel {
    physics: PhysicsParams,
    fall_table: Vec<f64>,
    /// Flat walking cost per block (sprint if enabled).
    pub flat: f64,
    pub walk: f64,
    pub water: f64,
    pub walk_off_edge: f64,
    pub center_after_fall: f64,
    pub jump_one_block: f64,
    min_h: f64,
    min_up: f64,
    min_down: f64,
}

impl CostModel {
    pub fn new(physics: &PhysicsParams, costs: &MoveCostParams) -> Self {
        let fall_table = build_fall_table(physics);
        let walk = costs.walk_ticks_per_block;
        let flat = if costs.allow_sprint {
            costs.sprint_ticks_per_block.min(walk)
        } else {
            walk
        };
        let water = costs.water_ticks_per_block;
        let walk_off_edge = walk * costs.walk_off_edge_fraction;
        let center_after_fall = walk - walk_off_edge;
        let jump_one_block = ticks_to_fall(physics, 1.25) - ticks_to_fall(physics, 0.25);

        // fall_table[n] / n shrinks as the agent approaches terminal
        // velocity, so the scan finds the cheapest per-block descent.
        let min_fall_rate = fall_table
            .iter()
            .enumerate()
            .skip(1)
            .map(|(n, ticks)| ticks / n as f64)
            .fold(f64::INFINITY, f64::min);

        Self {
            physics: physics.clone(),
            fall_table,
            flat,
            walk,
            water,
            walk_off_edge,
            center_after_fall,
            jump_one_block,
            min_h: flat.min(water).min(walk_off_edge),
            min_up: jump_one_block.min(water),
            min_down: min_fall_rate.min(water),
        }
    }

    /// Ticks to fall exactly `blocks` whole blocks.
    pub fn fall_cost(&self, blocks: u32) -> f64 {
        match self.fall_table.get(blocks as usize) {
            Some(&ticks) => ticks,
            None => ticks_to_fall(&self.physics, f64::from(blocks)),
        }
    }

    /// Largest fall covered by the table.
    pub fn fall_table_max(&self) -> u32 {
        (self.fall_table.len() - 1) as u32
    }

    pub fn physics(&self) -> &PhysicsParams {
        &self.physics
    }

    // -----------------------------------------------------------------------
    // Move prices
    // -----------------------------------------------------------------------

    pub fn traverse(&self, in_water: bool) -> f64 {
        if in_water { self.water } else { self.flat }
    }

    pub fn diagonal(&self, in_water: bool) -> f64 {
        self.traverse(in_water) * std::f64::consts::SQRT_2
    }

    pub fn ascend(&self) -> f64 {
        self.flat + self.jump_one_block
    }

    /// One block down onto the next cell.
    pub fn descend(&self) -> f64 {
        self.walk_off_edge + self.fall_cost(1).max(self.center_after_fall)
    }

    /// Step off a ledge and drop `blocks` (two or more).
    pub fn fall(&self, blocks: u32) -> f64 {
        self.walk_off_edge + self.fall_cost(blocks) + self.center_after_fall
    }

    /// Running jump across `gap` empty columns.
    pub fn parkour(&self, gap: u32) -> f64 {
        f64::from(gap + 1) * self.flat
    }

    pub fn swim_vertical(&self) -> f64 {
        self.water
    }

    // -----------------------------------------------------------------------
    // Heuristic
    // -----------------------------------------------------------------------

    /// Admissible lower bound on ticks to cover `d`.
    pub fn heuristic(&self, d: Displacement) -> f64 {
        d.horizontal * self.min_h + d.up * self.min_up + d.down * self.min_down
    }
}

/// `table[n]` = ticks to fall `n` blocks, for `n` in `0..=fall_table_max`.
///
/// Built in one pass over ticks with the same arithmetic as `ticks_to_fall`,
/// so `table[n] == ticks_to_fall(n)` bit for bit.
fn build_fall_table(physics: &PhysicsParams) -> Vec<f64> {
    let max = physics.fall_table_max as usize;
    let mut table = vec![0.0; max + 1];
    let mut next = 1usize;
    let mut fallen = 0.0;
    let mut velocity = 0.0;
    let mut tick = 0u64;
    while next <= max {
        velocity = next_velocity(physics, velocity);
        tick += 1;
        while next <= max && fallen + velocity >= next as f64 {
            table[next] = (tick - 1) as f64 + (next as f64 - fallen) / velocity;
            next += 1;
        }
        fallen += velocity;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> CostModel {
        CostModel::new(&PhysicsParams::default(), &MoveCostParams::default())
    }

    #[test]
    fn fall_table_round_trips_through_integrator() {
        let physics = PhysicsParams::default();
        let model = model();
        for n in 0..=4096u32 {
            let ticks = model.fall_cost(n);
            let distance = fall_distance_after(&physics, ticks);
            assert!(
                (distance - f64::from(n)).abs() < 1e-9,
                "n={n}: ticks={ticks} -> distance={distance}"
            );
        }
    }

    #[test]
    fn table_matches_direct_inversion() {
        let physics = PhysicsParams::default();
        let model = model();
        for n in [0u32, 1, 2, 3, 17, 255, 4096] {
            assert_eq!(model.fall_cost(n), ticks_to_fall(&physics, f64::from(n)));
        }
    }

    #[test]
    fn fall_costs_are_monotone_and_positive() {
        let model = model();
        assert_eq!(model.fall_cost(0), 0.0);
        for n in 1..=4096u32 {
            assert!(model.fall_cost(n) > model.fall_cost(n - 1));
        }
    }

    #[test]
    fn terminal_velocity_caps_fall_rate() {
        let physics = PhysicsParams::default();
        let model = model();
        // Deep in the table, each extra block costs 1 / terminal ticks.
        let step = model.fall_cost(4000) - model.fall_cost(3999);
        assert!((step - 1.0 / physics.terminal_velocity).abs() < 1e-9);
    }

    #[test]
    fn early_fall_ticks_match_hand_integration() {
        let physics = PhysicsParams::default();
        // Velocities 0.08, 0.16, 0.24 → 0.48 blocks after 3 ticks.
        assert!((fall_distance_after(&physics, 3.0) - 0.48).abs() < 1e-12);
        assert!((ticks_to_fall(&physics, 0.48) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn beyond_table_falls_back_to_integration() {
        let physics = PhysicsParams {
            fall_table_max: 8,
            ..PhysicsParams::default()
        };
        let model = CostModel::new(&physics, &MoveCostParams::default());
        assert_eq!(model.fall_table_max(), 8);
        assert_eq!(model.fall_cost(20), ticks_to_fall(&physics, 20.0));
    }

    #[test]
    fn diagonal_costs_sqrt2_times_orthogonal() {
        let model = model();
        let ratio = model.diagonal(false) / model.traverse(false);
        assert!((ratio - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn move_prices_are_positive_and_finite() {
        let model = model();
        let prices = [
            model.traverse(false),
            model.traverse(true),
            model.diagonal(false),
            model.ascend(),
            model.descend(),
            model.fall(2),
            model.fall(64),
            model.parkour(1),
            model.parkour(3),
            model.swim_vertical(),
        ];
        for p in prices {
            assert!(p.is_finite() && p > 0.0, "price {p}");
        }
    }

    #[test]
    fn heuristic_never_exceeds_single_move_costs() {
        let model = model();
        let h = |horizontal: f64, up: f64, down: f64| {
            model.heuristic(Displacement { horizontal, up, down })
        };
        assert!(h(1.0, 0.0, 0.0) <= model.traverse(false));
        assert!(h(std::f64::consts::SQRT_2, 0.0, 0.0) <= model.diagonal(false));
        assert!(h(1.0, 1.0, 0.0) <= model.ascend());
        assert!(h(1.0, 0.0, 1.0) <= model.descend());
        for n in 2..=64 {
            assert!(h(1.0, 0.0, f64::from(n)) <= model.fall(n));
        }
        assert!(h(4.0, 0.0, 0.0) <= model.parkour(3));
        assert!(h(0.0, 1.0, 0.0) <= model.swim_vertical());
    }
}
