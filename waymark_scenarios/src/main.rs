// Headless walkthrough of one navigation episode.
//
// Builds a flat test world with a wall and a staircase, drops a simulated
// agent at the origin, submits a goal (or a flight target) and ticks until
// the episode ends, printing every navigation event as a JSON line. Set
// `RUST_LOG=waymark_nav=debug` to watch searches and paging as they happen.
//
// Usage:
//   walkthrough [OPTIONS]
//     --goal <X,Y,Z>        Goal block (default: 20,64,12)
//     --fly                 Fly to the goal instead of walking
//     --size <N>            Half-width of the world (default: 32)
//     --max-ticks <N>       Give up after this many ticks (default: 2000)
//     --background          Run searches on a worker thread
//     --config <FILE>       Load a PathingConfig from JSON

use std::time::Duration;

use waymark_nav::config::PathingConfig;
use waymark_nav::{Classification, Goal, Vec3, VoxelCoord};
use waymark_scenarios::{Scenario, TestWorld, test_config};

struct Options {
    goal: VoxelCoord,
    fly: bool,
    size: i32,
    max_ticks: u32,
    background: bool,
    config: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            goal: VoxelCoord::new(20, 64, 12),
            fly: false,
            size: 32,
            max_ticks: 2_000,
            background: false,
            config: None,
        }
    }
}

fn main() {
    env_logger::init();
    let options = parse_args();

    let mut config = match &options.config {
        Some(path) => load_config(path),
        None => test_config(),
    };
    config.execution.background_search = options.background;

    let mut scenario = Scenario::new(build_world(options.size), VoxelCoord::new(0, 64, 0), config);
    if options.fly {
        scenario.agent.flying = true;
        scenario.navigator.submit_flight(options.goal.feet_center() + Vec3::new(0.0, 0.5, 0.0));
    } else {
        scenario.navigator.submit_goal(Goal::Block(options.goal));
    }

    let mut outcome = None;
    for _ in 0..options.max_ticks {
        let report = scenario.step();
        for event in &report.events {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("failed to encode event: {e}"),
            }
        }
        if let Some(ended) = report.events.iter().find_map(|e| match &e.kind {
            waymark_nav::NavEventKind::EpisodeEnded { outcome } => Some(outcome.clone()),
            _ => None,
        }) {
            outcome = Some(ended);
            break;
        }
        if options.background {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    let ticks = scenario.navigator.current_tick();
    let at = scenario.agent_voxel();
    let stats = scenario.navigator.close();
    match outcome {
        Some(outcome) => println!("ended after {ticks} ticks at {at}: {outcome:?}"),
        None => println!("still running after {ticks} ticks at {at}"),
    }
    println!(
        "cache: {} regions resident, {} scans, {} saves requested",
        stats.resident_regions, stats.region_scans, stats.saves_requested
    );
}

/// Flat floor, a wall along x=8 with a single gap, and a three-step
/// staircase up to a platform.
fn build_world(half: i32) -> TestWorld {
    let mut world = TestWorld::flat(half);
    world.fill(
        VoxelCoord::new(8, 64, -half),
        VoxelCoord::new(8, 67, half),
        Classification::Solid,
    );
    world.fill(
        VoxelCoord::new(8, 64, half - 3),
        VoxelCoord::new(8, 65, half - 3),
        Classification::Air,
    );
    for step in 0..3 {
        world.fill(
            VoxelCoord::new(-6 + step, 64, -6),
            VoxelCoord::new(-6 + step, 64 + step, -4),
            Classification::Solid,
        );
    }
    world
}

fn load_config(path: &str) -> PathingConfig {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("cannot read {path}: {e}");
        std::process::exit(1);
    });
    PathingConfig::from_json(&text).unwrap_or_else(|e| {
        eprintln!("invalid config {path}: {e}");
        std::process::exit(1);
    })
}

/// Parse command-line arguments. Uses simple `std::env::args()` matching.
fn parse_args() -> Options {
    let mut options = Options::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--goal" => {
                i += 1;
                options.goal = args.get(i).and_then(|s| parse_coord(s)).unwrap_or_else(|| {
                    eprintln!("--goal requires X,Y,Z");
                    std::process::exit(1);
                });
            }
            "--fly" => options.fly = true,
            "--background" => options.background = true,
            "--size" => {
                i += 1;
                options.size = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--size requires a number");
                    std::process::exit(1);
                });
            }
            "--max-ticks" => {
                i += 1;
                options.max_ticks = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--max-ticks requires a number");
                    std::process::exit(1);
                });
            }
            "--config" => {
                i += 1;
                options.config = args.get(i).cloned().or_else(|| {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    options
}

fn parse_coord(s: &str) -> Option<VoxelCoord> {
    let mut parts = s.split(',').map(|p| p.trim().parse::<i32>());
    let coord = VoxelCoord::new(parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?);
    parts.next().is_none().then_some(coord)
}

fn print_usage() {
    println!("Usage: walkthrough [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --goal <X,Y,Z>        Goal block (default: 20,64,12)");
    println!("  --fly                 Fly to the goal instead of walking");
    println!("  --size <N>            Half-width of the world (default: 32)");
    println!("  --max-ticks <N>       Give up after this many ticks (default: 2000)");
    println!("  --background          Run searches on a worker thread");
    println!("  --config <FILE>       Load a PathingConfig from JSON");
    println!("  --help, -h            Show this help");
}
