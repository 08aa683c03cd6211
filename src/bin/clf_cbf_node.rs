use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use clf_cbf_core::control::trajectory::{Rollout, RolloutEnd, Scenario, TrajectoryGenerator};
use clf_cbf_core::solver::lp_format::to_lp_string;
use clf_cbf_core::{ActiveSetSolver, ClarabelSolver, ClfCbfController, ControllerConfig, Point2D, QuadraticProgram};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// CLI arguments
#[derive(Parser)]
#[command(name = "clf_cbf_node")]
#[command(about = "Drive the CLF-CBF safety controller through a scenario")]
struct Args {
    /// Controller configuration file (JSON); defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Scenario file with start, goal and obstacles (JSON)
    #[arg(long)]
    scenario: PathBuf,

    /// Parameter overrides (name=value), applied after the config file
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, f64)>,

    /// Maximum number of control ticks
    #[arg(long, default_value_t = 100)]
    ticks: usize,

    /// Control rate in Hz; 0 runs as fast as possible
    #[arg(long, default_value_t = 0.0)]
    rate_hz: f64,

    /// Distance at which the goal counts as reached
    #[arg(long, default_value_t = 1e-2)]
    goal_tolerance: f64,

    /// QP backend used for both stages
    #[arg(long, value_enum, default_value_t = Backend::ActiveSet)]
    solver: Backend,

    /// Write the programs of the last tick in LP format
    #[arg(long)]
    export_lp: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    ActiveSet,
    Clarabel,
}

#[derive(Serialize)]
struct TrajectoryReport {
    ticks: usize,
    end: String,
    positions: Vec<[f64; 2]>,
    velocities: Vec<[f64; 2]>,
}

fn parse_param(s: &str) -> Result<(String, f64)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=value, got {}", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {}", name))?;
    Ok((name.trim().to_string(), value))
}

fn load_config(args: &Args) -> Result<ControllerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => ControllerConfig::default(),
    };

    if !args.params.is_empty() {
        let params: HashMap<String, f64> = args.params.iter().cloned().collect();
        config.configure(&params)?;
    }

    Ok(config)
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    Scenario::from_json(&text).with_context(|| format!("failed to parse scenario {}", path.display()))
}

/// Tick the controller on a fixed-rate timer, like a periodic control node
async fn run_periodic(
    controller: &mut ClfCbfController,
    generator: &TrajectoryGenerator,
    scenario: &Scenario,
    rate_hz: f64,
) -> Result<Rollout> {
    let period = tick_period(rate_hz)?;
    let mut interval = tokio::time::interval(period);
    let mut rollout = Rollout::new(scenario.start);

    for _ in 0..generator.max_ticks() {
        interval.tick().await;
        if !generator.step(controller, &mut rollout, &scenario.obstacles) {
            break;
        }
        if let Some(velocity) = rollout.velocities.last() {
            let position = rollout.final_position();
            info!(
                tick = rollout.ticks(),
                u1 = velocity.x,
                u2 = velocity.y,
                x = position.x,
                y = position.y,
                "control tick"
            );
        }
    }

    generator.finish(controller, &mut rollout);
    Ok(rollout)
}

fn tick_period(rate_hz: f64) -> Result<Duration> {
    let period = Duration::try_from_secs_f64(1.0 / rate_hz)
        .with_context(|| format!("control rate {} Hz has no representable period", rate_hz))?;
    Ok(period.max(Duration::from_micros(1)))
}

/// Sibling of `path` with `suffix` added to the file stem
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}.{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn write_program(program: &QuadraticProgram, path: &Path) -> Result<()> {
    std::fs::write(path, to_lp_string(program)).with_context(|| format!("failed to write {}", path.display()))?;
    info!(program = %program.name, path = %path.display(), "exported program");
    Ok(())
}

/// Write the last solved model to `path`, one model per file
///
/// The safety filter goes to `path` itself; when it was built, the reference
/// program goes next to it with a `.reference` suffix.
fn export_programs(controller: &ClfCbfController, path: &Path) -> Result<()> {
    let Some(programs) = controller.last_programs() else {
        warn!("no programs were built, nothing to export");
        return Ok(());
    };

    match &programs.safety_filter {
        Some(filter) => {
            write_program(filter, path)?;
            write_program(&programs.reference, &sibling_path(path, "reference"))
        }
        None => write_program(&programs.reference, path),
    }
}

fn to_pairs(points: &[Point2D]) -> Vec<[f64; 2]> {
    points.iter().map(|p| [p.x, p.y]).collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let scenario = load_scenario(&args.scenario)?;

    info!(
        start = ?scenario.start.as_slice(),
        goal = ?scenario.goal.as_slice(),
        obstacles = scenario.obstacles.len(),
        solver = ?args.solver,
        "starting CLF-CBF node"
    );

    let mut controller = match args.solver {
        Backend::ActiveSet => ClfCbfController::with_solver(config, ActiveSetSolver::new())?,
        Backend::Clarabel => ClfCbfController::with_solver(config, ClarabelSolver::new())?,
    };
    controller.set_goal(scenario.goal);

    let generator = TrajectoryGenerator::new(args.ticks, args.goal_tolerance);
    let rollout = if args.rate_hz > 0.0 {
        run_periodic(&mut controller, &generator, &scenario, args.rate_hz).await?
    } else {
        generator.generate(&mut controller, scenario.start, &scenario.obstacles)
    };

    if let Some(path) = &args.export_lp {
        export_programs(&controller, path)?;
    }

    let report = TrajectoryReport {
        ticks: rollout.ticks(),
        end: match &rollout.end {
            RolloutEnd::GoalReached => "goal_reached".to_string(),
            RolloutEnd::TickLimit => "tick_limit".to_string(),
            RolloutEnd::Failed(err) => format!("failed: {}", err),
        },
        positions: to_pairs(&rollout.positions),
        velocities: to_pairs(&rollout.velocities),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    match rollout.end {
        RolloutEnd::Failed(err) => Err(err.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse_as_name_value_pairs() {
        assert_eq!(parse_param("barrier_gain=0.5").unwrap(), ("barrier_gain".to_string(), 0.5));
        assert_eq!(parse_param(" u1_max = 3 ").unwrap(), ("u1_max".to_string(), 3.0));
        assert!(parse_param("barrier_gain").is_err());
        assert!(parse_param("barrier_gain=fast").is_err());
    }

    #[test]
    fn tick_period_rejects_unrepresentable_rates() {
        assert_eq!(tick_period(10.0).unwrap(), Duration::from_millis(100));
        assert_eq!(tick_period(1e12).unwrap(), Duration::from_micros(1));
        assert!(tick_period(1e-320).is_err());
    }

    #[test]
    fn reference_program_goes_next_to_the_export() {
        assert_eq!(sibling_path(Path::new("out/qp_model.lp"), "reference"), PathBuf::from("out/qp_model.reference.lp"));
        assert_eq!(sibling_path(Path::new("model"), "reference"), PathBuf::from("model.reference"));
    }
}
