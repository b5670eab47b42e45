use std::io;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use race_pacer::export::{distance_splits, render_leg_text, render_split_text, write_plan_outputs};
use race_pacer::gpx_course::clean_filename;
use race_pacer::{
    load_gpx_course, run_batch, BatchConfig, CourseConfig, CourseProfile, DistanceUnit, LossMetric,
    PacingEngine, PlannerConfig, Strategy, TargetTime,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Race pacing plan generator", long_about = None)]
struct Cli {
    /// Cap the number of worker threads (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan paces for one course
    Plan(PlanArgs),
    /// Plan every GPX course in a folder
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct PlannerArgs {
    /// Number of legs (distinct paces)
    #[arg(long, default_value_t = 5)]
    paces: usize,

    /// Minimum number of segments per leg
    #[arg(long = "min-leg", default_value_t = race_pacer::config::DEFAULT_MIN_LEG_LENGTH)]
    min_leg: usize,

    #[arg(long, value_enum, default_value_t = MetricOpt::Square)]
    metric: MetricOpt,

    #[arg(long, value_enum, default_value_t = StrategyOpt::Optimal)]
    strategy: StrategyOpt,

    /// Segments a GPX track is resampled into
    #[arg(long, default_value_t = race_pacer::config::DEFAULT_COURSE_SEGMENTS)]
    segments: usize,

    #[arg(long, value_enum, default_value_t = SmoothingOpt::Gaussian)]
    smoothing: SmoothingOpt,

    /// Course finishes where it started
    #[arg(long = "loop", action = ArgAction::SetTrue)]
    loop_course: bool,

    /// Report splits per kilometer instead of per mile
    #[arg(long, action = ArgAction::SetTrue)]
    metric_splits: bool,

    /// Enable debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// GPX track of the course
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "course_csv", required_unless_present = "course_csv")]
    gpx: Option<PathBuf>,

    /// CSV course with `length_mi,grade_pct` rows
    #[arg(long = "course-csv", value_hint = ValueHint::FilePath)]
    course_csv: Option<PathBuf>,

    /// Target finish time in minutes
    #[arg(long)]
    time: f64,

    /// Additional leg counts to re-solve with the same engine
    #[arg(long = "what-if", value_delimiter = ',')]
    what_if: Vec<usize>,

    /// Folder for JSON / CSV / GeoJSON outputs
    #[arg(long, value_hint = ValueHint::DirPath)]
    out: Option<PathBuf>,

    #[command(flatten)]
    planner: PlannerArgs,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Folder searched recursively for GPX files
    #[arg(value_hint = ValueHint::DirPath)]
    input: PathBuf,

    #[arg(long, default_value = "pacing_output", value_hint = ValueHint::DirPath)]
    out: PathBuf,

    /// Target finish time in minutes for every course
    #[arg(long, conflicts_with = "pace_per_mile", required_unless_present = "pace_per_mile")]
    time: Option<f64>,

    /// Average minutes per mile, scaled by each course's distance
    #[arg(long = "pace-per-mile")]
    pace_per_mile: Option<f64>,

    #[command(flatten)]
    planner: PlannerArgs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricOpt {
    Square,
    Absolute,
}

impl From<MetricOpt> for LossMetric {
    fn from(value: MetricOpt) -> Self {
        match value {
            MetricOpt::Square => LossMetric::Square,
            MetricOpt::Absolute => LossMetric::Absolute,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyOpt {
    Optimal,
    Average,
    PerMile,
    PerKm,
    Hills,
}

impl From<StrategyOpt> for Strategy {
    fn from(value: StrategyOpt) -> Self {
        match value {
            StrategyOpt::Optimal => Strategy::Optimal,
            StrategyOpt::Average => Strategy::AveragePace,
            StrategyOpt::PerMile => Strategy::PerMile,
            StrategyOpt::PerKm => Strategy::PerKilometer,
            StrategyOpt::Hills => Strategy::HillDetection,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SmoothingOpt {
    None,
    Box,
    Gaussian,
    Butterworth,
}

impl From<SmoothingOpt> for CourseConfig {
    fn from(value: SmoothingOpt) -> Self {
        match value {
            SmoothingOpt::None => CourseConfig::raw(),
            SmoothingOpt::Box => CourseConfig::box_100m(),
            SmoothingOpt::Gaussian => CourseConfig::default(),
            SmoothingOpt::Butterworth => CourseConfig::butterworth(),
        }
    }
}

impl PlannerArgs {
    fn planner_config(&self, target_time: f64) -> PlannerConfig {
        PlannerConfig::new(target_time, self.paces)
            .with_min_leg_length(self.min_leg)
            .with_loss_metric(self.metric.into())
            .with_strategy(self.strategy.into())
    }

    fn course_config(&self) -> CourseConfig {
        CourseConfig::from(self.smoothing).with_segments(self.segments)
    }

    fn split_unit(&self) -> DistanceUnit {
        if self.metric_splits {
            DistanceUnit::Kilometer
        } else {
            DistanceUnit::Mile
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Plan(args) => args.planner.verbose,
        Command::Batch(args) => args.planner.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let threads = cli.threads.unwrap_or_else(num_cpus::get).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("failed to configure worker threads")?;

    match cli.command {
        Command::Plan(args) => handle_plan(args),
        Command::Batch(args) => handle_batch(args),
    }
}

fn load_course(args: &PlanArgs) -> Result<CourseProfile> {
    if let Some(path) = &args.gpx {
        return load_gpx_course(path, &args.planner.course_config())
            .with_context(|| format!("failed to load GPX course {}", path.display()));
    }
    if let Some(path) = &args.course_csv {
        let name = path
            .file_stem()
            .map(|s| clean_filename(&s.to_string_lossy()))
            .unwrap_or_else(|| "course".to_string());
        return CourseProfile::from_csv_path(path, name)
            .with_context(|| format!("failed to load CSV course {}", path.display()));
    }
    bail!("either --gpx or --course-csv is required")
}

fn handle_plan(args: PlanArgs) -> Result<()> {
    let started = Instant::now();
    let course = load_course(&args)?;
    println!(
        "🗺️  {}: {:.2} mi in {} segments",
        course.name,
        course.total_distance(),
        course.n_segments()
    );

    let config = args.planner.planner_config(args.time);
    let split_unit = args.planner.split_unit();
    let mut engine = PacingEngine::new(course, config)?;
    let plan = engine.solve()?;

    println!();
    print!("{}", render_leg_text(&plan, engine.course(), args.time));
    println!("\n⏱️  Splits");
    print!(
        "{}",
        render_split_text(&distance_splits(&plan, engine.course(), split_unit), split_unit)
    );
    println!("📉 Plan loss: {:.4}", plan.total_loss);

    if let Some(out) = &args.out {
        let stem = clean_filename(&engine.course().name);
        let written = write_plan_outputs(
            out,
            &stem,
            &plan,
            engine.course(),
            engine.config(),
            split_unit,
            args.planner.loop_course,
        )
        .with_context(|| format!("failed to write outputs to {}", out.display()))?;
        for path in &written {
            println!("💾 Saved {}", path.display());
        }
    }

    if !args.what_if.is_empty() {
        println!("\n🔁 What-if leg counts");
        for &legs in &args.what_if {
            engine.change_total_paces(legs)?;
            match engine.solve() {
                Ok(alt) => println!(
                    "   {:>3} legs: loss {:.4}, paces {}",
                    legs,
                    alt.total_loss,
                    pace_list(&alt.leg_pace)
                ),
                Err(e) => println!("   {:>3} legs: ❌ {}", legs, e),
            }
        }
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "planning finished");
    Ok(())
}

fn pace_list(paces: &[f64]) -> String {
    paces
        .iter()
        .map(|&p| race_pacer::units::pace_display_text(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn handle_batch(args: BatchArgs) -> Result<()> {
    let target = match (args.time, args.pace_per_mile) {
        (Some(minutes), _) => TargetTime::Minutes(minutes),
        (None, Some(pace)) => TargetTime::PacePerMile(pace),
        (None, None) => bail!("either --time or --pace-per-mile is required"),
    };
    let planner = args.planner.planner_config(target.for_distance(1.0));
    let config = BatchConfig {
        target,
        planner,
        course: args.planner.course_config(),
        split_unit: args.planner.split_unit(),
        loop_course: args.planner.loop_course,
    };

    let results = run_batch(&args.input, &args.out, &config)
        .with_context(|| format!("batch over {} failed", args.input.display()))?;
    if results.iter().all(|r| !r.is_ok()) && !results.is_empty() {
        bail!("no course in {} could be planned", args.input.display());
    }
    Ok(())
}
