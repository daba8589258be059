//! Paced gather / process / resupply session runner.
//!
//! Reads `autocycle.toml`, validates it, and can dry-run a whole session
//! against the simulated world to show what the control loop would do.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use autocycle::core::clock::ManualClock;
use autocycle::core::stats::SessionSummary;
use autocycle::core::types::StopReason;
use autocycle::exit_codes;
use autocycle::io::config::{DEFAULT_CONFIG_FILE, RunnerConfig, load_config, write_config};
use autocycle::io::sim::{SimConfig, SimWorld};
use autocycle::io::telemetry::{JsonLinesSink, MultiSink, TracingSink};
use autocycle::logging;
use autocycle::looping::{LoopStop, run_session};
use autocycle::orchestrator::Orchestrator;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Parser)]
#[command(
    name = "autocycle",
    version,
    about = "Paced gather/process/resupply session runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Load and validate the config (ranges, thresholds, tasks).
    Validate {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Run a full session against the simulated world and print its summary.
    Simulate {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Seed for pacing and the simulated world (overrides the config).
        #[arg(long)]
        seed: Option<u64>,
        /// Units stocked at the supply per task (defaults to each task's quantity).
        #[arg(long)]
        supply: Option<u32>,
        /// Chance that any simulated interaction is refused.
        #[arg(long, default_value_t = 0.0)]
        failure_chance: f64,
        #[arg(long, default_value_t = 100_000)]
        max_ticks: u64,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
        /// Append telemetry events to this file as JSON lines.
        #[arg(long)]
        telemetry: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Validate { config } => cmd_validate(&config),
        Command::Simulate {
            config,
            seed,
            supply,
            failure_chance,
            max_ticks,
            json,
            telemetry,
        } => cmd_simulate(&SimulateArgs {
            config,
            seed,
            supply,
            failure_chance,
            max_ticks,
            json,
            telemetry,
        }),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &RunnerConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    if !path.exists() {
        bail!("missing {} (run `autocycle init` first)", path.display());
    }
    let cfg = load_config(path)?;
    println!("ok: {} task(s)", cfg.tasks.len());
    Ok(exit_codes::OK)
}

struct SimulateArgs {
    config: PathBuf,
    seed: Option<u64>,
    supply: Option<u32>,
    failure_chance: f64,
    max_ticks: u64,
    json: bool,
    telemetry: Option<PathBuf>,
}

fn cmd_simulate(args: &SimulateArgs) -> Result<i32> {
    let cfg = load_config(&args.config)?;
    if !(0.0..=1.0).contains(&args.failure_chance) {
        bail!("--failure-chance must be within [0, 1]");
    }
    let seed = args.seed.or(cfg.seed).unwrap_or_else(rand::random);

    let stock = cfg
        .tasks
        .iter()
        .map(|task| {
            let units = args
                .supply
                .unwrap_or_else(|| u32::try_from(task.quantity).unwrap_or(u32::MAX));
            (task.resource.clone(), units)
        })
        .collect();
    let clock = Rc::new(ManualClock::new(0));
    let mut world = SimWorld::new(
        SimConfig {
            stock,
            failure_chance: args.failure_chance,
            ..SimConfig::default()
        },
        clock.clone(),
        seed.wrapping_add(1),
    );

    let mut sink = MultiSink::new().with(Box::new(TracingSink));
    if let Some(path) = &args.telemetry {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        sink = sink.with(Box::new(JsonLinesSink::new(file)));
    }

    let mut orchestrator =
        Orchestrator::from_config(cfg, clock, StdRng::seed_from_u64(seed), Box::new(sink))?;
    orchestrator.start()?;
    let outcome = run_session(&mut orchestrator, &mut world, Some(args.max_ticks), |_| {});

    match outcome.stop {
        LoopStop::Stopped(summary) => {
            print_summary(&summary, args.json)?;
            Ok(exit_code_for(summary.stop_reason))
        }
        LoopStop::TickLimit { max_ticks } => {
            eprintln!(
                "tick limit ({max_ticks}) reached: {}",
                orchestrator.status_line()
            );
            Ok(exit_codes::STOPPED)
        }
    }
}

fn print_summary(summary: &SessionSummary, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::to_string_pretty(summary).context("serialize summary")?;
        println!("{payload}");
    } else {
        print!("{summary}");
    }
    Ok(())
}

fn exit_code_for(reason: StopReason) -> i32 {
    if reason == StopReason::QueueComplete {
        exit_codes::OK
    } else if reason.is_safety_halt() {
        exit_codes::HALTED
    } else {
        exit_codes::STOPPED
    }
}
