use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use perimetry_core::StimulusPlan;
use perimetry_experiment::{
    ExperimentConfig, LogSinks, RunDirectory, RunOutcome, RunReport, StimulusScheduler,
};
use perimetry_timing::{HighPrecisionTimer, MonotonicTimer, Timer};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::console::{ConsoleDisplay, ManualGaze};
use crate::handoff::CommandHandoff;
use crate::input;

#[derive(Parser, Debug)]
#[command(
    name = "perimetry",
    version,
    about = "Adaptive visual-field stimulus scheduler"
)]
pub struct Cli {
    /// Stimulus plan: count, response limit, then one position per line
    #[arg(long)]
    pub plan: PathBuf,

    /// TOML file with experiment parameters
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the directory that receives numbered run folders
    #[arg(long)]
    pub log_root: Option<PathBuf>,

    /// Program started with the run's raw/ directory once results are written
    #[arg(long)]
    pub post_process: Option<String>,

    /// Seed for the inter-trial delay
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sleep on the OS monotonic clock instead of the runtime timer
    #[arg(long)]
    pub precise_timer: bool,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

pub struct App {
    plan: StimulusPlan,
    config: ExperimentConfig,
    run_dir: RunDirectory,
    sinks: LogSinks<std::io::BufWriter<std::fs::File>>,
    post_process: Option<String>,
    seed: Option<u64>,
    precise_timer: bool,
}

impl App {
    /// Loads everything a run needs. Any failure here happens before the
    /// first stimulus is shown.
    pub fn new(cli: Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if let Some(root) = cli.log_root {
            config.log_root = root;
        }
        config.validate()?;

        let plan = StimulusPlan::load(&cli.plan)
            .with_context(|| format!("loading stimulus plan {}", cli.plan.display()))?;
        let run_dir = RunDirectory::create(&config.log_root)?;
        let sinks = LogSinks::open(&run_dir.raw())?;

        Ok(Self {
            plan,
            config,
            run_dir,
            sinks,
            post_process: cli.post_process,
            seed: cli.seed,
            precise_timer: cli.precise_timer,
        })
    }

    pub async fn run(self) -> Result<RunReport> {
        println!("=== PERIMETRY ===");
        println!("Platform: {}", std::env::consts::OS);
        println!("Run folder: {}", self.run_dir.root().display());
        println!("{}\n", input::HELP);

        let raw = self.run_dir.raw();
        let report = if self.precise_timer {
            self.execute(HighPrecisionTimer::new()).await?
        } else {
            self.execute(MonotonicTimer::new()).await?
        };

        match report.outcome {
            RunOutcome::Completed => println!("\nRun completed."),
            RunOutcome::Aborted => println!("\nRun stopped early."),
        }
        println!(
            "Trials: {}, hits: {}, false positives: {}",
            report.summary.trials, report.summary.hits, report.summary.false_positives
        );
        if let Some(latency) = report.summary.mean_latency {
            println!("Mean latency: {:.3} ms", latency * 1e3);
        }
        println!("Results saved to {}", raw.display());
        Ok(report)
    }

    async fn execute<T: Timer>(self, timer: T) -> Result<RunReport> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let gaze = Arc::new(ManualGaze::new());

        let mut scheduler =
            StimulusScheduler::new(self.plan, self.config, timer, rng, self.sinks)?
                .with_display(Box::new(ConsoleDisplay::default()))
                .with_gaze(gaze.clone());
        if let Some(program) = self.post_process {
            scheduler = scheduler
                .with_post_processor(Box::new(CommandHandoff::new(program)), self.run_dir.raw());
        }

        let shutdown = scheduler.shutdown_handle();
        input::spawn_console_input(scheduler.trigger_handle(), gaze, shutdown.clone())
            .context("starting console input")?;

        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, closing run");
                shutdown.shutdown();
            }
        });

        let report = scheduler.run().await;
        interrupt.abort();
        let report = report?;
        info!(run = self.run_dir.number(), "run data written");
        Ok(report)
    }
}
