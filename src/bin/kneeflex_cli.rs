use std::fs;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kneeflex::plan::Plan;
use kneeflex::session::{SessionEvent, SessionDriver, SourceStatus};
use kneeflex::source::LineSampleSource;
use kneeflex::storage::{PendingStore, Vault};
use kneeflex::AppConfig;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(
    name = "kneeflex_cli",
    about = "Offline session harness for the kneeflex trainer core"
)]
struct Cli {
    /// Path to the JSON config file (defaults to kneeflex.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a capture file ("angle,force" lines) through a full session
    Run {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        patient: String,
        #[arg(long)]
        capture: PathBuf,
        /// Override the sampling rate for faster-than-realtime replay
        #[arg(long)]
        poll_hz: Option<u32>,
    },
    /// List persisted session summaries for a patient
    History {
        #[arg(long)]
        patient: String,
    },
    /// Validate a plan file without starting a session
    ValidatePlan {
        #[arg(long)]
        plan: PathBuf,
    },
}

fn main() -> ExitCode {
    kneeflex::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    match cli.command {
        Commands::Run {
            plan,
            patient,
            capture,
            poll_hz,
        } => run_session(&config, &plan, &patient, &capture, poll_hz),
        Commands::History { patient } => run_history(&config, &patient),
        Commands::ValidatePlan { plan } => run_validate(&plan),
    }
}

enum Finish {
    Natural,
    Forced,
}

fn run_session(
    config: &AppConfig,
    plan_path: &PathBuf,
    patient: &str,
    capture: &PathBuf,
    poll_hz: Option<u32>,
) -> Result<ExitCode> {
    let plan = load_plan(plan_path)?;
    let vault = Vault::open(&config.storage.data_dir, &config.storage.key_file)?;
    let store = PendingStore::new(&config.storage.data_dir, Arc::new(vault));

    let mut sampling = config.sampling.clone();
    if let Some(hz) = poll_hz {
        sampling.poll_hz = hz;
    }

    let file = File::open(capture).with_context(|| format!("opening {}", capture.display()))?;
    let source = LineSampleSource::new(file);

    let driver = SessionDriver::new(sampling, store);
    let mut handle = driver.start(plan, patient, Box::new(source))?;
    // First subscription is pre-opened by the driver, so even a capture
    // that completes instantly cannot slip its events past this loop
    let mut rx = handle.subscribe();

    let finish = loop {
        match rx.blocking_recv() {
            Ok(SessionEvent::SessionEnded { .. }) => break Finish::Natural,
            // End of capture: close out whatever was achieved
            Ok(SessionEvent::SourceStatusChanged {
                status: SourceStatus::Degraded,
            }) => break Finish::Forced,
            Ok(SessionEvent::PersistFailed { .. }) => break Finish::Natural,
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break Finish::Natural,
        }
    };

    let summary = match finish {
        Finish::Natural => handle
            .wait()?
            .context("session ended without a persisted summary")?,
        Finish::Forced => handle.forced_finish()?,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(ExitCode::from(0))
}

fn run_history(config: &AppConfig, patient: &str) -> Result<ExitCode> {
    let vault = Vault::open(&config.storage.data_dir, &config.storage.key_file)?;
    let store = PendingStore::new(&config.storage.data_dir, Arc::new(vault));

    let summaries = store.list_summaries(patient);
    if summaries.is_empty() {
        println!("No sessions found for {patient}");
        return Ok(ExitCode::from(0));
    }
    for summary in summaries {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(ExitCode::from(0))
}

fn run_validate(plan_path: &PathBuf) -> Result<ExitCode> {
    let plan = load_plan(plan_path)?;
    match plan.validate() {
        Ok(()) => {
            println!("Plan {} is valid", plan.id);
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::from(2))
        }
    }
}

fn load_plan(path: &PathBuf) -> Result<Plan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing plan {}", path.display()))
}
