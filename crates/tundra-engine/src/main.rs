//! Batch engine binary for Tundra cohort runs.
//!
//! Loads configuration, reads every dataset once, and runs the configured
//! cohorts through their stages on the reference compute core, writing
//! JSON-lines output and a batch report.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (first argument, default `tundra-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Load datasets and build the run list
//! 4. Wire Ctrl-C to the run control
//! 5. Run the batch on a blocking thread
//! 6. Write the batch report and print the status table

mod error;
mod sink;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tundra_catalog::JsonDirectory;
use tundra_core::{
    BatchReport, BucketCore, CohortOutcome, PreparedRun, RunControl, RunCoordinator,
    TundraConfig, prepare_run,
};

use crate::error::EngineError;
use crate::sink::JsonLinesSink;

/// Configuration file read when no path is given.
const DEFAULT_CONFIG: &str = "tundra-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if startup fails or a site-mode cohort fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        config = %config_path.display(),
        mode = ?config.run.mode,
        case = %config.run.case_name,
        "tundra-engine starting"
    );

    // 3. Load datasets and build the run list.
    let mut source = JsonDirectory::new(&config.inputs.grid_dir, &config.inputs.cohort_dir);
    if let Some(path) = &config.inputs.restart_file {
        source = source.with_restart_file(path);
    }
    if let Some(path) = &config.inputs.run_list_file {
        source = source.with_run_list_file(path);
    }
    if let Some(path) = &config.inputs.region_dir {
        source = source.with_region_dir(path);
    }
    let prepared = prepare_run(&config, &source)?;

    // 4. Wire Ctrl-C to the run control.
    let control = Arc::new(RunControl::new());
    let stop = Arc::clone(&control);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Stop requested; finishing the current month");
            stop.request_stop();
        }
    });

    // 5. Run the batch.
    let output_dir = config.output.dir.clone();
    let report = tokio::task::spawn_blocking(move || run_prepared(&prepared, control, &output_dir))
        .await
        .map_err(|e| EngineError::Task {
            message: e.to_string(),
        })??;

    // 6. Report.
    let report_path = config
        .output
        .dir
        .join(format!("{}_report.json", config.run.case_name));
    write_report(&report, &report_path)?;
    print_status_table(&report);

    info!(
        run_id = %report.run_id,
        report = %report_path.display(),
        "tundra-engine shutdown complete"
    );
    Ok(())
}

/// Load the configuration, falling back to defaults if the file is absent.
fn load_config(path: &Path) -> Result<TundraConfig, EngineError> {
    if path.exists() {
        Ok(TundraConfig::from_file(path)?)
    } else {
        eprintln!("Config file {} not found, using defaults", path.display());
        Ok(TundraConfig::parse("{}")?)
    }
}

/// Run every cohort of a prepared batch on fresh bucket cores.
fn run_prepared(
    prepared: &PreparedRun,
    control: Arc<RunControl>,
    output_dir: &Path,
) -> Result<BatchReport, EngineError> {
    let mut sink = JsonLinesSink::create(output_dir, &prepared.config.case_name)?;
    let coordinator = RunCoordinator::new(&prepared.catalog, &prepared.config, control);
    let report = coordinator.run_batch(&prepared.run_list, BucketCore::new, &mut sink)?;
    sink.finish()?;
    Ok(report)
}

fn write_report(report: &BatchReport, path: &Path) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(report).map_err(|e| EngineError::Report {
        message: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| EngineError::Report {
        message: format!("{}: {e}", path.display()),
    })
}

/// Print one row per cohort, then the totals.
fn print_status_table(report: &BatchReport) {
    println!("  cohort  status        last month  detail");
    for cohort in &report.cohorts {
        let (status, detail) = match &cohort.outcome {
            CohortOutcome::Completed => ("completed", String::new()),
            CohortOutcome::Failed(failure) => ("failed", failure.to_string()),
            CohortOutcome::Cancelled => ("cancelled", String::new()),
        };
        let checkpoint = cohort.checkpoint.map_or_else(
            || "-".to_owned(),
            |c| format!("{}-{:02}", c.calendar_year, c.month.saturating_add(1)),
        );
        println!(
            "{:>8}  {status:<10}  {checkpoint:>12}  {detail}",
            cohort.chtid.to_string()
        );
    }
    println!(
        "{} completed, {} failed, {} cancelled",
        report.completed(),
        report.failed(),
        report.cancelled()
    );
}
