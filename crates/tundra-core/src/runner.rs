//! Batch runner: one invocation from configuration to per-cohort report.
//!
//! [`prepare_run`] does everything that can fail before stepping starts:
//! validate the configuration, load the catalog, and build the run list.
//! [`RunCoordinator::run_batch`] then resolves every cohort up front and
//! runs them one at a time, in run-list order, each on a fresh compute
//! core.
//!
//! Failure handling follows the run mode:
//!
//! - **Site**: any cohort error ends the batch with
//!   [`BatchError::SiteCohortFailed`].
//! - **Regional**: a cohort error is logged and recorded in the report as
//!   a [`CohortFailure`], with the months completed before it; the batch
//!   moves on to the next cohort.
//!
//! A stop request ends the current cohort at its last completed month and
//! marks every remaining cohort cancelled.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use tundra_catalog::{CatalogError, CatalogOptions, DatasetSource, EntityCatalog};
use tundra_types::{CohortId, DatasetKind, Stage};
use uuid::Uuid;

use crate::compute::{CohortInputs, ComputeCore, StateSnapshot};
use crate::config::{ConfigError, RunMode, StageConfig, TundraConfig};
use crate::operator::RunControl;
use crate::output::OutputSink;
use crate::resolver::{CrossReferenceResolver, RequiredLinks, ResolvedCohortContext};
use crate::runlist::{RunList, RunListError};
use crate::scheduler::{
    Checkpoint, CohortError, CohortRun, EquilibriumTest, FailedRun, RunEnd, StageScheduler,
};

/// Errors that end a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The configuration is unreadable or invalid.
    #[error("configuration error: {source}")]
    Config {
        /// The underlying configuration error.
        #[from]
        source: ConfigError,
    },

    /// A dataset is missing or malformed.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: CatalogError,
    },

    /// The run list is empty or unreadable.
    #[error("run list error: {source}")]
    RunList {
        /// The underlying run-list error.
        #[from]
        source: RunListError,
    },

    /// The run mode has no implementation.
    #[error("run mode {mode:?} is not supported")]
    UnsupportedMode {
        /// The configured mode.
        mode: RunMode,
    },

    /// The single cohort of a site run failed.
    #[error("cohort {cohort} failed: {source}")]
    SiteCohortFailed {
        /// Cohort that failed.
        cohort: CohortId,
        /// Why it failed.
        source: CohortError,
    },
}

/// Everything a batch needs, loaded and validated.
#[derive(Debug)]
pub struct PreparedRun {
    /// Validated run configuration.
    pub config: StageConfig,
    /// Loaded datasets.
    pub catalog: EntityCatalog,
    /// Cohorts to run, in order.
    pub run_list: RunList,
}

/// Validate configuration, load datasets and build the run list.
///
/// # Errors
///
/// Returns a [`BatchError`] for an invalid configuration, an unsupported
/// mode, a missing or malformed dataset, or an empty run list. Nothing has
/// been simulated when this fails.
pub fn prepare_run(
    config: &TundraConfig,
    source: &dyn DatasetSource,
) -> Result<PreparedRun, BatchError> {
    let stage_config = StageConfig::from_config(config)?;
    let run_list = match stage_config.mode {
        RunMode::Site => {
            let chtid = config.run.site_cohort.ok_or_else(|| ConfigError::Invalid {
                reason: "site mode needs run.site_cohort".to_owned(),
            })?;
            RunList::single(chtid)
        }
        RunMode::Regional => RunList::from_source(source)?,
        mode @ RunMode::RegionalSpatial => return Err(BatchError::UnsupportedMode { mode }),
    };

    let catalog = EntityCatalog::load(
        source,
        CatalogOptions {
            load_restart: stage_config.uses_restart(),
            use_severity: stage_config.use_severity,
        },
    )?;

    info!(
        mode = ?stage_config.mode,
        case = %stage_config.case_name,
        cohorts = run_list.len(),
        stages = ?stage_config.stages,
        "Run prepared"
    );
    Ok(PreparedRun {
        config: stage_config,
        catalog,
        run_list,
    })
}

/// How one cohort's run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "failure", rename_all = "snake_case")]
pub enum CohortOutcome {
    /// Every enabled stage completed.
    Completed,
    /// The cohort's run stopped on an error.
    Failed(CohortFailure),
    /// A stop was requested before or during the cohort's run.
    Cancelled,
}

/// Why a cohort failed, as recorded in the batch report.
///
/// Mirrors [`CohortError`] with the underlying errors flattened to text so
/// the report stays cloneable and serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CohortFailure {
    /// The cohort, grid or climate record could not be resolved.
    #[error("no {dataset} record")]
    MissingRequiredLink {
        /// Required dataset whose link is missing.
        dataset: DatasetKind,
    },

    /// A year's driving inputs could not be assembled.
    #[error("driving data for year {year} unavailable: {reason}")]
    DrivingDataReadFailure {
        /// Calendar year being prepared.
        year: i32,
        /// What went wrong.
        reason: String,
    },

    /// The compute core rejected the cohort's records.
    #[error("load failed: {reason}")]
    Load {
        /// What went wrong.
        reason: String,
    },

    /// The compute core failed to step a month.
    #[error("{stage} year {year} failed: {reason}")]
    Core {
        /// Stage being run.
        stage: Stage,
        /// Calendar year being run.
        year: i32,
        /// What went wrong.
        reason: String,
    },

    /// The output sink rejected a record.
    #[error("output failed: {reason}")]
    Output {
        /// What went wrong.
        reason: String,
    },

    /// The stage clock or stage order broke down.
    #[error("scheduling failed: {reason}")]
    Scheduling {
        /// What went wrong.
        reason: String,
    },
}

impl From<&CohortError> for CohortFailure {
    fn from(error: &CohortError) -> Self {
        match error {
            CohortError::MissingRequiredLink { dataset, .. } => Self::MissingRequiredLink {
                dataset: *dataset,
            },
            CohortError::DrivingDataReadFailure { year, reason, .. } => {
                Self::DrivingDataReadFailure {
                    year: *year,
                    reason: reason.clone(),
                }
            }
            CohortError::Load { source, .. } => Self::Load {
                reason: source.to_string(),
            },
            CohortError::Core {
                stage,
                year,
                source,
                ..
            } => Self::Core {
                stage: *stage,
                year: *year,
                reason: source.to_string(),
            },
            CohortError::Output { source, .. } => Self::Output {
                reason: source.to_string(),
            },
            CohortError::Clock { source, .. } => Self::Scheduling {
                reason: source.to_string(),
            },
            CohortError::Stage { source, .. } => Self::Scheduling {
                reason: source.to_string(),
            },
        }
    }
}

/// Result for one cohort of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    /// Cohort.
    pub chtid: CohortId,
    /// How it ended.
    pub outcome: CohortOutcome,
    /// Last completed month, if any month ran.
    pub checkpoint: Option<Checkpoint>,
    /// Months simulated.
    pub months: u64,
    /// Core state at the end of the run, if it ran at all.
    pub final_state: Option<StateSnapshot>,
}

impl CohortReport {
    fn from_run(run: CohortRun) -> Self {
        let outcome = match run.end {
            RunEnd::Completed => CohortOutcome::Completed,
            RunEnd::Cancelled => CohortOutcome::Cancelled,
        };
        Self {
            chtid: run.chtid,
            outcome,
            checkpoint: run.checkpoint,
            months: run.months,
            final_state: Some(run.final_state),
        }
    }

    /// A failed run keeps the months completed before the error. The core
    /// state may be mid-month, so no final state is reported.
    fn failed(chtid: CohortId, failed: &FailedRun) -> Self {
        Self {
            chtid,
            outcome: CohortOutcome::Failed(CohortFailure::from(&failed.error)),
            checkpoint: failed.checkpoint,
            months: failed.months,
            final_state: None,
        }
    }

    const fn not_run(chtid: CohortId, outcome: CohortOutcome) -> Self {
        Self {
            chtid,
            outcome,
            checkpoint: None,
            months: 0,
            final_state: None,
        }
    }
}

/// Result of a whole batch, in run-list order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    /// Unique id of this batch.
    pub run_id: Uuid,
    /// Run mode.
    pub mode: RunMode,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// When the batch finished.
    pub finished_at: DateTime<Utc>,
    /// One entry per run-list entry.
    pub cohorts: Vec<CohortReport>,
}

impl BatchReport {
    /// Number of cohorts that completed.
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, CohortOutcome::Completed))
    }

    /// Number of cohorts that failed.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CohortOutcome::Failed(_)))
    }

    /// Number of cohorts that were cancelled.
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, CohortOutcome::Cancelled))
    }

    /// Outcomes in run-list order.
    pub fn outcomes(&self) -> Vec<&CohortOutcome> {
        self.cohorts.iter().map(|c| &c.outcome).collect()
    }

    fn count(&self, pred: impl Fn(&CohortOutcome) -> bool) -> usize {
        self.cohorts.iter().filter(|c| pred(&c.outcome)).count()
    }
}

/// Runs a batch of cohorts against one catalog and configuration.
pub struct RunCoordinator<'a> {
    catalog: &'a EntityCatalog,
    config: &'a StageConfig,
    control: Arc<RunControl>,
    equilibrium_test: Option<Box<EquilibriumTest>>,
}

impl<'a> RunCoordinator<'a> {
    /// A coordinator over a loaded catalog.
    pub const fn new(
        catalog: &'a EntityCatalog,
        config: &'a StageConfig,
        control: Arc<RunControl>,
    ) -> Self {
        Self {
            catalog,
            config,
            control,
            equilibrium_test: None,
        }
    }

    /// Install a convergence test for the equilibrium stage.
    #[must_use]
    pub fn with_equilibrium_test(mut self, test: Box<EquilibriumTest>) -> Self {
        self.equilibrium_test = Some(test);
        self
    }

    /// Shared run control.
    pub const fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    /// Run every cohort of `run_list`, in order.
    ///
    /// `new_core` is called once per cohort that has its required links;
    /// cohorts never share a core.
    ///
    /// # Errors
    ///
    /// In site mode, returns [`BatchError::SiteCohortFailed`] if the
    /// cohort fails. In regional mode cohort failures are recorded in the
    /// report and never returned.
    pub fn run_batch<C, F>(
        &self,
        run_list: &RunList,
        mut new_core: F,
        sink: &mut dyn OutputSink,
    ) -> Result<BatchReport, BatchError>
    where
        C: ComputeCore,
        F: FnMut() -> C,
    {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        info!(
            %run_id,
            mode = ?self.config.mode,
            cohorts = run_list.len(),
            "Batch starting"
        );

        let resolver = CrossReferenceResolver::new(self.catalog, self.config.uses_restart());
        let resolution = resolver.resolve(run_list);

        let mut scheduler = StageScheduler::new(self.config, &self.control);
        if let Some(test) = self.equilibrium_test.as_deref() {
            scheduler = scheduler.with_equilibrium_test(test);
        }

        let mut cohorts = Vec::with_capacity(resolution.contexts.len());
        for ctx in &resolution.contexts {
            if self.control.is_stop_requested() {
                cohorts.push(CohortReport::not_run(ctx.chtid, CohortOutcome::Cancelled));
                continue;
            }
            let report = match self.run_one(ctx, &mut new_core, &scheduler, sink) {
                Ok(run) => CohortReport::from_run(run),
                Err(failed) if self.config.mode == RunMode::Site => {
                    return Err(BatchError::SiteCohortFailed {
                        cohort: ctx.chtid,
                        source: failed.error,
                    });
                }
                Err(failed) => {
                    error!(
                        cohort = %ctx.chtid,
                        error = %failed.error,
                        months = failed.months,
                        checkpoint = ?failed.checkpoint,
                        "Cohort failed; continuing batch"
                    );
                    CohortReport::failed(ctx.chtid, &failed)
                }
            };
            cohorts.push(report);
        }

        let report = BatchReport {
            run_id,
            mode: self.config.mode,
            started_at,
            finished_at: Utc::now(),
            cohorts,
        };
        log_batch_end(&report, &self.control);
        Ok(report)
    }

    fn run_one<C, F>(
        &self,
        ctx: &ResolvedCohortContext,
        new_core: &mut F,
        scheduler: &StageScheduler<'_>,
        sink: &mut dyn OutputSink,
    ) -> Result<CohortRun, FailedRun>
    where
        C: ComputeCore,
        F: FnMut() -> C,
    {
        let links = ctx.require()?;
        let inputs = self.inputs(ctx, links)?;
        let mut core = new_core();
        core.load_cohort(&inputs)
            .map_err(|source| CohortError::Load {
                cohort: ctx.chtid,
                source,
            })?;
        scheduler.run_cohort(&mut core, &inputs, sink)
    }

    /// Borrow a resolved cohort's records from the catalog.
    fn inputs(
        &self,
        ctx: &ResolvedCohortContext,
        links: RequiredLinks,
    ) -> Result<CohortInputs<'a>, CohortError> {
        let catalog = self.catalog;
        let missing = |dataset| CohortError::MissingRequiredLink {
            cohort: ctx.chtid,
            dataset,
        };
        let grid = catalog
            .grids()
            .get(links.grid)
            .ok_or_else(|| missing(DatasetKind::Grid))?;
        let climate = catalog
            .climates()
            .get(links.climate)
            .ok_or_else(|| missing(DatasetKind::Climate))?;
        Ok(CohortInputs {
            chtid: ctx.chtid,
            grid,
            drainage: ctx.drain_rec.and_then(|r| catalog.drainages().get(r)),
            soil: ctx.soil_rec.and_then(|r| catalog.soils().get(r)),
            grid_fire: ctx.gfire_rec.and_then(|r| catalog.grid_fires().get(r)),
            climate,
            vegetation: ctx.veg_rec.and_then(|r| catalog.vegetation().get(r)),
            fire: ctx.fire_rec.and_then(|r| catalog.fires().get(r)),
            restart: ctx
                .init_rec
                .and_then(|r| catalog.restarts().and_then(|d| d.get(r))),
            co2: catalog.co2(),
        })
    }
}

/// Log the batch summary.
fn log_batch_end(report: &BatchReport, control: &RunControl) {
    let elapsed = report
        .finished_at
        .signed_duration_since(report.started_at)
        .num_milliseconds();
    if report.cancelled() > 0 {
        warn!(
            run_id = %report.run_id,
            cancelled = report.cancelled(),
            "Batch stopped before every cohort completed"
        );
    }
    info!(
        run_id = %report.run_id,
        completed = report.completed(),
        failed = report.failed(),
        cancelled = report.cancelled(),
        months = control.months_completed(),
        elapsed_ms = elapsed,
        "Batch complete"
    );
}
