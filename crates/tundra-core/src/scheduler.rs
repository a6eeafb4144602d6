//! The per-cohort stage scheduler.
//!
//! [`StageScheduler::run_cohort`] walks the enabled stages in order through
//! a [`StageMachine`], runs each stage's passes year by year, and inside
//! every year prepares driving data, advances twelve months and routes
//! output. The stop flag is polled at every month boundary, so a
//! cancelled run always ends on a completed month.

use tracing::{debug, info};
use tundra_types::{CohortId, DatasetKind, MONTHS_PER_YEAR, Stage};

use crate::clock::{ClockError, DAYS_IN_MONTH, StageClock};
use crate::compute::{CohortInputs, ComputeCore, CoreError, StateSnapshot};
use crate::config::StageConfig;
use crate::operator::RunControl;
use crate::output::{OutputContext, OutputSink, SinkError};
use crate::stage::{DrivingWindow, StageError, StageMachine, StagePass, plan_stage};

/// Convergence test for the equilibrium stage. Returning `true` ends the
/// stage early.
pub type EquilibriumTest = dyn Fn(&StateSnapshot) -> bool + Send + Sync;

/// Errors that end one cohort's run.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// The cohort cannot resolve its cohort, grid or climate record.
    #[error("cohort {cohort} has no {dataset} record")]
    MissingRequiredLink {
        /// Cohort affected.
        cohort: CohortId,
        /// Required dataset whose link is missing.
        dataset: DatasetKind,
    },

    /// A year's driving inputs could not be assembled.
    #[error("cohort {cohort} failed to read driving data for year {year}: {reason}")]
    DrivingDataReadFailure {
        /// Cohort affected.
        cohort: CohortId,
        /// Calendar year being prepared.
        year: i32,
        /// What went wrong.
        reason: String,
    },

    /// The compute core rejected the cohort's records.
    #[error("cohort {cohort} could not be loaded: {source}")]
    Load {
        /// Cohort affected.
        cohort: CohortId,
        /// The underlying core error.
        source: CoreError,
    },

    /// The compute core failed to step a month.
    #[error("cohort {cohort} failed in {stage} year {year}: {source}")]
    Core {
        /// Cohort affected.
        cohort: CohortId,
        /// Stage being run.
        stage: Stage,
        /// Calendar year being run.
        year: i32,
        /// The underlying core error.
        source: CoreError,
    },

    /// The output sink rejected a record.
    #[error("cohort {cohort} output failed: {source}")]
    Output {
        /// Cohort affected.
        cohort: CohortId,
        /// The underlying sink error.
        source: SinkError,
    },

    /// The stage clock overflowed.
    #[error("cohort {cohort}: {source}")]
    Clock {
        /// Cohort affected.
        cohort: CohortId,
        /// The underlying clock error.
        source: ClockError,
    },

    /// A stage was entered out of order.
    #[error("cohort {cohort}: {source}")]
    Stage {
        /// Cohort affected.
        cohort: CohortId,
        /// The underlying stage error.
        source: StageError,
    },
}

/// A cohort run that ended on an error, with the progress made before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct FailedRun {
    /// Why the run ended.
    pub error: CohortError,
    /// Last month completed before the failure.
    pub checkpoint: Option<Checkpoint>,
    /// Months simulated before the failure.
    pub months: u64,
}

impl From<CohortError> for FailedRun {
    fn from(error: CohortError) -> Self {
        Self {
            error,
            checkpoint: None,
            months: 0,
        }
    }
}

/// The last completed month of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Checkpoint {
    /// Stage the month belongs to.
    pub stage: Stage,
    /// Calendar year.
    pub calendar_year: i32,
    /// Month index (0-11).
    pub month: usize,
}

/// How a cohort run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Every enabled stage completed.
    Completed,
    /// A stop was requested.
    Cancelled,
}

/// What happened in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSummary {
    /// Stage.
    pub stage: Stage,
    /// Years simulated, all passes included.
    pub years: usize,
    /// The equilibrium test ended the stage early.
    pub converged: bool,
}

/// Result of one cohort run.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRun {
    /// Cohort.
    pub chtid: CohortId,
    /// How the run ended.
    pub end: RunEnd,
    /// Stages that completed, in order.
    pub stages: Vec<StageSummary>,
    /// Last completed month.
    pub checkpoint: Option<Checkpoint>,
    /// Months simulated.
    pub months: u64,
    /// Core state at the end of the run.
    pub final_state: StateSnapshot,
}

enum PassEnd {
    Finished,
    Converged,
    Cancelled,
}

/// Progress shared across the passes of one cohort run.
struct Progress {
    chtid: CohortId,
    clock: StageClock,
    checkpoint: Option<Checkpoint>,
    last_year: Option<OutputContext>,
    months: u64,
    years: usize,
}

/// Drives one cohort at a time through the enabled stages.
pub struct StageScheduler<'a> {
    config: &'a StageConfig,
    control: &'a RunControl,
    equilibrium_test: Option<&'a EquilibriumTest>,
}

impl<'a> StageScheduler<'a> {
    /// A scheduler for one run configuration.
    pub const fn new(config: &'a StageConfig, control: &'a RunControl) -> Self {
        Self {
            config,
            control,
            equilibrium_test: None,
        }
    }

    /// Install a convergence test checked after every full equilibrium year.
    #[must_use]
    pub const fn with_equilibrium_test(mut self, test: &'a EquilibriumTest) -> Self {
        self.equilibrium_test = Some(test);
        self
    }

    /// Run every enabled stage for one cohort.
    ///
    /// `core` must already hold the cohort (see
    /// [`ComputeCore::load_cohort`]).
    ///
    /// # Errors
    ///
    /// Returns a [`FailedRun`] if driving data cannot be prepared, the
    /// core fails a step, or the sink fails. The cohort's run ends there;
    /// nothing is retried. The failure carries the last completed month.
    pub fn run_cohort(
        &self,
        core: &mut dyn ComputeCore,
        inputs: &CohortInputs<'_>,
        sink: &mut dyn OutputSink,
    ) -> Result<CohortRun, FailedRun> {
        let mut progress = Progress {
            chtid: inputs.chtid,
            clock: StageClock::new(self.config.output.start_year),
            checkpoint: None,
            last_year: None,
            months: 0,
            years: 0,
        };
        self.drive(core, inputs, sink, &mut progress)
            .map_err(|error| FailedRun {
                error,
                checkpoint: progress.checkpoint,
                months: progress.months,
            })
    }

    fn drive(
        &self,
        core: &mut dyn ComputeCore,
        inputs: &CohortInputs<'_>,
        sink: &mut dyn OutputSink,
        progress: &mut Progress,
    ) -> Result<CohortRun, CohortError> {
        let chtid = inputs.chtid;
        let fri = inputs.fire_return_interval();
        let available = inputs.climate.available_years();
        let mut machine = StageMachine::new(&self.config.stages);
        let mut stages = Vec::new();

        info!(
            cohort = %chtid,
            stages = ?machine.enabled(),
            fri,
            climate_years = available,
            "Cohort run starting"
        );

        for stage in machine.enabled().to_vec() {
            machine
                .begin(stage)
                .map_err(|source| CohortError::Stage { cohort: chtid, source })?;
            info!(cohort = %chtid, %stage, "Stage starting");

            let years_before = progress.years;
            let mut converged = false;
            for pass in plan_stage(stage, self.config, fri, available) {
                match self.run_pass(&pass, core, sink, progress)? {
                    PassEnd::Finished => {}
                    PassEnd::Converged => {
                        converged = true;
                        break;
                    }
                    PassEnd::Cancelled => {
                        info!(
                            cohort = %chtid,
                            %stage,
                            checkpoint = ?progress.checkpoint,
                            "Cohort run cancelled"
                        );
                        return Ok(CohortRun {
                            chtid,
                            end: RunEnd::Cancelled,
                            stages,
                            checkpoint: progress.checkpoint,
                            months: progress.months,
                            final_state: core.snapshot(),
                        });
                    }
                }
            }

            machine.complete();
            let years = progress.years.saturating_sub(years_before);
            info!(cohort = %chtid, %stage, years, converged, "Stage complete");
            stages.push(StageSummary {
                stage,
                years,
                converged,
            });
        }

        let final_state = core.snapshot();
        if let Some(ctx) = &progress.last_year {
            sink.on_restart(ctx, &final_state)
                .map_err(|source| CohortError::Output { cohort: chtid, source })?;
        }
        info!(cohort = %chtid, months = progress.months, "Cohort run complete");

        Ok(CohortRun {
            chtid,
            end: RunEnd::Completed,
            stages,
            checkpoint: progress.checkpoint,
            months: progress.months,
            final_state,
        })
    }

    fn run_pass(
        &self,
        pass: &StagePass,
        core: &mut dyn ComputeCore,
        sink: &mut dyn OutputSink,
        progress: &mut Progress,
    ) -> Result<PassEnd, CohortError> {
        let chtid = progress.chtid;
        let clock_err = |source| CohortError::Clock { cohort: chtid, source };
        let output = self.config.output;

        progress.clock.enter_stage(pass.stage, pass.begin_year);
        core.set_modules(pass.modules);
        if let Some(years) = pass.years_since_disturbance {
            core.set_years_since_disturbance(years);
        }

        for _ in 0..pass.years {
            if self.control.is_stop_requested() {
                return Ok(PassEnd::Cancelled);
            }

            let clock = &progress.clock;
            let year_index = clock.year_index();
            let calendar_year = clock.calendar_year().map_err(clock_err)?;
            let output_year = clock.output_year_index();
            let window =
                DrivingWindow::for_year(pass, year_index, clock.stage_year_index(), calendar_year)
                    .ok_or_else(|| CohortError::DrivingDataReadFailure {
                        cohort: chtid,
                        year: calendar_year,
                        reason: "no driving-data years available".to_owned(),
                    })?;
            core.prepare_driving_data(&window).map_err(|e| {
                CohortError::DrivingDataReadFailure {
                    cohort: chtid,
                    year: calendar_year,
                    reason: e.to_string(),
                }
            })?;

            let year_ctx = OutputContext {
                chtid,
                stage: pass.stage,
                calendar_year,
                year_index,
                output_year_index: output_year.unwrap_or(0),
                month: None,
                day: None,
            };

            for (month, &days) in DAYS_IN_MONTH.iter().enumerate() {
                if month > 0 && self.control.is_stop_requested() {
                    return Ok(PassEnd::Cancelled);
                }
                core.advance_one_month(year_index, month, days)
                    .map_err(|source| CohortError::Core {
                        cohort: chtid,
                        stage: pass.stage,
                        year: calendar_year,
                        source,
                    })?;
                progress.clock.advance_one_month().map_err(clock_err)?;
                progress.checkpoint = Some(Checkpoint {
                    stage: pass.stage,
                    calendar_year,
                    month,
                });
                progress.months = progress.months.saturating_add(1);
                self.control.record_month();

                if output_year.is_some() {
                    let ctx = OutputContext {
                        month: Some(month),
                        ..year_ctx
                    };
                    route_month(core, sink, &ctx, days, output)
                        .map_err(|source| CohortError::Output { cohort: chtid, source })?;
                }
            }

            progress.years = progress.years.saturating_add(1);
            progress.last_year = Some(year_ctx);

            if output.region && pass.stage != Stage::Equilibrium && output_year.is_some() {
                let state = core.snapshot();
                let state = match &self.config.region_variables {
                    Some(names) => state.select(names),
                    None => state,
                };
                sink.on_region_year(&year_ctx, &state)
                    .map_err(|source| CohortError::Output { cohort: chtid, source })?;
            }
            debug!(cohort = %chtid, stage = %pass.stage, calendar_year, "Year complete");

            if pass.checks_equilibrium()
                && self
                    .equilibrium_test
                    .is_some_and(|test| test(&core.snapshot()))
            {
                info!(cohort = %chtid, calendar_year, "Equilibrium reached");
                return Ok(PassEnd::Converged);
            }
        }
        Ok(PassEnd::Finished)
    }
}

/// Send one completed month to the enabled site outputs.
fn route_month(
    core: &dyn ComputeCore,
    sink: &mut dyn OutputSink,
    ctx: &OutputContext,
    days: u32,
    output: crate::config::OutputFlags,
) -> Result<(), SinkError> {
    if output.daily {
        let days = usize::try_from(days).unwrap_or(0);
        for day in 0..days {
            if let Some(state) = core.day_snapshot(day) {
                let day_ctx = OutputContext {
                    day: Some(day),
                    ..*ctx
                };
                sink.on_day(&day_ctx, &state)?;
            }
        }
    }
    let last_month = ctx
        .month
        .is_some_and(|m| m.checked_add(1) == Some(MONTHS_PER_YEAR));
    if output.monthly || (output.yearly && last_month) {
        let state = core.snapshot();
        if output.monthly {
            sink.on_month(ctx, &state)?;
        }
        if output.yearly && last_month {
            let year_ctx = OutputContext { month: None, ..*ctx };
            sink.on_year(&year_ctx, &state)?;
        }
    }
    Ok(())
}
