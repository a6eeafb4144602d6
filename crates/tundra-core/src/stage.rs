//! Stage ordering, stage sizing, and driving-data windows.
//!
//! [`StageMachine`] enforces Equilibrium -> Spinup -> Transient -> Scenario
//! over the enabled stages. [`plan_stage`] turns a stage into one or more
//! [`StagePass`]es (equilibrium has an environment-only pre-pass followed
//! by the full pass), and [`DrivingWindow`] is what the compute core is
//! told at the start of every simulated year.

use tundra_types::{ModuleSet, Stage};

use crate::config::{EquilibriumBounds, StageConfig};

/// Minimum number of fire cycles in the equilibrium full pass.
pub const MIN_FIRE_CYCLES: i32 = 20;

/// Years since disturbance during the pre-pass, far enough back that no
/// disturbance effect remains.
pub const PREPASS_YEARS_SINCE_DISTURBANCE: u32 = 1000;

/// Errors raised by illegal stage transitions.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A stage was started before an enabled earlier stage completed.
    #[error("{stage} cannot start before {predecessor} completes")]
    PredecessorIncomplete {
        /// Stage being started.
        stage: Stage,
        /// Enabled earlier stage that has not completed.
        predecessor: Stage,
    },

    /// A stage that is not enabled for this run was started.
    #[error("{stage} is not enabled")]
    NotEnabled {
        /// Stage being started.
        stage: Stage,
    },

    /// A stage was started while another was still running, or twice.
    #[error("{stage} cannot start now")]
    OutOfSequence {
        /// Stage being started.
        stage: Stage,
    },
}

/// Tracks which stages of one cohort run have started and completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMachine {
    enabled: Vec<Stage>,
    completed: Vec<Stage>,
    current: Option<Stage>,
}

impl StageMachine {
    /// A machine over the given enabled stages.
    pub fn new(enabled: &[Stage]) -> Self {
        let mut enabled = enabled.to_vec();
        enabled.sort();
        enabled.dedup();
        Self {
            enabled,
            completed: Vec::new(),
            current: None,
        }
    }

    /// Check whether `stage` may start now.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] naming why the stage cannot start.
    pub fn can_enter(&self, stage: Stage) -> Result<(), StageError> {
        if !self.enabled.contains(&stage) {
            return Err(StageError::NotEnabled { stage });
        }
        if self.current.is_some() || self.completed.contains(&stage) {
            return Err(StageError::OutOfSequence { stage });
        }
        if let Some(&predecessor) = self
            .enabled
            .iter()
            .find(|&&s| s < stage && !self.completed.contains(&s))
        {
            return Err(StageError::PredecessorIncomplete { stage, predecessor });
        }
        Ok(())
    }

    /// Start a stage.
    ///
    /// # Errors
    ///
    /// See [`can_enter`](Self::can_enter).
    pub fn begin(&mut self, stage: Stage) -> Result<(), StageError> {
        self.can_enter(stage)?;
        self.current = Some(stage);
        Ok(())
    }

    /// Set the completion flag of the running stage.
    pub fn complete(&mut self) -> Option<Stage> {
        let stage = self.current.take()?;
        self.completed.push(stage);
        Some(stage)
    }

    /// Whether a stage's completion flag is set.
    pub fn is_complete(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    /// The stage currently running.
    pub const fn current(&self) -> Option<Stage> {
        self.current
    }

    /// Completed stages in completion order.
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    /// Enabled stages in execution order.
    pub fn enabled(&self) -> &[Stage] {
        &self.enabled
    }
}

/// Last year index of the equilibrium full pass, `nfri * fri - 1`, where
/// `nfri = min(max(min_years / fri, 20), max_years / fri)`.
///
/// This is an index, not a count. The main pass runs years `0..=last`,
/// so it covers `nfri * fri` years.
///
/// Returns `None` when there is no fire regime (`fri <= 0`).
pub fn equilibrium_last_year(fri: i32, bounds: EquilibriumBounds) -> Option<i32> {
    if fri <= 0 {
        return None;
    }
    let lower = bounds.min_years.checked_div(fri)?.max(MIN_FIRE_CYCLES);
    let cycles = lower.min(bounds.max_years.checked_div(fri)?);
    cycles.checked_mul(fri)?.checked_sub(1)
}

/// Number of years in the equilibrium full pass.
///
/// Without a fire regime the pass runs for the minimum equilibrium length.
pub fn equilibrium_years(fri: Option<i32>, bounds: EquilibriumBounds) -> usize {
    let last = fri
        .and_then(|f| equilibrium_last_year(f, bounds))
        .or_else(|| bounds.min_years.checked_sub(1));
    last.and_then(|l| l.checked_add(1))
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0)
}

/// Number of driving-data years a stage cycles over.
///
/// Equilibrium and spin-up use at most `nominal` years; transient and
/// scenario use everything available.
pub fn driving_horizon(stage: Stage, available: usize, nominal: usize) -> usize {
    match stage {
        Stage::Equilibrium | Stage::Spinup => nominal.min(available),
        Stage::Transient | Stage::Scenario => available,
    }
}

/// Whether climate and CO2 vary from year to year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimateChange {
    /// Year-to-year climate variation (otherwise normalized climate).
    pub climate: bool,
    /// CO2 looked up per calendar year (otherwise the series' first value).
    pub co2: bool,
}

/// Climate-change switches for a stage.
///
/// Equilibrium always runs on normalized climate and constant CO2. Later
/// stages use their defaults unless the configuration overrides them.
pub fn climate_change(stage: Stage, config: &StageConfig) -> ClimateChange {
    let (climate, co2) = match stage {
        Stage::Equilibrium => return ClimateChange {
            climate: false,
            co2: false,
        },
        Stage::Spinup => (true, false),
        Stage::Transient | Stage::Scenario => (true, true),
    };
    ClimateChange {
        climate: config.change_climate.unwrap_or(climate),
        co2: config.change_co2.unwrap_or(co2),
    }
}

/// Which part of a stage a pass is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Environment-only warm-up ahead of the equilibrium full pass.
    Prepass,
    /// The stage proper.
    Main,
}

/// One contiguous year loop within a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePass {
    /// Stage the pass belongs to.
    pub stage: Stage,
    /// Pre-pass or main pass.
    pub pass: Pass,
    /// First calendar year.
    pub begin_year: i32,
    /// Number of years.
    pub years: usize,
    /// Modules enabled for the pass.
    pub modules: ModuleSet,
    /// Years since disturbance set on entry, if reset.
    pub years_since_disturbance: Option<u32>,
    /// Fires are derived from the fire-return interval instead of the
    /// fire-event history.
    pub fire_from_interval: bool,
    /// Driving-data horizon.
    pub horizon: usize,
    /// Climate-change switches.
    pub change: ClimateChange,
}

impl StagePass {
    /// Whether the convergence test applies after each year of this pass.
    pub fn checks_equilibrium(&self) -> bool {
        self.stage == Stage::Equilibrium && self.pass == Pass::Main
    }
}

/// The passes that make up one stage for a cohort.
///
/// `fri` is the cohort's fire-return interval (if its grid has fire
/// statistics) and `available_years` the length of its climate series.
pub fn plan_stage(
    stage: Stage,
    config: &StageConfig,
    fri: Option<i32>,
    available_years: usize,
) -> Vec<StagePass> {
    let horizon = driving_horizon(stage, available_years, config.nominal_horizon);
    let change = climate_change(stage, config);
    match config.stage_range(stage) {
        None => {
            let prepass_years = config
                .prepass_end_year
                .checked_add(1)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0);
            vec![
                StagePass {
                    stage,
                    pass: Pass::Prepass,
                    begin_year: 0,
                    years: prepass_years,
                    modules: ModuleSet::environment_only(),
                    years_since_disturbance: Some(PREPASS_YEARS_SINCE_DISTURBANCE),
                    fire_from_interval: false,
                    horizon,
                    change,
                },
                StagePass {
                    stage,
                    pass: Pass::Main,
                    begin_year: 0,
                    years: equilibrium_years(fri, config.equilibrium),
                    modules: ModuleSet::full(),
                    years_since_disturbance: Some(0),
                    fire_from_interval: true,
                    horizon,
                    change,
                },
            ]
        }
        Some(range) => vec![StagePass {
            stage,
            pass: Pass::Main,
            begin_year: range.begin,
            years: range.years(),
            modules: ModuleSet::full(),
            years_since_disturbance: None,
            fire_from_interval: false,
            horizon,
            change,
        }],
    }
}

/// What the compute core needs to prepare one year of driving data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrivingWindow {
    /// Global year index.
    pub year_index: usize,
    /// Year index within the stage.
    pub stage_year_index: usize,
    /// Driving-data year to read (`stage_year_index % horizon`).
    pub data_index: usize,
    /// Driving-data horizon.
    pub horizon: usize,
    /// Calendar year being simulated.
    pub calendar_year: i32,
    /// Year-to-year climate variation.
    pub change_climate: bool,
    /// Rising CO2.
    pub change_co2: bool,
    /// Derive fires from the fire-return interval.
    pub fire_from_interval: bool,
}

impl DrivingWindow {
    /// The window for one year of a pass, or `None` when the horizon is
    /// empty and there is nothing to read.
    pub fn for_year(
        pass: &StagePass,
        year_index: usize,
        stage_year_index: usize,
        calendar_year: i32,
    ) -> Option<Self> {
        Some(Self {
            year_index,
            stage_year_index,
            data_index: stage_year_index.checked_rem(pass.horizon)?,
            horizon: pass.horizon,
            calendar_year,
            change_climate: pass.change.climate,
            change_co2: pass.change.co2,
            fire_from_interval: pass.fire_from_interval,
        })
    }
}
