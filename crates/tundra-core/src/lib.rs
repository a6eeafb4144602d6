//! Cross-referencing, stage scheduling, and batch orchestration for Tundra
//! cohort runs.
//!
//! A run resolves every cohort's links into the loaded datasets once, then
//! steps cohorts one at a time through Equilibrium, Spinup, Transient and
//! Scenario, driving a [`ComputeCore`] month by month and routing its state
//! to an [`OutputSink`].
//!
//! # Modules
//!
//! - [`clock`] -- Stage clock: year and month counters, calendar year,
//!   output-year gating.
//! - [`compute`] -- [`ComputeCore`] trait and the reference
//!   [`BucketCore`].
//! - [`config`] -- Configuration loading from `tundra-config.yaml` and the
//!   validated [`StageConfig`].
//! - [`operator`] -- [`RunControl`], the shared stop flag.
//! - [`output`] -- [`OutputSink`] trait, [`MemorySink`] and [`NoOpSink`].
//! - [`resolver`] -- [`CrossReferenceResolver`] and
//!   [`ResolvedCohortContext`].
//! - [`runlist`] -- [`RunList`], the ordered cohort roster.
//! - [`runner`] -- [`RunCoordinator`] and the [`BatchReport`].
//! - [`scheduler`] -- [`StageScheduler`], the per-cohort year/month loop.
//! - [`stage`] -- Stage ordering, stage sizing and driving windows.

pub mod clock;
pub mod compute;
pub mod config;
pub mod operator;
pub mod output;
pub mod resolver;
pub mod runlist;
pub mod runner;
pub mod scheduler;
pub mod stage;

pub use compute::{BucketCore, CohortInputs, ComputeCore, CoreError, StateSnapshot};
pub use config::{ConfigError, RunMode, StageConfig, TundraConfig};
pub use operator::RunControl;
pub use output::{MemorySink, NoOpSink, OutputContext, OutputKind, OutputSink, SinkError};
pub use resolver::{CrossReferenceResolver, ResolvedCohortContext};
pub use runlist::{RunList, RunListError};
pub use runner::{
    BatchError, BatchReport, CohortFailure, CohortOutcome, CohortReport, PreparedRun,
    RunCoordinator, prepare_run,
};
pub use scheduler::{CohortError, CohortRun, EquilibriumTest, FailedRun, RunEnd, StageScheduler};
