//! Output routing to external sinks.
//!
//! The scheduler decides *when* output happens (output years, enabled
//! granularities, run mode) and hands the sink an [`OutputContext`] and an
//! already-assembled [`StateSnapshot`]. Formatting and persistence belong
//! to the sink.

use serde::Serialize;
use tundra_types::{CohortId, Stage};

use crate::compute::StateSnapshot;

/// Errors raised by an output sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing failed.
    #[error("output write failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A record could not be encoded.
    #[error("output encoding failed: {reason}")]
    Encode {
        /// What went wrong.
        reason: String,
    },
}

/// Granularity of an output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// One record per simulated day.
    Daily,
    /// One record per month.
    Monthly,
    /// One record per year.
    Yearly,
    /// One region-summary row per cohort-year.
    Region,
    /// Final state of a completed cohort run.
    Restart,
}

/// Where in the run an output record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputContext {
    /// Cohort being run.
    pub chtid: CohortId,
    /// Stage being run.
    pub stage: Stage,
    /// Calendar year.
    pub calendar_year: i32,
    /// Global year index.
    pub year_index: usize,
    /// Output-year index.
    pub output_year_index: usize,
    /// Month index, for daily and monthly records.
    pub month: Option<usize>,
    /// Day of month (0-based), for daily records.
    pub day: Option<usize>,
}

/// Receiver of per-cohort output.
pub trait OutputSink {
    /// One day of site output.
    fn on_day(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError>;

    /// One month of site output.
    fn on_month(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError>;

    /// One year of site output.
    fn on_year(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError>;

    /// One region-summary row.
    fn on_region_year(
        &mut self,
        ctx: &OutputContext,
        state: &StateSnapshot,
    ) -> Result<(), SinkError>;

    /// Final state after a cohort run completes.
    fn on_restart(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError>;
}

/// A sink that discards everything.
pub struct NoOpSink;

impl OutputSink for NoOpSink {
    fn on_day(&mut self, _ctx: &OutputContext, _state: &StateSnapshot) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_month(&mut self, _ctx: &OutputContext, _state: &StateSnapshot) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_year(&mut self, _ctx: &OutputContext, _state: &StateSnapshot) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_region_year(
        &mut self,
        _ctx: &OutputContext,
        _state: &StateSnapshot,
    ) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_restart(
        &mut self,
        _ctx: &OutputContext,
        _state: &StateSnapshot,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One record captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Granularity.
    pub kind: OutputKind,
    /// Where it was produced.
    pub context: OutputContext,
    /// The state handed to the sink.
    pub state: StateSnapshot,
}

/// A sink that keeps every record in memory, in call order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    records: Vec<OutputRecord>,
}

impl MemorySink {
    /// An empty sink.
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Every record so far.
    pub fn records(&self) -> &[OutputRecord] {
        &self.records
    }

    /// Records of one granularity.
    pub fn of_kind(&self, kind: OutputKind) -> impl Iterator<Item = &OutputRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    /// Records produced for one cohort.
    pub fn for_cohort(&self, chtid: CohortId) -> Vec<OutputRecord> {
        self.records
            .iter()
            .filter(|r| r.context.chtid == chtid)
            .cloned()
            .collect()
    }

    fn push(&mut self, kind: OutputKind, ctx: &OutputContext, state: &StateSnapshot) {
        self.records.push(OutputRecord {
            kind,
            context: *ctx,
            state: state.clone(),
        });
    }
}

impl OutputSink for MemorySink {
    fn on_day(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.push(OutputKind::Daily, ctx, state);
        Ok(())
    }

    fn on_month(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.push(OutputKind::Monthly, ctx, state);
        Ok(())
    }

    fn on_year(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.push(OutputKind::Yearly, ctx, state);
        Ok(())
    }

    fn on_region_year(
        &mut self,
        ctx: &OutputContext,
        state: &StateSnapshot,
    ) -> Result<(), SinkError> {
        self.push(OutputKind::Region, ctx, state);
        Ok(())
    }

    fn on_restart(&mut self, ctx: &OutputContext, state: &StateSnapshot) -> Result<(), SinkError> {
        self.push(OutputKind::Restart, ctx, state);
        Ok(())
    }
}
