//! Integration tests for the Tundra batch runner.
//!
//! Every test drives the full coordinator (catalog, cross-reference pass,
//! stage scheduler, output routing) over small in-memory datasets, except
//! `demo_inputs_run_end_to_end`, which reads the JSON files under
//! `demos/site/`.

#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::path::Path;
use std::sync::Arc;

use tundra_catalog::{JsonDirectory, MemorySource};
use tundra_core::compute::{BucketCore, CohortInputs, ComputeCore, CoreError, StateSnapshot};
use tundra_core::config::{RunMode, StageConfig, TundraConfig, YearRange};
use tundra_core::clock::days_in_month;
use tundra_core::output::{MemorySink, NoOpSink, OutputKind};
use tundra_core::resolver::{CrossReferenceResolver, LinkIssue, LinkWarning};
use tundra_core::stage::DrivingWindow;
use tundra_core::{
    CohortError, CohortFailure, CohortOutcome, RunControl, RunCoordinator, RunList,
    StageScheduler, prepare_run,
};
use tundra_types::{CohortId, DatasetKind, ModuleSet, Stage};

// =============================================================================
// Fixtures
// =============================================================================

/// Three cohorts; cohort 2 points at a grid that does not exist.
fn source() -> MemorySource {
    let mut s = MemorySource::new();
    s.insert_json(
        DatasetKind::Grid,
        r#"{"GRIDID": [1, 2], "LAT": [65.0, 68.0], "LON": [-147.0, -149.0],
            "DRAINAGEID": [1, 2], "SOILID": [1, 1], "GFIREID": [1, 1]}"#,
    )
    .unwrap();
    s.insert_json(
        DatasetKind::Drainage,
        r#"{"DRAINAGEID": [1, 2], "DRAINAGETYPE": [0, 1]}"#,
    )
    .unwrap();
    s.insert_json(DatasetKind::Soil, r#"{"SOILID": [1], "TOPSOIL": [2], "BOTSOIL": [3]}"#)
        .unwrap();
    s.insert_json(
        DatasetKind::GridFire,
        r#"{"GFIREID": [1], "FRI": [4], "PFSEASON": [[0.2, 0.8]], "PFSIZE": [[1.0]]}"#,
    )
    .unwrap();
    s.insert_json(
        DatasetKind::Cohort,
        r#"{"CHTID": [1, 2, 3], "INITCHTID": [1, 2, 3], "GRIDID": [1, 99, 2],
            "CLMID": [1, 1, 2], "VEGID": [1, 1, 1], "FIREID": [1, 1, 1]}"#,
    )
    .unwrap();
    let warm = "[-20.0, -15.0, -5.0, 0.0, 8.0, 15.0, 17.0, 14.0, 6.0, -4.0, -14.0, -19.0]";
    let cold = "[-25.0, -20.0, -12.0, -4.0, 4.0, 11.0, 13.0, 10.0, 2.0, -8.0, -18.0, -23.0]";
    let prec = "[10.0, 9.0, 8.0, 8.0, 14.0, 30.0, 45.0, 40.0, 28.0, 18.0, 14.0, 12.0]";
    s.insert_json(
        DatasetKind::Climate,
        &format!(
            r#"{{"CLMID": [1, 2],
                "TAIR": [[{warm}, {cold}, {warm}], [{cold}, {cold}, {warm}]],
                "PREC": [[{prec}, {prec}, {prec}], [{prec}, {prec}, {prec}]],
                "NIRR": [[{prec}, {prec}, {prec}], [{prec}, {prec}, {prec}]],
                "VAPO": [[{prec}, {prec}, {prec}], [{prec}, {prec}, {prec}]]}}"#
        ),
    )
    .unwrap();
    s.insert_json(
        DatasetKind::Vegetation,
        r#"{"VEGID": [1], "VEGSETYR": [[0, 1903]], "VEGTYPE": [[4, 5]], "VEGFRAC": [[1.0, 1.0]]}"#,
    )
    .unwrap();
    s.insert_json(
        DatasetKind::Fire,
        r#"{"FIREID": [1], "FIREYEAR": [[1902]], "FIRESEASON": [[2]], "FIRESIZE": [[10.0]]}"#,
    )
    .unwrap();
    s.insert_json(DatasetKind::RunList, r#"{"CHTID": [1, 2, 3]}"#)
        .unwrap();
    s
}

/// Short stages so a full four-stage run is a few dozen years.
fn short_config(mode: RunMode) -> TundraConfig {
    let mut config = TundraConfig::default();
    config.run.mode = mode;
    config.run.site_cohort = Some(CohortId(1));
    config.inputs.run_list_file = Some("runlist.json".into());
    config.time.spinup = YearRange::new(1001, 1003);
    config.time.transient = YearRange::new(1901, 1904);
    config.time.scenario = YearRange::new(2007, 2008);
    config.time.min_equilibrium_years = 10;
    config.time.max_equilibrium_years = 100;
    config.time.prepass_end_year = 2;
    config.output.monthly = true;
    config
}

fn run_list(ids: &[i32]) -> RunList {
    RunList::from_ids(ids.iter().copied().map(CohortId).collect()).unwrap()
}

/// Bucket core that requests a stop while integrating its `stop_at`-th
/// month.
struct StopDuringMonth {
    inner: BucketCore,
    control: Arc<RunControl>,
    stop_at: u32,
    months: u32,
}

impl ComputeCore for StopDuringMonth {
    fn load_cohort(&mut self, inputs: &CohortInputs<'_>) -> Result<(), CoreError> {
        self.inner.load_cohort(inputs)
    }

    fn set_modules(&mut self, modules: ModuleSet) {
        self.inner.set_modules(modules);
    }

    fn set_years_since_disturbance(&mut self, years: u32) {
        self.inner.set_years_since_disturbance(years);
    }

    fn prepare_driving_data(&mut self, window: &DrivingWindow) -> Result<(), CoreError> {
        self.inner.prepare_driving_data(window)
    }

    fn advance_one_month(
        &mut self,
        year_index: usize,
        month: usize,
        days_in_month: u32,
    ) -> Result<(), CoreError> {
        self.months = self.months.saturating_add(1);
        if self.months == self.stop_at {
            self.control.request_stop();
        }
        self.inner.advance_one_month(year_index, month, days_in_month)
    }

    fn snapshot(&self) -> StateSnapshot {
        self.inner.snapshot()
    }
}

/// Bucket core that records every driving window it is handed.
#[derive(Default)]
struct RecordingCore {
    inner: BucketCore,
    windows: Vec<DrivingWindow>,
}

impl ComputeCore for RecordingCore {
    fn load_cohort(&mut self, inputs: &CohortInputs<'_>) -> Result<(), CoreError> {
        self.inner.load_cohort(inputs)
    }

    fn set_modules(&mut self, modules: ModuleSet) {
        self.inner.set_modules(modules);
    }

    fn set_years_since_disturbance(&mut self, years: u32) {
        self.inner.set_years_since_disturbance(years);
    }

    fn prepare_driving_data(&mut self, window: &DrivingWindow) -> Result<(), CoreError> {
        self.windows.push(*window);
        self.inner.prepare_driving_data(window)
    }

    fn advance_one_month(
        &mut self,
        year_index: usize,
        month: usize,
        days_in_month: u32,
    ) -> Result<(), CoreError> {
        self.inner.advance_one_month(year_index, month, days_in_month)
    }

    fn snapshot(&self) -> StateSnapshot {
        self.inner.snapshot()
    }
}

/// Bucket core whose `fail_at`-th month step fails.
struct FailAtMonth {
    inner: BucketCore,
    fail_at: Option<u32>,
    months: u32,
}

impl ComputeCore for FailAtMonth {
    fn load_cohort(&mut self, inputs: &CohortInputs<'_>) -> Result<(), CoreError> {
        self.inner.load_cohort(inputs)
    }

    fn set_modules(&mut self, modules: ModuleSet) {
        self.inner.set_modules(modules);
    }

    fn set_years_since_disturbance(&mut self, years: u32) {
        self.inner.set_years_since_disturbance(years);
    }

    fn prepare_driving_data(&mut self, window: &DrivingWindow) -> Result<(), CoreError> {
        self.inner.prepare_driving_data(window)
    }

    fn advance_one_month(
        &mut self,
        year_index: usize,
        month: usize,
        days_in_month: u32,
    ) -> Result<(), CoreError> {
        self.months += 1;
        if self.fail_at == Some(self.months) {
            return Err(CoreError::Integration {
                reason: "injected".to_owned(),
            });
        }
        self.inner.advance_one_month(year_index, month, days_in_month)
    }

    fn snapshot(&self) -> StateSnapshot {
        self.inner.snapshot()
    }
}

// =============================================================================
// Failure isolation
// =============================================================================

#[test]
fn failed_cohort_does_not_disturb_its_neighbours() {
    let prepared = prepare_run(&short_config(RunMode::Regional), &source()).unwrap();
    assert_eq!(prepared.run_list.ids(), &[CohortId(1), CohortId(2), CohortId(3)]);

    let mut full_sink = MemorySink::new();
    let report = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut full_sink)
    .unwrap();

    let outcomes = report.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], &CohortOutcome::Completed);
    assert_eq!(
        outcomes[1],
        &CohortOutcome::Failed(CohortFailure::MissingRequiredLink {
            dataset: DatasetKind::Grid
        })
    );
    assert_eq!(outcomes[2], &CohortOutcome::Completed);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);
    assert!(full_sink.for_cohort(CohortId(2)).is_empty());
    assert_eq!(report.cohorts[1].months, 0);
    assert!(report.cohorts[1].checkpoint.is_none());

    let mut pair_sink = MemorySink::new();
    RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&run_list(&[1, 3]), BucketCore::new, &mut pair_sink)
    .unwrap();

    for chtid in [CohortId(1), CohortId(3)] {
        let alone = pair_sink.for_cohort(chtid);
        assert!(!alone.is_empty());
        assert_eq!(full_sink.for_cohort(chtid), alone);
    }
}

#[test]
fn regional_run_writes_region_rows_only() {
    let prepared = prepare_run(&short_config(RunMode::Regional), &source()).unwrap();
    let mut sink = MemorySink::new();
    RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&run_list(&[1]), BucketCore::new, &mut sink)
    .unwrap();

    assert_eq!(sink.of_kind(OutputKind::Monthly).count(), 0);
    assert_eq!(sink.of_kind(OutputKind::Yearly).count(), 0);
    // spinup 3 + transient 4 + scenario 2; equilibrium writes none
    assert_eq!(sink.of_kind(OutputKind::Region).count(), 9);
    assert_eq!(sink.of_kind(OutputKind::Restart).count(), 1);
}

#[test]
fn missing_climate_skips_only_that_cohort() {
    let mut source = source();
    source
        .insert_json(
            DatasetKind::Cohort,
            r#"{"CHTID": [1, 2, 3], "INITCHTID": [1, 2, 3], "GRIDID": [1, 1, 2],
                "CLMID": [1, 42, 2], "VEGID": [1, 1, 1], "FIREID": [1, 1, 1]}"#,
        )
        .unwrap();
    let prepared = prepare_run(&short_config(RunMode::Regional), &source).unwrap();
    let mut sink = MemorySink::new();
    let report = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut sink)
    .unwrap();

    assert_eq!(
        report.outcomes(),
        vec![
            &CohortOutcome::Completed,
            &CohortOutcome::Failed(CohortFailure::MissingRequiredLink {
                dataset: DatasetKind::Climate
            }),
            &CohortOutcome::Completed,
        ]
    );
    assert!(sink.for_cohort(CohortId(2)).is_empty());
    assert_eq!(sink.of_kind(OutputKind::Restart).count(), 2);
}

#[test]
fn missing_optional_links_warn_and_the_run_completes() {
    let mut source = source();
    source
        .insert_json(
            DatasetKind::Grid,
            r#"{"GRIDID": [1, 2], "LAT": [65.0, 68.0], "LON": [-147.0, -149.0],
                "DRAINAGEID": [1, 9], "SOILID": [1, 9], "GFIREID": [1, 9]}"#,
        )
        .unwrap();
    let prepared = prepare_run(&short_config(RunMode::Regional), &source).unwrap();

    let resolution = CrossReferenceResolver::new(&prepared.catalog, false).resolve(&run_list(&[3]));
    let warned: Vec<DatasetKind> = resolution.warnings.iter().map(|w| w.dataset).collect();
    assert_eq!(
        warned,
        vec![DatasetKind::Drainage, DatasetKind::Soil, DatasetKind::GridFire]
    );
    assert!(resolution.warnings.iter().all(|w| *w
        == LinkWarning {
            cohort: CohortId(3),
            dataset: w.dataset,
            issue: LinkIssue::Missing,
        }));

    let mut sink = MemorySink::new();
    let report = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&run_list(&[3]), BucketCore::new, &mut sink)
    .unwrap();
    assert_eq!(report.outcomes(), vec![&CohortOutcome::Completed]);
    // spinup 3 + transient 4 + scenario 2
    assert_eq!(sink.of_kind(OutputKind::Region).count(), 9);
    let state = report.cohorts[0].final_state.as_ref().unwrap();
    assert!(state.get("soil_carbon").is_some_and(f64::is_finite));
}

#[test]
fn core_failure_mid_stage_keeps_partial_progress() {
    let prepared = prepare_run(&short_config(RunMode::Regional), &source()).unwrap();
    let mut made = 0;
    let report = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(
        &run_list(&[1, 3]),
        || {
            made += 1;
            FailAtMonth {
                inner: BucketCore::new(),
                fail_at: (made == 1).then_some(30),
                months: 0,
            }
        },
        &mut NoOpSink,
    )
    .unwrap();

    let failed = &report.cohorts[0];
    assert_eq!(failed.months, 29);
    assert!(failed.final_state.is_none());
    // 29 months done: year index 2, fifth month
    let checkpoint = failed.checkpoint.unwrap();
    assert_eq!(checkpoint.stage, Stage::Equilibrium);
    assert_eq!(checkpoint.month, 4);
    assert_eq!(
        failed.outcome,
        CohortOutcome::Failed(CohortFailure::Core {
            stage: Stage::Equilibrium,
            year: checkpoint.calendar_year,
            reason: "integration failed: injected".to_owned(),
        })
    );
    assert_eq!(report.cohorts[1].outcome, CohortOutcome::Completed);
    assert_eq!(report.failed(), 1);
}

#[test]
fn missing_grid_is_fatal_in_site_mode() {
    let mut config = short_config(RunMode::Site);
    config.run.site_cohort = Some(CohortId(2));
    let prepared = prepare_run(&config, &source()).unwrap();
    let result = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut NoOpSink);
    assert!(matches!(
        result,
        Err(tundra_core::BatchError::SiteCohortFailed {
            cohort: CohortId(2),
            source: CohortError::MissingRequiredLink {
                dataset: DatasetKind::Grid,
                ..
            },
        })
    ));
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn stop_mid_month_reports_last_completed_month() {
    let prepared = prepare_run(&short_config(RunMode::Site), &source()).unwrap();

    let mut reference = MemorySink::new();
    RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut reference)
    .unwrap();

    let stop_at = 40;
    let control = Arc::new(RunControl::new());
    let core_control = Arc::clone(&control);
    let mut sink = MemorySink::new();
    let report = RunCoordinator::new(&prepared.catalog, &prepared.config, control)
        .run_batch(
            &prepared.run_list,
            || StopDuringMonth {
                inner: BucketCore::new(),
                control: Arc::clone(&core_control),
                stop_at,
                months: 0,
            },
            &mut sink,
        )
        .unwrap();

    let cohort = &report.cohorts[0];
    assert_eq!(cohort.outcome, CohortOutcome::Cancelled);
    assert_eq!(cohort.months, u64::from(stop_at));

    let expected = reference
        .of_kind(OutputKind::Monthly)
        .nth(usize::try_from(stop_at).unwrap() - 1)
        .unwrap();
    assert_eq!(cohort.final_state.as_ref(), Some(&expected.state));
    let checkpoint = cohort.checkpoint.unwrap();
    assert_eq!(checkpoint.stage, expected.context.stage);
    assert_eq!(checkpoint.calendar_year, expected.context.calendar_year);
    assert_eq!(Some(checkpoint.month), expected.context.month);

    assert_eq!(sink.of_kind(OutputKind::Monthly).count(), 40);
    assert_eq!(sink.of_kind(OutputKind::Restart).count(), 0);
}

#[test]
fn stop_marks_remaining_cohorts_cancelled() {
    let prepared = prepare_run(&short_config(RunMode::Regional), &source()).unwrap();
    let control = Arc::new(RunControl::new());
    let core_control = Arc::clone(&control);
    let report = RunCoordinator::new(&prepared.catalog, &prepared.config, control)
        .run_batch(
            &prepared.run_list,
            || StopDuringMonth {
                inner: BucketCore::new(),
                control: Arc::clone(&core_control),
                stop_at: 5,
                months: 0,
            },
            &mut NoOpSink,
        )
        .unwrap();

    assert_eq!(report.cancelled(), 3);
    assert_eq!(report.cohorts[0].months, 5);
    assert!(report.cohorts[0].final_state.is_some());
    assert!(report.cohorts[1].final_state.is_none());
    assert!(report.cohorts[2].checkpoint.is_none());
}

// =============================================================================
// Stage ordering and driving data
// =============================================================================

#[test]
fn stages_run_in_order_and_skip_disabled_ones() {
    let mut config = short_config(RunMode::Site);
    config.run.stages = vec![Stage::Scenario, Stage::Equilibrium, Stage::Transient];
    let prepared = prepare_run(&config, &source()).unwrap();
    let mut sink = MemorySink::new();
    RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut sink)
    .unwrap();

    let mut stages: Vec<Stage> = sink
        .of_kind(OutputKind::Yearly)
        .map(|r| r.context.stage)
        .collect();
    stages.dedup();
    assert_eq!(
        stages,
        vec![Stage::Equilibrium, Stage::Transient, Stage::Scenario]
    );

    let scenario_years: Vec<i32> = sink
        .of_kind(OutputKind::Yearly)
        .filter(|r| r.context.stage == Stage::Scenario)
        .map(|r| r.context.calendar_year)
        .collect();
    assert_eq!(scenario_years, vec![2007, 2008]);
}

#[test]
fn driving_horizon_is_clamped_before_transient() {
    let mut raw = short_config(RunMode::Site);
    raw.run.stages = vec![Stage::Spinup, Stage::Transient];
    raw.time.nominal_horizon = 2;
    let config = StageConfig::from_config(&raw).unwrap();
    let prepared = prepare_run(&raw, &source()).unwrap();
    let catalog = &prepared.catalog;

    let grid = catalog
        .grids()
        .get(catalog.grid_record(tundra_types::GridId(1)).unwrap())
        .unwrap();
    let climate = catalog
        .climates()
        .get(catalog.climate_record(tundra_types::ClimateId(1)).unwrap())
        .unwrap();
    let inputs = CohortInputs {
        chtid: CohortId(1),
        grid,
        drainage: None,
        soil: None,
        grid_fire: None,
        climate,
        vegetation: None,
        fire: None,
        restart: None,
        co2: None,
    };

    let control = RunControl::new();
    let mut core = RecordingCore::default();
    core.load_cohort(&inputs).unwrap();
    StageScheduler::new(&config, &control)
        .run_cohort(&mut core, &inputs, &mut NoOpSink)
        .unwrap();

    let summary: Vec<(usize, usize, i32)> = core
        .windows
        .iter()
        .map(|w| (w.horizon, w.data_index, w.calendar_year))
        .collect();
    assert_eq!(
        summary,
        vec![
            // spinup: min(2, 3 available)
            (2, 0, 1001),
            (2, 1, 1002),
            (2, 0, 1003),
            // transient: every available year
            (3, 0, 1901),
            (3, 1, 1902),
            (3, 2, 1903),
            (3, 0, 1904),
        ]
    );
    assert_eq!(
        core.windows.iter().map(|w| w.year_index).collect::<Vec<_>>(),
        (0..7).collect::<Vec<usize>>()
    );
}

// =============================================================================
// Output routing
// =============================================================================

#[test]
fn daily_output_covers_every_day_of_every_month() {
    let mut config = short_config(RunMode::Site);
    config.run.stages = vec![Stage::Transient];
    config.output.daily = true;
    let prepared = prepare_run(&config, &source()).unwrap();
    let mut sink = MemorySink::new();
    RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut sink)
    .unwrap();

    // transient 1901..=1904
    assert_eq!(sink.of_kind(OutputKind::Daily).count(), 4 * 365);
    assert_eq!(sink.of_kind(OutputKind::Monthly).count(), 4 * 12);
    assert!(
        sink.of_kind(OutputKind::Daily)
            .all(|r| r.context.day.is_some() && r.context.month.is_some())
    );

    for monthly in sink.of_kind(OutputKind::Monthly) {
        let month = monthly.context.month.unwrap();
        let days: Vec<_> = sink
            .of_kind(OutputKind::Daily)
            .filter(|r| {
                r.context.calendar_year == monthly.context.calendar_year
                    && r.context.month == Some(month)
            })
            .collect();
        let numbers: Vec<usize> = days.iter().map(|r| r.context.day.unwrap()).collect();
        let expected = usize::try_from(days_in_month(month).unwrap()).unwrap();
        assert_eq!(numbers, (0..expected).collect::<Vec<_>>());
        let last = days.last().unwrap();
        for pool in ["soil_water", "snowpack"] {
            assert_eq!(last.state.get(pool), monthly.state.get(pool));
        }
    }
}

#[test]
fn co2_dataset_drives_the_core_by_calendar_year() {
    let mut source = source();
    source
        .insert_json(
            DatasetKind::Co2,
            r#"{"YEAR": [1901, 1902, 1903, 1904], "CO2": [300.0, 310.0, 320.0, 330.0]}"#,
        )
        .unwrap();
    let mut config = short_config(RunMode::Regional);
    config.output.region_variables = Some(vec!["co2".to_owned()]);
    let prepared = prepare_run(&config, &source).unwrap();
    let mut sink = MemorySink::new();
    RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&run_list(&[1]), BucketCore::new, &mut sink)
    .unwrap();

    let rows: Vec<(Stage, i32, Option<f64>)> = sink
        .of_kind(OutputKind::Region)
        .map(|r| (r.context.stage, r.context.calendar_year, r.state.get("co2")))
        .collect();
    assert_eq!(
        rows,
        vec![
            // spinup holds the first value
            (Stage::Spinup, 1001, Some(300.0)),
            (Stage::Spinup, 1002, Some(300.0)),
            (Stage::Spinup, 1003, Some(300.0)),
            (Stage::Transient, 1901, Some(300.0)),
            (Stage::Transient, 1902, Some(310.0)),
            (Stage::Transient, 1903, Some(320.0)),
            (Stage::Transient, 1904, Some(330.0)),
            // past the series the last value is reused
            (Stage::Scenario, 2007, Some(330.0)),
            (Stage::Scenario, 2008, Some(330.0)),
        ]
    );
    assert!(sink.of_kind(OutputKind::Region).all(|r| r.state.len() == 1));
}

// =============================================================================
// Run list
// =============================================================================

#[test]
fn repeated_cohort_is_flagged_and_run_twice() {
    let list = run_list(&[3, 1, 3]);
    assert_eq!(list.duplicates(), vec![CohortId(3)]);

    let prepared = prepare_run(&short_config(RunMode::Regional), &source()).unwrap();
    let mut sink = MemorySink::new();
    let report = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&list, BucketCore::new, &mut sink)
    .unwrap();
    assert_eq!(report.completed(), 3);
    assert_eq!(report.cohorts[0].final_state, report.cohorts[2].final_state);
    assert_eq!(sink.of_kind(OutputKind::Restart).count(), 3);
}

#[test]
fn empty_roster_is_rejected() {
    let mut source = source();
    source
        .insert_json(DatasetKind::RunList, r#"{"CHTID": []}"#)
        .unwrap();
    assert!(matches!(
        prepare_run(&short_config(RunMode::Regional), &source),
        Err(tundra_core::BatchError::RunList {
            source: tundra_core::RunListError::EmptyRunList
        })
    ));
}

// =============================================================================
// Demo inputs
// =============================================================================

#[test]
fn demo_inputs_run_end_to_end() {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/site");
    let source = JsonDirectory::new(&demos, &demos).with_run_list_file(demos.join("runlist.json"));
    let config = TundraConfig::parse(
        r"
run:
  mode: regional
  case_name: demo-test
inputs:
  run_list_file: runlist.json
time:
  spinup: { begin: 1001, end: 1010 }
  transient: { begin: 1901, end: 1906 }
  scenario: { begin: 2007, end: 2008 }
  min_equilibrium_years: 100
  max_equilibrium_years: 1000
  prepass_end_year: 5
",
    )
    .unwrap();

    let prepared = prepare_run(&config, &source).unwrap();
    assert_eq!(prepared.run_list.ids(), &[CohortId(1), CohortId(2)]);
    let co2 = prepared.catalog.co2().unwrap();
    let co2_1906 = co2.at_year(1906);
    let mut sink = MemorySink::new();
    let report = RunCoordinator::new(
        &prepared.catalog,
        &prepared.config,
        Arc::new(RunControl::new()),
    )
    .run_batch(&prepared.run_list, BucketCore::new, &mut sink)
    .unwrap();

    assert_eq!(report.completed(), 2);
    for cohort in &report.cohorts {
        let state = cohort.final_state.as_ref().unwrap();
        assert!(state.get("soil_carbon").is_some_and(f64::is_finite));
        assert!(state.get("vegetation_carbon").is_some_and(|c| c >= 0.0));
    }
    // 10 + 6 + 2 region rows per cohort
    assert_eq!(sink.of_kind(OutputKind::Region).count(), 36);
    let row_1906 = sink
        .of_kind(OutputKind::Region)
        .find(|r| r.context.calendar_year == 1906)
        .unwrap();
    assert_eq!(row_1906.state.get("co2"), co2_1906);
}
