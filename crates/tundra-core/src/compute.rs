//! The compute-core seam and a reference bucket model.
//!
//! The physical and biogeochemical integration is not part of this crate.
//! [`ComputeCore`] is the capability surface the scheduler drives: load a
//! cohort, switch modules, prepare a year of driving data, advance a month,
//! and expose the current state as a [`StateSnapshot`].
//!
//! [`BucketCore`] is a deterministic stand-in that moves water and carbon
//! through a handful of pools. It is not a land-surface model; it exists so
//! the orchestration layer can be run end to end.

use std::collections::BTreeMap;

use serde::Serialize;
use tundra_types::{
    ClimateRecord, Co2Series, CohortId, DrainageRecord, FireEvent, FireEventRecord, GridFireRecord,
    GridRecord, MONTHS_PER_YEAR, ModuleSet, MonthlyClimate, RestartRecord, SoilRecord,
    VegetationRecord,
};

use crate::stage::DrivingWindow;

/// Errors reported by a compute core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The year's driving inputs could not be assembled.
    #[error("driving data unavailable: {reason}")]
    DrivingData {
        /// What was missing.
        reason: String,
    },

    /// A month step failed.
    #[error("integration failed: {reason}")]
    Integration {
        /// What went wrong.
        reason: String,
    },
}

/// Named numeric state assembled by the compute core.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StateSnapshot {
    values: BTreeMap<String, f64>,
}

impl StateSnapshot {
    /// An empty snapshot.
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Add a value, replacing any previous one with the same name.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_owned(), value);
        self
    }

    /// Value of a variable.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot has no variables.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keep only the named variables. Names the snapshot lacks are skipped.
    #[must_use]
    pub fn select(&self, names: &[String]) -> Self {
        let values = names
            .iter()
            .filter_map(|name| Some((name.clone(), self.get(name)?)))
            .collect();
        Self { values }
    }
}

/// The records one cohort run reads, borrowed from the catalog.
///
/// Grid and climate are always present; the cross-reference pass refuses
/// to run a cohort without them. The rest are `None` when their link was
/// missing (or, for restart, when the snapshot is unusable).
#[derive(Debug, Clone, Copy)]
pub struct CohortInputs<'a> {
    /// Cohort being run.
    pub chtid: CohortId,
    /// Grid cell.
    pub grid: &'a GridRecord,
    /// Drainage class.
    pub drainage: Option<&'a DrainageRecord>,
    /// Soil texture.
    pub soil: Option<&'a SoilRecord>,
    /// Grid fire statistics.
    pub grid_fire: Option<&'a GridFireRecord>,
    /// Climate series.
    pub climate: &'a ClimateRecord,
    /// Vegetation history.
    pub vegetation: Option<&'a VegetationRecord>,
    /// Fire history.
    pub fire: Option<&'a FireEventRecord>,
    /// Initial-state snapshot.
    pub restart: Option<&'a RestartRecord>,
    /// Region CO2 series.
    pub co2: Option<&'a Co2Series>,
}

impl CohortInputs<'_> {
    /// Fire-return interval of the cohort's grid.
    pub fn fire_return_interval(&self) -> Option<i32> {
        self.grid_fire
            .map(|g| g.fire_return_interval)
            .filter(|&fri| fri > 0)
    }
}

/// The compute capability driven by the stage scheduler.
///
/// One instance simulates one cohort; the coordinator creates a fresh core
/// for every cohort so no state leaks between them.
pub trait ComputeCore {
    /// Initialize parameters and state from a cohort's records.
    fn load_cohort(&mut self, inputs: &CohortInputs<'_>) -> Result<(), CoreError>;

    /// Enable or disable process modules.
    fn set_modules(&mut self, modules: ModuleSet);

    /// Reset the years-since-disturbance counter.
    fn set_years_since_disturbance(&mut self, years: u32);

    /// Assemble driving inputs for the year described by `window`.
    fn prepare_driving_data(&mut self, window: &DrivingWindow) -> Result<(), CoreError>;

    /// Integrate one month.
    fn advance_one_month(
        &mut self,
        year_index: usize,
        month: usize,
        days_in_month: u32,
    ) -> Result<(), CoreError>;

    /// Current state.
    fn snapshot(&self) -> StateSnapshot;

    /// State at the end of a day of the last integrated month, if the core
    /// keeps daily values.
    fn day_snapshot(&self, _day: usize) -> Option<StateSnapshot> {
        None
    }
}

// ---------------------------------------------------------------------------
// Reference bucket core
// ---------------------------------------------------------------------------

const FIELD_CAPACITY: f64 = 200.0;
const PREINDUSTRIAL_CO2: f64 = 280.0;
const FIRE_MONTH: usize = 6;

/// End-of-day pool values kept for daily output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct DayState {
    soil_water: f64,
    snowpack: f64,
    vegetation_carbon: f64,
    soil_carbon: f64,
}

/// Deterministic water-and-carbon bucket model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketCore {
    climate: Option<ClimateRecord>,
    vegetation: Option<VegetationRecord>,
    fires: Vec<FireEvent>,
    fire_return_interval: Option<i32>,
    drainage_type: i32,
    modules: Option<ModuleSet>,
    year: [MonthlyClimate; MONTHS_PER_YEAR],
    co2_series: Option<Co2Series>,
    co2: f64,
    community_type: i32,
    burn_month: Option<(usize, f64)>,
    years_since_disturbance: u32,
    months: u32,
    pools: DayState,
    days: Vec<DayState>,
}

impl BucketCore {
    /// A core with empty pools and no cohort loaded.
    pub fn new() -> Self {
        Self::default()
    }

    fn modules(&self) -> ModuleSet {
        self.modules.unwrap_or_else(ModuleSet::full)
    }

    fn step_day(&mut self, climate: &MonthlyClimate, days: f64, bgc: bool) {
        let tair = climate.air_temperature;
        let warm = tair.max(0.0);
        let rain = climate.precipitation / days;
        let p = &mut self.pools;

        if tair <= 0.0 {
            p.snowpack += rain;
        } else {
            let melt = p.snowpack.min(2.0 * tair);
            p.snowpack -= melt;
            p.soil_water += rain + melt;
        }
        let et = (p.soil_water * 0.002 * warm).min(p.soil_water);
        p.soil_water -= et;
        let capacity = if self.drainage_type == 0 {
            FIELD_CAPACITY
        } else {
            FIELD_CAPACITY * 1.5
        };
        p.soil_water = p.soil_water.min(capacity);

        if bgc {
            let co2_factor = 1.0 + 0.1 * (self.co2 / PREINDUSTRIAL_CO2).ln();
            let veg_factor = 1.0 + 0.05 * f64::from(self.community_type);
            let moisture = p.soil_water / (p.soil_water + 50.0);
            let gpp = 0.02 * warm * moisture * co2_factor * veg_factor;
            let litter = p.vegetation_carbon * 0.0005;
            p.vegetation_carbon += gpp - litter;
            let respiration = p.soil_carbon * 0.0001 * (1.0 + 0.07 * tair).max(0.0);
            p.soil_carbon += litter - respiration;
        }
    }

    fn seed_from_restart(&mut self, restart: &RestartRecord) {
        let first = |name: &str| {
            restart
                .state
                .get(name)
                .and_then(|v| v.first())
                .copied()
        };
        if let Some(v) = first("SOILWATER") {
            self.pools.soil_water = v;
        }
        if let Some(v) = first("SNOWPACK") {
            self.pools.snowpack = v;
        }
        if let Some(v) = first("VEGC") {
            self.pools.vegetation_carbon = v;
        }
        if let Some(v) = first("SOILC") {
            self.pools.soil_carbon = v;
        }
    }

    fn snapshot_of(&self, day: DayState) -> StateSnapshot {
        StateSnapshot::new()
            .with("soil_water", day.soil_water)
            .with("snowpack", day.snowpack)
            .with("vegetation_carbon", day.vegetation_carbon)
            .with("soil_carbon", day.soil_carbon)
            .with("co2", self.co2)
            .with("community_type", f64::from(self.community_type))
            .with(
                "years_since_disturbance",
                f64::from(self.years_since_disturbance),
            )
            .with("months", f64::from(self.months))
    }
}

impl ComputeCore for BucketCore {
    fn load_cohort(&mut self, inputs: &CohortInputs<'_>) -> Result<(), CoreError> {
        *self = Self {
            climate: Some(inputs.climate.clone()),
            vegetation: inputs.vegetation.cloned(),
            fires: inputs.fire.map(|f| f.events.clone()).unwrap_or_default(),
            fire_return_interval: inputs.fire_return_interval(),
            drainage_type: inputs.drainage.map_or(0, |d| d.drainage_type),
            co2_series: inputs.co2.cloned(),
            co2: PREINDUSTRIAL_CO2,
            pools: DayState {
                soil_water: 100.0,
                snowpack: 0.0,
                vegetation_carbon: 500.0,
                soil_carbon: 5000.0,
            },
            ..Self::default()
        };
        if let Some(restart) = inputs.restart {
            self.seed_from_restart(restart);
        }
        Ok(())
    }

    fn set_modules(&mut self, modules: ModuleSet) {
        self.modules = Some(modules);
    }

    fn set_years_since_disturbance(&mut self, years: u32) {
        self.years_since_disturbance = years;
    }

    fn prepare_driving_data(&mut self, window: &DrivingWindow) -> Result<(), CoreError> {
        let climate = self.climate.as_ref().ok_or_else(|| CoreError::DrivingData {
            reason: "no cohort loaded".to_owned(),
        })?;
        for (month, slot) in self.year.iter_mut().enumerate() {
            let value = if window.change_climate {
                climate.month(window.data_index, month)
            } else {
                climate.normal_month(month, window.horizon)
            };
            *slot = value.ok_or_else(|| CoreError::DrivingData {
                reason: format!(
                    "climate year {} month {month} not in a {}-year series",
                    window.data_index,
                    climate.available_years()
                ),
            })?;
        }

        let series = self.co2_series.as_ref();
        self.co2 = if window.change_co2 {
            series.and_then(|s| s.at_year(window.calendar_year))
        } else {
            series.and_then(Co2Series::initial)
        }
        .unwrap_or(PREINDUSTRIAL_CO2);

        if let Some(community) = self
            .vegetation
            .as_ref()
            .and_then(|v| v.community_type_for(window.calendar_year))
        {
            self.community_type = community;
        }

        self.burn_month = None;
        if self.modules().disturbance {
            if window.fire_from_interval {
                let due = self.fire_return_interval.is_some_and(|fri| {
                    u32::try_from(fri).is_ok_and(|fri| self.years_since_disturbance >= fri)
                });
                if due {
                    self.burn_month = Some((FIRE_MONTH, 0.5));
                }
            } else if let Some(fire) = self
                .fires
                .iter()
                .find(|f| f.year == window.calendar_year)
            {
                let severity = fire
                    .severity
                    .map_or(0.5, |s| 0.2 * f64::from(s.clamp(0, 4).saturating_add(1)));
                self.burn_month = Some((FIRE_MONTH, severity.min(1.0)));
            }
        }
        Ok(())
    }

    fn advance_one_month(
        &mut self,
        _year_index: usize,
        month: usize,
        days_in_month: u32,
    ) -> Result<(), CoreError> {
        let climate = *self.year.get(month).ok_or_else(|| CoreError::Integration {
            reason: format!("month index {month} out of range"),
        })?;
        if days_in_month == 0 {
            return Err(CoreError::Integration {
                reason: format!("month {month} has no days"),
            });
        }
        let modules = self.modules();
        let days = f64::from(days_in_month);

        self.days.clear();
        for _ in 0..days_in_month {
            if modules.env {
                self.step_day(&climate, days, modules.bgc);
            }
            self.days.push(self.pools);
        }

        if let Some((burn_month, fraction)) = self.burn_month
            && burn_month == month
        {
            let burned = self.pools.vegetation_carbon * fraction;
            self.pools.vegetation_carbon -= burned;
            self.pools.soil_carbon += burned * 0.3;
            self.years_since_disturbance = 0;
            self.burn_month = None;
        }

        if month.checked_add(1) == Some(MONTHS_PER_YEAR) {
            self.years_since_disturbance = self.years_since_disturbance.saturating_add(1);
        }
        self.months = self.months.saturating_add(1);
        Ok(())
    }

    fn snapshot(&self) -> StateSnapshot {
        self.snapshot_of(self.pools)
    }

    fn day_snapshot(&self, day: usize) -> Option<StateSnapshot> {
        self.days.get(day).map(|d| self.snapshot_of(*d))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tundra_types::{ClimateId, DrainageId, GridFireId, GridId, SoilId, Stage};

    use super::*;
    use crate::config::{StageConfig, TundraConfig};
    use crate::stage::plan_stage;

    fn grid() -> GridRecord {
        GridRecord {
            grid_id: GridId(1),
            lat: 65.0,
            lon: -147.0,
            drainage_id: DrainageId(1),
            soil_id: SoilId(1),
            grid_fire_id: GridFireId(1),
        }
    }

    fn climate(years: usize) -> ClimateRecord {
        let temps = [-20.0, -15.0, -8.0, 0.0, 8.0, 14.0, 16.0, 13.0, 6.0, -3.0, -12.0, -18.0];
        ClimateRecord {
            climate_id: ClimateId(1),
            air_temperature: vec![temps; years],
            precipitation: vec![[30.0; MONTHS_PER_YEAR]; years],
            net_irradiance: vec![[100.0; MONTHS_PER_YEAR]; years],
            vapour_pressure: vec![[5.0; MONTHS_PER_YEAR]; years],
        }
    }

    fn inputs<'a>(grid: &'a GridRecord, climate: &'a ClimateRecord) -> CohortInputs<'a> {
        CohortInputs {
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
        }
    }

    fn transient_window(years: usize, stage_year: usize) -> DrivingWindow {
        let mut config = TundraConfig::default();
        config.run.site_cohort = Some(CohortId(1));
        let config = StageConfig::from_config(&config).unwrap();
        let pass = plan_stage(Stage::Transient, &config, None, years)
            .into_iter()
            .next()
            .unwrap();
        DrivingWindow::for_year(&pass, 0, stage_year, 1901).unwrap()
    }

    fn run_year(core: &mut BucketCore, window: &DrivingWindow) {
        core.prepare_driving_data(window).unwrap();
        for month in 0..MONTHS_PER_YEAR {
            let days = crate::clock::days_in_month(month).unwrap();
            core.advance_one_month(0, month, days).unwrap();
        }
    }

    #[test]
    fn identical_inputs_give_identical_state() {
        let (g, c) = (grid(), climate(3));
        let window = transient_window(3, 1);
        let mut a = BucketCore::new();
        let mut b = BucketCore::new();
        a.load_cohort(&inputs(&g, &c)).unwrap();
        b.load_cohort(&inputs(&g, &c)).unwrap();
        run_year(&mut a, &window);
        run_year(&mut b, &window);
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.snapshot().get("months"), Some(12.0));
    }

    #[test]
    fn daily_snapshots_cover_the_last_month() {
        let (g, c) = (grid(), climate(1));
        let mut core = BucketCore::new();
        core.load_cohort(&inputs(&g, &c)).unwrap();
        core.prepare_driving_data(&transient_window(1, 0)).unwrap();
        core.advance_one_month(0, 1, 28).unwrap();
        assert!(core.day_snapshot(27).is_some());
        assert!(core.day_snapshot(28).is_none());
        assert_eq!(core.day_snapshot(27), Some(core.snapshot()));
    }

    #[test]
    fn missing_driving_year_is_reported() {
        let (g, c) = (grid(), climate(0));
        let mut core = BucketCore::new();
        core.load_cohort(&inputs(&g, &c)).unwrap();
        let window = DrivingWindow {
            year_index: 0,
            stage_year_index: 0,
            data_index: 0,
            horizon: 1,
            calendar_year: 1901,
            change_climate: true,
            change_co2: false,
            fire_from_interval: false,
        };
        assert!(matches!(
            core.prepare_driving_data(&window),
            Err(CoreError::DrivingData { .. })
        ));
    }

    #[test]
    fn co2_follows_the_series_only_when_changing() {
        let (g, c) = (grid(), climate(3));
        let series = Co2Series {
            years: vec![1901, 1902],
            concentrations: vec![296.0, 300.0],
        };
        let mut cohort = inputs(&g, &c);
        cohort.co2 = Some(&series);
        let mut core = BucketCore::new();
        core.load_cohort(&cohort).unwrap();

        let mut window = transient_window(3, 1);
        window.calendar_year = 1950;
        core.prepare_driving_data(&window).unwrap();
        assert_eq!(core.snapshot().get("co2"), Some(300.0));

        window.change_co2 = false;
        core.prepare_driving_data(&window).unwrap();
        assert_eq!(core.snapshot().get("co2"), Some(296.0));

        core.load_cohort(&inputs(&g, &c)).unwrap();
        core.prepare_driving_data(&transient_window(3, 1)).unwrap();
        assert_eq!(core.snapshot().get("co2"), Some(PREINDUSTRIAL_CO2));
    }

    #[test]
    fn select_keeps_listed_variables() {
        let state = StateSnapshot::new().with("a", 1.0).with("b", 2.0);
        let picked = state.select(&["b".to_owned(), "missing".to_owned()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked.get("b"), Some(2.0));
        assert!(state.select(&[]).is_empty());
    }

    #[test]
    fn restart_state_seeds_pools() {
        let (g, c) = (grid(), climate(1));
        let mut state = BTreeMap::new();
        state.insert("VEGC".to_owned(), vec![42.0]);
        let restart = RestartRecord {
            init_id: tundra_types::InitId(1),
            error_code: 0,
            state,
        };
        let mut cohort = inputs(&g, &c);
        cohort.restart = Some(&restart);
        let mut core = BucketCore::new();
        core.load_cohort(&cohort).unwrap();
        assert_eq!(core.snapshot().get("vegetation_carbon"), Some(42.0));
    }

    #[test]
    fn interval_fire_resets_years_since_disturbance() {
        let (g, c) = (grid(), climate(1));
        let gfire = GridFireRecord {
            grid_fire_id: GridFireId(1),
            fire_return_interval: 3,
            season_probability: Vec::new(),
            size_probability: Vec::new(),
        };
        let mut cohort = inputs(&g, &c);
        cohort.grid_fire = Some(&gfire);
        let mut core = BucketCore::new();
        core.load_cohort(&cohort).unwrap();
        core.set_modules(ModuleSet::full());
        core.set_years_since_disturbance(0);

        let mut window = transient_window(1, 0);
        window.fire_from_interval = true;
        for _ in 0..3 {
            run_year(&mut core, &window);
        }
        assert_eq!(core.snapshot().get("years_since_disturbance"), Some(3.0));
        run_year(&mut core, &window);
        // burned in month 6, then one year-end increment
        assert_eq!(core.snapshot().get("years_since_disturbance"), Some(1.0));
    }
}
