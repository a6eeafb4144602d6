//! Record payloads for each input dataset.
//!
//! Records are created once when a dataset is loaded and never mutated
//! afterward. Foreign keys are carried as typed ids; they are resolved
//! to record numbers by the cross-reference pass, not stored here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{
    ClimateId, CohortId, DrainageId, FireId, GridFireId, GridId, InitId, SoilId, VegetationId,
};

/// Months in a simulated year.
pub const MONTHS_PER_YEAR: usize = 12;

/// A geo-referenced grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    /// Grid-cell identifier.
    pub grid_id: GridId,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Drainage-class foreign key.
    pub drainage_id: DrainageId,
    /// Soil-texture foreign key.
    pub soil_id: SoilId,
    /// Grid fire-statistics foreign key.
    pub grid_fire_id: GridFireId,
}

/// A drainage class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainageRecord {
    /// Record identifier.
    pub drainage_id: DrainageId,
    /// Drainage type code (0 = well drained, 1 = poorly drained).
    pub drainage_type: i32,
}

/// Top and bottom mineral soil texture classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoilRecord {
    /// Record identifier.
    pub soil_id: SoilId,
    /// Texture class of the top mineral layers.
    pub top_soil: i32,
    /// Texture class of the bottom mineral layers.
    pub bottom_soil: i32,
}

/// Fire regime statistics for a grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFireRecord {
    /// Record identifier.
    pub grid_fire_id: GridFireId,
    /// Fire-return interval in years.
    pub fire_return_interval: i32,
    /// Probability of a fire falling in each season.
    pub season_probability: Vec<f64>,
    /// Probability of each fire-size class.
    pub size_probability: Vec<f64>,
}

/// A cohort and its foreign keys into the other datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortRecord {
    /// Cohort identifier.
    pub chtid: CohortId,
    /// Initial-state (restart) foreign key.
    pub init_id: InitId,
    /// Grid-cell foreign key. Many cohorts may share a grid.
    pub grid_id: GridId,
    /// Climate foreign key.
    pub climate_id: ClimateId,
    /// Vegetation foreign key.
    pub vegetation_id: VegetationId,
    /// Fire-event foreign key.
    pub fire_id: FireId,
}

/// One month of climate driving values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyClimate {
    /// Mean air temperature (degC).
    pub air_temperature: f64,
    /// Total precipitation (mm/month).
    pub precipitation: f64,
    /// Net incoming shortwave radiation (W/m2).
    pub net_irradiance: f64,
    /// Vapour pressure (hPa).
    pub vapour_pressure: f64,
}

/// Multi-year monthly climate series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRecord {
    /// Record identifier.
    pub climate_id: ClimateId,
    /// Air temperature, `[year][month]`.
    pub air_temperature: Vec<[f64; MONTHS_PER_YEAR]>,
    /// Precipitation, `[year][month]`.
    pub precipitation: Vec<[f64; MONTHS_PER_YEAR]>,
    /// Net irradiance, `[year][month]`.
    pub net_irradiance: Vec<[f64; MONTHS_PER_YEAR]>,
    /// Vapour pressure, `[year][month]`.
    pub vapour_pressure: Vec<[f64; MONTHS_PER_YEAR]>,
}

impl ClimateRecord {
    /// Number of driving years present in every variable.
    pub fn available_years(&self) -> usize {
        self.air_temperature
            .len()
            .min(self.precipitation.len())
            .min(self.net_irradiance.len())
            .min(self.vapour_pressure.len())
    }

    /// Driving values for one month of one data year.
    pub fn month(&self, year: usize, month: usize) -> Option<MonthlyClimate> {
        Some(MonthlyClimate {
            air_temperature: *self.air_temperature.get(year)?.get(month)?,
            precipitation: *self.precipitation.get(year)?.get(month)?,
            net_irradiance: *self.net_irradiance.get(year)?.get(month)?,
            vapour_pressure: *self.vapour_pressure.get(year)?.get(month)?,
        })
    }

    /// Mean of one calendar month over the first `years` data years.
    ///
    /// Returns `None` when `years` is zero or exceeds the series.
    #[allow(clippy::cast_precision_loss)]
    pub fn normal_month(&self, month: usize, years: usize) -> Option<MonthlyClimate> {
        if years == 0 || years > self.available_years() {
            return None;
        }
        let mut sum = MonthlyClimate {
            air_temperature: 0.0,
            precipitation: 0.0,
            net_irradiance: 0.0,
            vapour_pressure: 0.0,
        };
        for year in 0..years {
            let m = self.month(year, month)?;
            sum.air_temperature += m.air_temperature;
            sum.precipitation += m.precipitation;
            sum.net_irradiance += m.net_irradiance;
            sum.vapour_pressure += m.vapour_pressure;
        }
        let n = years as f64;
        Some(MonthlyClimate {
            air_temperature: sum.air_temperature / n,
            precipitation: sum.precipitation / n,
            net_irradiance: sum.net_irradiance / n,
            vapour_pressure: sum.vapour_pressure / n,
        })
    }
}

/// One vegetation epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationEpoch {
    /// Calendar year the epoch begins.
    pub start_year: i32,
    /// Community type code.
    pub community_type: i32,
    /// Fractional cover of the community.
    pub fraction: f64,
}

/// Vegetation community history for a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationRecord {
    /// Record identifier.
    pub vegetation_id: VegetationId,
    /// Epochs in the order stored in the dataset.
    pub epochs: Vec<VegetationEpoch>,
}

impl VegetationRecord {
    /// Community type in effect for `year`.
    ///
    /// The first epoch is the default; any later epoch whose start year is
    /// not after `year` replaces it.
    pub fn community_type_for(&self, year: i32) -> Option<i32> {
        let (first, rest) = self.epochs.split_first()?;
        let mut current = first.community_type;
        for epoch in rest {
            if year >= epoch.start_year {
                current = epoch.community_type;
            }
        }
        Some(current)
    }
}

/// A single historical fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireEvent {
    /// Calendar year of the fire.
    pub year: i32,
    /// Season code of the fire.
    pub season: i32,
    /// Burned area.
    pub size: f64,
    /// Severity class, when severity data is in use.
    pub severity: Option<i32>,
}

/// Fire-event history for a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireEventRecord {
    /// Record identifier.
    pub fire_id: FireId,
    /// Fire events in dataset order.
    pub events: Vec<FireEvent>,
}

/// State snapshot from a previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartRecord {
    /// Cohort id of the run that produced the snapshot.
    pub init_id: InitId,
    /// Non-zero when the producing run flagged the snapshot as unusable.
    pub error_code: i32,
    /// State-variable arrays by column name.
    pub state: BTreeMap<String, Vec<f64>>,
}

impl RestartRecord {
    /// Whether the snapshot can seed a new run.
    pub const fn is_usable(&self) -> bool {
        self.error_code == 0
    }
}

/// Region-wide atmospheric CO2, one value per calendar year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Co2Series {
    /// Calendar years, ascending.
    pub years: Vec<i32>,
    /// Concentration (ppmv) for each entry of `years`.
    pub concentrations: Vec<f64>,
}

impl Co2Series {
    /// Concentration of the first year in the series.
    pub fn initial(&self) -> Option<f64> {
        self.concentrations.first().copied()
    }

    /// Concentration for `year`.
    ///
    /// Years before the series use the first value; years after it reuse
    /// the last.
    pub fn at_year(&self, year: i32) -> Option<f64> {
        let after = self.years.partition_point(|&y| y <= year);
        self.concentrations.get(after.saturating_sub(1)).copied()
    }
}
