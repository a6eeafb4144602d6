//! Decoding of dataset tables into typed records.
//!
//! Each record type declares which dataset it comes from and how to pull
//! its columns out of a [`Table`]. Column layouts:
//!
//! | Dataset         | Columns                                                        |
//! |-----------------|----------------------------------------------------------------|
//! | grid            | `GRIDID`, `LAT`, `LON`, `DRAINAGEID`, `SOILID`, `GFIREID`      |
//! | drainage        | `DRAINAGEID`, `DRAINAGETYPE`                                   |
//! | soiltexture     | `SOILID`, `TOPSOIL`, `BOTSOIL`                                 |
//! | firestatistics  | `GFIREID`, `FRI`, `PFSEASON[rec][k]`, `PFSIZE[rec][k]`         |
//! | cohortid        | `CHTID`, `INITCHTID`, `GRIDID`, `CLMID`, `VEGID`, `FIREID`     |
//! | climate         | `CLMID`, `TAIR`/`PREC`/`NIRR`/`VAPO` as `[rec][year][12]`      |
//! | vegetation      | `VEGID`, `VEGSETYR`/`VEGTYPE`/`VEGFRAC` as `[rec][epoch]`      |
//! | fire            | `FIREID`, `FIREYEAR`/`FIRESEASON`/`FIRESIZE` (+ `FIRESEVERITY`) as `[rec][event]` |
//! | restart         | `CHTID`, optional `ERRCODE`, any other column is state         |
//! | co2             | `YEAR`, `CO2`, one entry per calendar year                     |

use std::collections::BTreeMap;

use serde_json::Value;
use tundra_types::{
    ClimateId, ClimateRecord, Co2Series, CohortId, CohortRecord, DatasetKind, DrainageId,
    DrainageRecord, FireEvent, FireEventRecord, FireId, GridFireId, GridFireRecord, GridId, GridRecord, InitId,
    MONTHS_PER_YEAR, RestartRecord, SoilId, SoilRecord, VegetationEpoch, VegetationId,
    VegetationRecord,
};

use crate::error::CatalogError;
use crate::table::Table;

/// Switches that change which optional columns are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Read `FIRESEVERITY` from the fire dataset.
    pub use_severity: bool,
}

/// A record type that can be decoded from its dataset table.
pub trait Record: Sized {
    /// The dataset this record type is stored in.
    const KIND: DatasetKind;

    /// The raw identifier of this record.
    fn raw_id(&self) -> i32;

    /// Decode every record of a table, in record-number order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] when a column is missing,
    /// mistyped, or does not line up with the id column.
    fn decode(table: &Table, options: &DecodeOptions) -> Result<Vec<Self>, CatalogError>;
}

/// Check that parallel per-record arrays have equal lengths.
fn check_parallel(
    kind: DatasetKind,
    column: &str,
    record: usize,
    expected: usize,
    found: usize,
) -> Result<(), CatalogError> {
    if expected == found {
        Ok(())
    } else {
        Err(CatalogError::schema(
            kind,
            column,
            format!("record {record} has {found} entries, expected {expected}"),
        ))
    }
}

impl Record for GridRecord {
    const KIND: DatasetKind = DatasetKind::Grid;

    fn raw_id(&self) -> i32 {
        self.grid_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let lat: Vec<f64> = table.records("LAT", n)?;
        let lon: Vec<f64> = table.records("LON", n)?;
        let drainage: Vec<i32> = table.records("DRAINAGEID", n)?;
        let soil: Vec<i32> = table.records("SOILID", n)?;
        let gfire: Vec<i32> = table.records("GFIREID", n)?;

        let records = ids
            .into_iter()
            .zip(lat)
            .zip(lon)
            .zip(drainage)
            .zip(soil)
            .zip(gfire)
            .map(|(((((id, lat), lon), drainage), soil), gfire)| Self {
                grid_id: GridId(id),
                lat,
                lon,
                drainage_id: DrainageId(drainage),
                soil_id: SoilId(soil),
                grid_fire_id: GridFireId(gfire),
            })
            .collect();
        Ok(records)
    }
}

impl Record for DrainageRecord {
    const KIND: DatasetKind = DatasetKind::Drainage;

    fn raw_id(&self) -> i32 {
        self.drainage_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let types: Vec<i32> = table.records("DRAINAGETYPE", ids.len())?;
        Ok(ids
            .into_iter()
            .zip(types)
            .map(|(id, drainage_type)| Self {
                drainage_id: DrainageId(id),
                drainage_type,
            })
            .collect())
    }
}

impl Record for SoilRecord {
    const KIND: DatasetKind = DatasetKind::Soil;

    fn raw_id(&self) -> i32 {
        self.soil_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let top: Vec<i32> = table.records("TOPSOIL", n)?;
        let bottom: Vec<i32> = table.records("BOTSOIL", n)?;
        Ok(ids
            .into_iter()
            .zip(top)
            .zip(bottom)
            .map(|((id, top_soil), bottom_soil)| Self {
                soil_id: SoilId(id),
                top_soil,
                bottom_soil,
            })
            .collect())
    }
}

impl Record for GridFireRecord {
    const KIND: DatasetKind = DatasetKind::GridFire;

    fn raw_id(&self) -> i32 {
        self.grid_fire_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let fri: Vec<i32> = table.records("FRI", n)?;
        let season: Vec<Vec<f64>> = table.records("PFSEASON", n)?;
        let size: Vec<Vec<f64>> = table.records("PFSIZE", n)?;
        Ok(ids
            .into_iter()
            .zip(fri)
            .zip(season)
            .zip(size)
            .map(|(((id, fri), season), size)| Self {
                grid_fire_id: GridFireId(id),
                fire_return_interval: fri,
                season_probability: season,
                size_probability: size,
            })
            .collect())
    }
}

impl Record for CohortRecord {
    const KIND: DatasetKind = DatasetKind::Cohort;

    fn raw_id(&self) -> i32 {
        self.chtid.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let init: Vec<i32> = table.records("INITCHTID", n)?;
        let grid: Vec<i32> = table.records("GRIDID", n)?;
        let climate: Vec<i32> = table.records("CLMID", n)?;
        let vegetation: Vec<i32> = table.records("VEGID", n)?;
        let fire: Vec<i32> = table.records("FIREID", n)?;
        Ok(ids
            .into_iter()
            .zip(init)
            .zip(grid)
            .zip(climate)
            .zip(vegetation)
            .zip(fire)
            .map(|(((((id, init), grid), climate), vegetation), fire)| Self {
                chtid: CohortId(id),
                init_id: InitId(init),
                grid_id: GridId(grid),
                climate_id: ClimateId(climate),
                vegetation_id: VegetationId(vegetation),
                fire_id: FireId(fire),
            })
            .collect())
    }
}

impl Record for ClimateRecord {
    const KIND: DatasetKind = DatasetKind::Climate;

    fn raw_id(&self) -> i32 {
        self.climate_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        type Series = Vec<[f64; MONTHS_PER_YEAR]>;
        let ids = table.ids()?;
        let n = ids.len();
        let tair: Vec<Series> = table.records("TAIR", n)?;
        let prec: Vec<Series> = table.records("PREC", n)?;
        let nirr: Vec<Series> = table.records("NIRR", n)?;
        let vapo: Vec<Series> = table.records("VAPO", n)?;

        let mut records = Vec::with_capacity(n);
        for (rec, ((((id, tair), prec), nirr), vapo)) in ids
            .into_iter()
            .zip(tair)
            .zip(prec)
            .zip(nirr)
            .zip(vapo)
            .enumerate()
        {
            let years = tair.len();
            check_parallel(Self::KIND, "PREC", rec, years, prec.len())?;
            check_parallel(Self::KIND, "NIRR", rec, years, nirr.len())?;
            check_parallel(Self::KIND, "VAPO", rec, years, vapo.len())?;
            records.push(Self {
                climate_id: ClimateId(id),
                air_temperature: tair,
                precipitation: prec,
                net_irradiance: nirr,
                vapour_pressure: vapo,
            });
        }
        Ok(records)
    }
}

impl Record for VegetationRecord {
    const KIND: DatasetKind = DatasetKind::Vegetation;

    fn raw_id(&self) -> i32 {
        self.vegetation_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let years: Vec<Vec<i32>> = table.records("VEGSETYR", n)?;
        let types: Vec<Vec<i32>> = table.records("VEGTYPE", n)?;
        let fractions: Vec<Vec<f64>> = table.records("VEGFRAC", n)?;

        let mut records = Vec::with_capacity(n);
        for (rec, (((id, years), types), fractions)) in ids
            .into_iter()
            .zip(years)
            .zip(types)
            .zip(fractions)
            .enumerate()
        {
            check_parallel(Self::KIND, "VEGTYPE", rec, years.len(), types.len())?;
            check_parallel(Self::KIND, "VEGFRAC", rec, years.len(), fractions.len())?;
            let epochs = years
                .into_iter()
                .zip(types)
                .zip(fractions)
                .map(|((start_year, community_type), fraction)| VegetationEpoch {
                    start_year,
                    community_type,
                    fraction,
                })
                .collect();
            records.push(Self {
                vegetation_id: VegetationId(id),
                epochs,
            });
        }
        Ok(records)
    }
}

impl Record for FireEventRecord {
    const KIND: DatasetKind = DatasetKind::Fire;

    fn raw_id(&self) -> i32 {
        self.fire_id.into_inner()
    }

    fn decode(table: &Table, options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let years: Vec<Vec<i32>> = table.records("FIREYEAR", n)?;
        let seasons: Vec<Vec<i32>> = table.records("FIRESEASON", n)?;
        let sizes: Vec<Vec<f64>> = table.records("FIRESIZE", n)?;
        let severities: Vec<Vec<Option<i32>>> = if options.use_severity {
            let raw: Vec<Vec<i32>> = table.records("FIRESEVERITY", n)?;
            raw.into_iter()
                .map(|row| row.into_iter().map(Some).collect())
                .collect()
        } else {
            years.iter().map(|row| vec![None; row.len()]).collect()
        };

        let mut records = Vec::with_capacity(n);
        for (rec, ((((id, years), seasons), sizes), severities)) in ids
            .into_iter()
            .zip(years)
            .zip(seasons)
            .zip(sizes)
            .zip(severities)
            .enumerate()
        {
            check_parallel(Self::KIND, "FIRESEASON", rec, years.len(), seasons.len())?;
            check_parallel(Self::KIND, "FIRESIZE", rec, years.len(), sizes.len())?;
            check_parallel(Self::KIND, "FIRESEVERITY", rec, years.len(), severities.len())?;
            let events = years
                .into_iter()
                .zip(seasons)
                .zip(sizes)
                .zip(severities)
                .map(|(((year, season), size), severity)| FireEvent {
                    year,
                    season,
                    size,
                    severity,
                })
                .collect();
            records.push(Self {
                fire_id: FireId(id),
                events,
            });
        }
        Ok(records)
    }
}

impl Record for RestartRecord {
    const KIND: DatasetKind = DatasetKind::Restart;

    fn raw_id(&self) -> i32 {
        self.init_id.into_inner()
    }

    fn decode(table: &Table, _options: &DecodeOptions) -> Result<Vec<Self>, CatalogError> {
        let ids = table.ids()?;
        let n = ids.len();
        let error_codes: Vec<i32> = table
            .optional_records("ERRCODE", n)?
            .unwrap_or_else(|| vec![0; n]);

        let id_column = Self::KIND.id_column();
        let mut state_columns: Vec<(String, Vec<Vec<f64>>)> = Vec::new();
        for name in table.column_names() {
            if name == id_column || name == "ERRCODE" {
                continue;
            }
            state_columns.push((name.to_owned(), state_column(table, name, n)?));
        }

        let mut records: Vec<Self> = ids
            .into_iter()
            .zip(error_codes)
            .map(|(id, error_code)| Self {
                init_id: InitId(id),
                error_code,
                state: BTreeMap::new(),
            })
            .collect();
        for (name, values) in state_columns {
            for (record, row) in records.iter_mut().zip(values) {
                record.state.insert(name.clone(), row);
            }
        }
        Ok(records)
    }
}

/// Decode the region CO2 table. Years must be strictly ascending.
///
/// # Errors
///
/// Returns [`CatalogError::Schema`] if `YEAR` or `CO2` is missing or
/// mistyped, the columns differ in length, or the years are out of order.
pub fn decode_co2(table: &Table) -> Result<Co2Series, CatalogError> {
    let years = table.ids()?;
    let concentrations: Vec<f64> = table.records("CO2", years.len())?;
    if years.windows(2).any(|pair| matches!(pair, [a, b] if a >= b)) {
        return Err(CatalogError::schema(
            DatasetKind::Co2,
            DatasetKind::Co2.id_column(),
            "years must be strictly ascending",
        ));
    }
    Ok(Co2Series {
        years,
        concentrations,
    })
}

/// Read a restart state column as per-record arrays. Scalar-per-record
/// columns become one-element arrays.
fn state_column(table: &Table, name: &str, n: usize) -> Result<Vec<Vec<f64>>, CatalogError> {
    let raw: Vec<Value> = table.records(name, n)?;
    raw.into_iter()
        .map(|value| match value {
            Value::Number(number) => number
                .as_f64()
                .map(|v| vec![v])
                .ok_or_else(|| CatalogError::schema(DatasetKind::Restart, name, "not a number")),
            other => serde_json::from_value::<Vec<f64>>(other)
                .map_err(|e| CatalogError::schema(DatasetKind::Restart, name, e.to_string())),
        })
        .collect()
}
