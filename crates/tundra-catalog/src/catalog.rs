//! The entity catalog: every dataset a run needs, loaded once.
//!
//! [`EntityCatalog::load`] reads all datasets up front. After that the
//! catalog is read-only for the lifetime of the run, so record numbers
//! handed out by its lookups stay valid until the run ends.

use tracing::{info, warn};
use tundra_types::{
    ClimateId, ClimateRecord, Co2Series, CohortId, CohortRecord, DatasetKind, DrainageId, DrainageRecord,
    FireEventRecord, FireId, GridFireId, GridFireRecord, GridId, GridRecord, InitId,
    RecordNumber, RestartRecord, SoilId, SoilRecord, VegetationId, VegetationRecord,
};

use crate::dataset::Dataset;
use crate::decode::{DecodeOptions, decode_co2};
use crate::error::CatalogError;
use crate::table::DatasetSource;

/// Which optional datasets to load and how to decode them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Load the restart dataset (restart initialization only).
    pub load_restart: bool,
    /// Decode fire severity.
    pub use_severity: bool,
}

/// All datasets of one run, indexed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCatalog {
    grids: Dataset<GridRecord>,
    drainages: Dataset<DrainageRecord>,
    soils: Dataset<SoilRecord>,
    grid_fires: Dataset<GridFireRecord>,
    cohorts: Dataset<CohortRecord>,
    restarts: Option<Dataset<RestartRecord>>,
    climates: Dataset<ClimateRecord>,
    vegetation: Dataset<VegetationRecord>,
    fires: Dataset<FireEventRecord>,
    co2: Option<Co2Series>,
}

impl EntityCatalog {
    /// Load every dataset from a source.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DatasetMissing`] or [`CatalogError::Schema`]
    /// for the first dataset that cannot be loaded. The run cannot start.
    pub fn load(source: &dyn DatasetSource, options: CatalogOptions) -> Result<Self, CatalogError> {
        let decode = DecodeOptions {
            use_severity: options.use_severity,
        };

        let catalog = Self {
            grids: Dataset::load(source, &decode)?,
            drainages: Dataset::load(source, &decode)?,
            soils: Dataset::load(source, &decode)?,
            grid_fires: Dataset::load(source, &decode)?,
            cohorts: Dataset::load(source, &decode)?,
            restarts: if options.load_restart {
                Some(Dataset::load(source, &decode)?)
            } else {
                None
            },
            climates: Dataset::load(source, &decode)?,
            vegetation: Dataset::load(source, &decode)?,
            fires: Dataset::load(source, &decode)?,
            co2: load_co2(source)?,
        };

        info!(
            grids = catalog.grids.len(),
            drainages = catalog.drainages.len(),
            soils = catalog.soils.len(),
            grid_fires = catalog.grid_fires.len(),
            cohorts = catalog.cohorts.len(),
            restarts = catalog.restarts.as_ref().map(Dataset::len),
            climates = catalog.climates.len(),
            vegetation = catalog.vegetation.len(),
            fires = catalog.fires.len(),
            co2_years = catalog.co2.as_ref().map(|c| c.years.len()),
            "Entity catalog loaded"
        );
        Ok(catalog)
    }

    /// Number of records in a dataset (`None` for a dataset not loaded).
    pub fn record_count(&self, kind: DatasetKind) -> Option<usize> {
        match kind {
            DatasetKind::Grid => Some(self.grids.len()),
            DatasetKind::Drainage => Some(self.drainages.len()),
            DatasetKind::Soil => Some(self.soils.len()),
            DatasetKind::GridFire => Some(self.grid_fires.len()),
            DatasetKind::Cohort => Some(self.cohorts.len()),
            DatasetKind::Restart => self.restarts.as_ref().map(Dataset::len),
            DatasetKind::Climate => Some(self.climates.len()),
            DatasetKind::Vegetation => Some(self.vegetation.len()),
            DatasetKind::Fire => Some(self.fires.len()),
            DatasetKind::Co2 => self.co2.as_ref().map(|c| c.years.len()),
            DatasetKind::RunList => None,
        }
    }

    /// Whether the restart dataset was loaded.
    pub const fn has_restarts(&self) -> bool {
        self.restarts.is_some()
    }

    // -------------------------------------------------------------------
    // id -> record number
    // -------------------------------------------------------------------

    /// Record number of a grid cell.
    pub fn grid_record(&self, id: GridId) -> Option<RecordNumber> {
        self.grids.lookup(id)
    }

    /// Record number of a drainage class.
    pub fn drainage_record(&self, id: DrainageId) -> Option<RecordNumber> {
        self.drainages.lookup(id)
    }

    /// Record number of a soil texture.
    pub fn soil_record(&self, id: SoilId) -> Option<RecordNumber> {
        self.soils.lookup(id)
    }

    /// Record number of a grid fire-statistics record.
    pub fn grid_fire_record(&self, id: GridFireId) -> Option<RecordNumber> {
        self.grid_fires.lookup(id)
    }

    /// Record number of a cohort.
    pub fn cohort_record(&self, id: CohortId) -> Option<RecordNumber> {
        self.cohorts.lookup(id)
    }

    /// Record number of a restart snapshot (`None` when not loaded).
    pub fn restart_record(&self, id: InitId) -> Option<RecordNumber> {
        self.restarts.as_ref()?.lookup(id)
    }

    /// Record number of a climate series.
    pub fn climate_record(&self, id: ClimateId) -> Option<RecordNumber> {
        self.climates.lookup(id)
    }

    /// Record number of a vegetation history.
    pub fn vegetation_record(&self, id: VegetationId) -> Option<RecordNumber> {
        self.vegetation.lookup(id)
    }

    /// Record number of a fire history.
    pub fn fire_record(&self, id: FireId) -> Option<RecordNumber> {
        self.fires.lookup(id)
    }

    // -------------------------------------------------------------------
    // Dataset access
    // -------------------------------------------------------------------

    /// The grid dataset.
    pub const fn grids(&self) -> &Dataset<GridRecord> {
        &self.grids
    }

    /// The drainage dataset.
    pub const fn drainages(&self) -> &Dataset<DrainageRecord> {
        &self.drainages
    }

    /// The soil-texture dataset.
    pub const fn soils(&self) -> &Dataset<SoilRecord> {
        &self.soils
    }

    /// The grid fire-statistics dataset.
    pub const fn grid_fires(&self) -> &Dataset<GridFireRecord> {
        &self.grid_fires
    }

    /// The cohort dataset.
    pub const fn cohorts(&self) -> &Dataset<CohortRecord> {
        &self.cohorts
    }

    /// The restart dataset, when loaded.
    pub const fn restarts(&self) -> Option<&Dataset<RestartRecord>> {
        self.restarts.as_ref()
    }

    /// The climate dataset.
    pub const fn climates(&self) -> &Dataset<ClimateRecord> {
        &self.climates
    }

    /// The vegetation dataset.
    pub const fn vegetation(&self) -> &Dataset<VegetationRecord> {
        &self.vegetation
    }

    /// The fire-event dataset.
    pub const fn fires(&self) -> &Dataset<FireEventRecord> {
        &self.fires
    }

    /// The region CO2 series, when the dataset exists.
    pub const fn co2(&self) -> Option<&Co2Series> {
        self.co2.as_ref()
    }
}

/// The CO2 series is optional; without it the core falls back to its
/// pre-industrial constant.
fn load_co2(source: &dyn DatasetSource) -> Result<Option<Co2Series>, CatalogError> {
    match source.table(DatasetKind::Co2) {
        Ok(table) => decode_co2(&table).map(Some),
        Err(CatalogError::DatasetMissing { .. }) => {
            warn!("No CO2 dataset, using the pre-industrial concentration");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Read the regional roster: the `CHTID` column of the run-list dataset,
/// in file order.
///
/// # Errors
///
/// Returns [`CatalogError::DatasetMissing`] if no run list is available,
/// or [`CatalogError::Schema`] if its id column is malformed.
pub fn load_roster(source: &dyn DatasetSource) -> Result<Vec<CohortId>, CatalogError> {
    let table = source.table(DatasetKind::RunList)?;
    let ids = table.ids()?;
    Ok(ids.into_iter().map(CohortId).collect())
}
