//! Shared type definitions for the Tundra cohort orchestration layer.
//!
//! # Modules
//!
//! - [`ids`] -- Per-dataset identifier newtypes and [`RecordNumber`].
//! - [`enums`] -- [`DatasetKind`], [`Stage`], and [`ModuleSet`].
//! - [`records`] -- Immutable record payloads for each input dataset.

pub mod enums;
pub mod ids;
pub mod records;

pub use enums::{DatasetKind, ModuleSet, Stage};
pub use ids::{
    ClimateId, CohortId, DrainageId, FireId, GridFireId, GridId, InitId, RecordNumber, SoilId,
    VegetationId,
};
pub use records::{
    ClimateRecord, Co2Series, CohortRecord, DrainageRecord, FireEvent, FireEventRecord, GridFireRecord,
    GridRecord, MONTHS_PER_YEAR, MonthlyClimate, RestartRecord, SoilRecord, VegetationEpoch,
    VegetationRecord,
};
