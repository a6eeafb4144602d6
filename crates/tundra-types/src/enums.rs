//! Enumerations shared across the orchestration crates.

use serde::{Deserialize, Serialize};

/// The independent record-oriented datasets a run draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Grid cells: location plus drainage/soil/grid-fire foreign keys.
    Grid,
    /// Drainage classes, referenced from grid cells.
    Drainage,
    /// Soil textures, referenced from grid cells.
    Soil,
    /// Grid-level fire statistics, referenced from grid cells.
    GridFire,
    /// Cohort id table with its foreign keys.
    Cohort,
    /// Restart (initial state) snapshots.
    Restart,
    /// Monthly climate time series.
    Climate,
    /// Vegetation community epochs.
    Vegetation,
    /// Fire-event history.
    Fire,
    /// The roster of cohorts to run in regional mode.
    RunList,
    /// Region-wide yearly atmospheric CO2 series.
    Co2,
}

impl DatasetKind {
    /// Name of the identifier column for this dataset.
    pub const fn id_column(self) -> &'static str {
        match self {
            Self::Grid => "GRIDID",
            Self::Drainage => "DRAINAGEID",
            Self::Soil => "SOILID",
            Self::GridFire => "GFIREID",
            Self::Cohort | Self::Restart | Self::RunList => "CHTID",
            Self::Climate => "CLMID",
            Self::Vegetation => "VEGID",
            Self::Fire => "FIREID",
            Self::Co2 => "YEAR",
        }
    }

    /// Whether a cohort cannot be simulated without a record in this dataset.
    pub const fn is_required_link(self) -> bool {
        matches!(self, Self::Cohort | Self::Grid | Self::Climate)
    }
}

impl core::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Grid => "grid",
            Self::Drainage => "drainage",
            Self::Soil => "soil",
            Self::GridFire => "grid-fire",
            Self::Cohort => "cohort",
            Self::Restart => "restart",
            Self::Climate => "climate",
            Self::Vegetation => "vegetation",
            Self::Fire => "fire",
            Self::RunList => "run-list",
            Self::Co2 => "co2",
        };
        f.write_str(name)
    }
}

/// One phase of the simulation timeline.
///
/// The derived ordering is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Long run to bring pools into balance with the fire regime.
    Equilibrium,
    /// Spin-up over normal climate.
    Spinup,
    /// Historical run over the full driving record.
    Transient,
    /// Projection run over scenario driving data.
    Scenario,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 4] = [
        Self::Equilibrium,
        Self::Spinup,
        Self::Transient,
        Self::Scenario,
    ];

    /// The stage that must complete before this one, if any.
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Equilibrium => None,
            Self::Spinup => Some(Self::Equilibrium),
            Self::Transient => Some(Self::Spinup),
            Self::Scenario => Some(Self::Transient),
        }
    }

    /// Two-letter code used in output file names (`eq`, `sp`, `tr`, `sc`).
    pub const fn code(self) -> &'static str {
        match self {
            Self::Equilibrium => "eq",
            Self::Spinup => "sp",
            Self::Transient => "tr",
            Self::Scenario => "sc",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Which process modules the compute core runs during a month step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ModuleSet {
    /// Environment (water/thermal) processes.
    pub env: bool,
    /// Biogeochemistry (carbon/nitrogen) processes.
    pub bgc: bool,
    /// Disturbance (fire).
    pub disturbance: bool,
    /// Dynamic soil layer structure.
    pub dynamic_soil_layer: bool,
    /// Dynamic vegetation.
    pub dynamic_vegetation: bool,
}

impl ModuleSet {
    /// Every module enabled.
    pub const fn full() -> Self {
        Self {
            env: true,
            bgc: true,
            disturbance: true,
            dynamic_soil_layer: true,
            dynamic_vegetation: true,
        }
    }

    /// Only the environment module, used for the equilibrium pre-pass.
    pub const fn environment_only() -> Self {
        Self {
            env: true,
            bgc: false,
            disturbance: false,
            dynamic_soil_layer: false,
            dynamic_vegetation: false,
        }
    }
}
