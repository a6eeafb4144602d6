//! Type-safe identifier wrappers around the raw integer ids stored in the
//! input datasets.
//!
//! Every dataset labels its records with an opaque signed integer. The
//! same integer value means different things in different datasets, so
//! each dataset gets its own newtype and the compiler rejects, say, a
//! [`GridId`] passed where a [`ClimateId`] is expected.
//!
//! A [`RecordNumber`] is different in kind: it is the dense zero-based
//! position of a record inside a loaded dataset, not a logical id.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `i32` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl $name {
            /// Return the raw integer value as stored in the dataset.
            pub const fn into_inner(self) -> i32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Cohort identifier (`CHTID`), the atomic simulated unit.
    CohortId
}

define_id! {
    /// Grid-cell identifier (`GRIDID`).
    GridId
}

define_id! {
    /// Drainage-class record identifier (`DRAINAGEID`).
    DrainageId
}

define_id! {
    /// Soil-texture record identifier (`SOILID`).
    SoilId
}

define_id! {
    /// Grid-level fire statistics identifier (`GFIREID`).
    GridFireId
}

define_id! {
    /// Initial-state (restart) identifier (`INITCHTID`).
    InitId
}

define_id! {
    /// Climate time-series identifier (`CLMID`).
    ClimateId
}

define_id! {
    /// Vegetation time-series identifier (`VEGID`).
    VegetationId
}

define_id! {
    /// Fire-event time-series identifier (`FIREID`).
    FireId
}

/// Zero-based position of a record within its loaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordNumber(pub usize);

impl RecordNumber {
    /// Return the position as a `usize` suitable for slice access.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for RecordNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
