//! Error types for the `tundra-catalog` crate.
//!
//! Every failure here happens at load time, before any cohort is
//! simulated, and makes the run unstartable.

use std::path::PathBuf;

use tundra_types::DatasetKind;

/// Errors that can occur while loading datasets.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The dataset file does not exist or no table was registered for it.
    #[error("{kind} dataset missing: {}", path.display())]
    DatasetMissing {
        /// The dataset that could not be found.
        kind: DatasetKind,
        /// Where it was looked for.
        path: PathBuf,
    },

    /// The dataset exists but does not match the expected column layout.
    #[error("{kind} dataset schema error in column {column}: {reason}")]
    Schema {
        /// The offending dataset.
        kind: DatasetKind,
        /// The offending column (`<document>` for whole-file problems).
        column: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The dataset file exists but could not be read.
    #[error("failed to read {kind} dataset: {source}")]
    Io {
        /// The dataset being read.
        kind: DatasetKind,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Build a [`CatalogError::Schema`] for a column.
    pub fn schema(kind: DatasetKind, column: &str, reason: impl Into<String>) -> Self {
        Self::Schema {
            kind,
            column: column.to_owned(),
            reason: reason.into(),
        }
    }
}
