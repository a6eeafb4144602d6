//! Column-oriented tables and the sources they are read from.
//!
//! A dataset on disk is a JSON object mapping column names to arrays. The
//! outer length of every array is the record count; the identifier column
//! is a 1-D integer array and the record number of an entity is its
//! position in that array.
//!
//! [`DatasetSource`] abstracts where tables come from. [`JsonDirectory`]
//! reads them from the configured input directories; [`MemorySource`]
//! holds them in memory for tests and embedding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize as _;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tundra_types::DatasetKind;

use crate::error::CatalogError;

/// Column name used in errors about the document as a whole.
const DOCUMENT: &str = "<document>";

/// A loaded dataset table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    kind: DatasetKind,
    columns: BTreeMap<String, Value>,
}

impl Table {
    /// Parse a table from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] if the document is not a JSON
    /// object of columns.
    pub fn from_json_str(kind: DatasetKind, json: &str) -> Result<Self, CatalogError> {
        let columns: BTreeMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| CatalogError::schema(kind, DOCUMENT, e.to_string()))?;
        Ok(Self { kind, columns })
    }

    /// Build a table from already-parsed columns.
    pub const fn from_columns(kind: DatasetKind, columns: BTreeMap<String, Value>) -> Self {
        Self { kind, columns }
    }

    /// The dataset this table belongs to.
    pub const fn kind(&self) -> DatasetKind {
        self.kind
    }

    /// Whether a column is present.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Names of all columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Read the identifier column as a 1-D integer sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] if the column is absent or is not
    /// a flat array of integers.
    pub fn ids(&self) -> Result<Vec<i32>, CatalogError> {
        self.column(self.kind.id_column())
    }

    /// Read a column and check its outer length against `records`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] if the column is absent, has the
    /// wrong element type, or a different record count.
    pub fn records<T: DeserializeOwned>(
        &self,
        name: &str,
        records: usize,
    ) -> Result<Vec<T>, CatalogError> {
        let values: Vec<T> = self.column(name)?;
        if values.len() != records {
            return Err(CatalogError::schema(
                self.kind,
                name,
                format!("expected {records} records, found {}", values.len()),
            ));
        }
        Ok(values)
    }

    /// Like [`records`](Self::records), but an absent column yields `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] if the column is present but
    /// malformed.
    pub fn optional_records<T: DeserializeOwned>(
        &self,
        name: &str,
        records: usize,
    ) -> Result<Option<Vec<T>>, CatalogError> {
        if self.has_column(name) {
            self.records(name, records).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Read a column with no shape constraint beyond its element type.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] if the column is absent or cannot
    /// be decoded as `Vec<T>`.
    pub fn column<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, CatalogError> {
        let value = self
            .columns
            .get(name)
            .ok_or_else(|| CatalogError::schema(self.kind, name, "column not found"))?;
        Vec::<T>::deserialize(value).map_err(|e| CatalogError::schema(self.kind, name, e.to_string()))
    }
}

/// A provider of dataset tables.
pub trait DatasetSource {
    /// Read the table for a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DatasetMissing`] if the dataset is not
    /// available, or another [`CatalogError`] if it cannot be read.
    fn table(&self, kind: DatasetKind) -> Result<Table, CatalogError>;
}

/// Reads datasets from JSON files in the grid and cohort input directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonDirectory {
    grid_dir: PathBuf,
    cohort_dir: PathBuf,
    restart_file: Option<PathBuf>,
    run_list_file: Option<PathBuf>,
    region_dir: Option<PathBuf>,
}

impl JsonDirectory {
    /// Create a source over the given grid-level and cohort-level input
    /// directories.
    pub fn new(grid_dir: impl Into<PathBuf>, cohort_dir: impl Into<PathBuf>) -> Self {
        Self {
            grid_dir: grid_dir.into(),
            cohort_dir: cohort_dir.into(),
            restart_file: None,
            run_list_file: None,
            region_dir: None,
        }
    }

    /// Set the restart file (only needed for restart initialization).
    #[must_use]
    pub fn with_restart_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.restart_file = Some(path.into());
        self
    }

    /// Set the regional run-list file.
    #[must_use]
    pub fn with_run_list_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.run_list_file = Some(path.into());
        self
    }

    /// Set the directory of region-wide inputs (`co2.json`). Defaults to
    /// the grid directory.
    #[must_use]
    pub fn with_region_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.region_dir = Some(path.into());
        self
    }

    /// Path a dataset is read from, if one is configured.
    pub fn path_for(&self, kind: DatasetKind) -> Option<PathBuf> {
        let in_grid = |name: &str| Some(self.grid_dir.join(name));
        let in_cohort = |name: &str| Some(self.cohort_dir.join(name));
        match kind {
            DatasetKind::Grid => in_grid("grid.json"),
            DatasetKind::Drainage => in_grid("drainage.json"),
            DatasetKind::Soil => in_grid("soiltexture.json"),
            DatasetKind::GridFire => in_grid("firestatistics.json"),
            DatasetKind::Cohort => in_cohort("cohortid.json"),
            DatasetKind::Climate => in_cohort("climate.json"),
            DatasetKind::Vegetation => in_cohort("vegetation.json"),
            DatasetKind::Fire => in_cohort("fire.json"),
            DatasetKind::Restart => self.restart_file.clone(),
            DatasetKind::RunList => self.run_list_file.clone(),
            DatasetKind::Co2 => Some(
                self.region_dir
                    .as_deref()
                    .unwrap_or(self.grid_dir.as_path())
                    .join("co2.json"),
            ),
        }
    }
}

impl DatasetSource for JsonDirectory {
    fn table(&self, kind: DatasetKind) -> Result<Table, CatalogError> {
        let path = self
            .path_for(kind)
            .ok_or_else(|| CatalogError::DatasetMissing {
                kind,
                path: PathBuf::new(),
            })?;
        read_table(kind, &path)
    }
}

/// Read one JSON table from disk.
fn read_table(kind: DatasetKind, path: &Path) -> Result<Table, CatalogError> {
    if !path.is_file() {
        return Err(CatalogError::DatasetMissing {
            kind,
            path: path.to_path_buf(),
        });
    }
    let contents =
        std::fs::read_to_string(path).map_err(|source| CatalogError::Io { kind, source })?;
    Table::from_json_str(kind, &contents)
}

/// An in-memory set of tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySource {
    tables: BTreeMap<DatasetKind, Table>,
}

impl MemorySource {
    /// Create an empty source.
    pub const fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Register a table, replacing any previous one of the same kind.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.kind(), table);
    }

    /// Parse and register a table from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Schema`] if the JSON is not a column object.
    pub fn insert_json(&mut self, kind: DatasetKind, json: &str) -> Result<(), CatalogError> {
        self.insert(Table::from_json_str(kind, json)?);
        Ok(())
    }

    /// Remove a table, so loading it reports it as missing.
    pub fn remove(&mut self, kind: DatasetKind) -> Option<Table> {
        self.tables.remove(&kind)
    }
}

impl DatasetSource for MemorySource {
    fn table(&self, kind: DatasetKind) -> Result<Table, CatalogError> {
        self.tables
            .get(&kind)
            .cloned()
            .ok_or_else(|| CatalogError::DatasetMissing {
                kind,
                path: PathBuf::from(format!("memory:{kind}")),
            })
    }
}
