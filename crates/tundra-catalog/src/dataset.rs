//! Dense record storage with a side index from id to record number.
//!
//! A [`Dataset`] owns its records in a `Vec` (the record number is the
//! position) and builds a hash map from raw id to record number once, at
//! load time. Lookups during cross-referencing are then O(1) instead of a
//! scan over the id column per query.

use std::collections::HashMap;

use tracing::{debug, warn};
use tundra_types::RecordNumber;

use crate::decode::{DecodeOptions, Record};
use crate::error::CatalogError;
use crate::table::DatasetSource;

/// A loaded, read-only dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<R> {
    records: Vec<R>,
    index: HashMap<i32, RecordNumber>,
}

impl<R: Record> Dataset<R> {
    /// Load and decode a dataset from a source.
    ///
    /// When an id appears more than once, the first record keeps the id
    /// and the later ones are only reachable by record number.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DatasetMissing`] if the source has no such
    /// dataset, or [`CatalogError::Schema`] if its columns are malformed.
    pub fn load(source: &dyn DatasetSource, options: &DecodeOptions) -> Result<Self, CatalogError> {
        let table = source.table(R::KIND)?;
        let records = R::decode(&table, options)?;
        let dataset = Self::from_records(records);
        debug!(dataset = %R::KIND, records = dataset.len(), "Dataset loaded");
        Ok(dataset)
    }

    /// Build a dataset from already-decoded records.
    pub fn from_records(records: Vec<R>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            let id = record.raw_id();
            if index.contains_key(&id) {
                warn!(
                    dataset = %R::KIND,
                    id,
                    record = position,
                    "Duplicate id; keeping the first record"
                );
            } else {
                index.insert(id, RecordNumber(position));
            }
        }
        Self { records, index }
    }

    /// Record number of the record with this id, if any.
    pub fn lookup(&self, id: impl Into<i32>) -> Option<RecordNumber> {
        self.index.get(&id.into()).copied()
    }
}

impl<R> Dataset<R> {
    /// An empty dataset.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Record at a record number.
    pub fn get(&self, record: RecordNumber) -> Option<&R> {
        self.records.get(record.index())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a record number indexes an existing record.
    pub fn contains(&self, record: RecordNumber) -> bool {
        record.index() < self.records.len()
    }

    /// Iterate over records in record-number order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordNumber, &R)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (RecordNumber(i), r))
    }
}
