//! The ordered set of cohorts simulated by one invocation.
//!
//! Order is significant: resolved contexts, batch outcomes and region
//! output rows are all paired back to cohorts by position in the list.

use std::collections::HashMap;

use tracing::warn;
use tundra_catalog::{CatalogError, DatasetSource, load_roster};
use tundra_types::CohortId;

/// Errors that can occur when building a run list.
#[derive(Debug, thiserror::Error)]
pub enum RunListError {
    /// No cohorts to process.
    #[error("run list is empty")]
    EmptyRunList,

    /// The regional roster could not be read.
    #[error("failed to read run list: {source}")]
    Roster {
        /// The underlying catalog error.
        #[from]
        source: CatalogError,
    },
}

/// Cohort ids in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunList {
    ids: Vec<CohortId>,
}

impl RunList {
    /// A site-mode list of exactly one cohort.
    pub fn single(id: CohortId) -> Self {
        Self { ids: vec![id] }
    }

    /// Build a list from ids in the given order.
    ///
    /// Repeated ids are kept (each occurrence is simulated) and logged as a
    /// likely misconfiguration.
    ///
    /// # Errors
    ///
    /// Returns [`RunListError::EmptyRunList`] if `ids` is empty.
    pub fn from_ids(ids: Vec<CohortId>) -> Result<Self, RunListError> {
        if ids.is_empty() {
            return Err(RunListError::EmptyRunList);
        }
        let list = Self { ids };
        for id in list.duplicates() {
            warn!(cohort = %id, "Cohort appears more than once in the run list");
        }
        Ok(list)
    }

    /// Read a regional roster from a dataset source.
    ///
    /// # Errors
    ///
    /// Returns [`RunListError::Roster`] if the roster cannot be read, or
    /// [`RunListError::EmptyRunList`] if it lists no cohorts.
    pub fn from_source(source: &dyn DatasetSource) -> Result<Self, RunListError> {
        Self::from_ids(load_roster(source)?)
    }

    /// Ids in processing order.
    pub fn ids(&self) -> &[CohortId] {
        &self.ids
    }

    /// Number of entries, counting repeats.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always `false`; an empty list cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over ids in processing order.
    pub fn iter(&self) -> impl Iterator<Item = CohortId> + '_ {
        self.ids.iter().copied()
    }

    /// Ids that occur more than once, in order of first occurrence.
    pub fn duplicates(&self) -> Vec<CohortId> {
        let mut counts: HashMap<CohortId, usize> = HashMap::new();
        for id in &self.ids {
            let count = counts.entry(*id).or_insert(0);
            *count = count.saturating_add(1);
        }
        let mut repeated = Vec::new();
        for id in &self.ids {
            if counts.get(id).is_some_and(|&n| n > 1) && !repeated.contains(id) {
                repeated.push(*id);
            }
        }
        repeated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tundra_catalog::MemorySource;
    use tundra_types::DatasetKind;

    use super::*;

    fn ids(raw: &[i32]) -> Vec<CohortId> {
        raw.iter().copied().map(CohortId).collect()
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            RunList::from_ids(Vec::new()),
            Err(RunListError::EmptyRunList)
        ));
    }

    #[test]
    fn order_is_preserved_verbatim() {
        let list = RunList::from_ids(ids(&[7, 2, 9, 4])).unwrap();
        assert_eq!(list.ids(), ids(&[7, 2, 9, 4]).as_slice());
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn duplicates_are_kept_and_flagged() {
        let list = RunList::from_ids(ids(&[3, 1, 3, 2, 1, 3])).unwrap();
        assert_eq!(list.len(), 6);
        assert_eq!(list.duplicates(), ids(&[3, 1]));

        let clean = RunList::from_ids(ids(&[1, 2, 3])).unwrap();
        assert!(clean.duplicates().is_empty());
    }

    #[test]
    fn roster_is_read_from_source() {
        let mut source = MemorySource::new();
        source
            .insert_json(DatasetKind::RunList, r#"{"CHTID": [4, 8]}"#)
            .unwrap();
        let list = RunList::from_source(&source).unwrap();
        assert_eq!(list.ids(), ids(&[4, 8]).as_slice());

        source
            .insert_json(DatasetKind::RunList, r#"{"CHTID": []}"#)
            .unwrap();
        assert!(matches!(
            RunList::from_source(&source),
            Err(RunListError::EmptyRunList)
        ));

        let _ = source.remove(DatasetKind::RunList);
        assert!(matches!(
            RunList::from_source(&source),
            Err(RunListError::Roster { .. })
        ));
    }
}
