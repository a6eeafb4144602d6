//! Cross-referencing cohorts to record numbers in every dataset.
//!
//! A cohort names its grid, climate, vegetation, fire and initial-state
//! records directly. Drainage, soil and fire statistics hang off the grid
//! record, so they take a second hop. [`CrossReferenceResolver::new`] does
//! that hop once for every cohort in the catalog; resolving a run list is
//! then a series of O(1) lookups producing one [`ResolvedCohortContext`]
//! per entry, in run-list order.

use std::collections::HashMap;

use tracing::warn;
use tundra_catalog::EntityCatalog;
use tundra_types::{
    CohortId, CohortRecord, DatasetKind, DrainageId, GridFireId, RecordNumber, SoilId,
};

use crate::runlist::RunList;
use crate::scheduler::CohortError;

/// Grid-level foreign keys of one cohort, found through its grid record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DerivedLinks {
    grid_rec: RecordNumber,
    drainage_id: DrainageId,
    soil_id: SoilId,
    grid_fire_id: GridFireId,
}

/// Record numbers of everything one cohort reads. `None` is the
/// "not found" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCohortContext {
    /// Cohort id.
    pub chtid: CohortId,
    /// Cohort record.
    pub cohort_rec: Option<RecordNumber>,
    /// Grid record.
    pub grid_rec: Option<RecordNumber>,
    /// Drainage record.
    pub drain_rec: Option<RecordNumber>,
    /// Soil record.
    pub soil_rec: Option<RecordNumber>,
    /// Grid fire-statistics record.
    pub gfire_rec: Option<RecordNumber>,
    /// Restart record.
    pub init_rec: Option<RecordNumber>,
    /// Climate record.
    pub clm_rec: Option<RecordNumber>,
    /// Vegetation record.
    pub veg_rec: Option<RecordNumber>,
    /// Fire-event record.
    pub fire_rec: Option<RecordNumber>,
}

/// Record numbers a cohort cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredLinks {
    /// Cohort record.
    pub cohort: RecordNumber,
    /// Grid record.
    pub grid: RecordNumber,
    /// Climate record.
    pub climate: RecordNumber,
}

impl ResolvedCohortContext {
    /// A context with every link missing.
    pub const fn unresolved(chtid: CohortId) -> Self {
        Self {
            chtid,
            cohort_rec: None,
            grid_rec: None,
            drain_rec: None,
            soil_rec: None,
            gfire_rec: None,
            init_rec: None,
            clm_rec: None,
            veg_rec: None,
            fire_rec: None,
        }
    }

    /// The record number resolved for a dataset.
    pub const fn link(&self, kind: DatasetKind) -> Option<RecordNumber> {
        match kind {
            DatasetKind::Cohort => self.cohort_rec,
            DatasetKind::Grid => self.grid_rec,
            DatasetKind::Drainage => self.drain_rec,
            DatasetKind::Soil => self.soil_rec,
            DatasetKind::GridFire => self.gfire_rec,
            DatasetKind::Restart => self.init_rec,
            DatasetKind::Climate => self.clm_rec,
            DatasetKind::Vegetation => self.veg_rec,
            DatasetKind::Fire => self.fire_rec,
            DatasetKind::RunList | DatasetKind::Co2 => None,
        }
    }

    /// Check the cohort, grid and climate links.
    ///
    /// # Errors
    ///
    /// Returns [`CohortError::MissingRequiredLink`] naming the first
    /// required dataset whose link is missing.
    pub fn require(&self) -> Result<RequiredLinks, CohortError> {
        let need = |kind: DatasetKind| {
            self.link(kind).ok_or_else(|| CohortError::MissingRequiredLink {
                cohort: self.chtid,
                dataset: kind,
            })
        };
        Ok(RequiredLinks {
            cohort: need(DatasetKind::Cohort)?,
            grid: need(DatasetKind::Grid)?,
            climate: need(DatasetKind::Climate)?,
        })
    }
}

/// Why an optional link degraded to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkIssue {
    /// The referenced id is not in the dataset.
    Missing,
    /// The referenced restart snapshot carries a non-zero error code.
    Unusable,
}

/// An optional link that degraded to default initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkWarning {
    /// Cohort affected.
    pub cohort: CohortId,
    /// Dataset whose link is missing.
    pub dataset: DatasetKind,
    /// What was wrong.
    pub issue: LinkIssue,
}

/// Result of resolving a run list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// One context per run-list entry, in run-list order.
    pub contexts: Vec<ResolvedCohortContext>,
    /// Degraded optional links, in run-list order.
    pub warnings: Vec<LinkWarning>,
}

/// Resolves cohort ids against a loaded catalog.
#[derive(Debug)]
pub struct CrossReferenceResolver<'a> {
    catalog: &'a EntityCatalog,
    derived: HashMap<CohortId, DerivedLinks>,
    resolve_restart: bool,
}

impl<'a> CrossReferenceResolver<'a> {
    /// Build the resolver, hopping every catalog cohort through its grid.
    ///
    /// `resolve_restart` is set when cohorts are initialized from restart
    /// snapshots; otherwise the restart link is always the sentinel and
    /// raises no warning.
    pub fn new(catalog: &'a EntityCatalog, resolve_restart: bool) -> Self {
        let mut derived = HashMap::with_capacity(catalog.cohorts().len());
        for (_, cohort) in catalog.cohorts().iter() {
            if derived.contains_key(&cohort.chtid) {
                continue;
            }
            let Some(grid_rec) = catalog.grid_record(cohort.grid_id) else {
                continue;
            };
            if let Some(grid) = catalog.grids().get(grid_rec) {
                derived.insert(
                    cohort.chtid,
                    DerivedLinks {
                        grid_rec,
                        drainage_id: grid.drainage_id,
                        soil_id: grid.soil_id,
                        grid_fire_id: grid.grid_fire_id,
                    },
                );
            }
        }
        Self {
            catalog,
            derived,
            resolve_restart,
        }
    }

    /// Resolve one cohort id.
    pub fn resolve_one(&self, chtid: CohortId) -> (ResolvedCohortContext, Vec<LinkWarning>) {
        let mut ctx = ResolvedCohortContext::unresolved(chtid);
        let mut warnings = Vec::new();

        let Some((cohort_rec, cohort)) = self
            .catalog
            .cohort_record(chtid)
            .and_then(|rec| Some((rec, self.catalog.cohorts().get(rec)?)))
        else {
            return (ctx, warnings);
        };
        ctx.cohort_rec = Some(cohort_rec);

        if let Some(links) = self.derived.get(&chtid) {
            ctx.grid_rec = Some(links.grid_rec);
            ctx.drain_rec = self.catalog.drainage_record(links.drainage_id);
            ctx.soil_rec = self.catalog.soil_record(links.soil_id);
            ctx.gfire_rec = self.catalog.grid_fire_record(links.grid_fire_id);
        }
        ctx.clm_rec = self.catalog.climate_record(cohort.climate_id);
        ctx.veg_rec = self.catalog.vegetation_record(cohort.vegetation_id);
        ctx.fire_rec = self.catalog.fire_record(cohort.fire_id);
        if self.resolve_restart {
            ctx.init_rec = self.resolve_restart_link(cohort, &mut warnings);
        }

        let mut optional = vec![DatasetKind::Vegetation, DatasetKind::Fire];
        if ctx.grid_rec.is_some() {
            optional.extend([DatasetKind::Drainage, DatasetKind::Soil, DatasetKind::GridFire]);
        }
        for dataset in optional {
            if ctx.link(dataset).is_none() {
                warnings.push(LinkWarning {
                    cohort: chtid,
                    dataset,
                    issue: LinkIssue::Missing,
                });
            }
        }
        (ctx, warnings)
    }

    fn resolve_restart_link(
        &self,
        cohort: &CohortRecord,
        warnings: &mut Vec<LinkWarning>,
    ) -> Option<RecordNumber> {
        let issue = match self.catalog.restart_record(cohort.init_id) {
            None => LinkIssue::Missing,
            Some(rec) => {
                let usable = self
                    .catalog
                    .restarts()
                    .and_then(|r| r.get(rec))
                    .is_some_and(tundra_types::RestartRecord::is_usable);
                if usable {
                    return Some(rec);
                }
                LinkIssue::Unusable
            }
        };
        warnings.push(LinkWarning {
            cohort: cohort.chtid,
            dataset: DatasetKind::Restart,
            issue,
        });
        None
    }

    /// Resolve every entry of a run list, in order, logging each degraded
    /// optional link.
    pub fn resolve(&self, run_list: &RunList) -> Resolution {
        let mut contexts = Vec::with_capacity(run_list.len());
        let mut warnings = Vec::new();
        for chtid in run_list.iter() {
            let (ctx, cohort_warnings) = self.resolve_one(chtid);
            for w in &cohort_warnings {
                warn!(
                    cohort = %w.cohort,
                    dataset = %w.dataset,
                    issue = ?w.issue,
                    "Optional link missing; using default initialization"
                );
            }
            contexts.push(ctx);
            warnings.extend(cohort_warnings);
        }
        Resolution { contexts, warnings }
    }

    /// Resolve every cohort in the catalog, in record order.
    pub fn resolve_catalog(&self) -> Vec<ResolvedCohortContext> {
        self.catalog
            .cohorts()
            .iter()
            .map(|(_, cohort)| self.resolve_one(cohort.chtid).0)
            .collect()
    }
}
