//! Dataset loading and id-to-record-number catalogs for the Tundra
//! orchestration layer.
//!
//! Every input dataset is read exactly once, before any simulation
//! starts, into a dense record vector plus a hash index from id to
//! record number. Nothing in this crate touches the filesystem after
//! [`EntityCatalog::load`] returns.
//!
//! # Modules
//!
//! - [`catalog`] -- [`EntityCatalog`], the set of all loaded datasets.
//! - [`dataset`] -- [`Dataset`], a record arena with an id index.
//! - [`decode`] -- Column layouts and the [`Record`] decoding trait.
//! - [`error`] -- [`CatalogError`].
//! - [`table`] -- Column-oriented tables and [`DatasetSource`]s.

pub mod catalog;
pub mod dataset;
pub mod decode;
pub mod error;
pub mod table;

pub use catalog::{CatalogOptions, EntityCatalog, load_roster};
pub use dataset::Dataset;
pub use decode::{DecodeOptions, Record};
pub use error::CatalogError;
pub use table::{DatasetSource, JsonDirectory, MemorySource, Table};
