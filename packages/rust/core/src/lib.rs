//! Workflows for geoasset.
//!
//! Ties geometry, storage and tiles together into the end-to-end operations
//! the CLI exposes: [`enrich_table`], [`reconcile`] and [`build_index`].

pub mod enrichment;
pub mod index;
pub mod pipeline;
pub mod reconcile;

pub use enrichment::{EnrichTableConfig, EnrichTableResult, enrich_table};
pub use index::{BuildIndexResult, build_index};
pub use pipeline::{ProgressReporter, SilentProgress};
pub use reconcile::{ReconcileOptions, ReconcileOutcome, reconcile};
