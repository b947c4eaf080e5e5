//! Tile-level delta between a source and a target raster.
//!
//! Tile identifiers are compared as exact, case-sensitive file names.

use std::collections::BTreeSet;

use geoasset_shared::{GeoAssetError, Result};

/// Diff result categorizing tiles by which side holds them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TileDiff {
    /// Tiles only the source has; these get copied.
    pub unique_to_source: BTreeSet<String>,
    /// Tiles only the target has; any of these aborts a reconciliation.
    pub unique_to_target: BTreeSet<String>,
    /// Tiles present on both sides.
    pub common: BTreeSet<String>,
}

impl TileDiff {
    /// Fail when the target is not an extension of the source.
    pub fn check_integrity(&self) -> Result<()> {
        if self.unique_to_target.is_empty() {
            return Ok(());
        }
        Err(GeoAssetError::IntegrityViolation {
            unique_to_target: self.unique_to_target.iter().cloned().collect(),
        })
    }

    /// True when the target already holds every source tile.
    pub fn is_noop(&self) -> bool {
        self.unique_to_source.is_empty()
    }
}

/// Compute the diff between the source and target tile listings.
pub fn diff_tiles(source: &BTreeSet<String>, target: &BTreeSet<String>) -> TileDiff {
    TileDiff {
        unique_to_source: source.difference(target).cloned().collect(),
        unique_to_target: target.difference(source).cloned().collect(),
        common: source.intersection(target).cloned().collect(),
    }
}
