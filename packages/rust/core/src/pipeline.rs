//! Progress reporting shared by the workflows.

/// Progress callback for reporting workflow status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a tile copy completes during reconciliation.
    fn tile_copied(&self, tile_id: &str, current: usize, total: usize);
    /// Called when a row has been enriched in memory.
    fn row_enriched(&self, id: &str, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn tile_copied(&self, _tile_id: &str, _current: usize, _total: usize) {}
    fn row_enriched(&self, _id: &str, _current: usize, _total: usize) {}
}
