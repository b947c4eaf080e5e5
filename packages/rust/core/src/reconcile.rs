//! Incremental tile-set reconciliation.
//!
//! Extends a target raster with the tiles only its source has, then records
//! what existed before (`overlap`) and what was added (`nonoverlap`) next to
//! the refreshed `tiles` and `extent` indices.
//!
//! The run assumes exclusive ownership of the target raster path.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use geoasset_shared::{GeoAssetError, Result};
use geoasset_tiles::{
    BucketResolver, IndexKind, RasterUri, TileDiff, TileIndex, copy_tile, diff_tiles, list_tile_names,
    read_object, rewrite_raster_path, write_object,
};

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Options & outcome
// ---------------------------------------------------------------------------

/// Immutable inputs of one reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub source: RasterUri,
    pub target: RasterUri,
    /// Sibling pixel meaning that also receives `overlap`/`nonoverlap`.
    pub companion_pixel_meaning: Option<String>,
    /// Maximum concurrent tile copies.
    pub concurrency: usize,
    /// File extension identifying tiles.
    pub tile_extension: String,
}

impl ReconcileOptions {
    pub fn new(source: RasterUri, target: RasterUri) -> Self {
        Self {
            source,
            target,
            companion_pixel_meaning: None,
            concurrency: 32,
            tile_extension: ".tif".into(),
        }
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Number of tiles copied into the target.
    pub copied: usize,
    /// Tile identifiers copied, sorted.
    pub copied_tiles: Vec<String>,
    /// `s3://` URIs of index documents written, in write order.
    pub indices_written: Vec<String>,
    pub elapsed: std::time::Duration,
}

/// Index documents prepared before any mutation.
struct IndexPlan {
    overlap: Bytes,
    nonoverlap: Bytes,
    tiles: Bytes,
    extent: Bytes,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Reconcile `options.target` against `options.source`.
///
/// 1. List tiles on both sides and diff them
/// 2. Abort if the target holds tiles the source lacks
/// 3. Return early when there is nothing to copy
/// 4. Read and prepare every index document
/// 5. Copy the new tiles through a bounded pool (fail-fast)
/// 6. Write `overlap`, `nonoverlap`, `tiles`, `extent` and companion copies
///
/// Nothing is written before step 5, so integrity and input errors leave the
/// target untouched. A copy failure leaves already copied tiles in place and
/// writes no index; re-running skips the tiles that made it.
#[instrument(skip_all, fields(source = %options.source, target = %options.target))]
pub async fn reconcile(
    resolver: Arc<dyn BucketResolver>,
    options: &ReconcileOptions,
    progress: &dyn ProgressReporter,
) -> Result<ReconcileOutcome> {
    let start = Instant::now();

    progress.phase("Listing tiles");
    let source_tiles =
        list_tile_names(resolver.as_ref(), &options.source, &options.tile_extension).await?;
    let target_tiles =
        list_tile_names(resolver.as_ref(), &options.target, &options.tile_extension).await?;

    let diff = diff_tiles(&source_tiles, &target_tiles);
    info!(
        source_tiles = source_tiles.len(),
        target_tiles = target_tiles.len(),
        unique_to_source = diff.unique_to_source.len(),
        unique_to_target = diff.unique_to_target.len(),
        "computed tile diff"
    );

    if let Err(e) = diff.check_integrity() {
        warn!(error = %e, "target is not an extension of source, aborting");
        return Err(e);
    }

    if diff.is_noop() {
        info!("target already holds every source tile, nothing to do");
        return Ok(ReconcileOutcome {
            elapsed: start.elapsed(),
            ..Default::default()
        });
    }

    progress.phase("Preparing indices");
    let plan = prepare_indices(resolver.as_ref(), options, &diff, !target_tiles.is_empty()).await?;

    progress.phase("Copying tiles");
    let copied_tiles = copy_tiles(&resolver, options, &diff.unique_to_source, progress).await?;

    progress.phase("Writing indices");
    let indices_written = write_indices(resolver.as_ref(), options, plan).await?;

    let outcome = ReconcileOutcome {
        copied: copied_tiles.len(),
        copied_tiles,
        indices_written,
        elapsed: start.elapsed(),
    };
    info!(copied = outcome.copied, elapsed = ?outcome.elapsed, "reconciliation complete");
    Ok(outcome)
}

async fn prepare_indices(
    resolver: &dyn BucketResolver,
    options: &ReconcileOptions,
    diff: &TileDiff,
    target_has_tiles: bool,
) -> Result<IndexPlan> {
    let source = &options.source;
    let target = &options.target;

    let source_tiles = read_object(resolver, &source.bucket, &source.index_key(IndexKind::Tiles))
        .await?
        .ok_or_else(|| GeoAssetError::validation(format!("source raster {source} has no tiles.geojson")))?;
    let extent = read_object(resolver, &source.bucket, &source.index_key(IndexKind::Extent))
        .await?
        .ok_or_else(|| GeoAssetError::validation(format!("source raster {source} has no extent.geojson")))?;
    let source_index = TileIndex::parse(&source_tiles)?;

    let overlap = if !target_has_tiles {
        TileIndex::empty().to_bytes()?
    } else {
        match read_object(resolver, &target.bucket, &target.index_key(IndexKind::Tiles)).await? {
            Some(bytes) => bytes,
            None => {
                // Left behind by an interrupted run: describe the tiles already
                // present using the source index.
                warn!(
                    common = diff.common.len(),
                    "target has tiles but no tiles.geojson, rebuilding overlap from source index"
                );
                let rebuilt = source_index.filter_tiles(&diff.common);
                if rebuilt.len() != diff.common.len() {
                    warn!(
                        indexed = rebuilt.len(),
                        present = diff.common.len(),
                        "source tiles.geojson does not describe every target tile"
                    );
                }
                retarget(&rebuilt.to_bytes()?, source, target)?
            }
        }
    };

    let nonoverlap_index = source_index.filter_tiles(&diff.unique_to_source);
    if nonoverlap_index.len() != diff.unique_to_source.len() {
        warn!(
            indexed = nonoverlap_index.len(),
            copied = diff.unique_to_source.len(),
            "source tiles.geojson does not describe every new tile"
        );
    }

    Ok(IndexPlan {
        overlap,
        nonoverlap: nonoverlap_index.to_bytes()?,
        tiles: retarget(&source_tiles, source, target)?,
        extent,
    })
}

/// Rewrite an index document from the source raster path to the target's.
fn retarget(document: &[u8], source: &RasterUri, target: &RasterUri) -> Result<Bytes> {
    let text = std::str::from_utf8(document)
        .map_err(|e| GeoAssetError::validation(format!("tile index is not UTF-8: {e}")))?;
    Ok(Bytes::from(rewrite_raster_path(text, source, target)))
}

/// Copy tiles with at most `options.concurrency` in flight.
///
/// After the first failure no new copies start; copies already running are
/// awaited and the first error is returned.
async fn copy_tiles(
    resolver: &Arc<dyn BucketResolver>,
    options: &ReconcileOptions,
    tiles: &BTreeSet<String>,
    progress: &dyn ProgressReporter,
) -> Result<Vec<String>> {
    let total = tiles.len();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks: JoinSet<Result<String>> = JoinSet::new();
    let mut copied: Vec<String> = Vec::with_capacity(total);
    let mut first_error: Option<GeoAssetError> = None;

    info!(total, concurrency = options.concurrency, "copying tiles");

    for tile_id in tiles {
        while let Some(joined) = tasks.try_join_next() {
            record_copy(joined, &mut copied, &mut first_error, progress, total);
        }
        if first_error.is_some() {
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GeoAssetError::Process(format!("copy pool closed: {e}")))?;

        // The permit may have been freed by a failed copy.
        while let Some(joined) = tasks.try_join_next() {
            record_copy(joined, &mut copied, &mut first_error, progress, total);
        }
        if first_error.is_some() {
            break;
        }

        let resolver = resolver.clone();
        let from = options.source.tile(tile_id.clone());
        let to = options.target.tile(tile_id.clone());
        tasks.spawn(async move {
            let _permit = permit;
            copy_tile(resolver.as_ref(), &from, &to).await?;
            Ok(from.tile_id)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        record_copy(joined, &mut copied, &mut first_error, progress, total);
    }

    match first_error {
        Some(e) => {
            warn!(copied = copied.len(), total, error = %e, "tile copy failed, aborting");
            Err(e)
        }
        None => {
            copied.sort();
            Ok(copied)
        }
    }
}

fn record_copy(
    joined: std::result::Result<Result<String>, tokio::task::JoinError>,
    copied: &mut Vec<String>,
    first_error: &mut Option<GeoAssetError>,
    progress: &dyn ProgressReporter,
    total: usize,
) {
    match joined {
        Ok(Ok(tile_id)) => {
            copied.push(tile_id);
            progress.tile_copied(&copied[copied.len() - 1], copied.len(), total);
        }
        Ok(Err(e)) => {
            first_error.get_or_insert(e);
        }
        Err(e) => {
            first_error.get_or_insert(GeoAssetError::Process(format!("copy task failed: {e}")));
        }
    }
}

async fn write_indices(
    resolver: &dyn BucketResolver,
    options: &ReconcileOptions,
    plan: IndexPlan,
) -> Result<Vec<String>> {
    let target = &options.target;
    let mut writes: Vec<(RasterUri, IndexKind, Bytes)> = vec![
        (target.clone(), IndexKind::Overlap, plan.overlap.clone()),
        (target.clone(), IndexKind::Nonoverlap, plan.nonoverlap.clone()),
        (target.clone(), IndexKind::Tiles, plan.tiles),
        (target.clone(), IndexKind::Extent, plan.extent),
    ];
    if let Some(meaning) = &options.companion_pixel_meaning {
        let companion = target.with_pixel_meaning(meaning);
        writes.push((companion.clone(), IndexKind::Overlap, plan.overlap));
        writes.push((companion, IndexKind::Nonoverlap, plan.nonoverlap));
    }

    let mut written = Vec::with_capacity(writes.len());
    for (raster, kind, body) in writes {
        let key = raster.index_key(kind);
        write_object(resolver, &raster.bucket, &key, body).await?;
        info!(bucket = %raster.bucket, %key, "wrote index");
        written.push(format!("s3://{}/{key}", raster.bucket));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use geoasset_tiles::{MemoryBuckets, build_tile_index};
    use object_store::ObjectStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SOURCE: &str = "s3://lake/ds/v1/raster/epsg-4326/10/40000/year/geotiff";
    const TARGET: &str = "s3://lake/ds/v2/raster/epsg-4326/10/40000/year/geotiff";

    const A: &str = "10N_000E.tif";
    const B: &str = "10N_010E.tif";
    const C: &str = "20N_000E.tif";

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Write tiles plus generated `tiles`/`extent` indices for a raster.
    async fn seed(resolver: &dyn BucketResolver, raster: &RasterUri, tiles: &[&str]) {
        for tile in tiles {
            write_object(resolver, &raster.bucket, &raster.key(tile), Bytes::from(format!("pixels-{tile}")))
                .await
                .unwrap();
        }
        let (index, extent) = build_tile_index(raster, &set(tiles)).unwrap();
        write_object(resolver, &raster.bucket, &raster.index_key(IndexKind::Tiles), index.to_bytes().unwrap())
            .await
            .unwrap();
        write_object(resolver, &raster.bucket, &raster.index_key(IndexKind::Extent), extent.to_bytes().unwrap())
            .await
            .unwrap();
    }

    async fn read(resolver: &dyn BucketResolver, raster: &RasterUri, kind: IndexKind) -> Option<Bytes> {
        read_object(resolver, &raster.bucket, &raster.index_key(kind)).await.unwrap()
    }

    fn options() -> ReconcileOptions {
        ReconcileOptions::new(RasterUri::parse(SOURCE).unwrap(), RasterUri::parse(TARGET).unwrap())
    }

    #[tokio::test]
    async fn copies_new_tiles_and_writes_indices() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let opts = options();
        seed(buckets.as_ref(), &opts.source, &[A, B, C]).await;
        seed(buckets.as_ref(), &opts.target, &[A, B]).await;
        let prior_target_tiles = read(buckets.as_ref(), &opts.target, IndexKind::Tiles).await.unwrap();

        let outcome = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        assert_eq!(outcome.copied, 1);
        assert_eq!(outcome.copied_tiles, vec![C]);

        let copied = read_object(buckets.as_ref(), "lake", &opts.target.key(C)).await.unwrap();
        assert_eq!(copied.as_deref(), Some(format!("pixels-{C}").as_bytes()));

        let overlap = read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await.unwrap();
        assert_eq!(overlap, prior_target_tiles);

        let nonoverlap = TileIndex::parse(&read(buckets.as_ref(), &opts.target, IndexKind::Nonoverlap).await.unwrap()).unwrap();
        assert_eq!(nonoverlap.tile_ids(), vec![C]);

        let tiles_bytes = read(buckets.as_ref(), &opts.target, IndexKind::Tiles).await.unwrap();
        let tiles = TileIndex::parse(&tiles_bytes).unwrap();
        assert_eq!(tiles.tile_ids(), vec![A, B, C]);
        let text = std::str::from_utf8(&tiles_bytes).unwrap();
        assert!(text.contains("/vsis3/lake/ds/v2/raster/"));
        assert!(!text.contains("/ds/v1/"));

        let source_extent = read(buckets.as_ref(), &opts.source, IndexKind::Extent).await.unwrap();
        let target_extent = read(buckets.as_ref(), &opts.target, IndexKind::Extent).await.unwrap();
        assert_eq!(source_extent, target_extent);

        assert_eq!(outcome.indices_written.len(), 4);
        assert!(outcome.indices_written[0].ends_with("overlap.geojson"));
        assert!(outcome.indices_written[3].ends_with("extent.geojson"));
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let opts = options();
        seed(buckets.as_ref(), &opts.source, &[A, B, C]).await;
        seed(buckets.as_ref(), &opts.target, &[A, B]).await;

        reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        let overlap_after_first = read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await;

        let second = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        assert_eq!(second.copied, 0);
        assert!(second.indices_written.is_empty());
        assert_eq!(read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await, overlap_after_first);
    }

    #[tokio::test]
    async fn extra_target_tile_aborts_without_mutation() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let opts = options();
        seed(buckets.as_ref(), &opts.source, &[A, B]).await;
        seed(buckets.as_ref(), &opts.target, &[A, C]).await;
        let tiles_before = read(buckets.as_ref(), &opts.target, IndexKind::Tiles).await;

        let err = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap_err();
        match err {
            GeoAssetError::IntegrityViolation { unique_to_target } => {
                assert_eq!(unique_to_target, vec![C.to_string()]);
            }
            other => panic!("unexpected {other}"),
        }

        let target_tiles = list_tile_names(buckets.as_ref(), &opts.target, ".tif").await.unwrap();
        assert_eq!(target_tiles, set(&[A, C]));
        assert_eq!(read(buckets.as_ref(), &opts.target, IndexKind::Tiles).await, tiles_before);
        assert!(read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await.is_none());
        assert!(read(buckets.as_ref(), &opts.target, IndexKind::Nonoverlap).await.is_none());
    }

    #[tokio::test]
    async fn empty_target_gets_empty_overlap() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let opts = options();
        seed(buckets.as_ref(), &opts.source, &[A, B]).await;

        let outcome = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        assert_eq!(outcome.copied, 2);
        let overlap = TileIndex::parse(&read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await.unwrap()).unwrap();
        assert!(overlap.is_empty());
    }

    #[tokio::test]
    async fn target_tiles_without_index_rebuilds_overlap() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let opts = options();
        seed(buckets.as_ref(), &opts.source, &[A, B]).await;
        write_object(buckets.as_ref(), "lake", &opts.target.key(A), Bytes::from_static(b"x"))
            .await
            .unwrap();

        let outcome = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        assert_eq!(outcome.copied_tiles, vec![B]);

        let overlap_bytes = read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await.unwrap();
        assert_eq!(TileIndex::parse(&overlap_bytes).unwrap().tile_ids(), vec![A]);
        let text = std::str::from_utf8(&overlap_bytes).unwrap();
        assert!(text.contains("/vsis3/lake/ds/v2/raster/"));
        assert!(!text.contains("/ds/v1/"));

        let tiles = TileIndex::parse(&read(buckets.as_ref(), &opts.target, IndexKind::Tiles).await.unwrap()).unwrap();
        assert_eq!(tiles.tile_ids(), vec![A, B]);
    }

    #[tokio::test]
    async fn companion_receives_overlap_pair() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let mut opts = options();
        opts.companion_pixel_meaning = Some("intensity".into());
        seed(buckets.as_ref(), &opts.source, &[A, B, C]).await;
        seed(buckets.as_ref(), &opts.target, &[A]).await;

        let outcome = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        assert_eq!(outcome.indices_written.len(), 6);

        let companion = opts.target.with_pixel_meaning("intensity");
        assert_eq!(
            read(buckets.as_ref(), &companion, IndexKind::Overlap).await,
            read(buckets.as_ref(), &opts.target, IndexKind::Overlap).await
        );
        assert_eq!(
            read(buckets.as_ref(), &companion, IndexKind::Nonoverlap).await,
            read(buckets.as_ref(), &opts.target, IndexKind::Nonoverlap).await
        );
        assert!(read(buckets.as_ref(), &companion, IndexKind::Tiles).await.is_none());
    }

    #[tokio::test]
    async fn cross_bucket_reconcile() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let opts = ReconcileOptions::new(
            RasterUri::parse(SOURCE).unwrap(),
            RasterUri::parse("s3://archive/ds/v2/raster/epsg-4326/10/40000/year/geotiff").unwrap(),
        );
        seed(buckets.as_ref(), &opts.source, &[A, B]).await;

        let outcome = reconcile(buckets.clone(), &opts, &SilentProgress).await.unwrap();
        assert_eq!(outcome.copied, 2);
        let tiles = read(buckets.as_ref(), &opts.target, IndexKind::Tiles).await.unwrap();
        assert!(std::str::from_utf8(&tiles).unwrap().contains("/vsis3/archive/ds/v2/"));
    }

    /// Serves bucket `dst` for its first `allowed` lookups, then fails.
    struct FlakyBuckets {
        inner: MemoryBuckets,
        lookups: AtomicUsize,
        allowed: AtomicUsize,
    }

    impl FlakyBuckets {
        fn new(allowed: usize) -> Self {
            Self {
                inner: MemoryBuckets::new(),
                lookups: AtomicUsize::new(0),
                allowed: AtomicUsize::new(allowed),
            }
        }

        fn heal(&self) {
            self.allowed.store(usize::MAX, Ordering::SeqCst);
        }
    }

    impl BucketResolver for FlakyBuckets {
        fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
            if bucket == "dst"
                && self.lookups.fetch_add(1, Ordering::SeqCst) >= self.allowed.load(Ordering::SeqCst)
            {
                return Err(GeoAssetError::Storage("bucket dst unavailable".into()));
            }
            self.inner.store(bucket)
        }
    }

    #[tokio::test]
    async fn copy_failure_writes_no_index() {
        let flaky = Arc::new(FlakyBuckets::new(1));
        let opts = dst_options();
        seed(&flaky.inner, &opts.source, &[A, B, C]).await;

        let resolver: Arc<dyn BucketResolver> = flaky.clone();
        let err = reconcile(resolver, &opts, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, GeoAssetError::Storage(_)));

        for kind in IndexKind::ALL {
            assert!(read(&flaky.inner, &opts.target, kind).await.is_none());
        }
    }

    fn dst_options() -> ReconcileOptions {
        ReconcileOptions::new(
            RasterUri::parse(SOURCE).unwrap(),
            RasterUri::parse("s3://dst/ds/v2/raster/epsg-4326/10/40000/year/geotiff").unwrap(),
        )
    }

    #[tokio::test]
    async fn interrupted_run_resumes_on_rerun() {
        const D: &str = "00N_000E.tif";
        const E: &str = "30N_000E.tif";

        // Listing takes one lookup, then each cross-bucket copy takes one.
        let flaky = Arc::new(FlakyBuckets::new(3));
        let mut opts = dst_options();
        opts.concurrency = 1;
        seed(&flaky.inner, &opts.source, &[D, A, C, E]).await;

        let resolver: Arc<dyn BucketResolver> = flaky.clone();
        let err = reconcile(resolver.clone(), &opts, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, GeoAssetError::Storage(_)));

        // Copies stop at the first failure.
        let left = list_tile_names(&flaky.inner, &opts.target, ".tif").await.unwrap();
        assert_eq!(left, set(&[D, A]));
        for kind in IndexKind::ALL {
            assert!(read(&flaky.inner, &opts.target, kind).await.is_none());
        }

        flaky.heal();
        let outcome = reconcile(resolver, &opts, &SilentProgress).await.unwrap();
        assert_eq!(outcome.copied_tiles, vec![C, E]);

        let overlap_bytes = read(&flaky.inner, &opts.target, IndexKind::Overlap).await.unwrap();
        assert_eq!(TileIndex::parse(&overlap_bytes).unwrap().tile_ids(), vec![D, A]);
        assert!(std::str::from_utf8(&overlap_bytes).unwrap().contains("/vsis3/dst/ds/v2/"));

        let nonoverlap = TileIndex::parse(&read(&flaky.inner, &opts.target, IndexKind::Nonoverlap).await.unwrap()).unwrap();
        assert_eq!(nonoverlap.tile_ids(), vec![C, E]);
        let tiles = TileIndex::parse(&read(&flaky.inner, &opts.target, IndexKind::Tiles).await.unwrap()).unwrap();
        assert_eq!(tiles.tile_ids(), vec![D, A, C, E]);
        assert!(read(&flaky.inner, &opts.target, IndexKind::Extent).await.is_some());
    }

    struct RecordingProgress {
        copied: Mutex<Vec<(String, usize, usize)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, _name: &str) {}
        fn tile_copied(&self, tile_id: &str, current: usize, total: usize) {
            self.copied.lock().unwrap().push((tile_id.to_string(), current, total));
        }
        fn row_enriched(&self, _id: &str, _current: usize, _total: usize) {}
    }

    #[tokio::test]
    async fn bounded_pool_reports_every_copy() {
        let buckets: Arc<dyn BucketResolver> = Arc::new(MemoryBuckets::new());
        let mut opts = options();
        opts.concurrency = 2;
        let names: Vec<String> = (0..9).map(|i| format!("{:02}N_000E.tif", i * 10 % 90)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        seed(buckets.as_ref(), &opts.source, &refs).await;

        let progress = RecordingProgress { copied: Mutex::new(Vec::new()) };
        let outcome = reconcile(buckets.clone(), &opts, &progress).await.unwrap();
        assert_eq!(outcome.copied, 9);

        let events = progress.copied.lock().unwrap();
        assert_eq!(events.len(), 9);
        assert!(events.iter().all(|(_, _, total)| *total == 9));
        assert_eq!(events.last().unwrap().1, 9);
    }
}
