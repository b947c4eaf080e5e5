//! Tile index generation for grid rasters.

use tracing::{info, instrument};

use geoasset_shared::Result;
use geoasset_tiles::{BucketResolver, IndexKind, RasterUri, build_tile_index, list_tile_names, write_object};

use crate::pipeline::ProgressReporter;

/// Outcome of [`build_index`].
#[derive(Debug, Clone)]
pub struct BuildIndexResult {
    /// Tiles described by the new `tiles.geojson`.
    pub tiles: usize,
    /// `s3://` URIs of the documents written.
    pub written: Vec<String>,
}

/// List a raster's tiles and (re)write its `tiles` and `extent` documents.
#[instrument(skip_all, fields(raster = %raster))]
pub async fn build_index(
    resolver: &dyn BucketResolver,
    raster: &RasterUri,
    tile_extension: &str,
    progress: &dyn ProgressReporter,
) -> Result<BuildIndexResult> {
    progress.phase("Listing tiles");
    let names = list_tile_names(resolver, raster, tile_extension).await?;

    progress.phase("Building indices");
    let (tiles, extent) = build_tile_index(raster, &names)?;

    progress.phase("Writing indices");
    let mut written = Vec::with_capacity(2);
    for (kind, document) in [(IndexKind::Tiles, &tiles), (IndexKind::Extent, &extent)] {
        let key = raster.index_key(kind);
        write_object(resolver, &raster.bucket, &key, document.to_bytes()?).await?;
        written.push(format!("s3://{}/{key}", raster.bucket));
    }

    info!(tiles = names.len(), "wrote tile indices");
    Ok(BuildIndexResult {
        tiles: names.len(),
        written,
    })
}
