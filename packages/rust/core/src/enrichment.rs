//! Geometry enrichment workflow.
//!
//! Loads a staging table, derives area, identity, bbox and projection for
//! every row, then merges the result into an enriched target table in one
//! transaction. Any bad row aborts the whole batch before anything is written.

use std::time::Instant;

use tracing::{info, instrument, warn};

use geoasset_geometry::{enrich_geometry, parse_geometry, to_geojson_text};
use geoasset_shared::{GeoAssetError, Result};
use geoasset_storage::{MergeStats, StagingRow, Storage, TargetRow, validate_identifier};

use crate::pipeline::ProgressReporter;

/// Which tables an enrichment run reads and writes.
#[derive(Debug, Clone)]
pub struct EnrichTableConfig {
    pub staging_table: String,
    pub target_table: String,
    /// Name of the geometry column in the target table; its projected twin is
    /// `{geometry_column}_wm`.
    pub geometry_column: String,
    /// Synthesize point geometries from longitude/latitude first.
    pub points: bool,
}

impl EnrichTableConfig {
    pub fn new(staging_table: impl Into<String>, target_table: impl Into<String>) -> Self {
        Self {
            staging_table: staging_table.into(),
            target_table: target_table.into(),
            geometry_column: "geom".into(),
            points: false,
        }
    }
}

/// Summary of one enrichment run.
#[derive(Debug, Clone)]
pub struct EnrichTableResult {
    pub run_id: String,
    /// Rows read from staging.
    pub rows: usize,
    /// Point geometries synthesized from longitude/latitude.
    pub points_synthesized: u64,
    pub stats: MergeStats,
    pub elapsed: std::time::Duration,
}

/// Enrich a staging table into its target table.
#[instrument(skip_all, fields(staging = %config.staging_table, target = %config.target_table))]
pub async fn enrich_table(
    storage: &Storage,
    config: &EnrichTableConfig,
    progress: &dyn ProgressReporter,
) -> Result<EnrichTableResult> {
    let start = Instant::now();
    validate_identifier(&config.staging_table)?;
    validate_identifier(&config.target_table)?;
    validate_identifier(&config.geometry_column)?;

    // --- Phase 1: Point synthesis ---
    let points_synthesized = if config.points {
        progress.phase("Synthesizing points");
        let n = storage.synthesize_points(&config.staging_table).await?;
        info!(rows = n, "synthesized point geometries");
        n
    } else {
        0
    };

    let missing = storage.rows_missing_geometry(&config.staging_table).await?;
    if !missing.is_empty() {
        warn!(count = missing.len(), "staging rows without geometry");
        return Err(GeoAssetError::validation(format!(
            "{} staging row(s) have no geometry: {}",
            missing.len(),
            preview(&missing)
        )));
    }

    // --- Phase 2: Enrich in memory ---
    progress.phase("Enriching geometries");
    let staged = storage.load_staging(&config.staging_table).await?;
    let total = staged.len();
    let mut enriched = Vec::with_capacity(total);
    for (i, row) in staged.iter().enumerate() {
        enriched.push(enrich_row(row)?);
        progress.row_enriched(&row.id, i + 1, total);
    }
    info!(rows = total, "enriched staging rows");

    // --- Phase 3: Merge ---
    progress.phase("Merging into target");
    storage
        .ensure_target_table(&config.target_table, &config.geometry_column)
        .await?;
    let run_id = storage
        .insert_enrichment_run(&config.target_table, &config.staging_table)
        .await?;
    let stats = storage
        .merge_enriched(&config.target_table, &config.geometry_column, &enriched)
        .await?;
    storage.finish_enrichment_run(&run_id, &stats).await?;

    let elapsed = start.elapsed();
    info!(
        run_id,
        inserted = stats.inserted,
        updated = stats.updated,
        unchanged = stats.unchanged,
        elapsed = ?elapsed,
        "enrichment complete"
    );

    Ok(EnrichTableResult {
        run_id,
        rows: total,
        points_synthesized,
        stats,
        elapsed,
    })
}

/// Derive every target field for one staging row.
fn enrich_row(row: &StagingRow) -> Result<TargetRow> {
    let with_id = |e: GeoAssetError| GeoAssetError::Geometry(format!("row '{}': {e}", row.id));

    let text = row
        .geom
        .as_deref()
        .ok_or_else(|| GeoAssetError::Geometry(format!("row '{}': geometry is missing", row.id)))?;
    let geometry = parse_geometry(text).map_err(with_id)?;
    let enriched = enrich_geometry(geometry).map_err(with_id)?;
    let geom_wm = to_geojson_text(&enriched.projected).map_err(with_id)?;

    Ok(TargetRow {
        id: row.id.clone(),
        geom: enriched.geojson_text.clone(),
        geom_wm,
        area_ha: enriched.area_ha,
        content_id: enriched.content_id.to_string(),
        geojson_text: enriched.geojson_text,
        bbox: enriched.bbox,
        properties: row.properties.clone(),
    })
}

fn preview(ids: &[String]) -> String {
    const SHOWN: usize = 5;
    let mut text = ids.iter().take(SHOWN).cloned().collect::<Vec<_>>().join(", ");
    if ids.len() > SHOWN {
        text.push_str(&format!(", ... ({} more)", ids.len() - SHOWN));
    }
    text
}
