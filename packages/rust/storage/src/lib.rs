//! libSQL storage layer for spatial tables.
//!
//! The [`Storage`] struct wraps a libSQL database holding:
//! - staging tables: raw geometries (or lon/lat pairs) awaiting enrichment
//! - target tables: enriched rows with area, identity, bbox and projection
//! - `enrichment_runs`: one bookkeeping row per enrichment run
//!
//! Geometries are stored as GeoJSON text. Table and column names are
//! interpolated into SQL, so every identifier passes [`validate_identifier`].

mod migrations;

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use geoasset_shared::{GeoAssetError, Result};
use libsql::{Connection, Database, params};
use regex::Regex;
use uuid::Uuid;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Reject anything that is not a plain SQL identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(GeoAssetError::validation(format!(
            "invalid table or column name '{name}'"
        )))
    }
}

fn storage_err(e: libsql::Error) -> GeoAssetError {
    GeoAssetError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One row of a staging table.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingRow {
    pub id: String,
    /// GeoJSON geometry text; `None` until synthesized from lon/lat.
    pub geom: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    /// JSON object of passthrough attributes.
    pub properties: String,
}

/// An enriched row ready to be merged into a target table.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    pub id: String,
    /// Source geometry (GeoJSON, lon/lat).
    pub geom: String,
    /// Web-Mercator geometry (GeoJSON).
    pub geom_wm: String,
    pub area_ha: f64,
    pub content_id: String,
    pub geojson_text: String,
    pub bbox: [f64; 4],
    pub properties: String,
}

/// A stored target row, as read back.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub id: String,
    pub area_ha: f64,
    pub content_id: String,
    pub geojson_text: String,
    pub bbox: Vec<f64>,
    pub properties: String,
    pub created_on: String,
    pub updated_on: String,
}

/// Counts produced by [`Storage::merge_enriched`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

/// A recorded enrichment run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRun {
    pub id: String,
    pub target_table: String,
    pub staging_table: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats: Option<MergeStats>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GeoAssetError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        GeoAssetError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Staging tables
    // -----------------------------------------------------------------------

    /// Create a staging table if it does not exist.
    pub async fn create_staging_table(&self, table: &str) -> Result<()> {
        validate_identifier(table)?;
        let sql = format!(
            r#"CREATE TABLE IF NOT EXISTS "{table}" (
                id         TEXT PRIMARY KEY,
                geom       TEXT,
                longitude  REAL,
                latitude   REAL,
                properties TEXT NOT NULL DEFAULT '{{}}'
            )"#
        );
        self.conn.execute(&sql, params![]).await.map_err(storage_err)?;
        Ok(())
    }

    /// Insert or replace one staging row.
    pub async fn insert_staging_row(&self, table: &str, row: &StagingRow) -> Result<()> {
        validate_identifier(table)?;
        let sql = format!(
            r#"INSERT OR REPLACE INTO "{table}" (id, geom, longitude, latitude, properties)
               VALUES (?1, ?2, ?3, ?4, ?5)"#
        );
        self.conn
            .execute(
                &sql,
                params![
                    row.id.as_str(),
                    row.geom.as_deref(),
                    row.longitude,
                    row.latitude,
                    row.properties.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Fill `geom` with a GeoJSON point built from longitude/latitude.
    ///
    /// Only rows whose geometry is unset are touched, so re-running is safe.
    /// Returns the number of rows updated.
    pub async fn synthesize_points(&self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        let sql = format!(
            r#"UPDATE "{table}"
               SET geom = json_object('type', 'Point', 'coordinates', json_array(longitude, latitude))
               WHERE geom IS NULL AND longitude IS NOT NULL AND latitude IS NOT NULL"#
        );
        self.conn.execute(&sql, params![]).await.map_err(storage_err)
    }

    /// Ids of staging rows that still have no geometry.
    pub async fn rows_missing_geometry(&self, table: &str) -> Result<Vec<String>> {
        validate_identifier(table)?;
        let sql = format!(r#"SELECT id FROM "{table}" WHERE geom IS NULL ORDER BY id"#);
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            ids.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(ids)
    }

    /// Load every staging row, ordered by id.
    pub async fn load_staging(&self, table: &str) -> Result<Vec<StagingRow>> {
        validate_identifier(table)?;
        let sql = format!(
            r#"SELECT id, geom, longitude, latitude, properties FROM "{table}" ORDER BY id"#
        );
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(StagingRow {
                id: row.get::<String>(0).map_err(storage_err)?,
                geom: row.get::<String>(1).ok(),
                longitude: row.get::<f64>(2).ok(),
                latitude: row.get::<f64>(3).ok(),
                properties: row.get::<String>(4).unwrap_or_else(|_| "{}".into()),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Target tables
    // -----------------------------------------------------------------------

    /// Create an enriched target table and its `content_id` index.
    pub async fn ensure_target_table(&self, table: &str, geom_column: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(geom_column)?;
        let sql = format!(
            r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    id            TEXT PRIMARY KEY,
    "{geom_column}"    TEXT NOT NULL,
    "{geom_column}_wm" TEXT NOT NULL,
    area_ha       REAL NOT NULL,
    content_id    TEXT NOT NULL,
    geojson_text  TEXT NOT NULL,
    bbox          TEXT NOT NULL CHECK (json_valid(bbox) AND json_array_length(bbox) = 4),
    properties    TEXT NOT NULL DEFAULT '{{}}',
    created_on    TEXT NOT NULL,
    updated_on    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_{table}_content_id" ON "{table}"(content_id);
"#
        );
        self.conn.execute_batch(&sql).await.map_err(storage_err)?;
        Ok(())
    }

    /// Current `(geojson_text, properties)` per id in a target table.
    async fn target_fingerprints(&self, table: &str) -> Result<HashMap<String, (String, String)>> {
        let sql = format!(r#"SELECT id, geojson_text, properties FROM "{table}""#);
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;

        let mut map = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            map.insert(
                row.get::<String>(0).map_err(storage_err)?,
                (
                    row.get::<String>(1).map_err(storage_err)?,
                    row.get::<String>(2).unwrap_or_default(),
                ),
            );
        }
        Ok(map)
    }

    /// Upsert enriched rows by id inside one transaction.
    ///
    /// - new ids are inserted
    /// - rows whose geometry changed get every derived field rewritten
    /// - rows where only properties changed keep their derived fields
    /// - rows with identical geometry and properties are left untouched
    pub async fn merge_enriched(
        &self,
        table: &str,
        geom_column: &str,
        rows: &[TargetRow],
    ) -> Result<MergeStats> {
        validate_identifier(table)?;
        validate_identifier(geom_column)?;

        let existing = self.target_fingerprints(table).await?;
        let now = Utc::now().to_rfc3339();

        let insert_sql = format!(
            r#"INSERT INTO "{table}"
               (id, "{geom_column}", "{geom_column}_wm", area_ha, content_id, geojson_text, bbox, properties, created_on, updated_on)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"#
        );
        let update_geometry_sql = format!(
            r#"UPDATE "{table}" SET
               "{geom_column}" = ?2, "{geom_column}_wm" = ?3, area_ha = ?4, content_id = ?5,
               geojson_text = ?6, bbox = ?7, properties = ?8, updated_on = ?9
               WHERE id = ?1"#
        );
        let update_properties_sql =
            format!(r#"UPDATE "{table}" SET properties = ?2, updated_on = ?3 WHERE id = ?1"#);

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let mut stats = MergeStats::default();

        for row in rows {
            let bbox = serde_json::to_string(&row.bbox)
                .map_err(|e| GeoAssetError::Storage(e.to_string()))?;

            match existing.get(&row.id) {
                Some((text, props)) if *text == row.geojson_text && *props == row.properties => {
                    stats.unchanged += 1;
                }
                Some((text, _)) if *text == row.geojson_text => {
                    tx.execute(
                        &update_properties_sql,
                        params![row.id.as_str(), row.properties.as_str(), now.as_str()],
                    )
                    .await
                    .map_err(storage_err)?;
                    stats.updated += 1;
                }
                Some(_) => {
                    tx.execute(
                        &update_geometry_sql,
                        params![
                            row.id.as_str(),
                            row.geom.as_str(),
                            row.geom_wm.as_str(),
                            row.area_ha,
                            row.content_id.as_str(),
                            row.geojson_text.as_str(),
                            bbox.as_str(),
                            row.properties.as_str(),
                            now.as_str()
                        ],
                    )
                    .await
                    .map_err(storage_err)?;
                    stats.updated += 1;
                }
                None => {
                    tx.execute(
                        &insert_sql,
                        params![
                            row.id.as_str(),
                            row.geom.as_str(),
                            row.geom_wm.as_str(),
                            row.area_ha,
                            row.content_id.as_str(),
                            row.geojson_text.as_str(),
                            bbox.as_str(),
                            row.properties.as_str(),
                            now.as_str()
                        ],
                    )
                    .await
                    .map_err(storage_err)?;
                    stats.inserted += 1;
                }
            }
        }

        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(
            table,
            inserted = stats.inserted,
            updated = stats.updated,
            unchanged = stats.unchanged,
            "merged enriched rows"
        );
        Ok(stats)
    }

    /// Read one target row by id.
    pub async fn get_target_row(&self, table: &str, id: &str) -> Result<Option<TargetRecord>> {
        validate_identifier(table)?;
        let sql = format!(
            r#"SELECT id, area_ha, content_id, geojson_text, bbox, properties, created_on, updated_on
               FROM "{table}" WHERE id = ?1"#
        );
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_target_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Number of rows in a table.
    pub async fn count_rows(&self, table: &str) -> Result<u64> {
        validate_identifier(table)?;
        let sql = format!(r#"SELECT COUNT(*) FROM "{table}""#);
        let mut rows = self.conn.query(&sql, params![]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).unwrap_or(0) as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Enrichment runs
    // -----------------------------------------------------------------------

    /// Record the start of an enrichment run. Returns the run ID.
    pub async fn insert_enrichment_run(&self, target_table: &str, staging_table: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO enrichment_runs (id, target_table, staging_table, started_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), target_table, staging_table, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Mark an enrichment run finished with its merge counts.
    pub async fn finish_enrichment_run(&self, run_id: &str, stats: &MergeStats) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE enrichment_runs
                 SET finished_at = ?1, rows_inserted = ?2, rows_updated = ?3, rows_unchanged = ?4
                 WHERE id = ?5",
                params![
                    now.as_str(),
                    stats.inserted as i64,
                    stats.updated as i64,
                    stats.unchanged as i64,
                    run_id
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Runs against a target table, oldest first.
    pub async fn list_enrichment_runs(&self, target_table: &str) -> Result<Vec<EnrichmentRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, target_table, staging_table, started_at, finished_at,
                        rows_inserted, rows_updated, rows_unchanged
                 FROM enrichment_runs WHERE target_table = ?1 ORDER BY started_at, id",
                params![target_table],
            )
            .await
            .map_err(storage_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let finished_at: Option<String> = row.get(4).ok();
            let stats = match (
                row.get::<i64>(5).ok(),
                row.get::<i64>(6).ok(),
                row.get::<i64>(7).ok(),
            ) {
                (Some(inserted), Some(updated), Some(unchanged)) => Some(MergeStats {
                    inserted: inserted as u64,
                    updated: updated as u64,
                    unchanged: unchanged as u64,
                }),
                _ => None,
            };
            runs.push(EnrichmentRun {
                id: row.get::<String>(0).map_err(storage_err)?,
                target_table: row.get::<String>(1).map_err(storage_err)?,
                staging_table: row.get::<String>(2).map_err(storage_err)?,
                started_at: row.get::<String>(3).map_err(storage_err)?,
                finished_at,
                stats,
            });
        }
        Ok(runs)
    }
}

fn row_to_target_record(row: &libsql::Row) -> Result<TargetRecord> {
    let bbox_text = row.get::<String>(4).map_err(storage_err)?;
    let bbox: Vec<f64> = serde_json::from_str(&bbox_text)
        .map_err(|e| GeoAssetError::Storage(format!("malformed bbox '{bbox_text}': {e}")))?;

    Ok(TargetRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        area_ha: row.get::<f64>(1).map_err(storage_err)?,
        content_id: row.get::<String>(2).map_err(storage_err)?,
        geojson_text: row.get::<String>(3).map_err(storage_err)?,
        bbox,
        properties: row.get::<String>(5).unwrap_or_else(|_| "{}".into()),
        created_on: row.get::<String>(6).map_err(storage_err)?,
        updated_on: row.get::<String>(7).map_err(storage_err)?,
    })
}
