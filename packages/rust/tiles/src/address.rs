//! Raster addressing over the storage layout convention:
//!
//! `s3://{bucket}/{dataset}/{version}/raster/{crs}/{resolution}/{block_size}/{pixel_meaning}/{format}/{tile_id}`
//!
//! with sibling index documents (`tiles.geojson`, `extent.geojson`, and
//! during reconciliation `overlap.geojson`, `nonoverlap.geojson`) next to
//! the tiles at the `{format}/` level.

use std::fmt;

use url::Url;

use geoasset_shared::{GeoAssetError, Result};

/// Path segments from `{dataset}` through `{format}`.
const RASTER_SEGMENTS: usize = 8;

// ---------------------------------------------------------------------------
// RasterDescriptor / RasterUri
// ---------------------------------------------------------------------------

/// The segments that describe one raster of a dataset version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterDescriptor {
    pub crs: String,
    pub resolution: String,
    pub block_size: String,
    pub pixel_meaning: String,
    pub format: String,
}

/// One logical raster: a bucket plus dataset, version and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterUri {
    pub bucket: String,
    pub dataset: String,
    pub version: String,
    pub descriptor: RasterDescriptor,
}

impl RasterUri {
    /// Parse an `s3://` URI. Anything after `{format}` is ignored.
    pub fn parse(uri: &str) -> Result<Self> {
        let url = Url::parse(uri).map_err(|e| GeoAssetError::invalid_address(uri, e.to_string()))?;
        if url.scheme() != "s3" {
            return Err(GeoAssetError::invalid_address(
                uri,
                format!("unsupported scheme '{}', expected s3", url.scheme()),
            ));
        }

        let bucket = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(GeoAssetError::invalid_address(uri, "missing bucket")),
        };

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.take(RASTER_SEGMENTS).collect())
            .unwrap_or_default();
        if segments.len() < RASTER_SEGMENTS {
            return Err(GeoAssetError::invalid_address(
                uri,
                format!(
                    "expected {RASTER_SEGMENTS} path segments after the bucket, found {}",
                    segments.len()
                ),
            ));
        }
        if let Some(pos) = segments.iter().position(|s| s.is_empty()) {
            return Err(GeoAssetError::invalid_address(
                uri,
                format!("path segment {} is empty", pos + 1),
            ));
        }
        if segments[2] != "raster" {
            return Err(GeoAssetError::invalid_address(
                uri,
                format!("expected 'raster' after the version, found '{}'", segments[2]),
            ));
        }

        Ok(Self {
            bucket,
            dataset: segments[0].to_string(),
            version: segments[1].to_string(),
            descriptor: RasterDescriptor {
                crs: segments[3].to_string(),
                resolution: segments[4].to_string(),
                block_size: segments[5].to_string(),
                pixel_meaning: segments[6].to_string(),
                format: segments[7].to_string(),
            },
        })
    }

    /// `{dataset}/{version}/raster/{crs}/{resolution}/{block_size}/{pixel_meaning}/`
    pub fn raster_path(&self) -> String {
        let d = &self.descriptor;
        format!(
            "{}/{}/raster/{}/{}/{}/{}/",
            self.dataset, self.version, d.crs, d.resolution, d.block_size, d.pixel_meaning
        )
    }

    /// Object key prefix of the `{format}/` directory, without trailing slash.
    pub fn format_prefix(&self) -> String {
        format!("{}{}", self.raster_path(), self.descriptor.format)
    }

    /// Object key of a file directly under `{format}/`.
    pub fn key(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.format_prefix())
    }

    pub fn index_key(&self, kind: IndexKind) -> String {
        self.key(kind.file_name())
    }

    pub fn tile(&self, tile_id: impl Into<String>) -> TileAddress {
        TileAddress {
            raster: self.clone(),
            tile_id: tile_id.into(),
        }
    }

    /// The sibling raster with a different pixel meaning.
    pub fn with_pixel_meaning(&self, pixel_meaning: &str) -> Self {
        let mut sibling = self.clone();
        sibling.descriptor.pixel_meaning = pixel_meaning.to_string();
        sibling
    }

    /// GDAL virtual path of an object in this raster's bucket.
    pub fn vsis3_path(&self, key: &str) -> String {
        format!("/vsis3/{}/{key}", self.bucket)
    }
}

impl fmt::Display for RasterUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.format_prefix())
    }
}

// ---------------------------------------------------------------------------
// TileAddress / IndexKind
// ---------------------------------------------------------------------------

/// One tile within a raster. `tile_id` is the file name, extension included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub raster: RasterUri,
    pub tile_id: String,
}

impl TileAddress {
    pub fn bucket(&self) -> &str {
        &self.raster.bucket
    }

    pub fn key(&self) -> String {
        self.raster.key(&self.tile_id)
    }
}

/// Index documents kept next to the tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Tiles,
    Extent,
    Overlap,
    Nonoverlap,
}

impl IndexKind {
    pub const ALL: [IndexKind; 4] = [Self::Tiles, Self::Extent, Self::Overlap, Self::Nonoverlap];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Tiles => "tiles.geojson",
            Self::Extent => "extent.geojson",
            Self::Overlap => "overlap.geojson",
            Self::Nonoverlap => "nonoverlap.geojson",
        }
    }

    pub fn is_index_file(name: &str) -> bool {
        Self::ALL.iter().any(|kind| kind.file_name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "s3://gfw-data-lake/umd_tree_cover_loss/v1.9/raster/epsg-4326/10/40000/year/geotiff";

    #[test]
    fn parses_full_layout() {
        let raster = RasterUri::parse(URI).unwrap();
        assert_eq!(raster.bucket, "gfw-data-lake");
        assert_eq!(raster.dataset, "umd_tree_cover_loss");
        assert_eq!(raster.version, "v1.9");
        assert_eq!(raster.descriptor.crs, "epsg-4326");
        assert_eq!(raster.descriptor.resolution, "10");
        assert_eq!(raster.descriptor.block_size, "40000");
        assert_eq!(raster.descriptor.pixel_meaning, "year");
        assert_eq!(raster.descriptor.format, "geotiff");
        assert_eq!(raster.to_string(), URI);
    }

    #[test]
    fn trailing_parts_are_ignored() {
        let a = RasterUri::parse(&format!("{URI}/*.tif")).unwrap();
        let b = RasterUri::parse(&format!("{URI}/tiles.geojson")).unwrap();
        let c = RasterUri::parse(&format!("{URI}/")).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn keys_follow_layout() {
        let raster = RasterUri::parse(URI).unwrap();
        assert_eq!(
            raster.raster_path(),
            "umd_tree_cover_loss/v1.9/raster/epsg-4326/10/40000/year/"
        );
        assert_eq!(
            raster.index_key(IndexKind::Nonoverlap),
            "umd_tree_cover_loss/v1.9/raster/epsg-4326/10/40000/year/geotiff/nonoverlap.geojson"
        );
        assert_eq!(
            raster.tile("10N_020E.tif").key(),
            "umd_tree_cover_loss/v1.9/raster/epsg-4326/10/40000/year/geotiff/10N_020E.tif"
        );
        assert_eq!(
            raster.vsis3_path("a/b.tif"),
            "/vsis3/gfw-data-lake/a/b.tif"
        );
    }

    #[test]
    fn companion_changes_only_pixel_meaning() {
        let raster = RasterUri::parse(URI).unwrap();
        let sibling = raster.with_pixel_meaning("intensity");
        assert_eq!(sibling.descriptor.pixel_meaning, "intensity");
        assert_eq!(sibling.version, raster.version);
        assert_eq!(sibling.descriptor.format, raster.descriptor.format);
    }

    #[test]
    fn rejects_malformed_addresses() {
        let cases = [
            "s3://bucket/ds/v1/raster/epsg-4326/10/40000",
            "gs://bucket/ds/v1/raster/epsg-4326/10/40000/year/geotiff",
            "s3://bucket/ds/v1/vector/epsg-4326/10/40000/year/geotiff",
            "s3://bucket/ds//raster/epsg-4326/10/40000/year/geotiff",
            "not a uri",
        ];
        for uri in cases {
            let err = RasterUri::parse(uri).unwrap_err();
            assert!(
                matches!(err, GeoAssetError::InvalidAddress { .. }),
                "{uri}: {err}"
            );
        }
    }

    #[test]
    fn index_files_are_recognised() {
        assert!(IndexKind::is_index_file("tiles.geojson"));
        assert!(IndexKind::is_index_file("overlap.geojson"));
        assert!(!IndexKind::is_index_file("10N_020E.tif"));
    }
}
