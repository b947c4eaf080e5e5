//! Tile index documents (GeoJSON feature collections).
//!
//! Each feature describes one tile: a footprint polygon plus properties
//! `{"name": "/vsis3/{bucket}/{key}", "extent": [xmin, ymin, xmax, ymax]}`.
//! The tile identifier of a feature is the last path segment of `name`.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use bytes::Bytes;
use geo::{BooleanOps, MultiPolygon, Polygon, Rect, coord};
use geojson::{Feature, FeatureCollection, JsonObject};
use regex::Regex;
use serde_json::json;

use geoasset_shared::{GeoAssetError, Result};

use crate::address::RasterUri;

/// CRS segment of rasters whose resolution is a grid size in degrees.
pub const GRID_CRS: &str = "epsg-4326";

static GRID_TILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2})([NS])_(\d{3})([EW])").expect("valid grid tile regex")
});

// ---------------------------------------------------------------------------
// TileIndex
// ---------------------------------------------------------------------------

/// A parsed tile index document.
#[derive(Debug, Clone, PartialEq)]
pub struct TileIndex {
    collection: FeatureCollection,
}

impl TileIndex {
    pub fn empty() -> Self {
        Self::from_features(Vec::new())
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self {
            collection: FeatureCollection {
                bbox: None,
                features,
                foreign_members: None,
            },
        }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_slice(bytes)
            .map_err(|e| GeoAssetError::validation(format!("malformed tile index: {e}")))?;
        Ok(Self { collection })
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec(&self.collection)
            .map(Bytes::from)
            .map_err(|e| GeoAssetError::validation(format!("failed to serialize tile index: {e}")))
    }

    pub fn features(&self) -> &[Feature] {
        &self.collection.features
    }

    pub fn len(&self) -> usize {
        self.collection.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.features.is_empty()
    }

    /// Tile identifiers named by the features, in document order.
    pub fn tile_ids(&self) -> Vec<String> {
        self.collection
            .features
            .iter()
            .filter_map(feature_tile_id)
            .map(str::to_string)
            .collect()
    }

    /// Keep only the features whose tile identifier is in `keep`.
    pub fn filter_tiles(&self, keep: &BTreeSet<String>) -> Self {
        let features = self
            .collection
            .features
            .iter()
            .filter(|f| feature_tile_id(f).is_some_and(|id| keep.contains(id)))
            .cloned()
            .collect();
        Self::from_features(features)
    }
}

fn feature_tile_id(feature: &Feature) -> Option<&str> {
    let name = feature.property("name")?.as_str()?;
    name.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Point a source index at the target raster.
///
/// Only the `{bucket}/{dataset}/.../{pixel_meaning}/` path text changes;
/// geometry and tile identifiers are untouched.
pub fn rewrite_raster_path(text: &str, from: &RasterUri, to: &RasterUri) -> String {
    let old = format!("{}/{}", from.bucket, from.raster_path());
    let new = format!("{}/{}", to.bucket, to.raster_path());
    text.replace(&old, &new)
}

// ---------------------------------------------------------------------------
// Grid footprints
// ---------------------------------------------------------------------------

/// Top-left corner `(lon, lat)` encoded in a grid tile name like `10N_020E.tif`.
pub fn parse_tile_origin(name: &str) -> Option<(f64, f64)> {
    let caps = GRID_TILE.captures(name)?;
    let lat: f64 = caps[1].parse().ok()?;
    let lon: f64 = caps[3].parse().ok()?;
    let lat = if &caps[2] == "S" { -lat } else { lat };
    let lon = if &caps[4] == "W" { -lon } else { lon };
    Some((lon, lat))
}

/// Footprint of a grid tile given its top-left corner and edge in degrees.
pub fn tile_footprint(lon: f64, lat: f64, size: f64) -> Polygon<f64> {
    Rect::new(coord! { x: lon, y: lat - size }, coord! { x: lon + size, y: lat }).to_polygon()
}

/// Build `tiles` and `extent` documents for a grid raster from its tile names.
pub fn build_tile_index(raster: &RasterUri, tile_ids: &BTreeSet<String>) -> Result<(TileIndex, TileIndex)> {
    if raster.descriptor.crs != GRID_CRS {
        return Err(GeoAssetError::validation(format!(
            "index generation supports {GRID_CRS} rasters only, got {}",
            raster.descriptor.crs
        )));
    }
    let size: f64 = raster
        .descriptor
        .resolution
        .parse()
        .ok()
        .filter(|s: &f64| *s > 0.0 && s.is_finite())
        .ok_or_else(|| {
            GeoAssetError::validation(format!(
                "resolution '{}' is not a grid size in degrees",
                raster.descriptor.resolution
            ))
        })?;

    let mut features = Vec::with_capacity(tile_ids.len());
    let mut footprints = Vec::with_capacity(tile_ids.len());
    for tile_id in tile_ids {
        let (lon, lat) = parse_tile_origin(tile_id).ok_or_else(|| {
            GeoAssetError::validation(format!("tile '{tile_id}' does not follow grid naming"))
        })?;
        let footprint = tile_footprint(lon, lat, size);
        features.push(tile_feature(
            &footprint,
            raster.vsis3_path(&raster.key(tile_id)),
            [lon, lat - size, lon + size, lat],
        ));
        footprints.push(footprint);
    }

    let extent = if footprints.is_empty() {
        TileIndex::empty()
    } else {
        let union = footprints
            .into_iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, p| acc.union(&MultiPolygon::new(vec![p])));
        TileIndex::from_features(vec![Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&union))),
            id: None,
            properties: None,
            foreign_members: None,
        }])
    };

    Ok((TileIndex::from_features(features), extent))
}

fn tile_feature(footprint: &Polygon<f64>, name: String, extent: [f64; 4]) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("name".into(), json!(name));
    properties.insert("extent".into(), json!(extent));
    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(footprint))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}
