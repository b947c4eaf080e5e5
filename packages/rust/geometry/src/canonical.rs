//! Canonical GeoJSON serialization and content-addressed identity.

use geo::Geometry;
use geojson::GeoJson;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use geoasset_shared::{GeoAssetError, Result};

/// Parse GeoJSON text (a bare geometry or a feature) into a geometry.
pub fn parse_geometry(text: &str) -> Result<Geometry<f64>> {
    let parsed: GeoJson = text
        .parse()
        .map_err(|e| GeoAssetError::Geometry(format!("invalid GeoJSON: {e}")))?;

    let geometry = match parsed {
        GeoJson::Geometry(geometry) => geometry,
        GeoJson::Feature(feature) => feature
            .geometry
            .ok_or_else(|| GeoAssetError::Geometry("feature has no geometry".into()))?,
        GeoJson::FeatureCollection(_) => {
            return Err(GeoAssetError::Geometry(
                "expected a geometry, found a feature collection".into(),
            ));
        }
    };

    Geometry::<f64>::try_from(geometry)
        .map_err(|e| GeoAssetError::Geometry(format!("unsupported geometry: {e}")))
}

/// Canonical text of a geometry.
///
/// Serialized through `geojson` with full `f64` precision, so the same
/// coordinates always produce the same bytes.
pub fn to_geojson_text(geometry: &Geometry<f64>) -> Result<String> {
    let geojson = geojson::Geometry::new(geojson::Value::from(geometry));
    serde_json::to_string(&geojson)
        .map_err(|e| GeoAssetError::Geometry(format!("failed to serialize geometry: {e}")))
}

/// Identity of a canonical serialization: the first 16 bytes of its SHA-256.
pub fn content_id(geojson_text: &str) -> Uuid {
    let digest = Sha256::digest(geojson_text.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
