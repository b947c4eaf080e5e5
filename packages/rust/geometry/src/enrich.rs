//! Derived attributes for one source geometry.

use geo::{BoundingRect, GeodesicArea, Geometry, GeometryCollection, MultiPolygon, Validation};
use tracing::debug;
use uuid::Uuid;

use geoasset_shared::{GeoAssetError, Result};

use crate::canonical::{content_id, to_geojson_text};
use crate::projection::{
    ENVELOPE, all_finite, as_multi_polygon, clip_to_envelope, repair, to_web_mercator,
};

/// Square metres per hectare.
const SQ_M_PER_HECTARE: f64 = 10_000.0;

/// A geometry with every derived field computed.
#[derive(Debug, Clone)]
pub struct EnrichedGeometry {
    /// The geometry the fields were derived from (collections reduced to polygons).
    pub geometry: Geometry<f64>,
    /// Canonical serialization of `geometry`.
    pub geojson_text: String,
    pub content_id: Uuid,
    /// Geodesic area on the WGS84 spheroid, in hectares.
    pub area_ha: f64,
    /// `[xmin, ymin, xmax, ymax]` in the source CRS.
    pub bbox: [f64; 4],
    /// Web-Mercator geometry, clipped to the projection envelope when needed.
    pub projected: Geometry<f64>,
}

/// Compute area, identity, bbox and projection for a lon/lat geometry.
///
/// Fails with [`GeoAssetError::Geometry`] when the geometry is empty, has no
/// polygonal part left after filtering a collection, or cannot be repaired
/// into a valid, finite projected shape. A shape lying wholly outside the
/// projection envelope is not an error.
pub fn enrich_geometry(geometry: Geometry<f64>) -> Result<EnrichedGeometry> {
    let geometry = match geometry {
        Geometry::GeometryCollection(_) => {
            let parts = polygonal_parts(&geometry);
            if parts.0.is_empty() {
                return Err(GeoAssetError::Geometry(
                    "geometry collection has no polygonal parts".into(),
                ));
            }
            Geometry::MultiPolygon(parts)
        }
        other => other,
    };

    let rect = geometry
        .bounding_rect()
        .ok_or_else(|| GeoAssetError::Geometry("empty geometry".into()))?;
    let bbox = [rect.min().x, rect.min().y, rect.max().x, rect.max().y];
    if bbox.iter().any(|v| !v.is_finite()) {
        return Err(GeoAssetError::Geometry("non-finite coordinates".into()));
    }

    let geojson_text = to_geojson_text(&geometry)?;
    let content_id = content_id(&geojson_text);
    let area_ha = geometry.geodesic_area_unsigned() / SQ_M_PER_HECTARE;
    let projected = project_safely(&geometry)?;

    Ok(EnrichedGeometry {
        geometry,
        geojson_text,
        content_id,
        area_ha,
        bbox,
        projected,
    })
}

/// Two-pass projection.
///
/// Geometries inside the envelope are projected directly (after repair if
/// polygonal and invalid). Others are clipped and repaired first; when the
/// clip leaves nothing the projection is an empty collection.
fn project_safely(geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
    let prepared = if ENVELOPE.contains(geometry) {
        match as_multi_polygon(geometry) {
            Some(polygons) if !polygons.is_valid() => {
                debug!("repairing invalid polygon before projection");
                Geometry::MultiPolygon(checked_repair(&polygons)?)
            }
            _ => geometry.clone(),
        }
    } else {
        debug!("clipping geometry to projection envelope");
        let Some(clipped) = clip_to_envelope(geometry) else {
            debug!("geometry lies entirely outside the projection envelope");
            return Ok(Geometry::GeometryCollection(GeometryCollection::default()));
        };
        match as_multi_polygon(&clipped) {
            Some(polygons) if !polygons.is_valid() => Geometry::MultiPolygon(checked_repair(&polygons)?),
            _ => clipped,
        }
    };

    let projected = to_web_mercator(&prepared);
    if !all_finite(&projected) {
        return Err(GeoAssetError::Geometry(
            "projection produced non-finite coordinates".into(),
        ));
    }
    Ok(projected)
}

fn checked_repair(polygons: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    let repaired = repair(polygons);
    if repaired.0.is_empty() || !repaired.is_valid() {
        return Err(GeoAssetError::Geometry("polygon could not be repaired".into()));
    }
    Ok(repaired)
}

/// Polygonal sub-parts of a geometry, flattening nested collections.
/// Points and lines are discarded.
pub fn polygonal_parts(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons);
    MultiPolygon::new(polygons)
}

fn collect_polygons(geometry: &Geometry<f64>, out: &mut Vec<geo::Polygon<f64>>) {
    match geometry {
        Geometry::GeometryCollection(gc) => {
            for part in gc.iter() {
                collect_polygons(part, out);
            }
        }
        other => {
            if let Some(mp) = as_multi_polygon(other) {
                out.extend(mp.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::parse_geometry;
    use geo::{Area, LineString, Point, polygon};

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ])
    }

    #[test]
    fn one_degree_cell_at_equator_area() {
        let enriched = enrich_geometry(square(0.0, 0.0, 1.0, 1.0)).unwrap();
        let expected = 1_230_800.0;
        assert!((enriched.area_ha - expected).abs() / expected < 0.01, "{}", enriched.area_ha);
    }

    #[test]
    fn bbox_is_source_extrema() {
        let enriched = enrich_geometry(square(-3.5, 10.0, 2.0, 12.25)).unwrap();
        assert_eq!(enriched.bbox, [-3.5, 10.0, 2.0, 12.25]);
    }

    #[test]
    fn identity_depends_only_on_shape() {
        let a = enrich_geometry(square(0.0, 0.0, 1.0, 1.0)).unwrap();
        let b = enrich_geometry(parse_geometry(&a.geojson_text).unwrap()).unwrap();
        assert_eq!(a.content_id, b.content_id);

        let c = enrich_geometry(square(0.0, 0.0, 1.0, 1.5)).unwrap();
        assert_ne!(a.content_id, c.content_id);
    }

    #[test]
    fn inside_envelope_projects_valid() {
        let enriched = enrich_geometry(square(-170.0, -80.0, 170.0, 80.0)).unwrap();
        let projected = as_multi_polygon(&enriched.projected).unwrap();
        assert!(projected.is_valid());
        assert!(all_finite(&enriched.projected));
    }

    #[test]
    fn antimeridian_spanning_polygon_projects_valid() {
        let enriched = enrich_geometry(square(-179.0, -10.0, 179.0, 10.0)).unwrap();
        let projected = as_multi_polygon(&enriched.projected).unwrap();
        assert!(!projected.0.is_empty());
        assert!(projected.is_valid());
    }

    #[test]
    fn polar_polygon_is_clipped_and_finite() {
        let enriched = enrich_geometry(square(0.0, 70.0, 10.0, 89.0)).unwrap();
        assert!(all_finite(&enriched.projected));
        let rect = enriched.projected.bounding_rect().unwrap();
        // 85 degrees north in metres.
        assert!(rect.max().y < 19_971_869.0);
        // Area and bbox still describe the unclipped source shape.
        assert_eq!(enriched.bbox[3], 89.0);
    }

    #[test]
    fn overlapping_parts_are_repaired() {
        let overlapping = Geometry::MultiPolygon(MultiPolygon::new(vec![
            polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)],
            polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 1.0)],
        ]));
        let enriched = enrich_geometry(overlapping).unwrap();
        let projected = as_multi_polygon(&enriched.projected).unwrap();
        assert!(projected.is_valid());
        assert_eq!(projected.0.len(), 1);

        // The shared unit square is kept once: 7 units against 4 for one square.
        let single = to_web_mercator(&square(0.0, 0.0, 2.0, 2.0)).unsigned_area();
        let ratio = projected.unsigned_area() / single;
        assert!((ratio - 1.75).abs() < 0.01, "{ratio}");
        // Identity is taken from the source shape, not the repaired one.
        assert!(enriched.geojson_text.contains("MultiPolygon"));
    }

    #[test]
    fn collection_keeps_only_polygons() {
        let gc = Geometry::GeometryCollection(GeometryCollection(vec![
            Geometry::Point(Point::new(5.0, 5.0)),
            Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)])),
            square(0.0, 0.0, 1.0, 1.0),
        ]));
        let enriched = enrich_geometry(gc).unwrap();
        match &enriched.geometry {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(enriched.geojson_text.contains("MultiPolygon"));
    }

    #[test]
    fn collection_without_polygons_fails() {
        let gc = Geometry::GeometryCollection(GeometryCollection(vec![Geometry::Point(
            Point::new(5.0, 5.0),
        )]));
        assert!(matches!(enrich_geometry(gc), Err(GeoAssetError::Geometry(_))));
    }

    #[test]
    fn point_outside_envelope_projects_to_nothing() {
        let enriched = enrich_geometry(Geometry::Point(Point::new(15.0, 86.5))).unwrap();
        assert_eq!(enriched.bbox, [15.0, 86.5, 15.0, 86.5]);
        match &enriched.projected {
            Geometry::GeometryCollection(gc) => assert!(gc.0.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn polygon_beyond_south_limit_projects_to_nothing() {
        let enriched = enrich_geometry(square(-20.0, -89.0, 20.0, -86.0)).unwrap();
        assert!(enriched.area_ha > 0.0);
        assert!(enriched.projected.bounding_rect().is_none());
    }

    #[test]
    fn point_has_zero_area() {
        let enriched = enrich_geometry(Geometry::Point(Point::new(10.0, 10.0))).unwrap();
        assert_eq!(enriched.area_ha, 0.0);
        assert_eq!(enriched.bbox, [10.0, 10.0, 10.0, 10.0]);
    }
}
