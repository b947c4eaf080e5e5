//! Dateline and pole safe projection to spherical Web-Mercator (EPSG:3857).
//!
//! Mercator diverges towards the poles, so geometries are only projected once
//! they lie inside [`ENVELOPE`]. Anything reaching past it is clipped first.

use std::f64::consts::FRAC_PI_4;

use geo::{
    BooleanOps, BoundingRect, Coord, CoordsIter, Geometry, GeometryCollection, LineString,
    MapCoords, MultiLineString, MultiPoint, MultiPolygon, Rect, coord,
};

/// Sphere radius used by EPSG:3857.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Geographic bounds inside which the projection is well defined.
pub const ENVELOPE: Envelope = Envelope {
    min_lon: -180.0,
    min_lat: -85.0,
    max_lon: 180.0,
    max_lat: 85.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Envelope {
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_lon, y: self.min_lat },
            coord! { x: self.max_lon, y: self.max_lat },
        )
    }

    pub fn contains_coord(&self, c: Coord<f64>) -> bool {
        c.x >= self.min_lon && c.x <= self.max_lon && c.y >= self.min_lat && c.y <= self.max_lat
    }

    /// True when the geometry's bounding box lies inside the envelope.
    /// Empty geometries count as contained.
    pub fn contains(&self, geometry: &Geometry<f64>) -> bool {
        match geometry.bounding_rect() {
            Some(rect) => self.contains_coord(rect.min()) && self.contains_coord(rect.max()),
            None => true,
        }
    }

    fn multi_polygon(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![self.rect().to_polygon()])
    }
}

/// Project one lon/lat coordinate (degrees) to metres.
pub fn project_coord(c: Coord<f64>) -> Coord<f64> {
    coord! {
        x: EARTH_RADIUS_M * c.x.to_radians(),
        y: EARTH_RADIUS_M * (FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln(),
    }
}

/// Project every coordinate. Callers clip to [`ENVELOPE`] first.
pub fn to_web_mercator(geometry: &Geometry<f64>) -> Geometry<f64> {
    geometry.map_coords(project_coord)
}

/// True when no coordinate is NaN or infinite.
pub fn all_finite(geometry: &Geometry<f64>) -> bool {
    geometry.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}

/// Resolve self-intersections and dissolve overlapping parts.
///
/// Each part is unioned in separately; overlaps keep their area instead of
/// cancelling out as they would under a single even-odd pass.
pub fn repair(polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    polygons.iter().fold(MultiPolygon::new(Vec::new()), |acc, part| {
        acc.union(&MultiPolygon::new(vec![part.clone()]))
    })
}

/// Polygonal view of a geometry, if it has one.
pub fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        _ => None,
    }
}

/// Intersect a geometry with [`ENVELOPE`].
///
/// Polygons are intersected and repaired, lines are clipped, and points
/// outside are dropped. Returns `None` when nothing remains.
pub fn clip_to_envelope(geometry: &Geometry<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(p) => ENVELOPE.contains_coord(p.0).then(|| Geometry::Point(*p)),
        Geometry::MultiPoint(mp) => {
            let kept: Vec<_> = mp.iter().filter(|p| ENVELOPE.contains_coord(p.0)).copied().collect();
            (!kept.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(kept)))
        }
        Geometry::Line(line) => clip_lines(MultiLineString::new(vec![LineString::new(vec![
            line.start, line.end,
        ])])),
        Geometry::LineString(ls) => clip_lines(MultiLineString::new(vec![ls.clone()])),
        Geometry::MultiLineString(mls) => clip_lines(mls.clone()),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            let polygons = as_multi_polygon(geometry)?;
            let clipped = repair(&polygons.intersection(&ENVELOPE.multi_polygon()));
            (!clipped.0.is_empty()).then(|| Geometry::MultiPolygon(clipped))
        }
        Geometry::GeometryCollection(gc) => {
            let parts: Vec<_> = gc.iter().filter_map(clip_to_envelope).collect();
            (!parts.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(parts)))
        }
    }
}

fn clip_lines(lines: MultiLineString<f64>) -> Option<Geometry<f64>> {
    let clipped = ENVELOPE.multi_polygon().clip(&lines, false);
    (!clipped.0.is_empty()).then(|| Geometry::MultiLineString(clipped))
}
