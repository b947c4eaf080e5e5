//! Geometry enrichment: canonical identity, geodesic area, bounding box and
//! dateline/pole safe Web-Mercator projection for lon/lat geometries.

pub mod canonical;
pub mod enrich;
pub mod projection;

pub use canonical::{content_id, parse_geometry, to_geojson_text};
pub use enrich::{EnrichedGeometry, enrich_geometry, polygonal_parts};
pub use projection::{ENVELOPE, Envelope, clip_to_envelope, project_coord, to_web_mercator};
