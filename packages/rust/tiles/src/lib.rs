//! Tiled raster storage: address parsing, object store access, tile-set
//! diffing and tile index documents.

pub mod address;
pub mod diff;
pub mod index;
pub mod store;

pub use address::{IndexKind, RasterDescriptor, RasterUri, TileAddress};
pub use diff::{TileDiff, diff_tiles};
pub use index::{TileIndex, build_tile_index, parse_tile_origin, rewrite_raster_path, tile_footprint};
pub use store::{
    BucketResolver, LocalBuckets, MemoryBuckets, S3Buckets, S3Options, copy_tile, list_tile_names,
    read_object, write_object,
};
