//! Object storage access for tile sets.
//!
//! Every bucket maps to an [`ObjectStore`] through a [`BucketResolver`]:
//! S3 in production, local directories or in-memory stores for tests and
//! offline runs.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::debug;

use geoasset_shared::{GeoAssetError, Result};

use crate::address::{IndexKind, RasterUri, TileAddress};

fn store_err(e: object_store::Error) -> GeoAssetError {
    GeoAssetError::Storage(e.to_string())
}

fn object_path(key: &str) -> Result<ObjectPath> {
    ObjectPath::parse(key).map_err(|e| GeoAssetError::Storage(format!("invalid object key '{key}': {e}")))
}

// ---------------------------------------------------------------------------
// Bucket resolvers
// ---------------------------------------------------------------------------

/// Maps a bucket name to the store that serves it.
pub trait BucketResolver: Send + Sync {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// Connection settings for S3 buckets, resolved by the caller.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub region: Option<String>,
    /// Alternative endpoint (e.g. a local S3-compatible server); allows plain HTTP.
    pub endpoint: Option<String>,
}

/// S3 buckets, one client per bucket, credentials from the AWS environment.
pub struct S3Buckets {
    options: S3Options,
    clients: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3Buckets {
    pub fn new(options: S3Options) -> Self {
        Self {
            options,
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl BucketResolver for S3Buckets {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| GeoAssetError::Storage("S3 client cache poisoned".into()))?;
        if let Some(store) = clients.get(bucket) {
            return Ok(store.clone());
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = &self.options.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &self.options.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }
        let store: Arc<dyn ObjectStore> = Arc::new(builder.build().map_err(store_err)?);
        debug!(bucket, "created S3 client");
        clients.insert(bucket.to_string(), store.clone());
        Ok(store)
    }
}

/// Buckets served from `{root}/{bucket}` directories.
pub struct LocalBuckets {
    root: PathBuf,
}

impl LocalBuckets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BucketResolver for LocalBuckets {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let dir = self.root.join(bucket);
        std::fs::create_dir_all(&dir).map_err(|e| GeoAssetError::io(&dir, e))?;
        let store = LocalFileSystem::new_with_prefix(&dir).map_err(store_err)?;
        Ok(Arc::new(store))
    }
}

/// In-memory buckets, created on first use.
#[derive(Default)]
pub struct MemoryBuckets {
    stores: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BucketResolver for MemoryBuckets {
    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self
            .stores
            .lock()
            .map_err(|_| GeoAssetError::Storage("memory bucket map poisoned".into()))?;
        let store = stores
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(InMemory::new()))
            .clone();
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// File names directly under the raster's `{format}/` directory that end in
/// `extension`. Index documents and nested objects are never tiles.
pub async fn list_tile_names(
    resolver: &dyn BucketResolver,
    raster: &RasterUri,
    extension: &str,
) -> Result<BTreeSet<String>> {
    let store = resolver.store(&raster.bucket)?;
    let prefix = object_path(&raster.format_prefix())?;
    let listing: Vec<_> = store.list(Some(&prefix)).try_collect().await.map_err(store_err)?;

    let mut names = BTreeSet::new();
    for meta in listing {
        let Some(parts) = meta.location.prefix_match(&prefix) else {
            continue;
        };
        let parts: Vec<_> = parts.collect();
        if parts.len() != 1 {
            continue;
        }
        let name = parts[0].as_ref();
        if name.ends_with(extension) && !IndexKind::is_index_file(name) {
            names.insert(name.to_string());
        }
    }

    debug!(raster = %raster, count = names.len(), "listed tiles");
    Ok(names)
}

/// Read an object. A missing object is `None`.
pub async fn read_object(resolver: &dyn BucketResolver, bucket: &str, key: &str) -> Result<Option<Bytes>> {
    let store = resolver.store(bucket)?;
    match store.get(&object_path(key)?).await {
        Ok(result) => Ok(Some(result.bytes().await.map_err(store_err)?)),
        Err(object_store::Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(store_err(e)),
    }
}

/// Write (create or overwrite) an object.
pub async fn write_object(resolver: &dyn BucketResolver, bucket: &str, key: &str, body: Bytes) -> Result<()> {
    let store = resolver.store(bucket)?;
    store
        .put(&object_path(key)?, PutPayload::from(body))
        .await
        .map_err(store_err)?;
    Ok(())
}

/// Copy one tile. Same-bucket copies stay server-side; cross-bucket copies
/// stream through this process.
pub async fn copy_tile(resolver: &dyn BucketResolver, from: &TileAddress, to: &TileAddress) -> Result<()> {
    let copy_err = |e: object_store::Error| GeoAssetError::Copy {
        tile: from.tile_id.clone(),
        message: e.to_string(),
    };
    let from_key = object_path(&from.key())?;
    let to_key = object_path(&to.key())?;

    if from.bucket() == to.bucket() {
        let store = resolver.store(from.bucket())?;
        store.copy(&from_key, &to_key).await.map_err(copy_err)?;
    } else {
        let source = resolver.store(from.bucket())?;
        let target = resolver.store(to.bucket())?;
        let body = source
            .get(&from_key)
            .await
            .map_err(copy_err)?
            .bytes()
            .await
            .map_err(copy_err)?;
        target
            .put(&to_key, PutPayload::from(body))
            .await
            .map_err(copy_err)?;
    }
    Ok(())
}
