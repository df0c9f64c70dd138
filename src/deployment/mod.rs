//! Post-provisioning steps: mirror the local asset directory into the site bucket,
//! then invalidate the CDN cache when anything changed.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

pub mod aws;
pub mod local;
pub mod plan;
pub mod sync;

pub use aws::{CloudfrontInvalidator, S3BucketStore};
pub use local::{scan_assets, LocalAsset};
pub use plan::SyncPlan;
pub use sync::{AssetDeployment, SyncReport};

/// S3 allows at most this many keys per DeleteObjects call.
pub const MAX_DELETE_BATCH: usize = 1000;

/// invalidating everything is one path, whatever the number of objects.
pub const INVALIDATE_ALL: &str = "/*";

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// every object key in the bucket, with its ETag.
    async fn list_objects(&self, bucket: &str) -> Result<BTreeMap<String, String>>;

    async fn put_object(&self, bucket: &str, asset: &LocalAsset, body: Vec<u8>) -> Result<()>;

    /// callers never pass more than `MAX_DELETE_BATCH` keys.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;
}

#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    /// returns the invalidation id.
    async fn invalidate(&self, distribution_id: &str, paths: &[String], caller_reference: &str) -> Result<String>;
}
