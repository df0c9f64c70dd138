use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use tracing::{debug, warn};

use super::{BucketStore, CacheInvalidator, LocalAsset};
use crate::error::{Error, Result};

pub struct S3BucketStore {
    client: aws_sdk_s3::Client,
}

impl S3BucketStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    pub async fn for_region(region: &str) -> Self {
        let shared_config = aws_config::from_env()
            .region(aws_sdk_s3::config::Region::new(region.to_string()))
            .load()
            .await;
        Self::new(aws_sdk_s3::Client::new(&shared_config))
    }
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn list_objects(&self, bucket: &str) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        let mut token: Option<String> = None;
        loop {
            let resp = self.client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| Error::sync("list", bucket, e))?;
            for obj in resp.contents().unwrap_or_default() {
                if let Some(key) = obj.key() {
                    out.insert(key.to_string(), obj.e_tag().unwrap_or_default().to_string());
                }
            }
            match resp.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        debug!(%bucket, count = out.len(), "listed remote objects");
        Ok(out)
    }

    async fn put_object(&self, bucket: &str, asset: &LocalAsset, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(&asset.key)
            .content_type(&asset.content_type)
            .content_md5(&asset.content_md5)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::sync("upload", format!("s3://{bucket}/{}", asset.key), e))?;
        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        let objects: Vec<ObjectIdentifier> = keys.iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect();
        let delete = Delete::builder().set_objects(Some(objects)).quiet(true).build();
        let resp = self.client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| Error::sync("delete", bucket, e))?;
        let errors = resp.errors().unwrap_or_default();
        if let Some(first) = errors.first() {
            warn!(%bucket, failed = errors.len(), "some objects could not be deleted");
            return Err(Error::sync(
                "delete",
                format!("s3://{bucket}/{}", first.key().unwrap_or_default()),
                first.message().unwrap_or("unknown error"),
            ));
        }
        Ok(())
    }
}

pub struct CloudfrontInvalidator {
    client: aws_sdk_cloudfront::Client,
}

impl CloudfrontInvalidator {
    pub fn new(client: aws_sdk_cloudfront::Client) -> Self {
        Self { client }
    }

    /// cloudfront is global, any region works for its endpoint.
    pub async fn from_env() -> Self {
        let shared_config = aws_config::from_env().load().await;
        Self::new(aws_sdk_cloudfront::Client::new(&shared_config))
    }
}

#[async_trait]
impl CacheInvalidator for CloudfrontInvalidator {
    async fn invalidate(&self, distribution_id: &str, paths: &[String], caller_reference: &str) -> Result<String> {
        let batch = InvalidationBatch::builder()
            .paths(Paths::builder()
                .quantity(paths.len() as i32)
                .set_items(Some(paths.to_vec()))
                .build())
            .caller_reference(caller_reference)
            .build();
        let resp = self.client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| Error::sync("invalidate", distribution_id, e))?;
        let id = resp.invalidation().and_then(|i| i.id()).unwrap_or_default();
        Ok(id.to_string())
    }
}
