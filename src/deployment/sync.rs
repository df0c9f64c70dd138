use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use super::local::scan_assets;
use super::plan::SyncPlan;
use super::{BucketStore, CacheInvalidator, INVALIDATE_ALL, MAX_DELETE_BATCH};
use crate::error::Result;

/// Mirror a local directory into the site bucket, optionally followed by a CDN invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDeployment {
    pub source_dir: PathBuf,
    pub bucket_name: String,
    pub distribution_id: Option<String>,
    /// compute and log the plan, but touch nothing.
    pub dry_run: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub plan: SyncPlan,
    pub uploaded: usize,
    pub deleted: usize,
    pub invalidation_id: Option<String>,
}

impl SyncReport {
    pub fn has_changes(&self) -> bool {
        self.plan.has_changes()
    }
}

pub fn caller_reference(plan: &SyncPlan) -> String {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    format!("sitestack-{:08x}-{}", plan.change_digest(), millis)
}

impl AssetDeployment {
    pub fn new(source_dir: impl Into<PathBuf>, bucket_name: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            bucket_name: bucket_name.into(),
            distribution_id: None,
            dry_run: false,
        }
    }

    pub fn with_distribution(mut self, distribution_id: impl Into<String>) -> Self {
        self.distribution_id = Some(distribution_id.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Uploads always finish before any delete, so the bucket never lacks a file the
    /// new tree references.
    pub async fn sync(&self, store: &dyn BucketStore) -> Result<SyncReport> {
        let local = scan_assets(&self.source_dir)?;
        let remote = store.list_objects(&self.bucket_name).await?;
        let plan = SyncPlan::compute(&local, &remote);
        info!(
            bucket = %self.bucket_name,
            uploads = plan.uploads.len(),
            deletes = plan.deletes.len(),
            unchanged = plan.unchanged.len(),
            dry_run = self.dry_run,
            "computed sync plan"
        );
        let mut report = SyncReport { plan, ..Default::default() };
        if self.dry_run {
            for asset in &report.plan.uploads {
                info!(key = %asset.key, "would upload");
            }
            for key in &report.plan.deletes {
                info!(%key, "would delete");
            }
            return Ok(report);
        }

        for asset in &report.plan.uploads {
            let body = asset.read()?;
            debug!(key = %asset.key, size = asset.size, "uploading");
            store.put_object(&self.bucket_name, asset, body).await?;
            report.uploaded += 1;
        }
        for batch in report.plan.deletes.chunks(MAX_DELETE_BATCH) {
            debug!(count = batch.len(), "deleting stale objects");
            store.delete_objects(&self.bucket_name, batch).await?;
            report.deleted += batch.len();
        }
        info!(bucket = %self.bucket_name, uploaded = report.uploaded, deleted = report.deleted, "bucket in sync");
        Ok(report)
    }

    /// One invalidation covering everything, and only when the sync changed something.
    pub async fn invalidate(&self, report: &mut SyncReport, invalidator: &dyn CacheInvalidator, paths: &[String]) -> Result<()> {
        let distribution_id = match &self.distribution_id {
            Some(id) => id,
            None => return Ok(()),
        };
        if !report.has_changes() {
            info!(distribution = %distribution_id, "nothing changed, skipping invalidation");
            return Ok(());
        }
        if self.dry_run {
            info!(distribution = %distribution_id, ?paths, "would invalidate");
            return Ok(());
        }
        let reference = caller_reference(&report.plan);
        let id = invalidator.invalidate(distribution_id, paths, &reference).await?;
        info!(distribution = %distribution_id, invalidation = %id, "created invalidation");
        report.invalidation_id = Some(id);
        Ok(())
    }

    pub async fn run(&self, store: &dyn BucketStore, invalidator: &dyn CacheInvalidator) -> Result<SyncReport> {
        let mut report = self.sync(store).await?;
        self.invalidate(&mut report, invalidator, &[INVALIDATE_ALL.to_string()]).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::deployment::LocalAsset;
    use crate::error::Error;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<BTreeMap<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BucketStore for MemoryStore {
        async fn list_objects(&self, _bucket: &str) -> Result<BTreeMap<String, String>> {
            Ok(self.objects.lock().unwrap().clone())
        }

        async fn put_object(&self, _bucket: &str, asset: &LocalAsset, _body: Vec<u8>) -> Result<()> {
            self.calls.lock().unwrap().push(format!("put {}", asset.key));
            self.objects.lock().unwrap().insert(asset.key.clone(), format!("\"{}\"", asset.md5_hex));
            Ok(())
        }

        async fn delete_objects(&self, _bucket: &str, keys: &[String]) -> Result<()> {
            assert!(keys.len() <= MAX_DELETE_BATCH);
            self.calls.lock().unwrap().push(format!("delete {}", keys.len()));
            let mut objects = self.objects.lock().unwrap();
            for key in keys {
                objects.remove(key);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingInvalidator {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl CacheInvalidator for RecordingInvalidator {
        async fn invalidate(&self, distribution_id: &str, paths: &[String], _caller_reference: &str) -> Result<String> {
            self.calls.lock().unwrap().push((distribution_id.to_string(), paths.to_vec()));
            Ok("I123".into())
        }
    }

    struct FailingInvalidator;

    #[async_trait]
    impl CacheInvalidator for FailingInvalidator {
        async fn invalidate(&self, distribution_id: &str, _paths: &[String], _caller_reference: &str) -> Result<String> {
            Err(Error::sync("invalidate", distribution_id, "throttled"))
        }
    }

    fn site_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        std::fs::write(dir.path().join("about.html"), "<h1>about</h1>").unwrap();
        dir
    }

    #[tokio::test]
    async fn uploads_happen_before_deletes() {
        let dir = site_dir();
        let store = MemoryStore::default();
        store.objects.lock().unwrap().insert("old.html".into(), "\"abc\"".into());
        let deployment = AssetDeployment::new(dir.path(), "example-site");
        let report = deployment.sync(&store).await.unwrap();
        assert_eq!(report.uploaded, 2);
        assert_eq!(report.deleted, 1);
        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["put about.html", "put index.html", "delete 1"]);
    }

    #[tokio::test]
    async fn deletes_are_batched() {
        let dir = site_dir();
        let store = MemoryStore::default();
        {
            let mut objects = store.objects.lock().unwrap();
            for i in 0..2500 {
                objects.insert(format!("stale/{i:05}.html"), "\"x\"".into());
            }
        }
        let report = AssetDeployment::new(dir.path(), "example-site").sync(&store).await.unwrap();
        assert_eq!(report.deleted, 2500);
        let calls = store.calls.lock().unwrap().clone();
        assert_eq!(&calls[2..], &["delete 1000", "delete 1000", "delete 500"]);
    }

    #[tokio::test]
    async fn second_run_changes_nothing_and_skips_invalidation() {
        let dir = site_dir();
        let store = MemoryStore::default();
        let invalidator = RecordingInvalidator::default();
        let deployment = AssetDeployment::new(dir.path(), "example-site").with_distribution("E1");

        let first = deployment.run(&store, &invalidator).await.unwrap();
        assert_eq!(first.invalidation_id.as_deref(), Some("I123"));
        let second = deployment.run(&store, &invalidator).await.unwrap();
        assert!(!second.has_changes());
        assert_eq!(second.uploaded, 0);
        assert_eq!(second.invalidation_id, None);

        let calls = invalidator.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("E1".to_string(), vec!["/*".to_string()])]);
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let dir = site_dir();
        let store = MemoryStore::default();
        let invalidator = RecordingInvalidator::default();
        let deployment = AssetDeployment::new(dir.path(), "example-site").with_distribution("E1").dry_run(true);
        let report = deployment.run(&store, &invalidator).await.unwrap();
        assert_eq!(report.plan.uploads.len(), 2);
        assert_eq!(report.uploaded, 0);
        assert!(store.calls.lock().unwrap().is_empty());
        assert!(invalidator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidation_failure_is_reported() {
        let dir = site_dir();
        let store = MemoryStore::default();
        let deployment = AssetDeployment::new(dir.path(), "example-site").with_distribution("E1");
        let err = deployment.run(&store, &FailingInvalidator).await.unwrap_err();
        assert!(matches!(err, Error::Sync { operation: "invalidate", .. }));
    }

    #[test]
    fn caller_reference_carries_the_digest() {
        let plan = SyncPlan::default();
        let reference = caller_reference(&plan);
        assert!(reference.starts_with(&format!("sitestack-{:08x}-", plan.change_digest())));
    }
}
