use std::collections::BTreeMap;

use super::local::LocalAsset;

/// S3 reports ETags wrapped in quotes.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_ascii_lowercase()
}

/// What a sync has to do to make the bucket mirror the local directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub uploads: Vec<LocalAsset>,
    /// remote keys with no local counterpart.
    pub deletes: Vec<String>,
    pub unchanged: Vec<String>,
}

impl SyncPlan {
    /// `remote` maps object key to ETag. Keys come out sorted since both inputs are BTreeMaps.
    pub fn compute(local: &BTreeMap<String, LocalAsset>, remote: &BTreeMap<String, String>) -> SyncPlan {
        let mut plan = SyncPlan::default();
        for (key, asset) in local {
            match remote.get(key) {
                Some(etag) if normalize_etag(etag) == asset.md5_hex => plan.unchanged.push(key.clone()),
                _ => plan.uploads.push(asset.clone()),
            }
        }
        for key in remote.keys() {
            if !local.contains_key(key) {
                plan.deletes.push(key.clone());
            }
        }
        plan
    }

    pub fn has_changes(&self) -> bool {
        !self.uploads.is_empty() || !self.deletes.is_empty()
    }

    /// stable checksum of the mutations in this plan.
    pub fn change_digest(&self) -> u32 {
        let mut adler = adler::Adler32::new();
        for asset in &self.uploads {
            adler.write_slice(b"put:");
            adler.write_slice(asset.key.as_bytes());
            adler.write_slice(asset.md5_hex.as_bytes());
        }
        for key in &self.deletes {
            adler.write_slice(b"delete:");
            adler.write_slice(key.as_bytes());
        }
        adler.checksum()
    }
}
