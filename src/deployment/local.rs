use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use md5::{Digest, Md5};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// one file from the local asset directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    /// object key: path relative to the asset directory, `/` separated.
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    /// lowercase hex md5, comparable with a single-part S3 ETag.
    pub md5_hex: String,
    /// base64 md5 for the `Content-MD5` header.
    pub content_md5: String,
    pub content_type: String,
}

impl LocalAsset {
    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| Error::io(&self.path, "read", e))
    }
}

/// Object keys are the relative path verbatim, so a name that is not UTF-8 cannot
/// become a key without colliding with others.
pub fn object_key(root: &Path, path: &Path) -> Result<Option<String>> {
    let relative = match path.strip_prefix(root) {
        Ok(r) => r,
        Err(_) => return Ok(None),
    };
    let mut parts = vec![];
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::io(path, "read", std::io::Error::new(std::io::ErrorKind::InvalidData, "file name is not valid UTF-8"))
        })?;
        parts.push(part);
    }
    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(parts.join("/")))
}

/// every regular file under `dir`, keyed by object key.
pub fn scan_assets(dir: &Path) -> Result<BTreeMap<String, LocalAsset>> {
    if !dir.is_dir() {
        return Err(Error::io(dir, "read", std::io::Error::new(std::io::ErrorKind::NotFound, "asset directory does not exist")));
    }
    let mut out: BTreeMap<String, LocalAsset> = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(|p| p.to_path_buf()).unwrap_or_else(|| dir.to_path_buf());
            Error::io(path, "walk", e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        let key = match object_key(dir, &path)? {
            Some(k) => k,
            None => continue,
        };
        if let Some(existing) = out.get(&key) {
            return Err(Error::io(&path, "read", std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("maps to the same object key {key} as {}", existing.path.display()),
            )));
        }
        let bytes = std::fs::read(&path).map_err(|e| Error::io(&path, "read", e))?;
        let digest = Md5::digest(&bytes);
        let content_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();
        debug!(%key, size = bytes.len(), %content_type, "found local asset");
        out.insert(key.clone(), LocalAsset {
            key,
            size: bytes.len() as u64,
            md5_hex: hex::encode(digest),
            content_md5: STANDARD.encode(digest),
            content_type,
            path,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_relative_and_slash_separated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body {}").unwrap();

        let assets = scan_assets(dir.path()).unwrap();
        let keys: Vec<&str> = assets.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["css/site.css", "index.html"]);
        assert_eq!(assets["index.html"].content_type, "text/html");
        assert_eq!(assets["css/site.css"].content_type, "text/css");
        assert_eq!(assets["index.html"].size, 11);
    }

    #[test]
    fn md5_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();
        let assets = scan_assets(dir.path()).unwrap();
        assert_eq!(assets["empty.txt"].md5_hex, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(assets["empty.txt"].content_md5, "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn nested_keys_keep_their_full_path() {
        let root = Path::new("/site");
        assert_eq!(object_key(root, Path::new("/site/a/b/c.html")).unwrap().as_deref(), Some("a/b/c.html"));
        assert_eq!(object_key(root, Path::new("/site")).unwrap(), None);
        assert_eq!(object_key(root, Path::new("/elsewhere/x.html")).unwrap(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_rejected_instead_of_merged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"a\xff.html")), "one").unwrap();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"a\xfe.html")), "two").unwrap();
        let err = scan_assets(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_assets(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
