use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

/// URL prefix under which stored media is served.
pub const MEDIA_PREFIX: &str = "/uploads";

/// Media upload collaborator. Callers only ever see the relative path.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores the bytes and returns a path like `/uploads/<name>.<ext>`.
    async fn save(&self, body: Bytes, content_type: &str) -> anyhow::Result<String>;
    async fn remove(&self, path: &str) -> anyhow::Result<()>;
}

/// Writes uploads to a directory on local disk.
#[derive(Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
}

impl LocalMediaStore {
    pub async fn new(root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    // Only accepts names this store could have produced.
    fn file_for(&self, path: &str) -> Option<PathBuf> {
        let name = path.strip_prefix(MEDIA_PREFIX)?.strip_prefix('/')?;
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !name.starts_with('.');
        valid.then(|| self.root.join(name))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn save(&self, body: Bytes, content_type: &str) -> anyhow::Result<String> {
        let ext = ext_from_mime(content_type).unwrap_or("bin");
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let name = format!("{}-{}.{}", millis, Uuid::new_v4().simple(), ext);
        let file = self.root.join(&name);
        tokio::fs::write(&file, &body)
            .await
            .with_context(|| format!("write upload {}", file.display()))?;
        debug!(file = %name, bytes = body.len(), "media stored");
        Ok(format!("{MEDIA_PREFIX}/{name}"))
    }

    async fn remove(&self, path: &str) -> anyhow::Result<()> {
        let Some(file) = self.file_for(path) else {
            warn!(path, "refusing to remove media outside upload dir");
            return Ok(());
        };
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove upload {}", file.display())),
        }
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn save_returns_relative_path_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path()).await.unwrap();

        let path = store
            .save(Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert!(path.starts_with("/uploads/"));
        assert!(path.ends_with(".png"));

        let name = path.trim_start_matches("/uploads/");
        let on_disk = dir.path().join(name);
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"\x89PNG");

        store.remove(&path).await.unwrap();
        assert!(!on_disk.exists());
        // second removal is a no-op
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn remove_ignores_paths_outside_the_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().join("media")).await.unwrap();
        let outside = dir.path().join("keep.txt");
        std::fs::write(&outside, b"x").unwrap();

        store.remove("/uploads/../keep.txt").await.unwrap();
        store.remove("/etc/passwd").await.unwrap();
        assert!(outside.exists());
    }
}
