use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use shuffler_core::{models::BlobDescription, traits::BlobStore, SchedulerError, SchedulerResult};
use tokio::fs;
use tracing::debug;

/// 本地文件系统对象存储，对象路径为 `<root>/<bucket>/<object>`
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_of(&self, blob: &BlobDescription) -> SchedulerResult<PathBuf> {
        if blob.object.split('/').any(|part| part == "..") {
            return Err(SchedulerError::Blob(format!("非法的对象路径: {blob}")));
        }
        Ok(self.root.join(&blob.bucket).join(&blob.object))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn list(
        &self,
        prefix: &BlobDescription,
        shard: Option<&str>,
    ) -> SchedulerResult<Vec<String>> {
        let (dir, name_prefix) = match prefix.object.rsplit_once('/') {
            Some((dir, tail)) => (dir, tail),
            None => ("", prefix.object.as_str()),
        };
        let dir_path = self.path_of(&BlobDescription::new(&prefix.bucket, dir))?;

        let mut entries = match fs::read_dir(&dir_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(SchedulerError::Blob(format!("列出 {prefix} 失败: {e}"))),
        };

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SchedulerError::Blob(format!("列出 {prefix} 失败: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(name_prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| SchedulerError::Blob(format!("读取 {name} 类型失败: {e}")))?
                .is_dir();
            let child = if is_dir {
                format!("{rest}/")
            } else {
                rest.to_string()
            };
            if shard.is_none_or(|s| child.starts_with(s)) {
                children.push(child);
            }
        }
        children.sort();
        Ok(children)
    }

    async fn exists(&self, blobs: &[BlobDescription]) -> SchedulerResult<bool> {
        for blob in blobs {
            let exists = fs::try_exists(self.path_of(blob)?)
                .await
                .map_err(|e| SchedulerError::Blob(format!("检查 {blob} 失败: {e}")))?;
            if !exists {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn download(&self, blob: &BlobDescription) -> SchedulerResult<Vec<u8>> {
        match fs::read(self.path_of(blob)?).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SchedulerError::BlobNotFound(blob.to_string()))
            }
            Err(e) => Err(SchedulerError::Blob(format!("下载 {blob} 失败: {e}"))),
        }
    }

    async fn upload(&self, blob: &BlobDescription, data: &[u8]) -> SchedulerResult<()> {
        let path = self.path_of(blob)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SchedulerError::Blob(format!("创建目录 {parent:?} 失败: {e}")))?;
        }
        fs::write(&path, data)
            .await
            .map_err(|e| SchedulerError::Blob(format!("上传 {blob} 失败: {e}")))?;
        debug!("上传对象 {} ({} 字节)", blob, data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_roundtrip_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        for session in ["s2", "s1"] {
            let blob = BlobDescription::new("gradients", format!("p/1/2/d/{session}/gradient"));
            store.upload(&blob, session.as_bytes()).await.unwrap();
        }

        let listed = store
            .list(&BlobDescription::new("gradients", "p/1/2/d/"), None)
            .await
            .unwrap();
        assert_eq!(listed, vec!["s1/", "s2/"]);

        let blob = BlobDescription::new("gradients", "p/1/2/d/s1/gradient");
        assert_eq!(store.download(&blob).await.unwrap(), b"s1");
        assert!(store.exists(&[blob]).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());

        let listed = store
            .list(&BlobDescription::new("gradients", "nothing/here/"), None)
            .await
            .unwrap();
        assert!(listed.is_empty());

        let blob = BlobDescription::new("models", "p/1/0/s/0/checkpoint");
        assert!(matches!(
            store.download(&blob).await,
            Err(SchedulerError::BlobNotFound(_))
        ));
        assert!(!store.exists(&[blob]).await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_rejects_parent_segments() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path());
        let blob = BlobDescription::new("models", "../escape");
        assert!(store.upload(&blob, b"x").await.is_err());
    }
}
