use std::collections::BTreeMap;

use async_trait::async_trait;
use shuffler_core::{models::BlobDescription, traits::BlobStore, SchedulerError, SchedulerResult};
use tokio::sync::RwLock;

use super::immediate_children;

/// 内存对象存储，用于测试和单进程部署
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list(
        &self,
        prefix: &BlobDescription,
        shard: Option<&str>,
    ) -> SchedulerResult<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(immediate_children(
            objects
                .keys()
                .filter(|(bucket, _)| bucket == &prefix.bucket)
                .map(|(_, object)| object.as_str()),
            &prefix.object,
            shard,
        ))
    }

    async fn exists(&self, blobs: &[BlobDescription]) -> SchedulerResult<bool> {
        let objects = self.objects.read().await;
        Ok(blobs
            .iter()
            .all(|b| objects.contains_key(&(b.bucket.clone(), b.object.clone()))))
    }

    async fn download(&self, blob: &BlobDescription) -> SchedulerResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(blob.bucket.clone(), blob.object.clone()))
            .cloned()
            .ok_or_else(|| SchedulerError::BlobNotFound(blob.to_string()))
    }

    async fn upload(&self, blob: &BlobDescription, data: &[u8]) -> SchedulerResult<()> {
        self.objects
            .write()
            .await
            .insert((blob.bucket.clone(), blob.object.clone()), data.to_vec());
        Ok(())
    }
}
