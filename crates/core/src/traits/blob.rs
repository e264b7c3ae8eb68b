use async_trait::async_trait;

use crate::{models::BlobDescription, SchedulerResult};

/// 对象存储接口
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 列出前缀下的直接子项，目录以 `/` 结尾
    ///
    /// `shard` 非空时只返回以该值开头的子项。
    async fn list(&self, prefix: &BlobDescription, shard: Option<&str>)
        -> SchedulerResult<Vec<String>>;

    /// 所有对象均存在时返回 `true`
    async fn exists(&self, blobs: &[BlobDescription]) -> SchedulerResult<bool>;

    /// 对象不存在时返回 [`SchedulerError::BlobNotFound`](crate::SchedulerError::BlobNotFound)
    async fn download(&self, blob: &BlobDescription) -> SchedulerResult<Vec<u8>>;

    async fn upload(&self, blob: &BlobDescription, data: &[u8]) -> SchedulerResult<()>;
}
