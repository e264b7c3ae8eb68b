use async_trait::async_trait;

use crate::SchedulerResult;

/// 已持有的分区锁
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLock {
    pub key: String,
    pub owner: String,
}

/// 按分区名加锁的分布式锁
///
/// `try_acquire` 不阻塞：分区被其他实例持有时返回 `None`，调用方应跳过本轮。
/// 锁带有租约，持有者崩溃后租约到期即可被重新获取。
#[async_trait]
pub trait LockService: Send + Sync {
    async fn try_acquire(&self, key: &str) -> SchedulerResult<Option<PartitionLock>>;

    async fn release(&self, lock: &PartitionLock) -> SchedulerResult<()>;
}

/// 在分区锁内执行 `work`，分区被占用时返回 `Ok(None)`
///
/// 无论 `work` 成功与否都会释放锁；释放失败只记录日志，租约到期后自然失效。
pub async fn with_partition_lock<T, F, Fut>(
    lock_service: &dyn LockService,
    key: &str,
    work: F,
) -> SchedulerResult<Option<T>>
where
    T: Send,
    F: FnOnce() -> Fut + Send,
    Fut: std::future::Future<Output = SchedulerResult<T>> + Send,
{
    let Some(lock) = lock_service.try_acquire(key).await? else {
        tracing::debug!("分区 {} 被其他实例持有，跳过", key);
        return Ok(None);
    };

    let result = work().await;
    if let Err(e) = lock_service.release(&lock).await {
        tracing::warn!("释放分区锁 {} 失败: {}", key, e);
    }
    result.map(Some)
}
