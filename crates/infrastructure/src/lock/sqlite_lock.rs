use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shuffler_core::{
    traits::{LockService, PartitionLock},
    SchedulerError, SchedulerResult,
};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use super::new_owner;

/// 基于 `partition_locks` 表的分区锁，过期的租约可被抢占
pub struct SqliteLockService {
    pool: SqlitePool,
    lease: Duration,
}

impl SqliteLockService {
    pub fn new(pool: SqlitePool, lease: Duration) -> Self {
        Self { pool, lease }
    }
}

#[async_trait]
impl LockService for SqliteLockService {
    async fn try_acquire(&self, key: &str) -> SchedulerResult<Option<PartitionLock>> {
        let now = Utc::now().timestamp_millis();
        let lease_millis = i64::try_from(self.lease.as_millis())
            .map_err(|_| SchedulerError::Lock(format!("锁租约过长: {:?}", self.lease)))?;
        let owner = new_owner();

        let result = sqlx::query(
            r#"
            INSERT INTO partition_locks (partition_key, owner, expires_at) VALUES (?, ?, ?)
            ON CONFLICT (partition_key) DO UPDATE
            SET owner = excluded.owner, expires_at = excluded.expires_at
            WHERE partition_locks.expires_at < ?
            "#,
        )
        .bind(key)
        .bind(&owner)
        .bind(now + lease_millis)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| SchedulerError::Lock(format!("获取分区锁 {key} 失败: {e}")))?;

        if result.rows_affected() == 1 {
            debug!("获取分区锁: {}", key);
            Ok(Some(PartitionLock {
                key: key.to_string(),
                owner,
            }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, lock: &PartitionLock) -> SchedulerResult<()> {
        let result = sqlx::query("DELETE FROM partition_locks WHERE partition_key = ? AND owner = ?")
            .bind(&lock.key)
            .bind(&lock.owner)
            .execute(&self.pool)
            .await
            .map_err(|e| SchedulerError::Lock(format!("释放分区锁 {} 失败: {e}", lock.key)))?;

        if result.rows_affected() == 0 {
            warn!("分区锁 {} 已过期并被其他实例持有", lock.key);
        }
        Ok(())
    }
}
