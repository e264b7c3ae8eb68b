use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use shuffler_core::{
    traits::{LockService, PartitionLock},
    SchedulerError, SchedulerResult,
};
use tracing::{debug, info};

use super::new_owner;

const KEY_PREFIX: &str = "shuffler:lock:";

/// 只删除自己持有的锁
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// 基于Redis的分区锁
pub struct RedisLockService {
    connection: ConnectionManager,
    lease: Duration,
}

impl RedisLockService {
    pub async fn new(redis_url: &str, lease: Duration) -> SchedulerResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SchedulerError::Lock(format!("无效的Redis URL: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| SchedulerError::Lock(format!("连接Redis失败: {e}")))?;
        info!("Redis分区锁已连接");
        Ok(Self { connection, lease })
    }
}

#[async_trait]
impl LockService for RedisLockService {
    async fn try_acquire(&self, key: &str) -> SchedulerResult<Option<PartitionLock>> {
        let owner = new_owner();
        let lease_millis = u64::try_from(self.lease.as_millis())
            .map_err(|_| SchedulerError::Lock(format!("锁租约过长: {:?}", self.lease)))?;
        let mut connection = self.connection.clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(format!("{KEY_PREFIX}{key}"))
            .arg(&owner)
            .arg("NX")
            .arg("PX")
            .arg(lease_millis)
            .query_async(&mut connection)
            .await
            .map_err(|e| SchedulerError::Lock(format!("获取分区锁 {key} 失败: {e}")))?;

        Ok(acquired.map(|_| {
            debug!("获取分区锁: {}", key);
            PartitionLock {
                key: key.to_string(),
                owner,
            }
        }))
    }

    async fn release(&self, lock: &PartitionLock) -> SchedulerResult<()> {
        let mut connection = self.connection.clone();
        let _: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(format!("{KEY_PREFIX}{}", lock.key))
            .arg(&lock.owner)
            .invoke_async(&mut connection)
            .await
            .map_err(|e| SchedulerError::Lock(format!("释放分区锁 {} 失败: {e}", lock.key)))?;
        Ok(())
    }
}
