use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use shuffler_core::{
    traits::{LockService, PartitionLock},
    SchedulerResult,
};
use tokio::sync::Mutex;

use super::new_owner;

/// 进程内分区锁
pub struct InMemoryLockService {
    lease: Duration,
    locks: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryLockService {
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn try_acquire(&self, key: &str) -> SchedulerResult<Option<PartitionLock>> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        if let Some((_, expires_at)) = locks.get(key) {
            if *expires_at > now {
                return Ok(None);
            }
        }
        let owner = new_owner();
        locks.insert(key.to_string(), (owner.clone(), now + self.lease));
        Ok(Some(PartitionLock {
            key: key.to_string(),
            owner,
        }))
    }

    async fn release(&self, lock: &PartitionLock) -> SchedulerResult<()> {
        let mut locks = self.locks.lock().await;
        if locks
            .get(&lock.key)
            .is_some_and(|(owner, _)| owner == &lock.owner)
        {
            locks.remove(&lock.key);
        }
        Ok(())
    }
}
