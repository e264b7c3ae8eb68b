use std::time::Duration;

use anyhow::Result;
use shuffler_core::traits::LockService;
use shuffler_infrastructure::{DatabaseManager, InMemoryLockService};

async fn assert_exclusive(lock_service: &dyn LockService) -> Result<()> {
    let held = lock_service
        .try_acquire("collector_p/1/1/0")
        .await?
        .expect("首次获取应成功");
    assert!(lock_service.try_acquire("collector_p/1/1/0").await?.is_none());
    assert!(lock_service.try_acquire("collector_p/1/2/0").await?.is_some());

    lock_service.release(&held).await?;
    assert!(lock_service.try_acquire("collector_p/1/1/0").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_lock_exclusive() -> Result<()> {
    let db = DatabaseManager::in_memory().await?;
    let lock_service = db.lock_service(Duration::from_secs(60));
    assert_exclusive(&lock_service).await
}

#[tokio::test]
async fn test_in_memory_lock_exclusive() -> Result<()> {
    assert_exclusive(&InMemoryLockService::new(Duration::from_secs(60))).await
}

#[tokio::test]
async fn test_expired_lease_can_be_taken_over() -> Result<()> {
    let db = DatabaseManager::in_memory().await?;
    let lock_service = db.lock_service(Duration::from_millis(200));

    let stale = lock_service
        .try_acquire("taskscheduler_p/1")
        .await?
        .expect("首次获取应成功");
    tokio::time::sleep(Duration::from_millis(300)).await;
    let fresh = lock_service
        .try_acquire("taskscheduler_p/1")
        .await?
        .expect("过期租约应可被抢占");
    assert_ne!(stale.owner, fresh.owner);

    // 旧持有者释放不影响新持有者
    lock_service.release(&stale).await?;
    assert!(lock_service.try_acquire("taskscheduler_p/1").await?.is_none());
    Ok(())
}
