//! 分区锁实现
//!
//! - [`SqliteLockService`]: 基于数据库条件写入，默认实现
//! - [`RedisLockService`]: 基于 `SET NX PX`
//! - [`InMemoryLockService`]: 单进程内使用

pub mod in_memory_lock;
pub mod redis_lock;
pub mod sqlite_lock;

pub use in_memory_lock::InMemoryLockService;
pub use redis_lock::RedisLockService;
pub use sqlite_lock::SqliteLockService;

fn new_owner() -> String {
    uuid::Uuid::new_v4().to_string()
}
