pub mod blob;
pub mod database;
pub mod in_memory_queue;
pub mod lock;
pub mod message_queue;
pub mod message_queue_factory;
pub mod observability;
pub mod plan_executor;

pub use blob::{create_blob_store, InMemoryBlobStore, LocalBlobStore};
pub use database::*;
pub use in_memory_queue::InMemoryMessageQueue;
pub use lock::{InMemoryLockService, RedisLockService, SqliteLockService};
pub use message_queue::RabbitMQMessageQueue;
pub use message_queue_factory::MessageQueueFactory;
pub use observability::{MetricsCollector, StructuredLogger};
pub use plan_executor::PassthroughPlanExecutor;
