pub mod api_observability;
pub mod app_config;
pub mod blob_storage;
pub mod database;
pub mod lock;
pub mod message_queue;
pub mod orchestration;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::AppConfig;
pub use blob_storage::{BlobStorageConfig, BlobStorageType};
pub use database::DatabaseConfig;
pub use lock::{LockConfig, LockType};
pub use message_queue::{MessageQueueConfig, MessageQueueType};
pub use orchestration::{AssignmentConfig, CollectorConfig, SchedulerConfig};
