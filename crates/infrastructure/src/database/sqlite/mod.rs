pub mod sqlite_aggregation_batch_repository;
pub mod sqlite_assignment_repository;
pub mod sqlite_model_metrics_repository;
pub mod sqlite_task_repository;

pub use sqlite_aggregation_batch_repository::SqliteAggregationBatchRepository;
pub use sqlite_assignment_repository::SqliteAssignmentRepository;
pub use sqlite_model_metrics_repository::SqliteModelMetricsRepository;
pub use sqlite_task_repository::SqliteTaskRepository;

use chrono::{DateTime, Utc};
use shuffler_core::{SchedulerError, SchedulerResult};

/// 时间统一以UTC毫秒存储，保证比较与分桶按数值进行
pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> SchedulerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SchedulerError::Internal(format!("无效的时间戳: {millis}")))
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}
