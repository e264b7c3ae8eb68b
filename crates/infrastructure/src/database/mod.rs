pub mod manager;
pub mod sqlite;

pub use manager::{mask_database_url, DatabaseManager};
pub use sqlite::{
    SqliteAggregationBatchRepository, SqliteAssignmentRepository, SqliteModelMetricsRepository,
    SqliteTaskRepository,
};
