use async_trait::async_trait;
use chrono::Utc;
use shuffler_core::{
    models::{AggregationBatch, AggregationBatchId, AggregationBatchStatus, IterationId},
    traits::AggregationBatchRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;

use super::{from_millis, to_millis};

/// 聚合批次的SQLite仓储实现
pub struct SqliteAggregationBatchRepository {
    pool: SqlitePool,
}

impl SqliteAggregationBatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_batch(row: &SqliteRow) -> SchedulerResult<AggregationBatch> {
        Ok(AggregationBatch {
            population_name: row.try_get("population_name")?,
            task_id: row.try_get("task_id")?,
            iteration_id: row.try_get("iteration_id")?,
            attempt_id: row.try_get("attempt_id")?,
            batch_id: row.try_get("batch_id")?,
            aggregation_level: row.try_get("aggregation_level")?,
            batch_size: row.try_get("batch_size")?,
            created_by_partition: row.try_get("created_by_partition")?,
            status: row.try_get("status")?,
            created_time: from_millis(row.try_get("created_time")?)?,
            updated_time: from_millis(row.try_get("updated_time")?)?,
        })
    }
}

#[async_trait]
impl AggregationBatchRepository for SqliteAggregationBatchRepository {
    async fn get_aggregation_batch(
        &self,
        id: &AggregationBatchId,
    ) -> SchedulerResult<Option<AggregationBatch>> {
        let row = sqlx::query(
            r#"
            SELECT population_name, task_id, iteration_id, attempt_id, batch_id, aggregation_level,
                   batch_size, created_by_partition, status, created_time, updated_time
            FROM aggregation_batches
            WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
              AND batch_id = ?
            "#,
        )
        .bind(&id.iteration.population_name)
        .bind(id.iteration.task_id)
        .bind(id.iteration.iteration_id)
        .bind(id.iteration.attempt_id)
        .bind(&id.batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_batch).transpose()
    }

    async fn query_aggregation_batch_ids(
        &self,
        iteration: &IterationId,
        aggregation_level: i64,
        status: AggregationBatchStatus,
        partition: Option<&str>,
    ) -> SchedulerResult<Vec<String>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT batch_id FROM aggregation_batches WHERE population_name = ");
        builder
            .push_bind(iteration.population_name.clone())
            .push(" AND task_id = ")
            .push_bind(iteration.task_id)
            .push(" AND iteration_id = ")
            .push_bind(iteration.iteration_id)
            .push(" AND attempt_id = ")
            .push_bind(iteration.attempt_id)
            .push(" AND aggregation_level = ")
            .push_bind(aggregation_level)
            .push(" AND status = ")
            .push_bind(status);
        if let Some(partition) = partition {
            builder
                .push(" AND created_by_partition = ")
                .push_bind(partition.to_string());
        }
        builder.push(" ORDER BY batch_id");

        let ids: Vec<String> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(ids)
    }

    #[instrument(skip(self, from, to), fields(batch_id = %from.id(), from = %from.status, to = %to))]
    async fn update_aggregation_batch_status(
        &self,
        from: &AggregationBatch,
        to: AggregationBatchStatus,
    ) -> SchedulerResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE aggregation_batches SET status = ?, updated_time = ?
            WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
              AND batch_id = ? AND status = ?
            "#,
        )
        .bind(to)
        .bind(to_millis(Utc::now()))
        .bind(&from.population_name)
        .bind(from.task_id)
        .bind(from.iteration_id)
        .bind(from.attempt_id)
        .bind(&from.batch_id)
        .bind(from.status)
        .execute(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    async fn query_sum_of_aggregation_batch_sizes(
        &self,
        iteration: &IterationId,
        aggregation_level: i64,
        statuses: &[AggregationBatchStatus],
    ) -> SchedulerResult<i64> {
        if statuses.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COALESCE(SUM(batch_size), 0) FROM aggregation_batches WHERE population_name = ",
        );
        builder
            .push_bind(iteration.population_name.clone())
            .push(" AND task_id = ")
            .push_bind(iteration.task_id)
            .push(" AND iteration_id = ")
            .push_bind(iteration.iteration_id)
            .push(" AND attempt_id = ")
            .push_bind(iteration.attempt_id)
            .push(" AND aggregation_level = ")
            .push_bind(aggregation_level)
            .push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");

        let sum: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(sum)
    }
}
