use async_trait::async_trait;
use shuffler_core::{
    models::{IterationId, ModelMetric},
    traits::ModelMetricsRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// 模型指标的SQLite仓储实现
pub struct SqliteModelMetricsRepository {
    pool: SqlitePool,
}

impl SqliteModelMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelMetricsRepository for SqliteModelMetricsRepository {
    async fn upsert_model_metrics(&self, metrics: &[ModelMetric]) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        for metric in metrics {
            sqlx::query(
                r#"
                INSERT INTO model_metrics (population_name, task_id, iteration_id, metric_name, metric_value)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (population_name, task_id, iteration_id, metric_name)
                DO UPDATE SET metric_value = excluded.metric_value
                "#,
            )
            .bind(&metric.population_name)
            .bind(metric.task_id)
            .bind(metric.iteration_id)
            .bind(&metric.metric_name)
            .bind(metric.metric_value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!("写入模型指标 {} 项", metrics.len());
        Ok(())
    }

    async fn get_model_metrics(&self, iteration: &IterationId) -> SchedulerResult<Vec<ModelMetric>> {
        let rows = sqlx::query(
            r#"
            SELECT population_name, task_id, iteration_id, metric_name, metric_value
            FROM model_metrics
            WHERE population_name = ? AND task_id = ? AND iteration_id = ?
            ORDER BY metric_name
            "#,
        )
        .bind(&iteration.population_name)
        .bind(iteration.task_id)
        .bind(iteration.iteration_id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter()
            .map(|row| -> SchedulerResult<ModelMetric> {
                Ok(ModelMetric {
                    population_name: row.try_get("population_name")?,
                    task_id: row.try_get("task_id")?,
                    iteration_id: row.try_get("iteration_id")?,
                    metric_name: row.try_get("metric_name")?,
                    metric_value: row.try_get("metric_value")?,
                })
            })
            .collect()
    }
}
