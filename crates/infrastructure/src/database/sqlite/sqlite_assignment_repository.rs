use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shuffler_core::{
    models::{
        AggregationBatch, Assignment, AssignmentId, AssignmentStatus, IterationId,
        IterationStatus,
    },
    traits::AssignmentRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use tracing::{debug, instrument, warn};

use super::{from_millis, is_unique_violation, to_millis};

/// 设备分配的SQLite仓储实现
pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_assignment(row: &SqliteRow) -> SchedulerResult<Assignment> {
        Ok(Assignment {
            population_name: row.try_get("population_name")?,
            task_id: row.try_get("task_id")?,
            iteration_id: row.try_get("iteration_id")?,
            attempt_id: row.try_get("attempt_id")?,
            session_id: row.try_get("session_id")?,
            correlation_id: row.try_get("correlation_id")?,
            status: row.try_get("status")?,
            batch_id: row.try_get("batch_id")?,
            base_iteration_id: row.try_get("base_iteration_id")?,
            base_on_result_id: row.try_get("base_on_result_id")?,
            result_id: row.try_get("result_id")?,
            created_time: from_millis(row.try_get("created_time")?)?,
            status_updated_time: from_millis(row.try_get("status_updated_time")?)?,
        })
    }

    async fn insert_history(
        conn: &mut SqliteConnection,
        iteration: &IterationId,
        session_id: &str,
        status: AssignmentStatus,
        batch_id: Option<&str>,
        now: i64,
    ) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assignment_status_history (population_name, task_id, iteration_id, attempt_id,
                                                   session_id, status, batch_id, created_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&iteration.population_name)
        .bind(iteration.task_id)
        .bind(iteration.iteration_id)
        .bind(iteration.attempt_id)
        .bind(session_id)
        .bind(status)
        .bind(batch_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// 单个分配的条件更新，成功时写入状态历史
    async fn update_one(
        conn: &mut SqliteConnection,
        iteration: &IterationId,
        session_id: &str,
        from: AssignmentStatus,
        to: AssignmentStatus,
        batch_id: Option<&str>,
        now: i64,
    ) -> SchedulerResult<bool> {
        let result = match batch_id {
            Some(batch_id) => {
                sqlx::query(
                    r#"
                    UPDATE assignments SET status = ?, batch_id = ?, status_updated_time = ?
                    WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
                      AND session_id = ? AND status = ? AND batch_id IS NULL
                    "#,
                )
                .bind(to)
                .bind(batch_id)
                .bind(now)
                .bind(&iteration.population_name)
                .bind(iteration.task_id)
                .bind(iteration.iteration_id)
                .bind(iteration.attempt_id)
                .bind(session_id)
                .bind(from)
                .execute(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE assignments SET status = ?, status_updated_time = ?
                    WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
                      AND session_id = ? AND status = ?
                    "#,
                )
                .bind(to)
                .bind(now)
                .bind(&iteration.population_name)
                .bind(iteration.task_id)
                .bind(iteration.iteration_id)
                .bind(iteration.attempt_id)
                .bind(session_id)
                .bind(from)
                .execute(&mut *conn)
                .await?
            }
        };

        if result.rows_affected() != 1 {
            return Ok(false);
        }
        Self::insert_history(conn, iteration, session_id, to, batch_id, now).await?;
        Ok(true)
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    #[instrument(skip(self, assignment), fields(assignment_id = %assignment.id()))]
    async fn create_assignment(&self, assignment: &Assignment) -> SchedulerResult<bool> {
        let iteration = assignment.iteration();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO assignments (population_name, task_id, iteration_id, attempt_id, session_id,
                                     correlation_id, status, batch_id, created_time, status_updated_time)
            SELECT ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?
            WHERE EXISTS (
                SELECT 1 FROM iterations
                WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
                  AND status = ?
            )
            "#,
        )
        .bind(&assignment.population_name)
        .bind(assignment.task_id)
        .bind(assignment.iteration_id)
        .bind(assignment.attempt_id)
        .bind(&assignment.session_id)
        .bind(&assignment.correlation_id)
        .bind(assignment.status)
        .bind(to_millis(assignment.created_time))
        .bind(to_millis(assignment.status_updated_time))
        .bind(&assignment.population_name)
        .bind(assignment.task_id)
        .bind(assignment.iteration_id)
        .bind(assignment.attempt_id)
        .bind(IterationStatus::Collecting)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SchedulerError::AlreadyExists(format!("分配 {}", assignment.id()))
            } else {
                SchedulerError::Database(e)
            }
        })?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            debug!("迭代已不在收集中，未创建分配: {}", iteration);
            return Ok(false);
        }

        Self::insert_history(
            &mut *tx,
            &iteration,
            &assignment.session_id,
            assignment.status,
            None,
            to_millis(assignment.created_time),
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get_assignment(&self, id: &AssignmentId) -> SchedulerResult<Option<Assignment>> {
        let row = sqlx::query(
            r#"
            SELECT a.population_name, a.task_id, a.iteration_id, a.attempt_id, a.session_id,
                   a.correlation_id, a.status, a.batch_id, a.created_time, a.status_updated_time,
                   i.base_iteration_id, i.base_on_result_id, i.result_id
            FROM assignments a
            JOIN iterations i ON i.population_name = a.population_name AND i.task_id = a.task_id
                             AND i.iteration_id = a.iteration_id AND i.attempt_id = a.attempt_id
            WHERE a.population_name = ? AND a.task_id = ? AND a.iteration_id = ? AND a.attempt_id = ?
              AND a.session_id = ?
            "#,
        )
        .bind(&id.iteration.population_name)
        .bind(id.iteration.task_id)
        .bind(id.iteration.iteration_id)
        .bind(id.iteration.attempt_id)
        .bind(&id.session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_assignment).transpose()
    }

    #[instrument(skip(self, id, from, to), fields(assignment_id = %id, from = %from, to = %to))]
    async fn update_assignment_status(
        &self,
        id: &AssignmentId,
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = Self::update_one(
            &mut *tx,
            &id.iteration,
            &id.session_id,
            from,
            to,
            None,
            to_millis(Utc::now()),
        )
        .await?;
        if updated {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        Ok(updated)
    }

    #[instrument(skip(self, iteration, session_ids, from, to), fields(
        iteration_id = %iteration,
        count = session_ids.len(),
        from = %from,
        to = %to,
    ))]
    async fn batch_update_assignment_status(
        &self,
        iteration: &IterationId,
        session_ids: &[String],
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<u64> {
        if session_ids.is_empty() {
            return Ok(0);
        }
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for session_id in session_ids {
            if Self::update_one(&mut *tx, iteration, session_id, from, to, None, now).await? {
                updated += 1;
            }
        }
        tx.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self, session_ids, batch, from, to), fields(
        batch_id = %batch.id(),
        count = session_ids.len(),
    ))]
    async fn create_batch_and_update_assignments(
        &self,
        session_ids: &[String],
        batch: &AggregationBatch,
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<bool> {
        let iteration = batch.iteration();
        let now = to_millis(Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO aggregation_batches (population_name, task_id, iteration_id, attempt_id,
                                             batch_id, aggregation_level, batch_size,
                                             created_by_partition, status, created_time, updated_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.population_name)
        .bind(batch.task_id)
        .bind(batch.iteration_id)
        .bind(batch.attempt_id)
        .bind(&batch.batch_id)
        .bind(batch.aggregation_level)
        .bind(batch.batch_size)
        .bind(&batch.created_by_partition)
        .bind(batch.status)
        .bind(to_millis(batch.created_time))
        .bind(to_millis(batch.updated_time))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SchedulerError::AlreadyExists(format!("聚合批次 {}", batch.id()))
            } else {
                SchedulerError::Database(e)
            }
        })?;

        for session_id in session_ids {
            let updated = Self::update_one(
                &mut *tx,
                &iteration,
                session_id,
                from,
                to,
                Some(&batch.batch_id),
                now,
            )
            .await?;
            if !updated {
                warn!(
                    "分配 {}/{} 已不处于 {} 状态，放弃创建批次 {}",
                    iteration, session_id, from, batch.batch_id
                );
                tx.rollback().await?;
                return Ok(false);
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn query_assignment_ids_of_status(
        &self,
        iteration: &IterationId,
        status: AssignmentStatus,
        batch_id: Option<&str>,
    ) -> SchedulerResult<Vec<String>> {
        let query = match batch_id {
            Some(batch_id) => sqlx::query_scalar(
                r#"
                SELECT session_id FROM assignments
                WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
                  AND status = ? AND batch_id = ?
                ORDER BY session_id
                "#,
            )
            .bind(&iteration.population_name)
            .bind(iteration.task_id)
            .bind(iteration.iteration_id)
            .bind(iteration.attempt_id)
            .bind(status)
            .bind(batch_id.to_string()),
            None => sqlx::query_scalar(
                r#"
                SELECT session_id FROM assignments
                WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
                  AND status = ? AND batch_id IS NULL
                ORDER BY session_id
                "#,
            )
            .bind(&iteration.population_name)
            .bind(iteration.task_id)
            .bind(iteration.iteration_id)
            .bind(iteration.attempt_id)
            .bind(status),
        };

        let ids: Vec<String> = query
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::Database)?;
        Ok(ids)
    }

    async fn query_assignment_ids_of_status_before(
        &self,
        iteration: &IterationId,
        status: AssignmentStatus,
        before: DateTime<Utc>,
    ) -> SchedulerResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT session_id FROM assignments
            WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
              AND status = ? AND status_updated_time < ?
            ORDER BY session_id
            "#,
        )
        .bind(&iteration.population_name)
        .bind(iteration.task_id)
        .bind(iteration.iteration_id)
        .bind(iteration.attempt_id)
        .bind(status)
        .bind(to_millis(before))
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(ids)
    }
}
