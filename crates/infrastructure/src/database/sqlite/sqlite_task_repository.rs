use async_trait::async_trait;
use chrono::{Duration, Utc};
use shuffler_core::{
    models::{
        Iteration, IterationId, IterationStatus, OpenIterationCandidate, Task, TaskId, TaskStatus,
        MAX_ACTIVE_ASSIGNMENT_STATUS_CODE,
    },
    traits::TaskRepository,
    SchedulerError, SchedulerResult,
};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument, warn};

use super::{from_millis, is_unique_violation, to_millis};

const TASK_COLUMNS: &str = "population_name, task_id, total_iteration, min_aggregation_size, \
     max_aggregation_size, max_parallel, min_client_version, max_client_version, status, \
     correlation_id, info, created_time, start_time, stop_time";

const ITERATION_COLUMNS: &str = "i.population_name, i.task_id, i.iteration_id, i.attempt_id, \
     i.report_goal, i.status, i.base_iteration_id, i.base_on_result_id, i.result_id, \
     i.aggregation_level, i.max_aggregation_size, i.min_client_version, i.max_client_version, \
     i.info, i.created_time, i.status_updated_time";

/// 任务与迭代的SQLite仓储实现
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> SchedulerResult<Task> {
        let info: String = row.try_get("info")?;
        let start_time: Option<i64> = row.try_get("start_time")?;
        let stop_time: Option<i64> = row.try_get("stop_time")?;
        Ok(Task {
            population_name: row.try_get("population_name")?,
            task_id: row.try_get("task_id")?,
            total_iteration: row.try_get("total_iteration")?,
            min_aggregation_size: row.try_get("min_aggregation_size")?,
            max_aggregation_size: row.try_get("max_aggregation_size")?,
            max_parallel: row.try_get("max_parallel")?,
            min_client_version: row.try_get("min_client_version")?,
            max_client_version: row.try_get("max_client_version")?,
            status: row.try_get("status")?,
            correlation_id: row.try_get("correlation_id")?,
            info: serde_json::from_str(&info)?,
            created_time: from_millis(row.try_get("created_time")?)?,
            start_time: start_time.map(from_millis).transpose()?,
            stop_time: stop_time.map(from_millis).transpose()?,
        })
    }

    fn row_to_iteration(row: &SqliteRow) -> SchedulerResult<Iteration> {
        let info: String = row.try_get("info")?;
        Ok(Iteration {
            population_name: row.try_get("population_name")?,
            task_id: row.try_get("task_id")?,
            iteration_id: row.try_get("iteration_id")?,
            attempt_id: row.try_get("attempt_id")?,
            report_goal: row.try_get("report_goal")?,
            status: row.try_get("status")?,
            base_iteration_id: row.try_get("base_iteration_id")?,
            base_on_result_id: row.try_get("base_on_result_id")?,
            result_id: row.try_get("result_id")?,
            aggregation_level: row.try_get("aggregation_level")?,
            max_aggregation_size: row.try_get("max_aggregation_size")?,
            min_client_version: row.try_get("min_client_version")?,
            max_client_version: row.try_get("max_client_version")?,
            info: serde_json::from_str(&info)?,
            created_time: from_millis(row.try_get("created_time")?)?,
            status_updated_time: from_millis(row.try_get("status_updated_time")?)?,
        })
    }

    async fn insert_task_in(
        conn: &mut sqlx::SqliteConnection,
        task: &Task,
    ) -> SchedulerResult<()> {
        let info = serde_json::to_string(&task.info)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (population_name, task_id, total_iteration, min_aggregation_size,
                               max_aggregation_size, max_parallel, min_client_version,
                               max_client_version, status, correlation_id, info, created_time,
                               start_time, stop_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.population_name)
        .bind(task.task_id)
        .bind(task.total_iteration)
        .bind(task.min_aggregation_size)
        .bind(task.max_aggregation_size)
        .bind(task.max_parallel)
        .bind(&task.min_client_version)
        .bind(&task.max_client_version)
        .bind(task.status)
        .bind(&task.correlation_id)
        .bind(info)
        .bind(to_millis(task.created_time))
        .bind(task.start_time.map(to_millis))
        .bind(task.stop_time.map(to_millis))
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SchedulerError::AlreadyExists(format!("任务 {}", task.id()))
            } else {
                SchedulerError::Database(e)
            }
        })?;

        sqlx::query(
            "INSERT INTO task_status_history (population_name, task_id, status, created_time) VALUES (?, ?, ?, ?)",
        )
        .bind(&task.population_name)
        .bind(task.task_id)
        .bind(task.status)
        .bind(to_millis(Utc::now()))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    async fn insert_task(&self, task: &Task) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_task_in(&mut *tx, task).await?;
        tx.commit().await?;
        debug!("插入任务成功: {}", task.id());
        Ok(())
    }

    #[instrument(skip(self, task), fields(population_name = %task.population_name))]
    async fn create_task(&self, task: &Task) -> SchedulerResult<Task> {
        let mut tx = self.pool.begin().await?;
        let next_id: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(task_id), 0) + 1 FROM tasks WHERE population_name = ?",
        )
        .bind(&task.population_name)
        .fetch_one(&mut *tx)
        .await?;

        let created = Task {
            task_id: next_id,
            ..task.clone()
        };
        Self::insert_task_in(&mut *tx, &created).await?;
        tx.commit().await?;
        debug!("创建任务成功: {}", created.id());
        Ok(created)
    }

    async fn get_task(&self, population_name: &str, task_id: i64) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE population_name = ? AND task_id = ?"
        ))
        .bind(population_name)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn get_tasks_of_status(&self, status: TaskStatus) -> SchedulerResult<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ? \
             ORDER BY population_name, task_id DESC LIMIT 1000"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_task).collect()
    }

    #[instrument(skip(self, from, to), fields(task_id = %from.id(), from = %from.status, to = %to))]
    async fn update_task_status(&self, from: &Task, to: TaskStatus) -> SchedulerResult<bool> {
        let now = Utc::now();
        let start_time = (to == TaskStatus::Open).then(|| to_millis(now));
        let stop_time = to.is_terminal().then(|| to_millis(now));

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?, start_time = COALESCE(?, start_time), stop_time = COALESCE(?, stop_time)
            WHERE population_name = ? AND task_id = ? AND status = ?
            "#,
        )
        .bind(to)
        .bind(start_time)
        .bind(stop_time)
        .bind(&from.population_name)
        .bind(from.task_id)
        .bind(from.status)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO task_status_history (population_name, task_id, status, created_time) VALUES (?, ?, ?, ?)",
        )
        .bind(&from.population_name)
        .bind(from.task_id)
        .bind(to)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    #[instrument(skip(self, iteration), fields(iteration_id = %iteration.id()))]
    async fn create_iteration(&self, iteration: &Iteration) -> SchedulerResult<()> {
        let info = serde_json::to_string(&iteration.info)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO iterations (population_name, task_id, iteration_id, attempt_id, report_goal,
                                    status, base_iteration_id, base_on_result_id, result_id,
                                    aggregation_level, max_aggregation_size, min_client_version,
                                    max_client_version, info, created_time, status_updated_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&iteration.population_name)
        .bind(iteration.task_id)
        .bind(iteration.iteration_id)
        .bind(iteration.attempt_id)
        .bind(iteration.report_goal)
        .bind(iteration.status)
        .bind(iteration.base_iteration_id)
        .bind(iteration.base_on_result_id)
        .bind(iteration.result_id)
        .bind(iteration.aggregation_level)
        .bind(iteration.max_aggregation_size)
        .bind(&iteration.min_client_version)
        .bind(&iteration.max_client_version)
        .bind(info)
        .bind(to_millis(iteration.created_time))
        .bind(to_millis(iteration.status_updated_time))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SchedulerError::AlreadyExists(format!("迭代 {}", iteration.id()))
            } else {
                SchedulerError::Database(e)
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO iteration_status_history (population_name, task_id, iteration_id, attempt_id,
                                                  status, aggregation_level, created_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&iteration.population_name)
        .bind(iteration.task_id)
        .bind(iteration.iteration_id)
        .bind(iteration.attempt_id)
        .bind(iteration.status)
        .bind(iteration.aggregation_level)
        .bind(to_millis(iteration.created_time))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        debug!("创建迭代成功: {}", iteration.id());
        Ok(())
    }

    async fn get_iteration(&self, id: &IterationId) -> SchedulerResult<Option<Iteration>> {
        let row = sqlx::query(&format!(
            "SELECT {ITERATION_COLUMNS} FROM iterations i \
             WHERE i.population_name = ? AND i.task_id = ? AND i.iteration_id = ? AND i.attempt_id = ?"
        ))
        .bind(&id.population_name)
        .bind(id.task_id)
        .bind(id.iteration_id)
        .bind(id.attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_iteration).transpose()
    }

    async fn get_last_iteration(&self, task: &TaskId) -> SchedulerResult<Option<Iteration>> {
        let row = sqlx::query(&format!(
            "SELECT {ITERATION_COLUMNS} FROM iterations i \
             WHERE i.population_name = ? AND i.task_id = ? \
             ORDER BY i.iteration_id DESC, i.attempt_id DESC LIMIT 1"
        ))
        .bind(&task.population_name)
        .bind(task.task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        row.as_ref().map(Self::row_to_iteration).transpose()
    }

    async fn get_iterations_of_status(
        &self,
        status: IterationStatus,
    ) -> SchedulerResult<Vec<Iteration>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITERATION_COLUMNS} FROM iterations i WHERE i.status = ? \
             ORDER BY i.population_name, i.task_id, i.iteration_id"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter().map(Self::row_to_iteration).collect()
    }

    #[instrument(skip(self, from, to), fields(
        iteration_id = %from.id(),
        from = %from.status,
        to = %to.status,
        aggregation_level = to.aggregation_level,
    ))]
    async fn update_iteration_status(
        &self,
        from: &Iteration,
        to: &Iteration,
    ) -> SchedulerResult<bool> {
        if from.id() != to.id() {
            return Err(SchedulerError::Internal(format!(
                "迭代状态更新的前后标识不一致: {} != {}",
                from.id(),
                to.id()
            )));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE iterations
            SET status = ?, aggregation_level = ?, status_updated_time = ?
            WHERE population_name = ? AND task_id = ? AND iteration_id = ? AND attempt_id = ?
              AND status = ? AND aggregation_level = ?
            "#,
        )
        .bind(to.status)
        .bind(to.aggregation_level)
        .bind(to_millis(now))
        .bind(&from.population_name)
        .bind(from.task_id)
        .bind(from.iteration_id)
        .bind(from.attempt_id)
        .bind(from.status)
        .bind(from.aggregation_level)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO iteration_status_history (population_name, task_id, iteration_id, attempt_id,
                                                  status, aggregation_level, created_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&from.population_name)
        .bind(from.task_id)
        .bind(from.iteration_id)
        .bind(from.attempt_id)
        .bind(to.status)
        .bind(to.aggregation_level)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get_open_iterations(
        &self,
        population_name: &str,
    ) -> SchedulerResult<Vec<OpenIterationCandidate>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITERATION_COLUMNS}, t.status AS task_status,
                   (SELECT COUNT(*) FROM assignments a
                     WHERE a.population_name = i.population_name AND a.task_id = i.task_id
                       AND a.iteration_id = i.iteration_id AND a.attempt_id = i.attempt_id
                       AND a.status <= ?) AS active_assignments
            FROM iterations i
            JOIN tasks t ON t.population_name = i.population_name AND t.task_id = i.task_id
            WHERE i.population_name = ? AND i.status = ?
            ORDER BY i.task_id, i.iteration_id
            "#
        ))
        .bind(MAX_ACTIVE_ASSIGNMENT_STATUS_CODE)
        .bind(population_name)
        .bind(IterationStatus::Collecting)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;

        rows.iter()
            .map(|row| -> SchedulerResult<OpenIterationCandidate> {
                Ok(OpenIterationCandidate {
                    iteration: Self::row_to_iteration(row)?,
                    task_status: row.try_get("task_status")?,
                    active_assignments: row.try_get("active_assignments")?,
                })
            })
            .collect()
    }

    async fn get_iteration_ids_per_every_k_iterations(
        &self,
        task: &TaskId,
        k: i64,
        lookback_hours: i64,
    ) -> SchedulerResult<Vec<i64>> {
        if k <= 0 {
            warn!("迭代选择器的步长无效: {}", k);
            return Ok(Vec::new());
        }
        let since = to_millis(Utc::now() - Duration::hours(lookback_hours));
        let ids = sqlx::query_scalar(
            r#"
            SELECT MIN(iteration_id) AS iteration_id
            FROM iteration_status_history
            WHERE population_name = ? AND task_id = ? AND status = ? AND created_time >= ?
            GROUP BY (iteration_id - 1) / ?
            ORDER BY iteration_id
            "#,
        )
        .bind(&task.population_name)
        .bind(task.task_id)
        .bind(IterationStatus::Completed)
        .bind(since)
        .bind(k)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(ids)
    }

    async fn get_iteration_ids_per_every_k_hours(
        &self,
        task: &TaskId,
        k: i64,
        lookback_hours: i64,
    ) -> SchedulerResult<Vec<i64>> {
        if k <= 0 {
            warn!("时间选择器的小时数无效: {}", k);
            return Ok(Vec::new());
        }
        let since = to_millis(Utc::now() - Duration::hours(lookback_hours));
        let ids = sqlx::query_scalar(
            r#"
            SELECT MIN(iteration_id) AS iteration_id
            FROM iteration_status_history
            WHERE population_name = ? AND task_id = ? AND status = ? AND created_time >= ?
            GROUP BY created_time / (? * 3600000)
            ORDER BY iteration_id
            "#,
        )
        .bind(&task.population_name)
        .bind(task.task_id)
        .bind(IterationStatus::Completed)
        .bind(since)
        .bind(k)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::Database)?;
        Ok(ids)
    }
}
