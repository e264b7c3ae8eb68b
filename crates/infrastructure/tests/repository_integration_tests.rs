use anyhow::Result;
use chrono::{Duration, Utc};
use shuffler_core::models::{
    AggregationBatch, AggregationBatchStatus, AssignmentStatus, CheckInResult, IterationStatus,
    ModelMetric, TaskStatus,
};
use shuffler_core::SchedulerError;

mod database_test_utils;
use database_test_utils::*;

#[tokio::test]
async fn test_task_insert_get_and_conflict() -> Result<()> {
    let db = setup_database().await?;
    let repo = db.task_repository();
    let task = sample_task(1, TaskStatus::Created);

    repo.insert_task(&task).await?;
    let stored = repo.get_task(POPULATION, 1).await?.expect("任务应存在");
    assert_eq!(stored.status, TaskStatus::Created);
    assert_eq!(stored.info, task.info);

    let conflict = repo.insert_task(&task).await;
    assert!(matches!(conflict, Err(SchedulerError::AlreadyExists(_))));
    assert!(repo.get_task(POPULATION, 2).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_create_task_assigns_next_id() -> Result<()> {
    let db = setup_database().await?;
    let repo = db.task_repository();

    let first = repo.create_task(&sample_task(0, TaskStatus::Created)).await?;
    let second = repo.create_task(&sample_task(0, TaskStatus::Created)).await?;
    assert_eq!(first.task_id, 1);
    assert_eq!(second.task_id, 2);
    Ok(())
}

#[tokio::test]
async fn test_task_status_cas() -> Result<()> {
    let db = setup_database().await?;
    let repo = db.task_repository();
    let task = sample_task(1, TaskStatus::Created);
    repo.insert_task(&task).await?;

    assert!(repo.update_task_status(&task, TaskStatus::Open).await?);
    // 过期的 from 状态不会生效
    assert!(!repo.update_task_status(&task, TaskStatus::Failed).await?);

    let stored = repo.get_task(POPULATION, 1).await?.expect("任务应存在");
    assert_eq!(stored.status, TaskStatus::Open);
    assert!(stored.start_time.is_some());

    let open = repo.get_tasks_of_status(TaskStatus::Open).await?;
    assert_eq!(open.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_iteration_lifecycle() -> Result<()> {
    let db = setup_database().await?;
    let repo = db.task_repository();
    let task = sample_task(1, TaskStatus::Open);
    repo.insert_task(&task).await?;

    let first = sample_iteration(&task, 1, IterationStatus::Completed);
    let second = sample_iteration(&task, 2, IterationStatus::Collecting);
    repo.create_iteration(&first).await?;
    repo.create_iteration(&second).await?;
    assert!(matches!(
        repo.create_iteration(&second).await,
        Err(SchedulerError::AlreadyExists(_))
    ));

    let last = repo.get_last_iteration(&task.id()).await?.expect("应有迭代");
    assert_eq!(last.iteration_id, 2);

    let aggregating = second.with_status_and_level(IterationStatus::Aggregating, 1);
    assert!(repo.update_iteration_status(&second, &aggregating).await?);
    assert!(!repo.update_iteration_status(&second, &aggregating).await?);

    let stored = repo.get_iteration(&second.id()).await?.expect("迭代应存在");
    assert_eq!(stored.status, IterationStatus::Aggregating);
    assert_eq!(stored.aggregation_level, 1);

    // 层级不同的 from 视为过期
    let wrong_level = stored.with_status_and_level(IterationStatus::Aggregating, 0);
    assert!(
        !repo
            .update_iteration_status(&wrong_level, &stored.with_status(IterationStatus::Applying))
            .await?
    );

    let completed = repo.get_iterations_of_status(IterationStatus::Completed).await?;
    assert_eq!(completed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_open_iterations_count_active_assignments() -> Result<()> {
    let db = setup_database().await?;
    let task_repo = db.task_repository();
    let assignment_repo = db.assignment_repository();

    let task = sample_task(1, TaskStatus::Open);
    task_repo.insert_task(&task).await?;
    let iteration = sample_iteration(&task, 1, IterationStatus::Collecting);
    task_repo.create_iteration(&iteration).await?;

    for session in ["a", "b", "c"] {
        assert!(
            assignment_repo
                .create_assignment(&sample_assignment(&iteration, session, Utc::now()))
                .await?
        );
    }
    let failed = sample_assignment(&iteration, "c", Utc::now()).id();
    assert!(
        assignment_repo
            .update_assignment_status(&failed, AssignmentStatus::Assigned, AssignmentStatus::LocalFailed)
            .await?
    );

    let candidates = task_repo.get_open_iterations(POPULATION).await?;
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].active_assignments, 2);
    assert_eq!(candidates[0].task_status, TaskStatus::Open);
    assert_eq!(candidates[0].evaluate("10"), CheckInResult::Success);
    assert!(task_repo.get_open_iterations("other").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_assignment_requires_collecting_iteration() -> Result<()> {
    let db = setup_database().await?;
    let task_repo = db.task_repository();
    let assignment_repo = db.assignment_repository();

    let task = sample_task(1, TaskStatus::Open);
    task_repo.insert_task(&task).await?;
    let iteration = sample_iteration(&task, 1, IterationStatus::Aggregating);
    task_repo.create_iteration(&iteration).await?;

    let created = assignment_repo
        .create_assignment(&sample_assignment(&iteration, "late", Utc::now()))
        .await?;
    assert!(!created);
    Ok(())
}

#[tokio::test]
async fn test_assignment_lineage_and_concurrent_reports() -> Result<()> {
    let db = setup_database().await?;
    let task_repo = db.task_repository();
    let assignment_repo = db.assignment_repository();

    let task = sample_task(1, TaskStatus::Open);
    task_repo.insert_task(&task).await?;
    let iteration = sample_iteration(&task, 4, IterationStatus::Collecting);
    task_repo.create_iteration(&iteration).await?;
    let assignment = sample_assignment(&iteration, "s1", Utc::now());
    assignment_repo.create_assignment(&assignment).await?;

    let id = assignment.id();
    let stored = assignment_repo.get_assignment(&id).await?.expect("分配应存在");
    assert_eq!(stored.base_on_result_id, 3);
    assert_eq!(stored.result_id, 4);

    let first = assignment_repo
        .update_assignment_status(&id, AssignmentStatus::Assigned, AssignmentStatus::LocalCompleted)
        .await?;
    let second = assignment_repo
        .update_assignment_status(&id, AssignmentStatus::Assigned, AssignmentStatus::LocalFailed)
        .await?;
    assert!(first);
    assert!(!second);
    Ok(())
}

#[tokio::test]
async fn test_create_batch_is_all_or_nothing() -> Result<()> {
    let db = setup_database().await?;
    let task_repo = db.task_repository();
    let assignment_repo = db.assignment_repository();
    let batch_repo = db.aggregation_batch_repository();

    let task = sample_task(1, TaskStatus::Open);
    task_repo.insert_task(&task).await?;
    let iteration = sample_iteration(&task, 1, IterationStatus::Collecting);
    task_repo.create_iteration(&iteration).await?;
    let iteration_id = iteration.id();

    let sessions: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    for session in &sessions {
        assignment_repo
            .create_assignment(&sample_assignment(&iteration, session, Utc::now()))
            .await?;
    }
    assignment_repo
        .batch_update_assignment_status(
            &iteration_id,
            &sessions[..2],
            AssignmentStatus::Assigned,
            AssignmentStatus::LocalCompleted,
        )
        .await?;

    // c 不处于 LOCAL_COMPLETED，整个批次回滚
    let rejected = AggregationBatch::new_full(&iteration_id, "batch-x", 0, 3, "p");
    assert!(
        !assignment_repo
            .create_batch_and_update_assignments(
                &sessions,
                &rejected,
                AssignmentStatus::LocalCompleted,
                AssignmentStatus::UploadCompleted,
            )
            .await?
    );
    assert!(batch_repo.get_aggregation_batch(&rejected.id()).await?.is_none());
    assert_eq!(
        assignment_repo
            .query_assignment_ids_of_status(&iteration_id, AssignmentStatus::LocalCompleted, None)
            .await?,
        vec!["a", "b"]
    );

    let batch = AggregationBatch::new_full(&iteration_id, "batch-y", 0, 2, "p");
    assert!(
        assignment_repo
            .create_batch_and_update_assignments(
                &sessions[..2],
                &batch,
                AssignmentStatus::LocalCompleted,
                AssignmentStatus::UploadCompleted,
            )
            .await?
    );
    assert_eq!(
        assignment_repo
            .query_assignment_ids_of_status(
                &iteration_id,
                AssignmentStatus::UploadCompleted,
                Some("batch-y"),
            )
            .await?,
        vec!["a", "b"]
    );
    Ok(())
}

#[tokio::test]
async fn test_aggregation_batch_queries() -> Result<()> {
    let db = setup_database().await?;
    let task_repo = db.task_repository();
    let assignment_repo = db.assignment_repository();
    let batch_repo = db.aggregation_batch_repository();

    let task = sample_task(1, TaskStatus::Open);
    task_repo.insert_task(&task).await?;
    let iteration = sample_iteration(&task, 1, IterationStatus::Collecting);
    task_repo.create_iteration(&iteration).await?;
    let iteration_id = iteration.id();

    for (batch_id, size, partition) in [("b1", 2, "p1"), ("b2", 3, "p1"), ("b3", 4, "p2")] {
        let batch = AggregationBatch::new_full(&iteration_id, batch_id, 0, size, partition);
        assignment_repo
            .create_batch_and_update_assignments(
                &[],
                &batch,
                AssignmentStatus::LocalCompleted,
                AssignmentStatus::UploadCompleted,
            )
            .await?;
    }

    let p1_full = batch_repo
        .query_aggregation_batch_ids(&iteration_id, 0, AggregationBatchStatus::Full, Some("p1"))
        .await?;
    assert_eq!(p1_full, vec!["b1", "b2"]);

    let b1 = batch_repo
        .get_aggregation_batch(&AggregationBatch::new_full(&iteration_id, "b1", 0, 2, "p1").id())
        .await?
        .expect("批次应存在");
    assert!(
        batch_repo
            .update_aggregation_batch_status(&b1, AggregationBatchStatus::PublishCompleted)
            .await?
    );
    assert!(
        !batch_repo
            .update_aggregation_batch_status(&b1, AggregationBatchStatus::PublishCompleted)
            .await?
    );

    let published = batch_repo
        .query_sum_of_aggregation_batch_sizes(
            &iteration_id,
            0,
            &[
                AggregationBatchStatus::PublishCompleted,
                AggregationBatchStatus::UploadCompleted,
            ],
        )
        .await?;
    assert_eq!(published, 2);
    let full = batch_repo
        .query_sum_of_aggregation_batch_sizes(&iteration_id, 0, &[AggregationBatchStatus::Full])
        .await?;
    assert_eq!(full, 7);
    assert_eq!(
        batch_repo
            .query_sum_of_aggregation_batch_sizes(&iteration_id, 1, &[AggregationBatchStatus::Full])
            .await?,
        0
    );
    Ok(())
}

#[tokio::test]
async fn test_assignments_before_threshold() -> Result<()> {
    let db = setup_database().await?;
    let task_repo = db.task_repository();
    let assignment_repo = db.assignment_repository();

    let task = sample_task(1, TaskStatus::Open);
    task_repo.insert_task(&task).await?;
    let iteration = sample_iteration(&task, 1, IterationStatus::Collecting);
    task_repo.create_iteration(&iteration).await?;

    let old = Utc::now() - Duration::minutes(30);
    assignment_repo
        .create_assignment(&sample_assignment(&iteration, "old", old))
        .await?;
    assignment_repo
        .create_assignment(&sample_assignment(&iteration, "fresh", Utc::now()))
        .await?;

    let stale = assignment_repo
        .query_assignment_ids_of_status_before(
            &iteration.id(),
            AssignmentStatus::Assigned,
            Utc::now() - Duration::minutes(15),
        )
        .await?;
    assert_eq!(stale, vec!["old"]);
    Ok(())
}

#[tokio::test]
async fn test_checkpoint_selector_queries() -> Result<()> {
    let db = setup_database().await?;
    let repo = db.task_repository();
    let task = sample_task(1, TaskStatus::Open);
    repo.insert_task(&task).await?;

    for iteration_id in 1..=5 {
        let collecting = sample_iteration(&task, iteration_id, IterationStatus::Collecting);
        repo.create_iteration(&collecting).await?;
        repo.update_iteration_status(
            &collecting,
            &collecting.with_status(IterationStatus::Completed),
        )
        .await?;
    }

    let every_two = repo
        .get_iteration_ids_per_every_k_iterations(&task.id(), 2, 24)
        .await?;
    assert_eq!(every_two, vec![1, 3, 5]);

    // 所有迭代都在同一小时桶内时最多两个桶（跨越整点）
    let per_hour = repo.get_iteration_ids_per_every_k_hours(&task.id(), 1, 24).await?;
    assert!(!per_hour.is_empty() && per_hour.len() <= 2);
    assert_eq!(per_hour[0], 1);

    assert!(repo
        .get_iteration_ids_per_every_k_iterations(&task.id(), 0, 24)
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn test_model_metrics_upsert() -> Result<()> {
    let db = setup_database().await?;
    let repo = db.model_metrics_repository();
    let task = sample_task(1, TaskStatus::Open);
    let iteration = sample_iteration(&task, 1, IterationStatus::Completed);

    let metric = |name: &str, value: f64| ModelMetric {
        population_name: POPULATION.to_string(),
        task_id: 1,
        iteration_id: 1,
        metric_name: name.to_string(),
        metric_value: value,
    };
    repo.upsert_model_metrics(&[metric("loss", 0.5), metric("accuracy", 0.7)])
        .await?;
    repo.upsert_model_metrics(&[metric("loss", 0.25)]).await?;

    let stored = repo.get_model_metrics(&iteration.id()).await?;
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].metric_name, "accuracy");
    assert_eq!(stored[1].metric_value, 0.25);
    Ok(())
}
