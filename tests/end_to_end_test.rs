#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Result;
    use shuffler::{AppMode, Application, ShutdownManager};
    use shuffler_assignment::{AssignmentManager, CheckInOutcome};
    use shuffler_collector::{Collector, MessageFactory};
    use shuffler_core::{
        config::{AppConfig, AssignmentConfig, CollectorConfig, MessageQueueConfig, SchedulerConfig},
        models::{
            AssignmentId, BlobDescription, IterationStatus, MessageType, ReportOutcome, TaskStatus,
        },
        traits::{BlobStore, MessageQueue, ModelMetricsRepository, PlanExecutor, TaskRepository},
    };
    use shuffler_infrastructure::PassthroughPlanExecutor;
    use shuffler_scheduler::{IterationPlanner, TaskScheduler};
    use shuffler_testing_utils::{TaskBuilder, TestEnvironment, TEST_POPULATION};

    fn scheduler(env: &TestEnvironment) -> TaskScheduler {
        let planner = IterationPlanner::new(
            env.task_repository.clone(),
            env.blob_store_dyn(),
            env.blob_manager.clone(),
            Arc::new(PassthroughPlanExecutor::new()),
        );
        TaskScheduler::new(
            env.task_repository.clone(),
            env.metrics_repository.clone(),
            env.lock_service.clone(),
            planner,
            SchedulerConfig::default(),
            env.metrics.clone(),
        )
    }

    fn collector(env: &TestEnvironment) -> Collector {
        Collector::new(
            env.task_repository.clone(),
            env.assignment_repository.clone(),
            env.batch_repository.clone(),
            env.blob_store_dyn(),
            env.message_queue_dyn(),
            env.lock_service.clone(),
            MessageFactory::new(env.blob_manager.clone()),
            CollectorConfig {
                batch_size: 2,
                ..CollectorConfig::default()
            },
            &MessageQueueConfig::default(),
            env.metrics.clone(),
        )
    }

    /// 聚合器：为每个批次写出中间聚合结果
    async fn run_aggregator(env: &TestEnvironment, queue: &str) -> Result<usize> {
        let messages = env.message_queue.consume_messages(queue, usize::MAX).await?;
        for message in &messages {
            let MessageType::Aggregation(request) = &message.message_type else {
                panic!("expected aggregation request");
            };
            let output = BlobDescription::new(
                request.aggregated_gradient_output_bucket.clone(),
                request.aggregated_gradient_output_object.clone(),
            );
            env.blob_store.upload(&output, request.request_id.as_bytes()).await?;
        }
        Ok(messages.len())
    }

    /// 模型更新器：应用中间结果并写出新检查点与指标
    async fn run_model_updater(env: &TestEnvironment, queue: &str) -> Result<usize> {
        let executor = PassthroughPlanExecutor::new();
        let messages = env.message_queue.consume_messages(queue, usize::MAX).await?;
        for message in &messages {
            let MessageType::ModelUpdate(request) = &message.message_type else {
                panic!("expected model update request");
            };
            let checkpoint = env
                .blob_store
                .download(&BlobDescription::new(
                    request.checkpoint_bucket.clone(),
                    request.checkpoint_object.clone(),
                ))
                .await?;
            let plan = env
                .blob_store
                .download(&BlobDescription::new(
                    request.server_plan_bucket.clone(),
                    request.server_plan_object.clone(),
                ))
                .await?;
            let mut gradients = Vec::new();
            for gradient in &request.intermediate_gradients {
                let blob = BlobDescription::new(
                    request.intermediate_gradient_bucket.clone(),
                    format!("{}{}", request.intermediate_gradient_prefix, gradient),
                );
                gradients.push(env.blob_store.download(&blob).await?);
            }

            let update = executor.apply_intermediate(&checkpoint, &plan, &gradients).await?;

            if let (Some(bucket), Some(object)) = (
                &request.new_checkpoint_output_bucket,
                &request.new_checkpoint_output_object,
            ) {
                env.blob_store
                    .upload(&BlobDescription::new(bucket.clone(), object.clone()), &update.checkpoint)
                    .await?;
            }
            if let (Some(bucket), Some(object)) = (
                &request.new_client_checkpoint_output_bucket,
                &request.new_client_checkpoint_output_object,
            ) {
                env.blob_store
                    .upload(
                        &BlobDescription::new(bucket.clone(), object.clone()),
                        &update.client_checkpoint,
                    )
                    .await?;
            }
            env.blob_store
                .upload(
                    &BlobDescription::new(
                        request.metrics_output_bucket.clone(),
                        request.metrics_output_object.clone(),
                    ),
                    &serde_json::to_vec(&update.metrics)?,
                )
                .await?;
        }
        Ok(messages.len())
    }

    #[tokio::test]
    async fn test_single_iteration_training_round() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let queues = MessageQueueConfig::default();
        let scheduler = scheduler(&env);
        let collector = collector(&env);
        let manager = AssignmentManager::new(
            env.task_repository.clone(),
            env.assignment_repository.clone(),
            env.blob_manager.clone(),
            AssignmentConfig::default(),
            env.metrics.clone(),
        );

        let task = TaskBuilder::new()
            .with_status(TaskStatus::Created)
            .with_total_iteration(1)
            .with_aggregation_sizes(2, 3)
            .build();
        env.task_repository.insert_task(&task).await?;
        env.upload_task_resources(&task).await?;

        // 开放任务并创建第一轮迭代
        scheduler.run_once().await;
        scheduler.run_once().await;
        let iteration = env
            .task_repository
            .get_last_iteration(&task.id())
            .await?
            .expect("first iteration created");
        assert_eq!(iteration.status, IterationStatus::Collecting);

        // 两台设备签到、完成计算并上传梯度
        for _ in 0..2 {
            let CheckInOutcome::TaskAssignment(assignment) =
                manager.create_task_assignment(TEST_POPULATION, "1", None).await
            else {
                panic!("device should be assigned");
            };
            let id = AssignmentId::new(iteration.id(), assignment.assignment_id.clone());
            assert!(manager.report_result(&id, ReportOutcome::Completed).await?);
            assert!(manager.get_upload_instruction(&id, None).await?.is_some());
            env.upload_gradient(&iteration, &assignment.assignment_id).await?;
        }

        collector.process_iterations().await?;
        let stored = env.task_repository.get_iteration(&iteration.id()).await?;
        assert_eq!(stored.map(|i| i.status), Some(IterationStatus::Aggregating));

        assert_eq!(run_aggregator(&env, &queues.aggregator_queue).await?, 1);
        collector.process_iterations().await?;
        let stored = env.task_repository.get_iteration(&iteration.id()).await?;
        assert_eq!(stored.map(|i| i.status), Some(IterationStatus::Applying));

        assert_eq!(run_model_updater(&env, &queues.model_updater_queue).await?, 1);
        scheduler.run_once().await;
        scheduler.run_once().await;

        let stored = env
            .task_repository
            .get_task(TEST_POPULATION, task.task_id)
            .await?
            .expect("task exists");
        assert_eq!(stored.status, TaskStatus::Completed);

        let stored = env.task_repository.get_iteration(&iteration.id()).await?;
        assert_eq!(stored.map(|i| i.status), Some(IterationStatus::PostProcessed));

        let metrics = env.metrics_repository.get_model_metrics(&iteration.id()).await?;
        let gradient_count = metrics
            .iter()
            .find(|m| m.metric_name == "gradient_count")
            .map(|m| m.metric_value);
        assert_eq!(gradient_count, Some(1.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_application_starts_and_shuts_down() -> Result<()> {
        let blob_root = tempfile::tempdir()?;
        let mut config = AppConfig::from_toml(
            r#"
            [database]
            url = "sqlite::memory:"

            [lock]
            type = "in_memory"

            [message_queue]
            type = "in_memory"

            [api]
            bind_address = "127.0.0.1:0"

            [observability]
            metrics_enabled = false
            "#,
        )?;
        config.blob_storage.root_dir = blob_root.path().to_string_lossy().to_string();

        let app = Arc::new(Application::new(config, AppMode::All).await?);
        let shutdown_manager = ShutdownManager::new();
        let shutdown_rx = shutdown_manager.subscribe().await;

        let handle = {
            let app = Arc::clone(&app);
            tokio::spawn(async move { app.run(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_manager.shutdown().await;

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await??;
        assert!(result.is_ok());
        Ok(())
    }
}
