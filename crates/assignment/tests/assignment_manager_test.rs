#[cfg(test)]
mod tests {
    use anyhow::Result;
    use shuffler_assignment::{AssignmentManager, CheckInOutcome};
    use shuffler_core::{
        config::AssignmentConfig,
        models::{
            AssignmentId, AssignmentStatus, CheckInResult, CompressionFormat, EligibilityPolicy,
            EligibilityTaskInfo, Iteration, IterationInfo, IterationStatus, MinSeparationPolicy,
            ReportOutcome, Task, TaskAssignment, TaskInfo, TaskStatus,
        },
        traits::{AssignmentRepository, TaskRepository},
    };
    use shuffler_testing_utils::{IterationBuilder, TaskBuilder, TestEnvironment, TEST_POPULATION};

    fn manager(env: &TestEnvironment) -> AssignmentManager {
        AssignmentManager::new(
            env.task_repository.clone(),
            env.assignment_repository.clone(),
            env.blob_manager.clone(),
            AssignmentConfig::default(),
            env.metrics.clone(),
        )
    }

    async fn open_iteration(env: &TestEnvironment, task: Task, max_size: i64) -> Result<Iteration> {
        env.task_repository.insert_task(&task).await?;
        let iteration = IterationBuilder::for_task(&task, 1)
            .with_status(IterationStatus::Collecting)
            .with_max_aggregation_size(max_size)
            .with_info(IterationInfo {
                task_info: task.info.clone(),
                evaluation_training_iteration_id: None,
            })
            .build();
        env.task_repository.create_iteration(&iteration).await?;
        Ok(iteration)
    }

    fn assigned(outcome: CheckInOutcome) -> TaskAssignment {
        match outcome {
            CheckInOutcome::TaskAssignment(assignment) => assignment,
            CheckInOutcome::RejectionInfo(rejection) => {
                panic!("unexpected rejection: {:?}", rejection.reason)
            }
        }
    }

    fn rejected_reason(outcome: &CheckInOutcome) -> Option<CheckInResult> {
        match outcome {
            CheckInOutcome::RejectionInfo(rejection) => Some(rejection.reason),
            CheckInOutcome::TaskAssignment(_) => None,
        }
    }

    fn assignment_id(iteration: &Iteration, assignment: &TaskAssignment) -> AssignmentId {
        AssignmentId::new(iteration.id(), assignment.assignment_id.clone())
    }

    #[tokio::test]
    async fn test_no_collecting_iteration_is_not_active() -> Result<()> {
        let env = TestEnvironment::new().await?;

        let outcome = manager(&env)
            .create_task_assignment(TEST_POPULATION, "1", None)
            .await;

        let CheckInOutcome::RejectionInfo(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, CheckInResult::IterationNotActive);
        assert_eq!(
            rejection.retry_window,
            AssignmentConfig::default().long_retry_window
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_store_failure_becomes_transient_rejection() -> Result<()> {
        let env = TestEnvironment::new().await?;
        open_iteration(&env, TaskBuilder::new().build(), 3).await?;
        let manager = manager(&env);

        env.database.close().await;
        let outcome = manager.create_task_assignment(TEST_POPULATION, "1", None).await;

        let CheckInOutcome::RejectionInfo(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, CheckInResult::IterationNotOpen);
        assert_eq!(
            rejection.retry_window,
            AssignmentConfig::default().transient_retry_window
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_check_in_creates_assignment() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let iteration = open_iteration(&env, TaskBuilder::new().build(), 3).await?;

        let assignment = assigned(
            manager(&env)
                .create_task_assignment(TEST_POPULATION, "1", Some("device-42".to_string()))
                .await,
        );

        assert_eq!(assignment.task_name, format!("/population/{TEST_POPULATION}/task/1"));
        assert_eq!(assignment.aggregation_id, "1");
        assert_eq!(
            assignment.self_uri,
            format!(
                "/population/{TEST_POPULATION}/task/1/aggregation/1/task-assignment/{}",
                assignment.assignment_id
            )
        );
        assert!(assignment
            .init_checkpoint
            .uri
            .ends_with(&format!("/{TEST_POPULATION}/1/0/d/0/client_checkpoint")));
        assert!(assignment
            .plan
            .uri
            .ends_with(&format!("/{TEST_POPULATION}/1/0/s/0/client_only_plan")));

        let stored = env
            .assignment_repository
            .get_assignment(&assignment_id(&iteration, &assignment))
            .await?
            .expect("assignment stored");
        assert_eq!(stored.status, AssignmentStatus::Assigned);
        assert_eq!(stored.correlation_id.as_deref(), Some("device-42"));
        Ok(())
    }

    #[tokio::test]
    async fn test_full_iteration_rejects_with_transient_window() -> Result<()> {
        let env = TestEnvironment::new().await?;
        open_iteration(&env, TaskBuilder::new().build(), 1).await?;
        let manager = manager(&env);

        assigned(manager.create_task_assignment(TEST_POPULATION, "1", None).await);
        let outcome = manager.create_task_assignment(TEST_POPULATION, "1", None).await;

        let CheckInOutcome::RejectionInfo(rejection) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.reason, CheckInResult::IterationFull);
        assert_eq!(
            rejection.retry_window,
            AssignmentConfig::default().transient_retry_window
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_reasons() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let manager = manager(&env);

        let task = TaskBuilder::new().with_client_versions("10", "20").build();
        open_iteration(&env, task, 3).await?;
        let outcome = manager.create_task_assignment(TEST_POPULATION, "9", None).await;
        assert_eq!(
            rejected_reason(&outcome),
            Some(CheckInResult::ClientVersionMismatch)
        );

        let paused = TaskBuilder::new()
            .with_task_id(2)
            .with_status(TaskStatus::Canceled)
            .build();
        open_iteration(&env, paused, 3).await?;
        // 版本不匹配 (120) 与任务未开放 (110) 同时存在时取状态码较小者
        let outcome = manager.create_task_assignment(TEST_POPULATION, "30", None).await;
        assert_eq!(
            rejected_reason(&outcome),
            Some(CheckInResult::IterationNotOpen)
        );
        let outcome = manager.create_task_assignment(TEST_POPULATION, "15", None).await;
        assert!(rejected_reason(&outcome).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_weight_tasks_are_never_selected() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let task = TaskBuilder::new().with_traffic_weight(0).build();
        open_iteration(&env, task, 3).await?;

        let outcome = manager(&env)
            .create_task_assignment(TEST_POPULATION, "1", None)
            .await;

        assert_eq!(
            rejected_reason(&outcome),
            Some(CheckInResult::IterationNotActive)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_training_eligibility_gets_current_index() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let info = TaskInfo {
            eligibility_task_info: Some(EligibilityTaskInfo {
                eligibility_policies: vec![EligibilityPolicy {
                    id: "min_sep".to_string(),
                    min_separation_policy: Some(MinSeparationPolicy {
                        current_index: 0,
                        minimum_separation: 3,
                    }),
                    data_availability_policy: None,
                }],
            }),
            ..TaskInfo::default()
        };
        open_iteration(&env, TaskBuilder::new().with_info(info).build(), 3).await?;

        let assignment = assigned(
            manager(&env)
                .create_task_assignment(TEST_POPULATION, "1", None)
                .await,
        );

        let policy = &assignment
            .eligibility_task_info
            .expect("eligibility is sent")
            .eligibility_policies[0];
        assert_eq!(
            policy.min_separation_policy.as_ref().map(|p| p.current_index),
            Some(1)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_report_result_applies_once() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let iteration = open_iteration(&env, TaskBuilder::new().build(), 3).await?;
        let manager = manager(&env);
        let assignment = assigned(manager.create_task_assignment(TEST_POPULATION, "1", None).await);
        let id = assignment_id(&iteration, &assignment);

        assert!(manager.report_result(&id, ReportOutcome::Completed).await?);
        assert!(!manager.report_result(&id, ReportOutcome::Failed).await?);

        let stored = env
            .assignment_repository
            .get_assignment(&id)
            .await?
            .expect("assignment stored");
        assert_eq!(stored.status, AssignmentStatus::LocalCompleted);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_instruction_requires_local_completed() -> Result<()> {
        let env = TestEnvironment::new().await?;
        let iteration = open_iteration(&env, TaskBuilder::new().build(), 3).await?;
        let manager = manager(&env);
        let assignment = assigned(manager.create_task_assignment(TEST_POPULATION, "1", None).await);
        let id = assignment_id(&iteration, &assignment);

        assert!(manager.get_upload_instruction(&id, None).await?.is_none());

        manager.report_result(&id, ReportOutcome::Completed).await?;
        let instruction = manager
            .get_upload_instruction(&id, Some(CompressionFormat::Gzip))
            .await?
            .expect("instruction for completed assignment");

        assert!(instruction.upload_location.ends_with(&format!(
            "/gradients/{TEST_POPULATION}/1/1/d/{}/gradient",
            assignment.assignment_id
        )));
        assert_eq!(
            instruction.extra_request_headers.get("content-type").map(String::as_str),
            Some("application/octet-stream")
        );
        assert_eq!(
            instruction.extra_request_headers.get("content-encoding").map(String::as_str),
            Some("gzip")
        );
        assert_eq!(instruction.compression_format, Some(CompressionFormat::Gzip));

        let unknown = AssignmentId::new(iteration.id(), "missing");
        assert!(manager.get_upload_instruction(&unknown, None).await?.is_none());
        Ok(())
    }
}
