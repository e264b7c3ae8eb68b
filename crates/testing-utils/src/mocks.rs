//! Plan executor test doubles

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use shuffler_core::{
    traits::{AppliedUpdate, PlanExecutor},
    SchedulerError, SchedulerResult,
};

/// Records calls and prefixes derived checkpoints so tests can tell them apart
#[derive(Debug, Default)]
pub struct RecordingPlanExecutor {
    derive_calls: AtomicUsize,
    fail: bool,
}

impl RecordingPlanExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            derive_calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn derive_calls(&self) -> usize {
        self.derive_calls.load(Ordering::SeqCst)
    }

    pub fn client_checkpoint_of(checkpoint: &[u8]) -> Vec<u8> {
        [b"client:".as_slice(), checkpoint].concat()
    }
}

#[async_trait]
impl PlanExecutor for RecordingPlanExecutor {
    async fn derive_client_checkpoint(
        &self,
        checkpoint: &[u8],
        _server_plan: &[u8],
    ) -> SchedulerResult<Vec<u8>> {
        self.derive_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SchedulerError::PlanExecution("mock failure".to_string()));
        }
        Ok(Self::client_checkpoint_of(checkpoint))
    }

    async fn apply_intermediate(
        &self,
        checkpoint: &[u8],
        server_plan: &[u8],
        gradients: &[Vec<u8>],
    ) -> SchedulerResult<AppliedUpdate> {
        let client_checkpoint = self.derive_client_checkpoint(checkpoint, server_plan).await?;
        let mut next = checkpoint.to_vec();
        for gradient in gradients {
            next.extend_from_slice(gradient);
        }
        Ok(AppliedUpdate {
            checkpoint: next,
            client_checkpoint,
            metrics: [("gradient_count".to_string(), gradients.len() as f64)].into(),
        })
    }
}
