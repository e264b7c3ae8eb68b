//! Metrics collector for the round orchestrator
//!
//! Handles without labels are registered once at construction. Labelled
//! series are resolved per call through the `metrics` macros.

use metrics::{counter, histogram, Counter, Histogram};
use shuffler_core::models::{AssignmentStatus, CheckInResult, IterationStatus, TaskStatus};
use tracing::debug;

/// Metrics collector shared by scheduler, collector and assignment services
#[derive(Clone)]
pub struct MetricsCollector {
    iterations_created_total: Counter,
    assignments_created_total: Counter,
    batches_created_total: Counter,
    batches_published_total: Counter,
    model_updates_requested_total: Counter,
    aggregator_notifications_total: Counter,
    publish_duration: Histogram,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            iterations_created_total: counter!("shuffler_iterations_created_total"),
            assignments_created_total: counter!("shuffler_assignments_created_total"),
            batches_created_total: counter!("shuffler_aggregation_batches_created_total"),
            batches_published_total: counter!("shuffler_aggregation_batches_published_total"),
            model_updates_requested_total: counter!("shuffler_model_updates_requested_total"),
            aggregator_notifications_total: counter!("shuffler_aggregator_notifications_total"),
            publish_duration: histogram!("shuffler_message_publish_duration_seconds"),
        }
    }

    pub fn record_iteration_created(&self) {
        self.iterations_created_total.increment(1);
    }

    pub fn record_task_transition(&self, from: TaskStatus, to: TaskStatus) {
        counter!(
            "shuffler_task_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    pub fn record_iteration_transition(&self, from: IterationStatus, to: IterationStatus) {
        counter!(
            "shuffler_iteration_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    pub fn record_assignment_created(&self) {
        self.assignments_created_total.increment(1);
    }

    pub fn record_check_in_rejected(&self, reason: CheckInResult) {
        counter!("shuffler_check_in_rejections_total", "reason" => reason.as_str()).increment(1);
    }

    pub fn record_assignment_report(&self, status: AssignmentStatus) {
        counter!("shuffler_assignment_reports_total", "status" => status.as_str()).increment(1);
    }

    pub fn record_assignments_timed_out(&self, status: AssignmentStatus, count: u64) {
        counter!("shuffler_assignment_timeouts_total", "status" => status.as_str())
            .increment(count);
    }

    pub fn record_batches_created(&self, count: u64) {
        self.batches_created_total.increment(count);
    }

    pub fn record_batch_published(&self, duration_seconds: f64) {
        self.batches_published_total.increment(1);
        self.publish_duration.record(duration_seconds);
    }

    pub fn record_model_update_requested(&self, duration_seconds: f64) {
        self.model_updates_requested_total.increment(1);
        self.publish_duration.record(duration_seconds);
    }

    pub fn record_aggregator_notification(&self) {
        self.aggregator_notifications_total.increment(1);
    }

    /// A conditional write lost to a concurrent writer
    pub fn record_lost_race(&self, entity: &'static str) {
        counter!("shuffler_lost_races_total", "entity" => entity).increment(1);
    }

    /// A partition was held by another instance and skipped this cycle
    pub fn record_partition_skipped(&self, component: &'static str) {
        counter!("shuffler_partitions_skipped_total", "component" => component).increment(1);
    }

    pub fn record_sweep_duration(&self, component: &'static str, duration_seconds: f64) {
        histogram!("shuffler_sweep_duration_seconds", "component" => component)
            .record(duration_seconds);
        debug!(component, duration_seconds, "sweep finished");
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
