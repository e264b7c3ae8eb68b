use serde::{Deserialize, Serialize};

use crate::models::RetryWindow;

/// 分配超时时间上限（分钟），即30天
pub const MAX_TIMEOUT_MINUTES: i64 = 30 * 24 * 60;

/// 任务/迭代调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// APPLYING 状态持续超过此时长后输出告警
    pub applying_warn_threshold_seconds: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 10,
            applying_warn_threshold_seconds: 300, // 5分钟
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }
        if self.applying_warn_threshold_seconds <= 0 {
            return Err(anyhow::anyhow!("APPLYING告警阈值必须大于0"));
        }
        Ok(())
    }
}

/// 结果收集器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub timeout_interval_seconds: u64,
    pub batch_size: usize,
    pub upload_timeout_minutes: i64,
    pub local_compute_timeout_minutes: i64,
    /// 失败的第0层批次总大小超过 `阈值 × batch_size` 时迭代进入 AGGREGATING_FAILED
    pub aggregation_batch_failure_threshold: Option<f64>,
    pub notification_poll_interval_seconds: u64,
    pub max_parallel_publishes: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 10,
            timeout_interval_seconds: 60,
            batch_size: 50,
            upload_timeout_minutes: 15,
            local_compute_timeout_minutes: 15,
            aggregation_batch_failure_threshold: None,
            notification_poll_interval_seconds: 5,
            max_parallel_publishes: 8,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_seconds == 0 || self.timeout_interval_seconds == 0 {
            return Err(anyhow::anyhow!("收集器轮询间隔必须大于0"));
        }
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("聚合批次大小必须大于0"));
        }
        for minutes in [self.upload_timeout_minutes, self.local_compute_timeout_minutes] {
            if minutes <= 0 || minutes > MAX_TIMEOUT_MINUTES {
                return Err(anyhow::anyhow!(
                    "超时时间必须在 1 到 {MAX_TIMEOUT_MINUTES} 分钟之间"
                ));
            }
        }
        if let Some(threshold) = self.aggregation_batch_failure_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(anyhow::anyhow!("批次失败阈值不能为负数"));
            }
        }
        if self.max_parallel_publishes == 0 {
            return Err(anyhow::anyhow!("最大并发发布数必须大于0"));
        }
        Ok(())
    }
}

/// 设备签到配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// ITERATION_FULL / ITERATION_NOT_OPEN 的重试窗口
    pub transient_retry_window: RetryWindow,
    /// CLIENT_VERSION_MISMATCH / ITERATION_NOT_ACTIVE 的重试窗口
    pub long_retry_window: RetryWindow,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            transient_retry_window: RetryWindow {
                delay_min_seconds: 60,
                delay_max_seconds: 300,
            },
            long_retry_window: RetryWindow {
                delay_min_seconds: 86_400,
                delay_max_seconds: 172_800,
            },
        }
    }
}

impl AssignmentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for window in [&self.transient_retry_window, &self.long_retry_window] {
            if window.delay_min_seconds > window.delay_max_seconds {
                return Err(anyhow::anyhow!(
                    "重试窗口下限不能大于上限: {} > {}",
                    window.delay_min_seconds,
                    window.delay_max_seconds
                ));
            }
        }
        Ok(())
    }
}
