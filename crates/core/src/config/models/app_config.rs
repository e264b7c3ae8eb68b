use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    blob_storage::BlobStorageConfig,
    database::DatabaseConfig,
    lock::LockConfig,
    message_queue::MessageQueueConfig,
    orchestration::{AssignmentConfig, CollectorConfig, SchedulerConfig},
};

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub message_queue: MessageQueueConfig,
    pub lock: LockConfig,
    pub blob_storage: BlobStorageConfig,
    pub scheduler: SchedulerConfig,
    pub collector: CollectorConfig,
    pub assignment: AssignmentConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: SHUFFLER_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/shuffler.toml",
                "shuffler.toml",
                "/etc/shuffler/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SHUFFLER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.message_queue
            .validate()
            .context("消息队列配置验证失败")?;
        self.lock.validate().context("分布式锁配置验证失败")?;
        self.blob_storage
            .validate()
            .context("对象存储配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.collector.validate().context("收集器配置验证失败")?;
        self.assignment.validate().context("签到配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{LockType, MessageQueueType};
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.collector.batch_size, 50);
        assert_eq!(config.assignment.long_retry_window.delay_min_seconds, 86_400);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [collector]
            batch_size = 2
            aggregation_batch_failure_threshold = 0.5

            [lock]
            type = "in_memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.collector.batch_size, 2);
        assert_eq!(config.collector.aggregation_batch_failure_threshold, Some(0.5));
        assert_eq!(config.lock.r#type, LockType::InMemory);
        assert_eq!(config.message_queue.r#type, MessageQueueType::InMemory);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("[collector]\nbatch_size = 0\n").is_err());
        assert!(AppConfig::from_toml("[collector]\nupload_timeout_minutes = 9223372036854775807\n").is_err());
        assert!(AppConfig::from_toml("[collector]\nlocal_compute_timeout_minutes = 43201\n").is_err());
        assert!(AppConfig::from_toml("[collector]\nlocal_compute_timeout_minutes = 43200\n").is_ok());
        assert!(AppConfig::from_toml("[message_queue]\nconsume_batch_size = 0\n").is_err());
        assert!(AppConfig::from_toml("[database]\nurl = \"postgres://x\"\n").is_err());
        assert!(AppConfig::from_toml("[lock]\ntype = \"redis\"\n").is_err());
        assert!(AppConfig::from_toml(
            "[message_queue]\ntype = \"rabbitmq\"\nurl = \"http://x\"\n"
        )
        .is_err());
    }

    #[test]
    fn test_toml_round_trip_and_file_loading() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        let toml_str = config.to_toml().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml_str.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.database.url, "sqlite::memory:");
        assert!(AppConfig::load(Some("/nonexistent/shuffler.toml")).is_err());
    }
}
