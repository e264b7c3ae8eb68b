use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use shuffler_api::{create_app, AppState};
use shuffler_assignment::AssignmentManager;
use shuffler_collector::{Collector, MessageFactory, NotificationListener};
use shuffler_core::{
    config::{AppConfig, LockType},
    traits::{BlobStore, LockService, MessageQueue},
    BlobManager,
};
use shuffler_infrastructure::{
    create_blob_store, DatabaseManager, InMemoryLockService, MessageQueueFactory,
    MetricsCollector, PassthroughPlanExecutor, RedisLockService,
};
use shuffler_scheduler::{IterationPlanner, TaskScheduler};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行任务/迭代调度器
    Scheduler,
    /// 仅运行结果收集器（含超时扫描与聚合器通知监听）
    Collector,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

impl AppMode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "scheduler" => Ok(AppMode::Scheduler),
            "collector" => Ok(AppMode::Collector),
            "api" => Ok(AppMode::Api),
            "all" => Ok(AppMode::All),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {mode}")),
        }
    }

    fn includes(self, component: AppMode) -> bool {
        self == AppMode::All || self == component
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: DatabaseManager,
    lock_service: Arc<dyn LockService>,
    blob_store: Arc<dyn BlobStore>,
    message_queue: Arc<dyn MessageQueue>,
    blob_manager: BlobManager,
    metrics: Arc<MetricsCollector>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let metrics_handle = if config.observability.metrics_enabled {
            Some(
                PrometheusBuilder::new()
                    .install_recorder()
                    .context("安装Prometheus指标导出器失败")?,
            )
        } else {
            None
        };

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("运行数据库迁移失败")?;

        let lock_service = create_lock_service(&config, &database).await?;

        let message_queue = MessageQueueFactory::create(&config.message_queue)
            .await
            .context("连接消息队列失败")?;

        let blob_store = create_blob_store(&config.blob_storage);
        let blob_manager = BlobManager::new(config.blob_storage.clone());

        Ok(Self {
            config,
            mode,
            database,
            lock_service,
            blob_store,
            message_queue,
            blob_manager,
            metrics: Arc::new(MetricsCollector::new()),
            metrics_handle,
        })
    }

    /// 运行应用程序，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let mut handles = Vec::new();

        if self.mode.includes(AppMode::Scheduler) && self.config.scheduler.enabled {
            handles.push(self.spawn_scheduler(shutdown_rx.resubscribe()));
        }

        if self.mode.includes(AppMode::Collector) && self.config.collector.enabled {
            handles.extend(self.spawn_collector(&shutdown_rx));
        }

        if self.mode.includes(AppMode::Api) && self.config.api.enabled {
            handles.push(self.spawn_api(shutdown_rx.resubscribe()).await?);
        }

        if handles.is_empty() {
            return Err(anyhow::anyhow!("模式 {:?} 下没有启用任何组件，请检查配置", self.mode));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("组件任务异常退出: {}", e);
            }
        }

        self.database.close().await;
        info!("所有组件已停止");
        Ok(())
    }

    /// 基于当前适配器构建任务/迭代调度器
    pub fn task_scheduler(&self) -> TaskScheduler {
        let task_repository = self.database.task_repository();
        let planner = IterationPlanner::new(
            task_repository.clone(),
            Arc::clone(&self.blob_store),
            self.blob_manager.clone(),
            Arc::new(PassthroughPlanExecutor::new()),
        );
        TaskScheduler::new(
            task_repository,
            self.database.model_metrics_repository(),
            Arc::clone(&self.lock_service),
            planner,
            self.config.scheduler.clone(),
            Arc::clone(&self.metrics),
        )
    }

    pub fn collector(&self) -> Collector {
        Collector::new(
            self.database.task_repository(),
            self.database.assignment_repository(),
            self.database.aggregation_batch_repository(),
            Arc::clone(&self.blob_store),
            Arc::clone(&self.message_queue),
            Arc::clone(&self.lock_service),
            MessageFactory::new(self.blob_manager.clone()),
            self.config.collector.clone(),
            &self.config.message_queue,
            Arc::clone(&self.metrics),
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            assignment_manager: Arc::new(AssignmentManager::new(
                self.database.task_repository(),
                self.database.assignment_repository(),
                self.blob_manager.clone(),
                self.config.assignment.clone(),
                Arc::clone(&self.metrics),
            )),
            task_repository: self.database.task_repository(),
            blob_manager: self.blob_manager.clone(),
            database: self.database.clone(),
            metrics_handle: self.metrics_handle.clone(),
        }
    }

    fn spawn_scheduler(&self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        info!("启动任务调度器，间隔: {}s", self.config.scheduler.interval_seconds);
        let scheduler = Arc::new(self.task_scheduler());

        tokio::spawn(run_interval_loop(
            "调度器",
            self.config.scheduler.interval_seconds,
            shutdown_rx,
            move || {
                let scheduler = Arc::clone(&scheduler);
                async move { scheduler.run_once().await }
            },
        ))
    }

    fn spawn_collector(&self, shutdown_rx: &broadcast::Receiver<()>) -> Vec<JoinHandle<()>> {
        let config = &self.config.collector;
        info!(
            "启动结果收集器，批次大小: {}, 间隔: {}s",
            config.batch_size, config.interval_seconds
        );
        let collector = Arc::new(self.collector());
        let listener = Arc::new(NotificationListener::new(
            Arc::clone(&collector),
            Arc::clone(&self.message_queue),
            &self.config.message_queue,
        ));

        let sweep = {
            let collector = Arc::clone(&collector);
            tokio::spawn(run_interval_loop(
                "收集器",
                config.interval_seconds,
                shutdown_rx.resubscribe(),
                move || {
                    let collector = Arc::clone(&collector);
                    async move {
                        if let Err(e) = collector.process_iterations().await {
                            error!("扫描迭代失败: {}", e);
                        }
                    }
                },
            ))
        };

        let timeouts = tokio::spawn(run_interval_loop(
            "超时扫描",
            config.timeout_interval_seconds,
            shutdown_rx.resubscribe(),
            move || {
                let collector = Arc::clone(&collector);
                async move {
                    if let Err(e) = collector.process_timeouts().await {
                        error!("超时扫描失败: {}", e);
                    }
                }
            },
        ));

        let notifications = tokio::spawn(run_interval_loop(
            "聚合器通知监听",
            config.notification_poll_interval_seconds,
            shutdown_rx.resubscribe(),
            move || {
                let listener = Arc::clone(&listener);
                async move {
                    if let Err(e) = listener.poll_once().await {
                        error!("消费聚合器通知失败: {}", e);
                    }
                }
            },
        ));

        vec![sweep, timeouts, notifications]
    }

    async fn spawn_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<JoinHandle<()>> {
        let bind_address = self.config.api.bind_address.clone();
        let app = create_app(self.app_state(), &self.config.api);

        let listener = TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;
        info!("API服务器启动在 http://{}", bind_address);

        Ok(tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            });
            if let Err(e) = server.await {
                error!("API服务器运行失败: {}", e);
            }
        }))
    }
}

async fn create_lock_service(
    config: &AppConfig,
    database: &DatabaseManager,
) -> Result<Arc<dyn LockService>> {
    let lease = Duration::from_secs(config.lock.lease_seconds);
    let lock_service: Arc<dyn LockService> = match config.lock.r#type {
        LockType::Database => Arc::new(database.lock_service(lease)),
        LockType::InMemory => Arc::new(InMemoryLockService::new(lease)),
        LockType::Redis => {
            let url = config
                .lock
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("使用Redis锁时必须提供redis_url"))?;
            Arc::new(
                RedisLockService::new(url, lease)
                    .await
                    .context("连接Redis失败")?,
            )
        }
    };
    info!("分布式锁类型: {:?}, 租约: {:?}", config.lock.r#type, lease);
    Ok(lock_service)
}

/// 以固定间隔执行一轮扫描，直到收到关闭信号
async fn run_interval_loop<F, Fut>(
    name: &'static str,
    interval_seconds: u64,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => tick().await,
            _ = shutdown_rx.recv() => {
                info!("{}循环收到关闭信号", name);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(AppMode::parse("collector").unwrap(), AppMode::Collector);
        assert!(AppMode::parse("worker").is_err());
        assert!(AppMode::All.includes(AppMode::Api));
        assert!(!AppMode::Scheduler.includes(AppMode::Api));
    }
}
