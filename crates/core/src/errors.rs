use thiserror::Error;

/// 编排系统错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务未找到: {population_name}/{task_id}")]
    TaskNotFound {
        population_name: String,
        task_id: i64,
    },

    #[error("迭代未找到: {id}")]
    IterationNotFound { id: String },

    #[error("分配记录未找到: {id}")]
    AssignmentNotFound { id: String },

    #[error("记录已存在: {0}")]
    AlreadyExists(String),

    #[error("未知的{kind}状态码: {code}")]
    UnknownStatusCode { kind: &'static str, code: i64 },

    #[error("无效的标识符: {0}")]
    InvalidId(String),

    #[error("不支持的迭代状态: {0}")]
    UnsupportedIterationStatus(String),

    #[error("不支持的聚合层级: {level}")]
    UnsupportedAggregationLevel { level: i64 },

    #[error("对象存储错误: {0}")]
    Blob(String),

    #[error("对象不存在: {0}")]
    BlobNotFound(String),

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("分布式锁错误: {0}")]
    Lock(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("计划执行错误: {0}")]
    PlanExecution(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
