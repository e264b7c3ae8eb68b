//! # 数据模型
//!
//! 联邦学习编排系统的核心数据结构：任务、迭代、设备分配、聚合批次，以及与聚合器、
//! 模型更新器、设备之间交换的消息。
//!
//! ## 核心模型
//!
//! ### Task - 任务定义
//! 一个训练或评估任务，包含迭代总数、聚合规模、客户端版本范围与任务附加信息。
//!
//! ### Iteration - 迭代
//! 任务的一轮联邦计算，通过 `base_iteration_id` / `base_on_result_id` / `result_id`
//! 描述检查点的血缘关系。
//!
//! ### Assignment - 设备分配
//! 设备的一次签到，以会话ID唯一标识，同时作为审计记录永不删除。
//!
//! ### AggregationBatch - 聚合批次
//! 一组已上传的梯度，作为一次聚合请求的输入。
//!
//! ## 状态管理
//!
//! 所有状态以整数状态码持久化，所有状态变更都是条件更新（比较并交换）。
//!
//! ```text
//! 任务:   CREATED → OPEN → COMPLETED
//!                    ↓
//!              CANCELED / FAILED
//!
//! 迭代:   COLLECTING → AGGREGATING → APPLYING → COMPLETED → POST_PROCESSED
//!                         ↓              ↓
//!               AGGREGATING_FAILED  APPLYING_FAILED
//!
//! 分配:   ASSIGNED → LOCAL_COMPLETED → UPLOAD_COMPLETED
//!            ↓              ↓                ↓
//!     LOCAL_* 失败/超时  UPLOAD_TIMEOUT   REMOTE_FAILED
//!
//! 批次:   FULL → PUBLISH_COMPLETED → UPLOAD_COMPLETED
//!                      ↓
//!                    FAILED
//! ```

pub mod aggregation_batch;
pub mod assignment;
pub mod check_in;
pub mod ids;
pub mod iteration;
pub mod message;
pub mod model_metrics;
pub mod status;
pub mod task;

pub use aggregation_batch::*;
pub use assignment::*;
pub use check_in::*;
pub use ids::*;
pub use iteration::*;
pub use message::*;
pub use model_metrics::*;
pub use status::*;
pub use task::*;
