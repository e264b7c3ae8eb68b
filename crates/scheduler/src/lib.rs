//! # 任务/迭代调度器
//!
//! 周期性扫描三类实体并推进其生命周期：
//!
//! - 待创建任务：准备基础迭代的设备端检查点后开放任务
//! - 活跃任务：根据最近一轮迭代的状态创建下一轮、完成或失败任务
//! - 已完成迭代：持久化模型指标后标记为已后处理
//!
//! 每个实体在各自的分区锁内处理，单个实体的失败只记录日志，不影响本轮其他实体。

pub mod iteration_planner;
pub mod task_scheduler;

pub use iteration_planner::IterationPlanner;
pub use task_scheduler::TaskScheduler;
