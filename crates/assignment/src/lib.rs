//! # 设备分配管理
//!
//! 处理设备签到与结果上报：
//!
//! - 签到：在人群中所有收集中的迭代里按流量权重选择一轮，创建分配并下发任务
//! - 上报：条件更新分配状态，本地计算完成的设备可获取梯度上传位置
//!
//! 面向设备的拒绝不会作为错误返回，而是携带重试窗口的结构化结果。

pub mod assignment_manager;
pub mod selection;

pub use assignment_manager::{AssignmentManager, CheckInOutcome};
