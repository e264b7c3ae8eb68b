//! # 结果收集器
//!
//! 按迭代分区扫描设备上传的梯度，将分配分批后发布给聚合器，
//! 在达到上报目标后推进迭代进入聚合、应用阶段，并处理超时与聚合器失败通知。

pub mod batching;
pub mod collector;
pub mod message_factory;
pub mod notification_listener;

pub use collector::Collector;
pub use message_factory::MessageFactory;
pub use notification_listener::NotificationListener;
