//! # Shuffler
//!
//! 联邦学习训练轮次编排服务的进程入口：按运行模式装配调度器、收集器与 HTTP 接口，
//! 并在收到关闭信号后优雅退出。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::ShutdownManager;
