//! 配置管理
//!
//! 配置按以下顺序加载，后者覆盖前者：
//! 1. 各配置段的默认值
//! 2. TOML 配置文件
//! 3. `SHUFFLER_` 前缀的环境变量，嵌套字段以 `__` 分隔，例如 `SHUFFLER_COLLECTOR__BATCH_SIZE=100`
//!
//! 加载完成后统一执行 [`AppConfig::validate`]。

pub mod models;

pub use models::*;
