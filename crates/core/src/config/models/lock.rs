use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    #[default]
    Database,
    InMemory,
    Redis,
}

/// 分区锁配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    #[serde(rename = "type")]
    pub r#type: LockType,
    pub lease_seconds: u64,
    pub redis_url: Option<String>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            r#type: LockType::default(),
            lease_seconds: 300, // 5分钟租约
            redis_url: None,
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.lease_seconds == 0 {
            return Err(anyhow::anyhow!("锁租约时间必须大于0"));
        }

        if self.r#type == LockType::Redis {
            match &self.redis_url {
                Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {}
                Some(_) => return Err(anyhow::anyhow!("Redis URL必须是redis://或rediss://格式")),
                None => return Err(anyhow::anyhow!("使用Redis锁时必须提供redis_url")),
            }
        }

        Ok(())
    }
}
