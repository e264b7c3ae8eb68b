use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlobStorageType {
    #[default]
    Local,
    InMemory,
}

/// 对象存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStorageConfig {
    #[serde(rename = "type")]
    pub r#type: BlobStorageType,
    pub root_dir: String,
    pub model_bucket: String,
    pub gradient_bucket: String,
    pub aggregated_gradient_bucket: String,
    /// 设备下载与上传地址的前缀
    pub public_base_url: String,
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        Self {
            r#type: BlobStorageType::default(),
            root_dir: "./data/blobs".to_string(),
            model_bucket: "models".to_string(),
            gradient_bucket: "gradients".to_string(),
            aggregated_gradient_bucket: "aggregated-gradients".to_string(),
            public_base_url: "http://localhost:8080/blobs".to_string(),
        }
    }
}

impl BlobStorageConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, bucket) in [
            ("模型", &self.model_bucket),
            ("梯度", &self.gradient_bucket),
            ("聚合梯度", &self.aggregated_gradient_bucket),
        ] {
            if bucket.is_empty() || bucket.contains('/') {
                return Err(anyhow::anyhow!("{name}存储桶名称无效: '{bucket}'"));
            }
        }

        if self.r#type == BlobStorageType::Local && self.root_dir.is_empty() {
            return Err(anyhow::anyhow!("本地对象存储根目录不能为空"));
        }

        if self.public_base_url.is_empty() {
            return Err(anyhow::anyhow!("对象存储公开地址不能为空"));
        }

        Ok(())
    }
}
