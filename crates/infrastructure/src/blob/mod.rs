//! 对象存储实现

pub mod in_memory_blob_store;
pub mod local_blob_store;

use std::collections::BTreeSet;
use std::sync::Arc;

use shuffler_core::{
    config::{BlobStorageConfig, BlobStorageType},
    traits::BlobStore,
};

pub use in_memory_blob_store::InMemoryBlobStore;
pub use local_blob_store::LocalBlobStore;

/// 根据配置创建对象存储
pub fn create_blob_store(config: &BlobStorageConfig) -> Arc<dyn BlobStore> {
    match config.r#type {
        BlobStorageType::Local => Arc::new(LocalBlobStore::new(&config.root_dir)),
        BlobStorageType::InMemory => Arc::new(InMemoryBlobStore::new()),
    }
}

/// 从对象名集合中提取前缀下的直接子项
pub(crate) fn immediate_children<'a>(
    objects: impl Iterator<Item = &'a str>,
    prefix: &str,
    shard: Option<&str>,
) -> Vec<String> {
    let children: BTreeSet<String> = objects
        .filter_map(|object| object.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .map(|rest| match rest.find('/') {
            Some(pos) => rest[..=pos].to_string(),
            None => rest.to_string(),
        })
        .filter(|child| shard.is_none_or(|s| child.starts_with(s)))
        .collect();
    children.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_children() {
        let objects = [
            "p/1/2/d/a/gradient",
            "p/1/2/d/b/gradient",
            "p/1/2/d/b/extra",
            "p/1/2/d/file",
            "p/1/3/d/c/gradient",
        ];
        let children = immediate_children(objects.iter().copied(), "p/1/2/d/", None);
        assert_eq!(children, vec!["a/", "b/", "file"]);

        let sharded = immediate_children(objects.iter().copied(), "p/1/2/d/", Some("b"));
        assert_eq!(sharded, vec!["b/"]);
    }
}
