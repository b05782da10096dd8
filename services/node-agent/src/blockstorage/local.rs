//! Local-filesystem volume backend.
//!
//! Artifacts are qcow2 files at `./blockstorages/<group>/<namespace>/<id>`,
//! the path convention the VM agent assembles drive arguments from.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use hum_types::system::BlockStorage;

use super::backend::{qemu_img_create, BackendError, VolumeBackend, VolumeSource};

/// Fixed by convention; not configurable.
pub const LOCAL_ROOT: &str = "./blockstorages";

#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }

    fn path(&self, bs: &BlockStorage) -> PathBuf {
        PathBuf::from(LOCAL_ROOT)
            .join(&bs.meta.group)
            .join(&bs.meta.namespace)
            .join(&bs.meta.id)
    }
}

#[async_trait]
impl VolumeBackend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn qemu_target(&self, bs: &BlockStorage) -> String {
        format!(
            "{}/{}/{}/{}",
            LOCAL_ROOT, bs.meta.group, bs.meta.namespace, bs.meta.id
        )
    }

    async fn exists(&self, bs: &BlockStorage) -> bool {
        tokio::fs::try_exists(self.path(bs)).await.unwrap_or(false)
    }

    async fn remove(&self, bs: &BlockStorage) -> Result<(), BackendError> {
        tokio::fs::remove_file(self.path(bs)).await?;
        Ok(())
    }

    async fn create_empty(&self, bs: &BlockStorage, size_bytes: u64) -> Result<(), BackendError> {
        let path = self.path(bs);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        qemu_img_create(&self.qemu_target(bs), size_bytes).await
    }

    async fn import(&self, bs: &BlockStorage, source: VolumeSource) -> Result<u64, BackendError> {
        let path = self.path(bs);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        let written = source.copy_to(&mut file).await?;
        file.flush().await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hum_types::Meta;

    fn block_storage() -> BlockStorage {
        BlockStorage {
            meta: Meta {
                id: "vol-1".to_string(),
                group: "g1".to_string(),
                namespace: "ns1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_qemu_target_is_conventional_path() {
        assert_eq!(
            LocalBackend::new().qemu_target(&block_storage()),
            "./blockstorages/g1/ns1/vol-1"
        );
    }

    #[tokio::test]
    async fn test_exists_false_for_missing_artifact() {
        assert!(!LocalBackend::new().exists(&block_storage()).await);
    }
}
