//! The volume backend seam.
//!
//! A backend owns the backing artifact of a block storage: a qcow2 file
//! on the local filesystem or an image in the ceph pool. The reconciler
//! only ever talks to the artifact through this trait; on any discrepancy
//! with the API record, the backend is probed and the record updated,
//! never the other way round.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use hum_types::system::BlockStorage;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http stream: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Bytes a volume is provisioned from.
pub enum VolumeSource {
    Http(reqwest::Response),
    File(tokio::fs::File),
}

impl VolumeSource {
    /// Copy every byte into `sink`; returns the number written.
    pub async fn copy_to<W>(self, sink: &mut W) -> Result<u64, BackendError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            VolumeSource::Http(mut response) => {
                let mut written = 0u64;
                while let Some(chunk) = response.chunk().await? {
                    sink.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                Ok(written)
            }
            VolumeSource::File(mut file) => Ok(tokio::io::copy(&mut file, sink).await?),
        }
    }
}

#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Value of the backend-type annotation.
    fn kind(&self) -> &'static str;

    /// Distributed-store pool, when the backend has one.
    fn pool(&self) -> Option<&str> {
        None
    }

    /// Image name within the backend: `<group>/<namespace>/<id>`.
    fn image_name(&self, bs: &BlockStorage) -> String {
        format!("{}/{}/{}", bs.meta.group, bs.meta.namespace, bs.meta.id)
    }

    /// Path or URI the disk-image utility and the emulator understand.
    fn qemu_target(&self, bs: &BlockStorage) -> String;

    async fn exists(&self, bs: &BlockStorage) -> bool;

    async fn remove(&self, bs: &BlockStorage) -> Result<(), BackendError>;

    /// Create a blank qcow2 artifact of the given size.
    async fn create_empty(&self, bs: &BlockStorage, size_bytes: u64) -> Result<(), BackendError> {
        qemu_img_create(&self.qemu_target(bs), size_bytes).await
    }

    /// Create the artifact from a byte stream; returns bytes written.
    async fn import(&self, bs: &BlockStorage, source: VolumeSource) -> Result<u64, BackendError>;
}

/// `qemu-img create -f qcow2 <target> <bytes>`
pub async fn qemu_img_create(target: &str, size_bytes: u64) -> Result<(), BackendError> {
    run_qemu_img(&["create", "-f", "qcow2", target, &size_bytes.to_string()]).await
}

/// `qemu-img resize <target> <bytes>`
pub async fn qemu_img_resize(target: &str, size_bytes: u64) -> Result<(), BackendError> {
    run_qemu_img(&["resize", target, &size_bytes.to_string()]).await
}

async fn run_qemu_img(args: &[&str]) -> Result<(), BackendError> {
    let output = Command::new("qemu-img").args(args).output().await?;
    if !output.status.success() {
        return Err(BackendError::CommandFailed {
            command: format!("qemu-img {}", args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hum_types::Meta;

    fn block_storage(group: &str, namespace: &str, id: &str) -> BlockStorage {
        BlockStorage {
            meta: Meta {
                id: id.to_string(),
                name: id.to_string(),
                group: group.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_copy_to_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("src");
        tokio::fs::write(&src_path, b"hello volume").await.unwrap();

        let source = VolumeSource::File(tokio::fs::File::open(&src_path).await.unwrap());
        let mut sink = Vec::new();
        let written = source.copy_to(&mut sink).await.unwrap();

        assert_eq!(written, 12);
        assert_eq!(sink, b"hello volume");
    }

    #[test]
    fn test_image_name_includes_triple() {
        struct Probe;

        #[async_trait]
        impl VolumeBackend for Probe {
            fn kind(&self) -> &'static str {
                "probe"
            }
            fn qemu_target(&self, bs: &BlockStorage) -> String {
                self.image_name(bs)
            }
            async fn exists(&self, _bs: &BlockStorage) -> bool {
                false
            }
            async fn remove(&self, _bs: &BlockStorage) -> Result<(), BackendError> {
                Ok(())
            }
            async fn import(
                &self,
                _bs: &BlockStorage,
                _source: VolumeSource,
            ) -> Result<u64, BackendError> {
                Ok(0)
            }
        }

        let bs = block_storage("g1", "ns1", "vol-1");
        assert_eq!(Probe.image_name(&bs), "g1/ns1/vol-1");
    }
}
