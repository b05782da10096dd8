//! Ceph RBD volume backend.
//!
//! Images live at `<pool>/<group>/<namespace>/<id>` and are driven through
//! the `rbd` tool with the configured conf file. Connection and image
//! teardown is guaranteed on every exit path by subprocess scope.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use hum_types::system::BlockStorage;

use super::backend::{BackendError, VolumeBackend, VolumeSource};

#[derive(Debug, Clone)]
pub struct CephBackend {
    pool: String,
    conf: PathBuf,
}

impl CephBackend {
    pub fn new(pool: &str, conf: PathBuf) -> Self {
        Self {
            pool: pool.to_string(),
            conf,
        }
    }

    fn rbd(&self) -> Command {
        let mut command = Command::new("rbd");
        command.arg("--conf").arg(&self.conf);
        command
    }

    /// `<pool>/<group>/<namespace>/<id>`
    fn image_spec(&self, bs: &BlockStorage) -> String {
        format!("{}/{}", self.pool, self.image_name(bs))
    }
}

#[async_trait]
impl VolumeBackend for CephBackend {
    fn kind(&self) -> &'static str {
        "ceph"
    }

    fn pool(&self) -> Option<&str> {
        Some(&self.pool)
    }

    fn qemu_target(&self, bs: &BlockStorage) -> String {
        format!("rbd:{}", self.image_spec(bs))
    }

    async fn exists(&self, bs: &BlockStorage) -> bool {
        self.rbd()
            .args(["info", &self.image_spec(bs)])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    async fn remove(&self, bs: &BlockStorage) -> Result<(), BackendError> {
        let spec = self.image_spec(bs);
        let output = self
            .rbd()
            .args(["rm", "--no-progress", &spec])
            .output()
            .await?;
        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                command: format!("rbd rm {}", spec),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn import(&self, bs: &BlockStorage, source: VolumeSource) -> Result<u64, BackendError> {
        let spec = self.image_spec(bs);
        let mut child = self
            .rbd()
            .args(["import", "--no-progress", "-", &spec])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let Some(mut stdin) = child.stdin.take() else {
            return Err(std::io::Error::other("rbd import stdin unavailable").into());
        };

        let written = match source.copy_to(&mut stdin).await {
            Ok(written) => written,
            Err(err) => {
                let _ = child.kill().await;
                return Err(err);
            }
        };
        stdin.shutdown().await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BackendError::CommandFailed {
                command: format!("rbd import {}", spec),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
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
    fn test_qemu_target_is_rbd_uri() {
        let backend = CephBackend::new("pool-a", PathBuf::from("/etc/ceph/ceph.conf"));
        assert_eq!(
            backend.qemu_target(&block_storage()),
            "rbd:pool-a/g1/ns1/vol-1"
        );
    }

    #[test]
    fn test_pool_is_exposed() {
        let backend = CephBackend::new("pool-a", PathBuf::from("/etc/ceph/ceph.conf"));
        assert_eq!(backend.pool(), Some("pool-a"));
    }
}
