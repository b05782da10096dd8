use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Backend newly provisioned block storages land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStorageBackendKind {
    Local,
    Ceph,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// API server base URL.
    pub api_url: String,
    /// Name this agent filters node-bound resources by. Defaults to the
    /// host's hostname, which must match the Node record id.
    pub node_name: String,
    pub reconcile_interval: Duration,
    pub block_storage_backend: BlockStorageBackendKind,
    pub ceph_pool: String,
    pub ceph_conf: PathBuf,
    /// Base-image cache directory, one file per entity id.
    pub image_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_url =
            std::env::var("HUM_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let node_name = match std::env::var("HUM_NODE_NAME") {
            Ok(name) => name,
            Err(_) => hostname()?,
        };

        let reconcile_interval = std::env::var("HUM_RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let block_storage_backend = match std::env::var("HUM_BLOCK_STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .as_str()
        {
            "local" => BlockStorageBackendKind::Local,
            "ceph" => BlockStorageBackendKind::Ceph,
            other => bail!("unknown block storage backend {other:?}"),
        };

        let ceph_pool = std::env::var("HUM_CEPH_POOL").unwrap_or_else(|_| "hum".to_string());
        let ceph_conf = std::env::var("HUM_CEPH_CONF")
            .unwrap_or_else(|_| "/etc/ceph/ceph.conf".to_string())
            .into();
        let image_dir = std::env::var("HUM_IMAGE_DIR")
            .unwrap_or_else(|_| "./images".to_string())
            .into();

        Ok(Self {
            api_url,
            node_name,
            reconcile_interval,
            block_storage_backend,
            ceph_pool,
            ceph_conf,
            image_dir,
        })
    }
}

fn hostname() -> Result<String> {
    let name = nix::unistd::gethostname().context("read hostname")?;
    name.into_string()
        .map_err(|raw| anyhow::anyhow!("hostname is not valid UTF-8: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_resolves() {
        assert!(!hostname().unwrap().is_empty());
    }
}
