//! BlockStorage reconciliation.
//!
//! Drives a record to match its declared source over one of two backends.
//! The per-record state machine:
//!
//! ```text
//!            ""/Pending ──create──▶ Active ──used_by_vm──▶ Used
//!                │                    │
//!                │                    └──delete_req──▶ Deleting ──▶ (gone)
//!                ▼
//!            Downloading ──ok──▶ Active
//!            Copying     ──ok──▶ Active
//!                │
//!                └──fail──▶ Error ──retry──▶ (destroy + restart)
//! ```
//!
//! `Downloading` and `Copying` are owned exclusively by the invocation
//! that set them; any other invocation returns without touching the
//! record.

mod backend;
mod ceph;
mod local;

pub use backend::{BackendError, VolumeBackend, VolumeSource};
pub use ceph::CephBackend;
pub use local::{LocalBackend, LOCAL_ROOT};

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use hum_client::Clients;
use hum_types::system::{BlockStorage, BlockStorageFrom, BlockStorageState};
use hum_types::{set_hash, size, DeleteState};

use crate::config::{BlockStorageBackendKind, Config};
use crate::reconcile::Reconcile;

use backend::qemu_img_resize;

pub const ANNOTATION_TYPE: &str = "blockstoragev0/type";
pub const ANNOTATION_CEPH_POOL: &str = "ceph-pool-name";
pub const ANNOTATION_CEPH_IMAGE: &str = "ceph-image-name";

/// Download requests carry a generous per-request cap instead of the API
/// client's default timeout; image bodies can be large.
const DOWNLOAD_TIMEOUT_SECS: u64 = 6 * 3600;

pub struct BlockStorageReconciler {
    clients: Clients,
    http: reqwest::Client,
    image_dir: PathBuf,
    local: LocalBackend,
    ceph: Option<CephBackend>,
    default_kind: BlockStorageBackendKind,
}

impl BlockStorageReconciler {
    pub fn new(clients: Clients, config: &Config) -> Result<Self> {
        let ceph = match config.block_storage_backend {
            BlockStorageBackendKind::Ceph => Some(CephBackend::new(
                &config.ceph_pool,
                config.ceph_conf.clone(),
            )),
            BlockStorageBackendKind::Local => None,
        };

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .context("build download client")?;

        Ok(Self {
            clients,
            http,
            image_dir: config.image_dir.clone(),
            local: LocalBackend::new(),
            ceph,
            default_kind: config.block_storage_backend,
        })
    }

    /// Pick the backend owning a record's artifact. Already-provisioned
    /// records carry a backend-type annotation; fresh records land on the
    /// configured default.
    fn backend_for(&self, bs: &BlockStorage) -> Result<&dyn VolumeBackend> {
        match bs.meta.annotations.get(ANNOTATION_TYPE).map(String::as_str) {
            Some("ceph") => match &self.ceph {
                Some(ceph) => Ok(ceph),
                None => bail!("record is ceph-backed but no ceph backend is configured"),
            },
            Some("local") => Ok(&self.local),
            Some(other) => bail!("unknown block storage backend annotation {other:?}"),
            None => Ok(self.default_backend()),
        }
    }

    fn default_backend(&self) -> &dyn VolumeBackend {
        match (&self.ceph, self.default_kind) {
            (Some(ceph), BlockStorageBackendKind::Ceph) => ceph,
            _ => &self.local,
        }
    }

    fn write_backend_annotations(&self, bs: &mut BlockStorage, backend: &dyn VolumeBackend) {
        let image_name = backend.image_name(bs);
        let annotations = &mut bs.meta.annotations;
        annotations.insert(ANNOTATION_TYPE.to_string(), backend.kind().to_string());
        if let Some(pool) = backend.pool() {
            annotations.insert(ANNOTATION_CEPH_POOL.to_string(), pool.to_string());
            annotations.insert(ANNOTATION_CEPH_IMAGE.to_string(), image_name);
        }
    }

    fn backend_annotations_present(&self, bs: &BlockStorage, backend: &dyn VolumeBackend) -> bool {
        let annotations = &bs.meta.annotations;
        if !annotations.contains_key(ANNOTATION_TYPE) {
            return false;
        }
        if backend.pool().is_some() {
            return annotations.contains_key(ANNOTATION_CEPH_POOL)
                && annotations.contains_key(ANNOTATION_CEPH_IMAGE);
        }
        true
    }

    /// Transition the record and write it back immediately so external
    /// observers see the state before the slow work starts.
    async fn set_state(&self, bs: &mut BlockStorage, state: BlockStorageState) -> Result<()> {
        bs.status.state = state;
        self.clients
            .block_storages
            .update(bs)
            .await
            .with_context(|| format!("write state {state}"))?;
        Ok(())
    }

    pub(crate) async fn sync_block_storage(&self, bs: &mut BlockStorage) -> Result<()> {
        // Copying/Downloading are owned by the invocation that set them.
        if bs.status.state.is_in_flight() {
            return Ok(());
        }

        if bs.meta.delete_state == DeleteState::Delete {
            return self.delete_block_storage(bs).await;
        }

        let backend = self.backend_for(bs)?;

        if backend.exists(bs).await {
            match bs.status.state {
                BlockStorageState::Error => {
                    // A failed attempt left an artifact behind; destroy it
                    // so the next tick re-provisions from a clean slate.
                    if let Err(err) = backend.remove(bs).await {
                        self.set_state(bs, BlockStorageState::Error).await?;
                        return Err(err).context("destroy artifact of errored volume");
                    }
                    return Ok(());
                }
                BlockStorageState::Init | BlockStorageState::Pending => {
                    self.write_backend_annotations(bs, backend);
                    bs.status.state = BlockStorageState::Active;
                    set_hash(bs)?;
                    return Ok(());
                }
                BlockStorageState::Active | BlockStorageState::Used => {
                    // Artifact and record agree; only repair annotations.
                    if !self.backend_annotations_present(bs, backend) {
                        self.write_backend_annotations(bs, backend);
                        self.clients.block_storages.update(bs).await?;
                    }
                    return Ok(());
                }
                // Queued/Deleting with an artifact: a transition owned
                // elsewhere is still pending.
                _ => return Ok(()),
            }
        }

        // No artifact. Record which backend it will land on, then
        // provision from the declared source.
        self.write_backend_annotations(bs, backend);
        self.clients.block_storages.update(bs).await?;

        // The record set is shared between agents. Re-read the
        // authoritative copy right before the transition: whoever moved
        // it into Downloading/Copying first owns it, and everyone else
        // backs off until it leaves that state.
        let current = self
            .clients
            .block_storages
            .get(&bs.meta.namespace, &bs.meta.id)
            .await?;
        if current.status.state.is_in_flight() {
            return Ok(());
        }

        let size_bytes = size::to_bytes(&bs.spec.limit_size);

        match bs.spec.from.clone() {
            BlockStorageFrom::Empty => {
                if let Err(err) = backend.create_empty(bs, size_bytes).await {
                    self.set_state(bs, BlockStorageState::Error).await?;
                    return Err(err).context("create empty volume");
                }
            }
            BlockStorageFrom::Http { url } => {
                self.set_state(bs, BlockStorageState::Downloading).await?;
                if let Err(err) = self.provision_from_http(bs, backend, &url, size_bytes).await {
                    self.set_state(bs, BlockStorageState::Error).await?;
                    return Err(err);
                }
            }
            BlockStorageFrom::BaseImage { image_name, tag } => {
                self.set_state(bs, BlockStorageState::Copying).await?;
                if let Err(err) = self
                    .provision_from_base_image(bs, backend, &image_name, &tag, size_bytes)
                    .await
                {
                    self.set_state(bs, BlockStorageState::Error).await?;
                    return Err(err);
                }
            }
        }

        // Promote. Error can only be the entry state here (the artifact
        // was destroyed on an earlier tick); a successful rebuild
        // reactivates it.
        if matches!(
            bs.status.state,
            BlockStorageState::Init
                | BlockStorageState::Pending
                | BlockStorageState::Downloading
                | BlockStorageState::Copying
                | BlockStorageState::Error
        ) {
            bs.status.state = BlockStorageState::Active;
            self.clients.block_storages.update(bs).await?;
        }

        set_hash(bs)?;
        Ok(())
    }

    async fn provision_from_http(
        &self,
        bs: &BlockStorage,
        backend: &dyn VolumeBackend,
        url: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("open download {url}"))?;
        let declared = response.content_length();

        let written = backend
            .import(bs, VolumeSource::Http(response))
            .await
            .context("stream volume bytes")?;

        // A short read would silently resize a truncated image.
        if let Some(expected) = declared {
            if written != expected {
                bail!("short download: {written} of {expected} bytes");
            }
        }

        qemu_img_resize(&backend.qemu_target(bs), size_bytes)
            .await
            .context("resize volume")?;
        Ok(())
    }

    async fn provision_from_base_image(
        &self,
        bs: &BlockStorage,
        backend: &dyn VolumeBackend,
        image_name: &str,
        tag: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let image = self
            .clients
            .images
            .get(&bs.meta.group, image_name)
            .await
            .context("get image record")?;
        let Some(entity) = image.spec.entity_map.get(tag) else {
            bail!("image entity not found for tag {tag:?}");
        };

        let source = self
            .ensure_cached_entity(&bs.meta.group, image_name, tag, entity)
            .await?;
        let file = tokio::fs::File::open(&source)
            .await
            .context("open cached entity")?;
        backend
            .import(bs, VolumeSource::File(file))
            .await
            .context("copy entity bytes")?;

        qemu_img_resize(&backend.qemu_target(bs), size_bytes)
            .await
            .context("resize volume")?;
        Ok(())
    }

    /// Make sure the entity bytes exist in the local cache, hydrating from
    /// the node that holds them when missing. Streams into a temp file and
    /// renames so a concurrent creator never observes a partial entity.
    async fn ensure_cached_entity(
        &self,
        group: &str,
        image_id: &str,
        tag: &str,
        entity: &str,
    ) -> Result<PathBuf> {
        let dir = self.image_dir.join(group);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(entity);
        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }

        let tmp = dir.join(format!("{entity}.partial"));
        let download = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            let mut response = self.clients.images.download(group, image_id, tag).await?;
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(err) = download {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err).context("hydrate image entity");
        }

        tokio::fs::rename(&tmp, &path)
            .await
            .context("publish image entity")?;
        info!(group, image = image_id, tag, entity, "hydrated image entity into local cache");
        Ok(path)
    }

    async fn delete_block_storage(&self, bs: &mut BlockStorage) -> Result<()> {
        // Anything outside the tolerated entry states means a transition
        // is still in flight; try again next tick.
        if !bs.status.state.delete_allowed() {
            return Ok(());
        }

        let backend = self.backend_for(bs)?;
        self.set_state(bs, BlockStorageState::Deleting).await?;

        if backend.exists(bs).await {
            if let Err(err) = backend.remove(bs).await {
                self.set_state(bs, BlockStorageState::Error).await?;
                return Err(err).context("remove artifact");
            }
        }

        match self
            .clients
            .block_storages
            .delete(&bs.meta.namespace, &bs.meta.id)
            .await
        {
            // Absence is the desired terminal state.
            Ok(()) | Err(hum_client::Error::NotFound(_)) => Ok(()),
            Err(err) => Err(err).context("hard delete record"),
        }
    }
}

#[async_trait]
impl Reconcile for BlockStorageReconciler {
    type Resource = BlockStorage;

    async fn list(&self, _group: &str, namespace: &str) -> hum_client::Result<Vec<BlockStorage>> {
        self.clients.block_storages.list(namespace).await
    }

    fn skip(&self, _bs: &BlockStorage) -> bool {
        // Block storages carry no node binding; every agent reconciles the
        // shared set. Ownership of a record comes from its transient
        // states, not from a filter here.
        false
    }

    async fn sync(&mut self, bs: &mut BlockStorage) -> Result<()> {
        self.sync_block_storage(bs).await
    }

    async fn update(&self, bs: &BlockStorage) -> hum_client::Result<()> {
        self.clients.block_storages.update(bs).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hum_types::Meta;

    fn reconciler(default: BlockStorageBackendKind) -> BlockStorageReconciler {
        let config = Config {
            api_url: "http://127.0.0.1:18080".to_string(),
            node_name: "node01".to_string(),
            reconcile_interval: std::time::Duration::from_secs(5),
            block_storage_backend: default,
            ceph_pool: "pool-a".to_string(),
            ceph_conf: "/etc/ceph/ceph.conf".into(),
            image_dir: "./images".into(),
        };
        let clients = Clients::new(&config.api_url).unwrap();
        BlockStorageReconciler::new(clients, &config).unwrap()
    }

    fn block_storage(state: BlockStorageState) -> BlockStorage {
        BlockStorage {
            meta: Meta {
                id: "vol-1".to_string(),
                group: "g1".to_string(),
                namespace: "ns1".to_string(),
                ..Default::default()
            },
            status: hum_types::system::BlockStorageStatus { state },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sync_is_noop_while_in_flight() {
        let reconciler = reconciler(BlockStorageBackendKind::Local);

        for state in [BlockStorageState::Copying, BlockStorageState::Downloading] {
            let mut bs = block_storage(state);
            let before = bs.clone();
            // No API server is listening; a no-op must not need one.
            reconciler.sync_block_storage(&mut bs).await.unwrap();
            assert_eq!(bs, before);
        }
    }

    #[tokio::test]
    async fn test_delete_waits_for_in_flight_transitions() {
        let reconciler = reconciler(BlockStorageBackendKind::Local);

        let mut bs = block_storage(BlockStorageState::Deleting);
        bs.meta.delete_state = DeleteState::Delete;
        let before = bs.clone();
        reconciler.sync_block_storage(&mut bs).await.unwrap();
        assert_eq!(bs, before);
    }

    #[test]
    fn test_skip_never_filters() {
        let reconciler = reconciler(BlockStorageBackendKind::Local);

        // Block storages are not node-bound; the shared set is reconciled
        // everywhere.
        let bs = block_storage(BlockStorageState::Active);
        assert!(!reconciler.skip(&bs));
    }

    #[test]
    fn test_backend_for_follows_annotation() {
        let reconciler = reconciler(BlockStorageBackendKind::Ceph);

        let mut bs = block_storage(BlockStorageState::Init);
        assert_eq!(reconciler.backend_for(&bs).unwrap().kind(), "ceph");

        bs.meta
            .annotations
            .insert(ANNOTATION_TYPE.to_string(), "local".to_string());
        assert_eq!(reconciler.backend_for(&bs).unwrap().kind(), "local");
    }

    #[test]
    fn test_backend_for_rejects_unconfigured_ceph() {
        let reconciler = reconciler(BlockStorageBackendKind::Local);

        let mut bs = block_storage(BlockStorageState::Init);
        assert_eq!(reconciler.backend_for(&bs).unwrap().kind(), "local");

        bs.meta
            .annotations
            .insert(ANNOTATION_TYPE.to_string(), "ceph".to_string());
        assert!(reconciler.backend_for(&bs).is_err());
    }

    #[test]
    fn test_backend_annotations_local() {
        let reconciler = reconciler(BlockStorageBackendKind::Local);
        let mut bs = block_storage(BlockStorageState::Init);

        let backend = reconciler.backend_for(&bs).unwrap();
        reconciler.write_backend_annotations(&mut bs, backend);

        assert_eq!(bs.meta.annotations[ANNOTATION_TYPE], "local");
        // Local backend has no pool; the ceph keys stay unset.
        assert!(!bs.meta.annotations.contains_key(ANNOTATION_CEPH_POOL));
        assert!(reconciler.backend_annotations_present(&bs, backend));
    }

    #[test]
    fn test_backend_annotations_ceph() {
        let reconciler = reconciler(BlockStorageBackendKind::Ceph);
        let mut bs = block_storage(BlockStorageState::Init);

        let backend = reconciler.backend_for(&bs).unwrap();
        assert!(!reconciler.backend_annotations_present(&bs, backend));

        reconciler.write_backend_annotations(&mut bs, backend);
        assert_eq!(bs.meta.annotations[ANNOTATION_TYPE], "ceph");
        assert_eq!(bs.meta.annotations[ANNOTATION_CEPH_POOL], "pool-a");
        assert_eq!(bs.meta.annotations[ANNOTATION_CEPH_IMAGE], "g1/ns1/vol-1");
        assert!(reconciler.backend_annotations_present(&bs, backend));
    }
}
