//! The shared reconciliation tick loop.
//!
//! Both agents run the same scan on a fixed period: list groups, for each
//! group list namespaces, for each pair list the owned kind, then sync
//! every item and write it back only when its content hash changed. An
//! error at any level is logged and the offending subtree skipped; a tick
//! never aborts, and ticks never overlap.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error};

use hum_client::Clients;
use hum_types::Resource;

/// Per-kind hooks the loop drives.
#[async_trait]
pub trait Reconcile: Send {
    type Resource: Resource + Send + Sync;

    /// Kind name for log context.
    fn kind(&self) -> &'static str {
        Self::Resource::KIND
    }

    async fn list(&self, group: &str, namespace: &str)
        -> hum_client::Result<Vec<Self::Resource>>;

    /// Resources bound to another node, or explicitly ignored, are skipped
    /// without any API write.
    fn skip(&self, resource: &Self::Resource) -> bool;

    /// Drive one resource toward its declared state. Implementations
    /// recompute the resource hash on success.
    async fn sync(&mut self, resource: &mut Self::Resource) -> anyhow::Result<()>;

    async fn update(&self, resource: &Self::Resource) -> hum_client::Result<()>;
}

/// Run the loop forever.
pub async fn run<R: Reconcile>(clients: Clients, mut reconciler: R, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    // A tick may outlast the period; never run two concurrently.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        tick(&clients, &mut reconciler).await;
    }
}

/// One full scan.
pub async fn tick<R: Reconcile>(clients: &Clients, reconciler: &mut R) {
    let kind = reconciler.kind();

    let groups = match clients.groups.list().await {
        Ok(groups) => groups,
        Err(err) => {
            error!(kind, error = %err, "list groups");
            return;
        }
    };

    for group in &groups {
        let namespaces = match clients.namespaces.list(&group.meta.id).await {
            Ok(namespaces) => namespaces,
            Err(err) => {
                error!(kind, group = %group.meta.id, error = %err, "list namespaces");
                continue;
            }
        };

        for namespace in &namespaces {
            let resources = match reconciler.list(&group.meta.id, &namespace.meta.id).await {
                Ok(resources) => resources,
                Err(err) => {
                    error!(
                        kind,
                        group = %group.meta.id,
                        namespace = %namespace.meta.id,
                        error = %err,
                        "list resources"
                    );
                    continue;
                }
            };

            for mut resource in resources {
                let old_hash = resource.meta().resource_hash.clone();

                if reconciler.skip(&resource) {
                    continue;
                }

                if let Err(err) = reconciler.sync(&mut resource).await {
                    error!(
                        kind,
                        group = %group.meta.id,
                        namespace = %namespace.meta.id,
                        id = %resource.meta().id,
                        error = %err,
                        "sync resource"
                    );
                    continue;
                }

                // Change suppression: an unchanged hash means nothing to
                // persist.
                if resource.meta().resource_hash == old_hash {
                    continue;
                }

                debug!(
                    kind,
                    group = %group.meta.id,
                    namespace = %namespace.meta.id,
                    id = %resource.meta().id,
                    "writing back changed resource"
                );
                if let Err(err) = reconciler.update(&resource).await {
                    error!(
                        kind,
                        group = %group.meta.id,
                        namespace = %namespace.meta.id,
                        id = %resource.meta().id,
                        error = %err,
                        "update resource"
                    );
                }
            }
        }
    }
}
