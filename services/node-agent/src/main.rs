//! hum Node Agent
//!
//! Entry point: initializes tracing, loads configuration, and runs one
//! reconcile loop per resource kind until the process is stopped.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hum_client::Clients;
use hum_node_agent::blockstorage::BlockStorageReconciler;
use hum_node_agent::config::Config;
use hum_node_agent::reconcile;
use hum_node_agent::virtualmachine::VirtualMachineReconciler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        node_name = %config.node_name,
        api_url = %config.api_url,
        "Starting hum node agent"
    );

    let clients = Clients::new(&config.api_url)?;

    let block_storages = BlockStorageReconciler::new(clients.clone(), &config)?;
    let virtual_machines = VirtualMachineReconciler::new(clients.clone(), &config);

    let bs_loop = tokio::spawn(reconcile::run(
        clients.clone(),
        block_storages,
        config.reconcile_interval,
    ));
    let vm_loop = tokio::spawn(reconcile::run(
        clients,
        virtual_machines,
        config.reconcile_interval,
    ));

    // The loops only return if the task is aborted.
    bs_loop.await?;
    vm_loop.await?;

    Ok(())
}
