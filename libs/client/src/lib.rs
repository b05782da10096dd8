//! Typed HTTP client for the hum API server.
//!
//! One sub-client per resource kind, each exposing
//! `get`/`list`/`create`/`update`/`delete` over the server's
//! `{code, error, data}` envelopes. All sub-clients share a single
//! connection pool.

mod error;
mod macros;
mod rest;

pub mod core;
pub mod system;

pub use error::{Error, Result};

use std::time::Duration;

use rest::Rest;

/// Aggregate of the per-kind clients.
#[derive(Debug, Clone)]
pub struct Clients {
    pub groups: core::GroupClient,
    pub namespaces: core::NamespaceClient,
    pub networks: core::NetworkClient,
    pub nodes: system::NodeClient,
    pub node_networks: system::NodeNetworkClient,
    pub block_storages: system::BlockStorageClient,
    pub virtual_machines: system::VirtualMachineClient,
    pub images: system::ImageClient,
}

impl Clients {
    /// Build clients against an API server base URL, e.g.
    /// `http://127.0.0.1:8080`.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let rest = Rest::new(http, base_url);

        Ok(Self {
            groups: core::GroupClient::new(rest.clone()),
            namespaces: core::NamespaceClient::new(rest.clone()),
            networks: core::NetworkClient::new(rest.clone()),
            nodes: system::NodeClient::new(rest.clone()),
            node_networks: system::NodeNetworkClient::new(rest.clone()),
            block_storages: system::BlockStorageClient::new(rest.clone()),
            virtual_machines: system::VirtualMachineClient::new(rest.clone()),
            images: system::ImageClient::new(rest),
        })
    }
}
