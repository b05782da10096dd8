use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::Meta;

/// Per-node realization of a [`crate::core::Network`], published by the
/// network agent. Read-only to this core: the owner reference identifies
/// the network, and the `nodenetworkv0/bridge_name` annotation names the
/// Linux bridge the VM agent attaches TAPs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeNetwork {
    #[serde(flatten)]
    pub meta: Meta,
}

impl_resource!(NodeNetwork, "nodenetwork");
