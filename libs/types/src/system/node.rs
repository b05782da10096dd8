use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::Meta;

/// A hypervisor host registered with the API server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: NodeSpec,
}

impl_resource!(Node, "node");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Address other components reach this node on; used to derive the
    /// advertised VNC websocket endpoint.
    #[serde(default)]
    pub address: String,
}
