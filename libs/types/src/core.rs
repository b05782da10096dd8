//! Core API resources: groups, namespaces, networks.

use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::Meta;

/// Top level of the resource tree; namespaces live inside a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(flatten)]
    pub meta: Meta,
}

impl_resource!(Group, "group");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(flatten)]
    pub meta: Meta,
}

impl_resource!(Namespace, "namespace");

/// Declared L3 network. Per-node realizations are published as
/// [`crate::system::NodeNetwork`] records by the network agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: NetworkSpec,
}

impl_resource!(Network, "network");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(rename = "ipv4CIDR", default)]
    pub ipv4_cidr: String,
}
