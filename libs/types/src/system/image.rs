use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::Meta;

/// An immutable base image. Tags resolve to entity ids; the entity bytes
/// live in node-local cache directories and are hydrated between nodes
/// through the image download endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: ImageSpec,
}

impl_resource!(Image, "image");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// tag -> entity id
    #[serde(default)]
    pub entity_map: BTreeMap<String, String>,
}
