use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::Meta;

/// A virtual disk, backed either by a qcow2 file on the local filesystem
/// or by an image in the distributed block store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockStorage {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: BlockStorageSpec,
    #[serde(default)]
    pub status: BlockStorageStatus,
}

impl_resource!(BlockStorage, "blockstorage");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStorageSpec {
    /// Size with unit, e.g. `10G`.
    #[serde(default)]
    pub limit_size: String,
    #[serde(default)]
    pub from: BlockStorageFrom,
}

/// Source the volume is provisioned from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockStorageFrom {
    #[default]
    #[serde(rename = "empty")]
    Empty,
    #[serde(rename = "http", rename_all = "camelCase")]
    Http { url: String },
    #[serde(rename = "baseImage", rename_all = "camelCase")]
    BaseImage { image_name: String, tag: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockStorageStatus {
    #[serde(default)]
    pub state: BlockStorageState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStorageState {
    /// Freshly created record, nothing provisioned yet.
    #[default]
    #[serde(rename = "")]
    Init,
    Pending,
    Downloading,
    Copying,
    Active,
    Used,
    Error,
    Queued,
    Deleting,
}

impl BlockStorageState {
    /// `Downloading` and `Copying` are owned by the sync invocation that
    /// set them; no other invocation may touch the record until it leaves
    /// the state.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Downloading | Self::Copying)
    }

    /// States from which a deletion request may proceed. Anything else
    /// means a transition is still in flight.
    pub fn delete_allowed(self) -> bool {
        matches!(self, Self::Init | Self::Error | Self::Queued | Self::Active)
    }
}

impl std::fmt::Display for BlockStorageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "",
            Self::Pending => "Pending",
            Self::Downloading => "Downloading",
            Self::Copying => "Copying",
            Self::Active => "Active",
            Self::Used => "Used",
            Self::Error => "Error",
            Self::Queued => "Queued",
            Self::Deleting => "Deleting",
        };
        write!(f, "{}", s)
    }
}
