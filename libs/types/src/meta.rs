//! Record metadata shared by every resource kind.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Deletion tombstone. The API sets `Delete` to request teardown; the
/// owning agent performs backend cleanup and then hard-deletes the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteState {
    #[default]
    #[serde(rename = "")]
    None,
    Delete,
}

/// Reference from a derived resource back to the resource that owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub id: String,
}

/// Common record metadata, flattened into each resource's JSON form.
///
/// `annotations` and `labels` are ordered maps so serialization (and with
/// it the resource hash) is byte-deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub resource_hash: String,
    #[serde(default)]
    pub delete_state: DeleteState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

/// A record the agents reconcile.
pub trait Resource: Serialize + DeserializeOwned {
    /// Kind name as it appears in API paths and log context.
    const KIND: &'static str;

    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;
}

/// Implement [`Resource`] for a record with a `meta` field.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $kind:literal) => {
        impl $crate::meta::Resource for $ty {
            const KIND: &'static str = $kind;

            fn meta(&self) -> &$crate::meta::Meta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::meta::Meta {
                &mut self.meta
            }
        }
    };
}

/// Recompute the record's content hash.
///
/// The hash field is cleared before serializing so the digest never covers
/// itself; storing the hex digest afterwards makes the operation
/// idempotent. Agents compare the stored hash before and after a sync to
/// decide whether an API write is needed, so the digest must cover every
/// field a sync can mutate.
pub fn set_hash<R: Resource>(resource: &mut R) -> Result<(), serde_json::Error> {
    resource.meta_mut().resource_hash.clear();
    let serialized = serde_json::to_vec(resource)?;
    resource.meta_mut().resource_hash = hex::encode(Md5::digest(&serialized));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::BlockStorage;

    fn record() -> BlockStorage {
        BlockStorage {
            meta: Meta {
                id: "vol-1".to_string(),
                name: "vol-1".to_string(),
                group: "g".to_string(),
                namespace: "ns".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_set_hash_idempotent() {
        let mut bs = record();
        set_hash(&mut bs).unwrap();
        let first = bs.meta.resource_hash.clone();
        set_hash(&mut bs).unwrap();
        assert_eq!(first, bs.meta.resource_hash);
    }

    #[test]
    fn test_set_hash_matches_recomputation() {
        let mut bs = record();
        set_hash(&mut bs).unwrap();
        let stored = bs.meta.resource_hash.clone();

        // Hashing the record with the hash field cleared must reproduce
        // the stored digest.
        bs.meta.resource_hash.clear();
        let serialized = serde_json::to_vec(&bs).unwrap();
        assert_eq!(stored, hex::encode(Md5::digest(&serialized)));
    }

    #[test]
    fn test_set_hash_covers_mutations() {
        let mut bs = record();
        set_hash(&mut bs).unwrap();
        let before = bs.meta.resource_hash.clone();

        bs.meta
            .annotations
            .insert("blockstoragev0/type".to_string(), "local".to_string());
        set_hash(&mut bs).unwrap();
        assert_ne!(before, bs.meta.resource_hash);
    }

    #[test]
    fn test_delete_state_encoding() {
        assert_eq!(serde_json::to_string(&DeleteState::None).unwrap(), "\"\"");
        assert_eq!(
            serde_json::to_string(&DeleteState::Delete).unwrap(),
            "\"Delete\""
        );
    }
}
