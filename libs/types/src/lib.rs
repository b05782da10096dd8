//! Resource records for the hum control plane.
//!
//! Every entity the API server holds is a record identified by a
//! `(group, namespace, id)` triple with a flattened [`meta::Meta`] carrying
//! annotations, the content hash and the deletion tombstone. Agents
//! deserialize these records, mutate them during reconciliation, and write
//! them back only when the content hash changed.

pub mod core;
pub mod meta;
pub mod size;
pub mod system;

pub use meta::{set_hash, DeleteState, Meta, OwnerReference, Resource};
