//! System API resources: the records the node-local agents reconcile.

mod blockstorage;
mod image;
mod node;
mod nodenetwork;
mod virtualmachine;

pub use blockstorage::{
    BlockStorage, BlockStorageFrom, BlockStorageSpec, BlockStorageState, BlockStorageStatus,
};
pub use image::{Image, ImageSpec};
pub use node::{Node, NodeSpec};
pub use nodenetwork::NodeNetwork;
pub use virtualmachine::{
    LoginUser, VirtualMachine, VirtualMachineActionState, VirtualMachineNic, VirtualMachineSpec,
    VirtualMachineState, VirtualMachineStatus,
};
