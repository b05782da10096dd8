use serde::{Deserialize, Serialize};

use crate::impl_resource;
use crate::meta::Meta;

/// A guest machine backed by a KVM emulator process on its bound node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    #[serde(flatten)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: VirtualMachineSpec,
    #[serde(default)]
    pub status: VirtualMachineStatus,
}

impl_resource!(VirtualMachine, "virtualmachine");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// Stable identifier burned into the emulator command line.
    /// Auto-assigned on first power-on when absent or malformed.
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub limit_vcpus: String,
    #[serde(default)]
    pub limit_memory: String,
    #[serde(rename = "blockStorageIDs", default)]
    pub block_storage_ids: Vec<String>,
    #[serde(default)]
    pub nics: Vec<VirtualMachineNic>,
    #[serde(default)]
    pub login_users: Vec<LoginUser>,
    #[serde(default)]
    pub action_state: VirtualMachineActionState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineNic {
    #[serde(rename = "networkID", default)]
    pub network_id: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub ipv4_address: String,
    #[serde(default)]
    pub default_gateway: String,
    #[serde(default)]
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub ssh_authorized_keys: Vec<String>,
}

/// Requested power state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualMachineActionState {
    PowerOn,
    #[default]
    PowerOff,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineStatus {
    #[serde(default)]
    pub state: VirtualMachineState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VirtualMachineState {
    /// Freshly created record, never reconciled.
    #[default]
    #[serde(rename = "")]
    Init,
    Pending,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl std::fmt::Display for VirtualMachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "",
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserialization() {
        let vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "id": "vm-1",
            "name": "vm-1",
            "group": "g",
            "namespace": "ns",
            "annotations": {"virtualmachinev0/node_name": "node01"},
            "spec": {
                "uuid": "8d9f9e42-92f3-4b37-8f24-83f5b1f9e0a1",
                "limitVcpus": "2",
                "limitMemory": "2G",
                "blockStorageIDs": ["vol-1"],
                "nics": [{
                    "networkID": "net-1",
                    "ipv4Address": "10.0.0.10",
                    "defaultGateway": "10.0.0.1",
                    "nameservers": ["8.8.8.8"],
                }],
                "loginUsers": [{
                    "username": "ubuntu",
                    "sshAuthorizedKeys": ["ssh-ed25519 AAAA test"],
                }],
                "actionState": "PowerOn",
            },
            "status": {"state": "Pending"},
        }))
        .unwrap();

        assert_eq!(vm.spec.action_state, VirtualMachineActionState::PowerOn);
        assert_eq!(vm.status.state, VirtualMachineState::Pending);
        assert_eq!(vm.spec.block_storage_ids, vec!["vol-1"]);
        assert_eq!(vm.spec.nics[0].network_id, "net-1");
        assert!(vm.spec.nics[0].mac_address.is_empty());
        assert_eq!(
            vm.meta.annotations["virtualmachinev0/node_name"],
            "node01"
        );
    }
}
