//! VirtualMachine reconciliation.
//!
//! Drives a record to its requested action state by orchestrating the KVM
//! emulator:
//!
//! ```text
//!   Stopped ──PowerOn──▶ Pending ──launch ok──▶ Running
//!                            │
//!                            └─volume not Active──▶ stays Pending
//!   Running ──PowerOff──▶ Stopping ──kill──▶ Stopped
//!   (any)   ──Delete──▶ (power off + purge workdir + api delete)
//! ```
//!
//! A VM is only reconciled by the agent whose node name matches its
//! binding annotation; the emulator process is located by UUID, never by
//! pidfile.

mod process;
mod qemu;
mod vnc;

pub use process::{find_emulator_pid, EMULATOR};
pub use qemu::{Drive, DriveFormat, Nic, QemuCommand};
pub use vnc::VncDisplays;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::info;

use hum_client::Clients;
use hum_cloudinit::{
    CloudInit, MetaData, NetworkConfig, NetworkConfigEntry, NetworkConfigSubnet, UserData,
    UserDataUser,
};
use hum_types::system::{
    BlockStorage, BlockStorageState, NodeNetwork, VirtualMachine, VirtualMachineActionState,
    VirtualMachineState,
};
use hum_types::{set_hash, size, DeleteState};

use crate::blockstorage::{ANNOTATION_CEPH_IMAGE, ANNOTATION_CEPH_POOL, ANNOTATION_TYPE, LOCAL_ROOT};
use crate::config::Config;
use crate::network;
use crate::reconcile::Reconcile;

pub const ANNOTATION_NODE_NAME: &str = "virtualmachinev0/node_name";
pub const ANNOTATION_IGNORE: &str = "virtualmachinev0/ignore";
pub const ANNOTATION_PID: &str = "virtualmachinev0/pid";
pub const ANNOTATION_VNC_DISPLAY: &str = "virtualmachinev0/vnc_display_number";
pub const ANNOTATION_VNC_WEBSOCKET_HOST: &str = "virtualmachinev0/vnc_websocket_host";

pub const NODE_NETWORK_ANNOTATION_BRIDGE: &str = "nodenetworkv0/bridge_name";
pub const NODE_NETWORK_ANNOTATION_NODE: &str = "nodenetworkv0/node_name";

/// Fixed by convention; not configurable.
const VM_ROOT: &str = "./virtualmachines";

pub struct VirtualMachineReconciler {
    clients: Clients,
    node_name: String,
    vnc_displays: VncDisplays,
}

impl VirtualMachineReconciler {
    pub fn new(clients: Clients, config: &Config) -> Self {
        Self {
            clients,
            node_name: config.node_name.clone(),
            vnc_displays: VncDisplays::new(),
        }
    }

    pub(crate) async fn sync_virtual_machine(&mut self, vm: &mut VirtualMachine) -> Result<()> {
        if vm.meta.delete_state == DeleteState::Delete {
            self.power_off(vm).await.context("power off")?;

            if !vm.spec.uuid.is_empty() {
                let dir = vm_dir(&vm.meta.group, &vm.meta.namespace, &vm.spec.uuid);
                if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                    tokio::fs::remove_dir_all(&dir)
                        .await
                        .context("purge working directory")?;
                }
            }

            return match self
                .clients
                .virtual_machines
                .delete(&vm.meta.namespace, &vm.meta.id)
                .await
            {
                // Absence is the desired terminal state.
                Ok(()) | Err(hum_client::Error::NotFound(_)) => Ok(()),
                Err(err) => Err(err).context("hard delete record"),
            };
        }

        match vm.spec.action_state {
            VirtualMachineActionState::PowerOn => self.power_on(vm).await.context("power on")?,
            VirtualMachineActionState::PowerOff => self.power_off(vm).await.context("power off")?,
        }

        set_hash(vm)?;
        Ok(())
    }

    async fn power_off(&mut self, vm: &mut VirtualMachine) -> Result<()> {
        let pid = process::find_emulator_pid(&vm.spec.uuid)?;
        let Some(pid) = pid else {
            if vm.status.state != VirtualMachineState::Stopped {
                vm.status.state = VirtualMachineState::Stopped;
                self.clients.virtual_machines.update(vm).await?;
            }
            return Ok(());
        };

        vm.status.state = VirtualMachineState::Stopping;
        self.clients.virtual_machines.update(vm).await?;

        kill(Pid::from_raw(pid), Signal::SIGKILL).context("kill emulator")?;

        if let Some(display) = vm
            .meta
            .annotations
            .get(ANNOTATION_VNC_DISPLAY)
            .and_then(|display| display.parse::<u32>().ok())
        {
            self.vnc_displays.release(display);
        }

        vm.status.state = VirtualMachineState::Stopped;
        self.clients.virtual_machines.update(vm).await?;
        info!(id = %vm.meta.id, pid, "powered off virtual machine");
        Ok(())
    }

    async fn power_on(&mut self, vm: &mut VirtualMachine) -> Result<()> {
        let pid = process::find_emulator_pid(&vm.spec.uuid)?;
        if pid.is_some() && vm.status.state == VirtualMachineState::Running {
            return Ok(());
        }

        vm.status.state = VirtualMachineState::Pending;
        self.clients.virtual_machines.update(vm).await?;

        let group = vm.meta.group.clone();
        let namespace = vm.meta.namespace.clone();

        // 1. Disk assembly: every referenced volume must already be
        //    Active; otherwise stay Pending and let the next tick retry.
        let mut drives = Vec::new();
        for bs_id in &vm.spec.block_storage_ids {
            let bs = self
                .clients
                .block_storages
                .get(&namespace, bs_id)
                .await
                .with_context(|| format!("get block storage {bs_id}"))?;
            if bs.status.state != BlockStorageState::Active {
                bail!("block storage {bs_id} is not active");
            }
            drives.push(Drive {
                file: drive_path(&bs)?,
                format: DriveFormat::Qcow2,
            });
        }

        let vcpus = size::to_bytes(&vm.spec.limit_vcpus);
        if vcpus == 0 {
            bail!("invalid vcpu limit {:?}", vm.spec.limit_vcpus);
        }

        // 2. NIC assembly. MACs are derived from (vm id, network id) so a
        //    restarted agent regenerates identical addresses.
        let mut nics = Vec::new();
        let mut taps = Vec::new();
        let mut net_entries = Vec::new();
        for (index, nic) in vm.spec.nics.iter_mut().enumerate() {
            if nic.mac_address.is_empty() {
                nic.mac_address = network::generate_mac(&vm.meta.id, &nic.network_id);
            }

            let net = self
                .clients
                .networks
                .get(&namespace, &nic.network_id)
                .await
                .with_context(|| format!("get network {}", nic.network_id))?;
            let node_network = self.node_network(&namespace, &net.meta.id).await?;
            let Some(bridge) = node_network
                .meta
                .annotations
                .get(NODE_NETWORK_ANNOTATION_BRIDGE)
            else {
                bail!("network is not active");
            };

            let tap_name = network::tap_name(bridge, &vm.meta.id, index);
            nics.push(Nic {
                bridge: bridge.clone(),
                mac_address: nic.mac_address.clone(),
                tap_name: tap_name.clone(),
            });
            taps.push((tap_name, bridge.clone()));

            let netmask = network::ipv4_netmask(&net.spec.ipv4_cidr)
                .with_context(|| format!("network {}", net.meta.id))?;
            net_entries.push(NetworkConfigEntry::physical(
                index,
                &nic.mac_address,
                NetworkConfigSubnet::r#static(
                    &nic.ipv4_address,
                    &netmask,
                    &nic.default_gateway,
                    nic.nameservers.clone(),
                ),
            ));
        }

        // 3. Identity.
        if uuid::Uuid::parse_str(&vm.spec.uuid).is_err() {
            vm.spec.uuid = uuid::Uuid::new_v4().to_string();
        }

        // 4. Cloud-init seed, attached as an extra raw drive.
        let seed_dir = vm_dir(&group, &namespace, &vm.spec.uuid);
        CloudInit::new(
            MetaData {
                instance_id: vm.spec.uuid.clone(),
                local_hostname: vm.meta.name.clone(),
            },
            UserData {
                users: vm
                    .spec
                    .login_users
                    .iter()
                    .map(|user| {
                        UserDataUser::sudoer(&user.username, user.ssh_authorized_keys.clone())
                    })
                    .collect(),
            },
            NetworkConfig {
                version: 1,
                config: net_entries,
            },
        )
        .write(&seed_dir)
        .context("write cloud-init seed")?;

        drives.push(Drive {
            file: format!(
                "{}/{}/{}/{}/{}",
                VM_ROOT,
                group,
                namespace,
                vm.spec.uuid,
                hum_cloudinit::SEED_IMAGE
            ),
            format: DriveFormat::Raw,
        });

        // 5. VNC display, reserved before launch and released on
        //    power-off.
        let Some(vnc_display) = self.vnc_displays.allocate() else {
            bail!("no free VNC display");
        };

        // 6. Launch.
        let command = QemuCommand {
            uuid: vm.spec.uuid.clone(),
            guest_name: format!("{}/{}", namespace, vm.meta.id),
            display: vnc_display,
            vcpus,
            memory: vm.spec.limit_memory.clone(),
            drives,
            nics,
        };
        let output = Command::new(EMULATOR)
            .args(command.build_args())
            .output()
            .await
            .context("spawn emulator")?;
        if !output.status.success() {
            self.vnc_displays.release(vnc_display);
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", EMULATOR, output.status, stderr.trim());
        }

        // 7. TAP wiring: the emulator created the TAPs; bring them up and
        //    enslave them to their bridges.
        for (tap_name, bridge) in &taps {
            network::attach_tap(tap_name, bridge)
                .with_context(|| format!("attach {tap_name} to bridge {bridge}"))?;
        }

        // 8. Annotate and mark running.
        let pid = process::find_emulator_pid(&vm.spec.uuid)?
            .context("emulator process not found after launch")?;
        let node = self
            .clients
            .nodes
            .get(&self.node_name)
            .await
            .context("get node")?;

        let annotations = &mut vm.meta.annotations;
        annotations.insert(ANNOTATION_PID.to_string(), pid.to_string());
        annotations.insert(ANNOTATION_VNC_DISPLAY.to_string(), vnc_display.to_string());
        annotations.insert(
            ANNOTATION_VNC_WEBSOCKET_HOST.to_string(),
            format!(
                "{}:{}",
                node.spec.address,
                VncDisplays::websocket_port(vnc_display)
            ),
        );
        vm.status.state = VirtualMachineState::Running;
        info!(id = %vm.meta.id, pid, display = vnc_display, "powered on virtual machine");
        Ok(())
    }

    /// Resolve the per-node realization of a network: owned by the network
    /// and bound to this agent's node.
    async fn node_network(&self, namespace: &str, network_id: &str) -> Result<NodeNetwork> {
        let node_networks = self.clients.node_networks.list(namespace).await?;
        for node_network in node_networks {
            let owned = node_network
                .meta
                .owner_references
                .iter()
                .any(|owner| owner.id == network_id);
            if !owned {
                continue;
            }
            if node_network
                .meta
                .annotations
                .get(NODE_NETWORK_ANNOTATION_NODE)
                .is_some_and(|node| node == &self.node_name)
            {
                return Ok(node_network);
            }
        }
        bail!(
            "node network for network {network_id} not found on {}",
            self.node_name
        )
    }
}

/// Emulator drive path for a volume, derived from its backend
/// annotations: local file path or `rbd:` URI.
fn drive_path(bs: &BlockStorage) -> Result<String> {
    match bs.meta.annotations.get(ANNOTATION_TYPE).map(String::as_str) {
        Some("ceph") => {
            let Some(pool) = bs.meta.annotations.get(ANNOTATION_CEPH_POOL) else {
                bail!("ceph-backed volume {} has no pool annotation", bs.meta.id);
            };
            let image = bs
                .meta
                .annotations
                .get(ANNOTATION_CEPH_IMAGE)
                .cloned()
                .unwrap_or_else(|| {
                    format!("{}/{}/{}", bs.meta.group, bs.meta.namespace, bs.meta.id)
                });
            Ok(format!("rbd:{}/{}", pool, image))
        }
        _ => Ok(format!(
            "{}/{}/{}/{}",
            LOCAL_ROOT, bs.meta.group, bs.meta.namespace, bs.meta.id
        )),
    }
}

fn vm_dir(group: &str, namespace: &str, uuid: &str) -> PathBuf {
    PathBuf::from(VM_ROOT).join(group).join(namespace).join(uuid)
}

#[async_trait]
impl Reconcile for VirtualMachineReconciler {
    type Resource = VirtualMachine;

    async fn list(&self, _group: &str, namespace: &str) -> hum_client::Result<Vec<VirtualMachine>> {
        self.clients.virtual_machines.list(namespace).await
    }

    fn skip(&self, vm: &VirtualMachine) -> bool {
        if vm
            .meta
            .annotations
            .get(ANNOTATION_NODE_NAME)
            .map(String::as_str)
            != Some(self.node_name.as_str())
        {
            return true;
        }
        vm.meta
            .annotations
            .get(ANNOTATION_IGNORE)
            .is_some_and(|ignore| ignore == "true")
    }

    async fn sync(&mut self, vm: &mut VirtualMachine) -> Result<()> {
        self.sync_virtual_machine(vm).await
    }

    async fn update(&self, vm: &VirtualMachine) -> hum_client::Result<()> {
        self.clients.virtual_machines.update(vm).await.map(|_| ())
    }
}
