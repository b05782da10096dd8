//! Emulator command-line assembly.
//!
//! Pure builder so the exact argv is testable without spawning anything.

use super::vnc::VncDisplays;

/// One `-drive` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    /// Path or `rbd:` URI.
    pub file: String,
    pub format: DriveFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveFormat {
    Qcow2,
    Raw,
}

impl std::fmt::Display for DriveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Qcow2 => write!(f, "qcow2"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// One virtio-net device plus its TAP netdev.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nic {
    /// Bridge name; doubles as the netdev id.
    pub bridge: String,
    pub mac_address: String,
    pub tap_name: String,
}

/// Everything needed to assemble the emulator invocation.
#[derive(Debug, Clone)]
pub struct QemuCommand {
    pub uuid: String,
    /// `<namespace>/<id>`
    pub guest_name: String,
    pub display: u32,
    pub vcpus: u64,
    /// Memory limit with its unit suffix, passed through to `-m`.
    pub memory: String,
    pub drives: Vec<Drive>,
    pub nics: Vec<Nic>,
}

impl QemuCommand {
    pub fn build_args(&self) -> Vec<String> {
        let vcpus = self.vcpus;
        let mut args: Vec<String> = vec![
            "-enable-kvm".to_string(),
            "-uuid".to_string(),
            self.uuid.clone(),
            "-name".to_string(),
            format!("guest={},debug-threads=on", self.guest_name),
            "-daemonize".to_string(),
            "-nodefaults".to_string(),
            "-vnc".to_string(),
            format!(
                "0.0.0.0:{},websocket={}",
                self.display,
                VncDisplays::websocket_port(self.display)
            ),
            "-smp".to_string(),
            format!("{vcpus},sockets=1,cores={vcpus},threads=1"),
            "-cpu".to_string(),
            "host".to_string(),
            "-m".to_string(),
            self.memory.clone(),
            "-device".to_string(),
            "VGA,id=video0,bus=pci.0".to_string(),
        ];

        for drive in &self.drives {
            args.push("-drive".to_string());
            args.push(format!("file={},format={}", drive.file, drive.format));
        }

        for nic in &self.nics {
            args.push("-device".to_string());
            args.push(format!(
                "virtio-net,netdev=netdev-{},driver=virtio-net-pci,mac={},mq=on,\
                 rx_queue_size=1024,tx_queue_size=1024,vectors={}",
                nic.bridge,
                nic.mac_address,
                vcpus * 2 + 2
            ));
            args.push("-netdev".to_string());
            args.push(format!(
                "tap,script=no,downscript=no,id=netdev-{},vhost=on,ifname={},queues={}",
                nic.bridge, nic.tap_name, vcpus
            ));
        }

        args
    }
}
