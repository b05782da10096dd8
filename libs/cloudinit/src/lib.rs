//! NoCloud seed generation for guest self-configuration.
//!
//! Renders the three cloud-init documents (`meta-data`, `user-data`,
//! `network-config`) and packs them into a seed ISO the emulator attaches
//! as an extra raw drive. The transformation is deterministic for the
//! same inputs and safe to re-run: files and image are simply rewritten.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use thiserror::Error;

/// File name of the generated seed image.
pub const SEED_IMAGE: &str = "cloudinit.img";

const META_DATA: &str = "meta-data";
const USER_DATA: &str = "user-data";
const NETWORK_CONFIG: &str = "network-config";

#[derive(Debug, Error)]
pub enum CloudInitError {
    #[error("render document: {0}")]
    Render(#[from] serde_yaml::Error),

    #[error("write seed data: {0}")]
    Io(#[from] std::io::Error),

    #[error("genisoimage failed: {0}")]
    Iso(String),
}

/// `meta-data` document.
#[derive(Debug, Clone, Serialize)]
pub struct MetaData {
    #[serde(rename = "instance-id")]
    pub instance_id: String,
    #[serde(rename = "local-hostname")]
    pub local_hostname: String,
}

/// One `users:` entry of the `user-data` document.
#[derive(Debug, Clone, Serialize)]
pub struct UserDataUser {
    pub name: String,
    pub ssh_authorized_keys: Vec<String>,
    pub groups: String,
    pub shell: String,
    pub sudo: Vec<String>,
}

impl UserDataUser {
    /// A login user with passwordless sudo and a bash shell.
    pub fn sudoer(name: &str, ssh_authorized_keys: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            ssh_authorized_keys,
            groups: "sudo".to_string(),
            shell: "/bin/bash".to_string(),
            sudo: vec!["ALL=(ALL) NOPASSWD:ALL".to_string()],
        }
    }
}

/// `user-data` document (serialized under a `#cloud-config` header).
#[derive(Debug, Clone, Serialize)]
pub struct UserData {
    pub users: Vec<UserDataUser>,
}

/// `network-config` document, format version 1.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfig {
    pub version: u32,
    pub config: Vec<NetworkConfigEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfigEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub name: String,
    pub mac_address: String,
    pub subnets: Vec<NetworkConfigSubnet>,
}

impl NetworkConfigEntry {
    /// A physical interface entry (`eth<index>`) with one static subnet.
    pub fn physical(index: usize, mac_address: &str, subnet: NetworkConfigSubnet) -> Self {
        Self {
            entry_type: "physical".to_string(),
            name: format!("eth{}", index),
            mac_address: mac_address.to_string(),
            subnets: vec![subnet],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkConfigSubnet {
    #[serde(rename = "type")]
    pub subnet_type: String,
    pub address: String,
    pub netmask: String,
    pub gateway: String,
    pub dns_nameservers: Vec<String>,
}

impl NetworkConfigSubnet {
    pub fn r#static(
        address: &str,
        netmask: &str,
        gateway: &str,
        dns_nameservers: Vec<String>,
    ) -> Self {
        Self {
            subnet_type: "static".to_string(),
            address: address.to_string(),
            netmask: netmask.to_string(),
            gateway: gateway.to_string(),
            dns_nameservers,
        }
    }
}

/// Builder for a complete NoCloud seed.
#[derive(Debug, Clone)]
pub struct CloudInit {
    meta_data: MetaData,
    user_data: UserData,
    network_config: NetworkConfig,
}

impl CloudInit {
    pub fn new(meta_data: MetaData, user_data: UserData, network_config: NetworkConfig) -> Self {
        Self {
            meta_data,
            user_data,
            network_config,
        }
    }

    pub fn render_meta_data(&self) -> Result<String, CloudInitError> {
        Ok(serde_yaml::to_string(&self.meta_data)?)
    }

    pub fn render_user_data(&self) -> Result<String, CloudInitError> {
        Ok(format!(
            "#cloud-config\n{}",
            serde_yaml::to_string(&self.user_data)?
        ))
    }

    pub fn render_network_config(&self) -> Result<String, CloudInitError> {
        Ok(serde_yaml::to_string(&self.network_config)?)
    }

    /// Write the three documents into `dir` and build the seed image.
    /// Returns the path of the generated image.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, CloudInitError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(META_DATA), self.render_meta_data()?)?;
        std::fs::write(dir.join(USER_DATA), self.render_user_data()?)?;
        std::fs::write(dir.join(NETWORK_CONFIG), self.render_network_config()?)?;

        let output = Command::new("genisoimage")
            .current_dir(dir)
            .args([
                "-output",
                SEED_IMAGE,
                "-volid",
                "cidata",
                "-joliet",
                "-rock",
                USER_DATA,
                META_DATA,
                NETWORK_CONFIG,
            ])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudInitError::Iso(stderr.trim().to_string()));
        }

        Ok(dir.join(SEED_IMAGE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> CloudInit {
        CloudInit::new(
            MetaData {
                instance_id: "8d9f9e42-92f3-4b37-8f24-83f5b1f9e0a1".to_string(),
                local_hostname: "vm-1".to_string(),
            },
            UserData {
                users: vec![UserDataUser::sudoer(
                    "ubuntu",
                    vec!["ssh-ed25519 AAAA test".to_string()],
                )],
            },
            NetworkConfig {
                version: 1,
                config: vec![NetworkConfigEntry::physical(
                    0,
                    "52:54:00:11:22:33",
                    NetworkConfigSubnet::r#static(
                        "10.0.0.10",
                        "255.255.255.0",
                        "10.0.0.1",
                        vec!["8.8.8.8".to_string()],
                    ),
                )],
            },
        )
    }

    #[test]
    fn test_meta_data_keys() {
        let rendered = seed().render_meta_data().unwrap();
        assert!(rendered.contains("instance-id: 8d9f9e42-92f3-4b37-8f24-83f5b1f9e0a1"));
        assert!(rendered.contains("local-hostname: vm-1"));
    }

    #[test]
    fn test_user_data_header_and_user() {
        let rendered = seed().render_user_data().unwrap();
        assert!(rendered.starts_with("#cloud-config\n"));
        assert!(rendered.contains("name: ubuntu"));
        assert!(rendered.contains("groups: sudo"));
        assert!(rendered.contains("shell: /bin/bash"));
        assert!(rendered.contains("ALL=(ALL) NOPASSWD:ALL"));
        assert!(rendered.contains("ssh-ed25519 AAAA test"));
    }

    #[test]
    fn test_network_config_entry() {
        let rendered = seed().render_network_config().unwrap();
        assert!(rendered.contains("version: 1"));
        assert!(rendered.contains("type: physical"));
        assert!(rendered.contains("name: eth0"));
        assert!(rendered.contains("mac_address: 52:54:00:11:22:33"));
        assert!(rendered.contains("type: static"));
        assert!(rendered.contains("netmask: 255.255.255.0"));
        assert!(rendered.contains("gateway: 10.0.0.1"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let a = seed();
        let b = seed();
        assert_eq!(
            a.render_network_config().unwrap(),
            b.render_network_config().unwrap()
        );
        assert_eq!(a.render_user_data().unwrap(), b.render_user_data().unwrap());
    }

    #[test]
    fn test_write_renders_documents() {
        // genisoimage is not guaranteed on test hosts; only the document
        // files are checked here.
        let dir = tempfile::tempdir().unwrap();
        let seed_dir = dir.path().join("vm");
        let _ = seed().write(&seed_dir);

        let user_data = std::fs::read_to_string(seed_dir.join("user-data")).unwrap();
        assert!(user_data.starts_with("#cloud-config\n"));
        assert!(seed_dir.join("meta-data").exists());
        assert!(seed_dir.join("network-config").exists());
    }
}
