//! Host networking helpers: deterministic MAC and TAP naming, and wiring
//! emulator-created TAPs into their Linux bridges.

use std::net::Ipv4Addr;
use std::process::Command;

use anyhow::{bail, Context, Result};
use md5::{Digest, Md5};

/// Generate a locally administered MAC for a NIC, keyed by
/// `(vm_id, network_id)` so reconciles after an agent restart reuse the
/// same address.
pub fn generate_mac(vm_id: &str, network_id: &str) -> String {
    let digest = Md5::digest(format!("{}{}", vm_id, network_id).as_bytes());
    format!(
        "52:54:{:02x}:{:02x}:{:02x}:{:02x}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

/// Deterministic TAP interface name: `hum-vm-<hash>-NN` where the hash is
/// derived from `(bridge_name, vm_id)` and NN is the two-digit NIC index.
/// The result always fits IFNAMSIZ - 1 (15 chars).
pub fn tap_name(bridge_name: &str, vm_id: &str, nic_index: usize) -> String {
    let digest = Md5::digest(format!("{}{}", bridge_name, vm_id).as_bytes());
    let hash = hex::encode(digest);
    format!("hum-vm-{}-{:02}", &hash[..5], nic_index)
}

/// Netmask in dotted-quad form for an IPv4 CIDR such as `10.0.0.0/24`.
pub fn ipv4_netmask(cidr: &str) -> Result<String> {
    let Some((address, prefix)) = cidr.split_once('/') else {
        bail!("invalid IPv4 CIDR {cidr:?}: missing prefix");
    };
    address
        .parse::<Ipv4Addr>()
        .with_context(|| format!("invalid IPv4 CIDR {cidr:?}"))?;
    let prefix: u32 = prefix
        .parse()
        .with_context(|| format!("invalid IPv4 CIDR {cidr:?}"))?;
    if prefix > 32 {
        bail!("invalid IPv4 CIDR {cidr:?}: prefix exceeds 32");
    }

    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    };
    Ok(Ipv4Addr::from(mask).to_string())
}

/// Bring a TAP up and enslave it to its bridge. Idempotent over the life
/// of the TAP created by the emulator.
pub fn attach_tap(tap: &str, bridge: &str) -> Result<()> {
    run_ip(&["link", "set", "dev", tap, "up"])?;
    run_ip(&["link", "set", "dev", tap, "master", bridge])?;
    Ok(())
}

/// Run an `ip` command and surface stderr on failure.
fn run_ip(args: &[&str]) -> Result<()> {
    let output = Command::new("ip")
        .args(args)
        .output()
        .context("failed to execute ip command")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("ip {} failed: {}", args.join(" "), stderr.trim());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_is_deterministic() {
        let a = generate_mac("vm-1", "net-1");
        let b = generate_mac("vm-1", "net-1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_mac_shape() {
        let mac = generate_mac("vm-1", "net-1");
        assert!(mac.starts_with("52:54:"));
        assert_eq!(mac.len(), 17);
        assert_eq!(mac.split(':').count(), 6);
    }

    #[test]
    fn test_mac_varies_by_input() {
        assert_ne!(generate_mac("vm-1", "net-1"), generate_mac("vm-1", "net-2"));
        assert_ne!(generate_mac("vm-1", "net-1"), generate_mac("vm-2", "net-1"));
    }

    #[test]
    fn test_tap_name_shape() {
        let name = tap_name("br-vlan100", "vm-1", 0);
        assert!(name.starts_with("hum-vm-"));
        assert!(name.ends_with("-00"));
        // IFNAMSIZ limit
        assert_eq!(name.len(), 15);
    }

    #[test]
    fn test_tap_name_indexed() {
        let first = tap_name("br0", "vm-1", 0);
        let third = tap_name("br0", "vm-1", 3);
        assert_eq!(&first[..12], &third[..12]);
        assert!(third.ends_with("-03"));
    }

    #[test]
    fn test_tap_name_deterministic() {
        assert_eq!(tap_name("br0", "vm-1", 1), tap_name("br0", "vm-1", 1));
        assert_ne!(tap_name("br0", "vm-1", 1), tap_name("br1", "vm-1", 1));
    }

    #[test]
    fn test_ipv4_netmask() {
        assert_eq!(ipv4_netmask("10.0.0.0/24").unwrap(), "255.255.255.0");
        assert_eq!(ipv4_netmask("172.16.0.0/16").unwrap(), "255.255.0.0");
        assert_eq!(ipv4_netmask("192.168.1.1/32").unwrap(), "255.255.255.255");
        assert_eq!(ipv4_netmask("0.0.0.0/0").unwrap(), "0.0.0.0");
    }

    #[test]
    fn test_ipv4_netmask_rejects_malformed() {
        assert!(ipv4_netmask("10.0.0.0").is_err());
        assert!(ipv4_netmask("10.0.0.0/33").is_err());
        assert!(ipv4_netmask("banana/24").is_err());
    }
}
