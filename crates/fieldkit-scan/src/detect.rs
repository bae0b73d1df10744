//! Local subnet auto-detection.

use std::net::Ipv4Addr;

use get_if_addrs::IfAddr;

use crate::addr;

/// Returned when no suitable interface is found.
pub const FALLBACK_CIDR: &str = "192.168.0.0/24";

/// CIDR of the first up, non-loopback IPv4 interface, or [`FALLBACK_CIDR`].
pub fn detect_subnet_cidr() -> String {
    let interfaces = match get_if_addrs::get_if_addrs() {
        Ok(i) => i,
        Err(e) => {
            tracing::warn!(error = %e, fallback = FALLBACK_CIDR, "Interface enumeration failed");
            return FALLBACK_CIDR.to_string();
        }
    };

    for iface in interfaces.iter().filter(|i| !i.is_loopback()) {
        let IfAddr::V4(v4) = &iface.addr else {
            continue;
        };
        if let Some(cidr) = cidr_for(v4.ip, v4.netmask) {
            tracing::info!(interface = %iface.name, cidr = %cidr, "Detected local subnet");
            return cidr;
        }
    }

    tracing::warn!(fallback = FALLBACK_CIDR, "No usable IPv4 interface found");
    FALLBACK_CIDR.to_string()
}

/// `network/prefix` for an interface address, skipping link-local and
/// host-only assignments.
fn cidr_for(ip: Ipv4Addr, netmask: Ipv4Addr) -> Option<String> {
    if ip.is_link_local() || ip.is_unspecified() {
        return None;
    }
    let mask = addr::to_integer(netmask);
    let prefix = addr::mask_prefix_length(mask);
    if prefix == 0 || prefix >= 31 {
        return None;
    }
    let network = addr::network_address(ip, mask);
    Some(format!("{network}/{prefix}"))
}
