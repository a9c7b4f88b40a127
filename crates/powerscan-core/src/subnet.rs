//! Subnet expansion: explicit CIDR strings and auto-detected connected
//! subnets, both yielding inclusive [`AddressRange`]s.

use std::net::IpAddr;

use ipnet::IpNet;
use pnet::datalink::{self, NetworkInterface};
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::range::AddressRange;

/// Address families covered by an `auto` subnet request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoScope {
    Both,
    V4Only,
    V6Only,
}

impl AutoScope {
    /// Recognize the `auto`/`auto4`/`auto6` keywords.
    pub fn parse(spec: &str) -> Option<Self> {
        match spec {
            "auto" => Some(AutoScope::Both),
            "auto4" => Some(AutoScope::V4Only),
            "auto6" => Some(AutoScope::V6Only),
            _ => None,
        }
    }

    fn admits(self, addr: &IpAddr) -> bool {
        match self {
            AutoScope::Both => true,
            AutoScope::V4Only => addr.is_ipv4(),
            AutoScope::V6Only => addr.is_ipv6(),
        }
    }
}

/// Expand a CIDR string into its first..last usable host addresses.
pub fn cidr_to_range(cidr: &str) -> Result<AddressRange> {
    let net: IpNet = cidr.parse().map_err(|e: ipnet::AddrParseError| {
        CoreError::MalformedInput {
            input: cidr.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok(usable_span(&net))
}

/// First..last usable hosts of a network. IPv4 excludes the network and
/// broadcast addresses, except for /31 and /32 where every address counts.
/// IPv6 has no broadcast; only the network address is excluded.
fn usable_span(net: &IpNet) -> AddressRange {
    match net {
        IpNet::V4(v4) => {
            let network = u32::from(v4.network());
            let broadcast = u32::from(v4.broadcast());
            if v4.prefix_len() >= 31 {
                AddressRange::new(IpAddr::V4(network.into()), IpAddr::V4(broadcast.into()))
            } else {
                AddressRange::new(
                    IpAddr::V4((network + 1).into()),
                    IpAddr::V4((broadcast - 1).into()),
                )
            }
        }
        IpNet::V6(v6) => {
            let network = u128::from(v6.network());
            let last = u128::from(v6.broadcast());
            if v6.prefix_len() == 128 {
                AddressRange::single(IpAddr::V6(network.into()))
            } else {
                AddressRange::new(IpAddr::V6((network + 1).into()), IpAddr::V6(last.into()))
            }
        }
    }
}

/// Expand every connected subnet of the qualifying local interfaces.
///
/// Interfaces that are down, not running, loopback, or without broadcast
/// capability are skipped. An empty interface enumeration is an error, a
/// merely empty result is not.
pub fn auto_detect_ranges(scope: AutoScope) -> Result<Vec<AddressRange>> {
    let interfaces = datalink::interfaces();
    if interfaces.is_empty() {
        return Err(CoreError::NoInterfaces);
    }
    let mut ranges = Vec::new();
    for iface in &interfaces {
        if !interface_qualifies(iface) {
            debug!(interface = %iface.name, "interface skipped for subnet auto-detection");
            continue;
        }
        for net in &iface.ips {
            let addr = net.ip();
            if !scope.admits(&addr) {
                continue;
            }
            let cidr = format!("{}/{}", addr, net.prefix());
            match cidr_to_range(&cidr) {
                Ok(range) => {
                    debug!(interface = %iface.name, %cidr, range = %range, "expanding connected subnet");
                    ranges.push(range);
                }
                Err(e) => {
                    warn!(interface = %iface.name, %cidr, error = %e, "could not expand connected subnet");
                }
            }
        }
    }
    Ok(ranges)
}

/// A usable interface is up, running, broadcast-capable and not loopback.
fn interface_qualifies(iface: &NetworkInterface) -> bool {
    !iface.is_loopback() && iface.is_up() && is_running(iface) && iface.is_broadcast()
}

#[cfg(unix)]
fn is_running(iface: &NetworkInterface) -> bool {
    iface.is_running()
}

#[cfg(not(unix))]
fn is_running(iface: &NetworkInterface) -> bool {
    iface.is_up()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn cidr_v4_excludes_network_and_broadcast() {
        let range = cidr_to_range("192.0.2.0/30").unwrap();
        assert_eq!(range.start, ip("192.0.2.1"));
        assert_eq!(range.end, ip("192.0.2.2"));
    }

    #[test]
    fn cidr_v4_with_host_bits_is_masked_first() {
        let range = cidr_to_range("192.168.1.42/24").unwrap();
        assert_eq!(range.start, ip("192.168.1.1"));
        assert_eq!(range.end, ip("192.168.1.254"));
    }

    #[test]
    fn cidr_v4_degenerate_prefixes_use_full_span() {
        let r32 = cidr_to_range("10.1.2.3/32").unwrap();
        assert_eq!(r32.start, ip("10.1.2.3"));
        assert_eq!(r32.end, ip("10.1.2.3"));

        let r31 = cidr_to_range("10.1.2.2/31").unwrap();
        assert_eq!(r31.start, ip("10.1.2.2"));
        assert_eq!(r31.end, ip("10.1.2.3"));
    }

    #[test]
    fn cidr_v6_excludes_network_only() {
        let range = cidr_to_range("2001:db8::/126").unwrap();
        assert_eq!(range.start, ip("2001:db8::1"));
        assert_eq!(range.end, ip("2001:db8::3"));

        let single = cidr_to_range("2001:db8::42/128").unwrap();
        assert_eq!(single.start, ip("2001:db8::42"));
        assert!(single.is_single());
    }

    #[test]
    fn malformed_cidr_is_rejected() {
        assert!(matches!(
            cidr_to_range("not-a-subnet"),
            Err(CoreError::MalformedInput { .. })
        ));
        assert!(matches!(
            cidr_to_range("192.0.2.0/33"),
            Err(CoreError::MalformedInput { .. })
        ));
    }

    #[test]
    fn auto_scope_keywords() {
        assert_eq!(AutoScope::parse("auto"), Some(AutoScope::Both));
        assert_eq!(AutoScope::parse("auto4"), Some(AutoScope::V4Only));
        assert_eq!(AutoScope::parse("auto6"), Some(AutoScope::V6Only));
        assert_eq!(AutoScope::parse("auto5"), None);
        assert_eq!(AutoScope::parse("192.0.2.0/24"), None);
    }

    #[test]
    fn auto_scope_family_filter() {
        assert!(AutoScope::Both.admits(&ip("192.0.2.1")));
        assert!(AutoScope::Both.admits(&ip("2001:db8::1")));
        assert!(AutoScope::V4Only.admits(&ip("192.0.2.1")));
        assert!(!AutoScope::V4Only.admits(&ip("2001:db8::1")));
        assert!(AutoScope::V6Only.admits(&ip("2001:db8::1")));
        assert!(!AutoScope::V6Only.admits(&ip("192.0.2.1")));
    }

    #[cfg(target_os = "linux")]
    mod interface_filter {
        use super::*;

        const IFF_UP: u32 = 0x1;
        const IFF_BROADCAST: u32 = 0x2;
        const IFF_LOOPBACK: u32 = 0x8;
        const IFF_RUNNING: u32 = 0x40;

        fn iface(name: &str, flags: u32) -> NetworkInterface {
            NetworkInterface {
                name: name.to_string(),
                description: String::new(),
                index: 1,
                mac: None,
                ips: Vec::new(),
                flags,
            }
        }

        #[test]
        fn active_broadcast_interface_qualifies() {
            let eth = iface("eth0", IFF_UP | IFF_RUNNING | IFF_BROADCAST);
            assert!(interface_qualifies(&eth));
        }

        #[test]
        fn loopback_and_inactive_interfaces_are_skipped() {
            let lo = iface("lo", IFF_UP | IFF_RUNNING | IFF_LOOPBACK);
            assert!(!interface_qualifies(&lo));

            let down = iface("eth1", IFF_BROADCAST);
            assert!(!interface_qualifies(&down));

            let not_running = iface("eth2", IFF_UP | IFF_BROADCAST);
            assert!(!interface_qualifies(&not_running));

            let no_broadcast = iface("tun0", IFF_UP | IFF_RUNNING);
            assert!(!interface_qualifies(&no_broadcast));
        }
    }
}
