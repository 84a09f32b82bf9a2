// Local address discovery for the subnet scan.

use std::net::{Ipv4Addr, UdpSocket};

/// The IPv4 address this machine uses to reach the LAN.
///
/// Connecting a UDP socket sends nothing; it only asks the OS to pick a
/// route, whose source address is the one we want.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(addr) if !addr.is_loopback() && !addr.is_unspecified() => Some(addr),
        _ => None,
    }
}

/// Every host address of the /24 containing `addr`, starting with the
/// neighbours closest to it.
///
/// Only private ranges are scanned; a public address yields nothing.
pub fn subnet_hosts(addr: Ipv4Addr) -> Vec<Ipv4Addr> {
    if !addr.is_private() {
        return Vec::new();
    }
    let [a, b, c, own] = addr.octets();
    let mut hosts: Vec<Ipv4Addr> = (1..=254u8)
        .filter(|&d| d != own)
        .map(|d| Ipv4Addr::new(a, b, c, d))
        .collect();
    hosts.sort_by_key(|h| (i16::from(h.octets()[3]) - i16::from(own)).abs());
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_hosts_skip_self_and_broadcast() {
        let hosts = subnet_hosts(Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(hosts.len(), 253);
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 20)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 0)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn test_subnet_hosts_nearest_first() {
        let hosts = subnet_hosts(Ipv4Addr::new(10, 0, 0, 100));
        let first_two: Vec<u8> = hosts.iter().take(2).map(|h| h.octets()[3]).collect();
        assert!(first_two.contains(&99));
        assert!(first_two.contains(&101));
    }

    #[test]
    fn test_public_address_is_not_scanned() {
        assert!(subnet_hosts(Ipv4Addr::new(8, 8, 8, 8)).is_empty());
    }
}
