use std::net::{Ipv4Addr, Ipv6Addr};

use netlog_core::{Family, Host};
use probe_common::AttachPoint;

/// Socket state captured by one hit of an attach point.
///
/// Ports are in host byte order. Both address pairs are always captured,
/// `family` tells which one is meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSocketEvent {
    pub point: AttachPoint,
    pub pid: i32,
    /// `AF_*`
    pub family: u16,
    /// `IPPROTO_*`
    pub protocol: u16,
    pub sport: u16,
    pub dport: u16,
    pub saddr: Ipv4Addr,
    pub daddr: Ipv4Addr,
    pub saddr6: Ipv6Addr,
    pub daddr6: Ipv6Addr,
    /// Return value of the probed call, zero where it isn't recorded.
    pub ret: i32,
}

impl RawSocketEvent {
    /// Source and destination of the socket, `None` for unsupported families.
    pub fn hosts(&self) -> Option<(Host, Host)> {
        let (source, destination) = match Family::from_raw(self.family) {
            Family::Inet => (self.saddr.into(), self.daddr.into()),
            Family::Inet6 => (self.saddr6.into(), self.daddr6.into()),
            Family::Unsupported(_) => return None,
        };
        Some((
            Host {
                ip: source,
                port: self.sport,
            },
            Host {
                ip: destination,
                port: self.dport,
            },
        ))
    }
}
