use std::{fmt, net::IpAddr};

use nix::libc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Socket lifecycle step observed by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Action {
    Connect,
    Accept,
    Bind,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Map an `IPPROTO_*` value to a supported protocol.
    pub fn from_raw(proto: u16) -> Option<Self> {
        match i32::from(proto) {
            libc::IPPROTO_TCP => Some(Protocol::Tcp),
            libc::IPPROTO_UDP => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// Address family of a socket.
///
/// Only [`Family::Inet`] and [`Family::Inet6`] can appear in a [`NetworkEvent`],
/// every other family is carried as `Unsupported` until the event is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    Inet,
    Inet6,
    Unsupported(u16),
}

impl Family {
    /// Map an `AF_*` value.
    pub fn from_raw(family: u16) -> Self {
        match i32::from(family) {
            libc::AF_INET => Family::Inet,
            libc::AF_INET6 => Family::Inet6,
            _ => Family::Unsupported(family),
        }
    }

    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::Inet,
            IpAddr::V6(_) => Family::Inet6,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Family::Unsupported(_))
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Inet => write!(f, "IPv4"),
            Family::Inet6 => write!(f, "IPv6"),
            Family::Unsupported(raw) => write!(f, "AF({raw})"),
        }
    }
}

/// Encapsulates IP and port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(v4) => write!(f, "{v4}:{}", self.port),
            IpAddr::V6(v6) => write!(f, "[{v6}]:{}", self.port),
        }
    }
}

/// A socket event which survived filtering and is handed to the log sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub action: Action,
    pub protocol: Protocol,
    pub family: Family,
    pub source: Host,
    pub destination: Host,
    /// Executable path of the originating process
    pub path: String,
    pub pid: i32,
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} -> {}",
            self.action, self.protocol, self.family, self.source, self.destination
        )
    }
}
