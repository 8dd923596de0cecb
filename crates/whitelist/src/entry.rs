use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use netlog_core::Family;
use thiserror::Error;

/// Maximum length in bytes of a whitelisted executable path.
pub const MAX_EXEC_PATH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("empty executable path")]
    Empty,
    #[error("executable path is {0} bytes long, the maximum is {MAX_EXEC_PATH}")]
    TooLong(usize),
    #[error("executable path contains a NUL byte")]
    Nul,
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
}

/// Restricts a whitelist entry to a remote endpoint.
///
/// A missing field matches anything. The address, when present, also fixes
/// the address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConstraint {
    pub address: Option<IpAddr>,
    pub port: Option<u16>,
}

impl EndpointConstraint {
    pub fn matches(&self, family: Family, address: Option<IpAddr>, port: u16) -> bool {
        let address_matches = match self.address {
            None => true,
            Some(expected) => Family::of(&expected) == family && address == Some(expected),
        };
        address_matches && self.port.is_none_or(|expected| expected == port)
    }
}

/// `1.2.3.4`, `1.2.3.4:22`, `::1`, `[::1]`, `[::1]:22` or `*:22`.
impl FromStr for EndpointConstraint {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EntryError::InvalidEndpoint(s.to_string());
        if let Some(port) = s.strip_prefix("*:") {
            let port = port.parse().map_err(|_| invalid())?;
            return Ok(Self {
                address: None,
                port: Some(port),
            });
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Self {
                address: Some(addr.ip()),
                port: Some(addr.port()),
            });
        }
        let ip = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(s);
        let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
        Ok(Self {
            address: Some(ip),
            port: None,
        })
    }
}

impl fmt::Display for EndpointConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.address, self.port) {
            (Some(address), Some(port)) => write!(f, "{}", SocketAddr::new(address, port)),
            (Some(address), None) => write!(f, "{address}"),
            (None, Some(port)) => write!(f, "*:{port}"),
            (None, None) => write!(f, "*"),
        }
    }
}

/// An executable exempted from logging, optionally only towards one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    path: String,
    endpoint: Option<EndpointConstraint>,
}

impl WhitelistEntry {
    pub fn new(path: &str, endpoint: Option<EndpointConstraint>) -> Result<Self, EntryError> {
        if path.is_empty() {
            Err(EntryError::Empty)
        } else if path.len() > MAX_EXEC_PATH {
            Err(EntryError::TooLong(path.len()))
        } else if path.contains('\0') {
            Err(EntryError::Nul)
        } else {
            Ok(Self {
                path: path.to_string(),
                endpoint,
            })
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn endpoint(&self) -> Option<&EndpointConstraint> {
        self.endpoint.as_ref()
    }

    /// Exact, case sensitive comparison of the path, then of the endpoint
    /// if the entry has one.
    pub fn matches(&self, path: &str, family: Family, address: Option<IpAddr>, port: u16) -> bool {
        self.path == path
            && self
                .endpoint
                .is_none_or(|endpoint| endpoint.matches(family, address, port))
    }
}

/// `PATH` or `PATH@ENDPOINT`. A suffix after the last `@` which isn't a valid
/// endpoint is considered part of the path.
impl FromStr for WhitelistEntry {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            Some((path, endpoint)) => match endpoint.parse() {
                Ok(endpoint) => WhitelistEntry::new(path, Some(endpoint)),
                Err(_) => WhitelistEntry::new(s, None),
            },
            None => WhitelistEntry::new(s, None),
        }
    }
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Some(endpoint) => write!(f, "{}@{}", self.path, endpoint),
            None => write!(f, "{}", self.path),
        }
    }
}
