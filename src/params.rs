//! Runtime parameters of netlog: the armed probes and the whitelist, read
//! and written as text.

use std::{net::IpAddr, sync::Arc};

use netlog_core::Family;
use probe_common::{InstrumentationPort, ProbeError, ProbeKind, ProbeRegistry, ProbeSetParseError};
use thiserror::Error;
use whitelist::{DEFAULT_DELIMITER, WhitelistTable};

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("invalid probe mask")]
    ProbeSet(#[from] ProbeSetParseError),
    #[error("unknown probe {0:?}")]
    UnknownProbe(String),
    #[error("{0:?} is not a valid probe switch")]
    InvalidSwitch(String),
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

pub struct Parameters<P> {
    registry: Arc<ProbeRegistry<P>>,
    whitelist: Arc<WhitelistTable>,
}

impl<P> Clone for Parameters<P> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            whitelist: self.whitelist.clone(),
        }
    }
}

impl<P: InstrumentationPort> Parameters<P> {
    pub fn new(registry: Arc<ProbeRegistry<P>>, whitelist: Arc<WhitelistTable>) -> Self {
        Self {
            registry,
            whitelist,
        }
    }

    pub fn registry(&self) -> &Arc<ProbeRegistry<P>> {
        &self.registry
    }

    pub fn whitelist(&self) -> &Arc<WhitelistTable> {
        &self.whitelist
    }

    /// Replace the whitelist, returning the number of accepted entries.
    pub fn set_whitelist_from_array<S: AsRef<str>>(&self, entries: &[S]) -> usize {
        self.whitelist.rebuild_from_entries(entries)
    }

    /// Replace the whitelist with a comma separated list.
    pub fn set_whitelist_from_string(&self, entries: &str) -> usize {
        self.whitelist
            .rebuild_from_delimited_string(entries, DEFAULT_DELIMITER)
    }

    pub fn dump_whitelist(&self, buf: &mut [u8]) -> usize {
        self.whitelist.dump_into(buf)
    }

    pub fn is_whitelisted(
        &self,
        path: &str,
        family: Family,
        address: Option<IpAddr>,
        port: u16,
    ) -> bool {
        self.whitelist.is_match(path, family, address, port)
    }

    /// Armed probes as a hexadecimal mask.
    pub fn probes(&self) -> String {
        self.registry.query().to_string()
    }

    /// Arm exactly the probes of the hexadecimal mask `value`.
    pub fn set_probes(&self, value: &str) -> Result<(), ParamError> {
        let desired = value.parse()?;
        self.registry.reconcile(desired)?;
        Ok(())
    }

    /// `"1"` if the probe called `name` is armed, `"0"` otherwise.
    pub fn probe(&self, name: &str) -> Result<String, ParamError> {
        let kind = probe_kind(name)?;
        Ok(if self.registry.query().contains(kind) {
            "1".to_string()
        } else {
            "0".to_string()
        })
    }

    /// Arm or disarm the probe called `name`, see [`parse_switch`].
    pub fn set_probe(&self, name: &str, value: &str) -> Result<(), ParamError> {
        let kind = probe_kind(name)?;
        let enabled = parse_switch(value)?;
        self.registry.set_probe(kind, enabled)?;
        Ok(())
    }
}

fn probe_kind(name: &str) -> Result<ProbeKind, ParamError> {
    name.trim()
        .parse()
        .map_err(|_| ParamError::UnknownProbe(name.to_string()))
}

/// An unsigned integer, `0x` prefixed hexadecimal, `0` prefixed octal or
/// decimal, where anything but zero is on. `y`, `n`, `true` and `false` are
/// accepted as well.
pub fn parse_switch(value: &str) -> Result<bool, ParamError> {
    let trimmed = value.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "y" | "true" => return Ok(true),
        "n" | "false" => return Ok(false),
        _ => {}
    }
    let (digits, radix) = if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        (hex, 16)
    } else if trimmed.len() > 1 && trimmed.starts_with('0') {
        (&trimmed[1..], 8)
    } else {
        (trimmed, 10)
    };
    // from_str_radix accepts a sign
    if digits.starts_with('+') || digits.starts_with('-') {
        return Err(ParamError::InvalidSwitch(value.to_string()));
    }
    u64::from_str_radix(digits, radix)
        .map(|value| value != 0)
        .map_err(|_| ParamError::InvalidSwitch(value.to_string()))
}
