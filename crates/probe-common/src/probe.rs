//! Logical probe kinds and the bitmask used to address them.

use std::{fmt, num::ParseIntError, str::FromStr};

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use thiserror::Error;

use crate::attach::AttachPoint;

/// One of the monitored socket lifecycle events.
///
/// The discriminant is the bit position inside a [`ProbeSet`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ProbeKind {
    TcpConnect = 0,
    TcpAccept = 1,
    TcpClose = 2,
    UdpConnect = 3,
    UdpBind = 4,
    UdpClose = 5,
}

impl ProbeKind {
    pub const fn bit(self) -> u32 {
        1 << self as u8
    }

    /// Physical instrumentation point backing this probe kind.
    ///
    /// TCP and UDP close share [`AttachPoint::Release`].
    pub const fn attach_point(self) -> AttachPoint {
        match self {
            ProbeKind::TcpConnect => AttachPoint::StreamConnect,
            ProbeKind::TcpAccept => AttachPoint::Accept,
            ProbeKind::TcpClose => AttachPoint::Release,
            ProbeKind::UdpConnect => AttachPoint::DgramConnect,
            ProbeKind::UdpBind => AttachPoint::Bind,
            ProbeKind::UdpClose => AttachPoint::Release,
        }
    }
}

/// Bitmask of [`ProbeKind`]s. Only the bits of known kinds can be set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProbeSet(u32);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeSetParseError {
    #[error("empty probe mask")]
    Empty,
    #[error("invalid hexadecimal probe mask {value:?}")]
    InvalidHex {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("unknown probe bits {0:#x}")]
    UnknownBits(u32),
}

impl ProbeSet {
    pub const EMPTY: ProbeSet = ProbeSet(0);
    pub const ALL: ProbeSet = ProbeSet(0x3f);

    /// Returns `None` if `bits` contains bits outside the known kinds.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(ProbeSet(bits))
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, kind: ProbeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: ProbeKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ProbeKind) {
        self.0 &= !kind.bit();
    }

    pub const fn union(self, other: ProbeSet) -> ProbeSet {
        ProbeSet(self.0 | other.0)
    }

    pub const fn intersection(self, other: ProbeSet) -> ProbeSet {
        ProbeSet(self.0 & other.0)
    }

    /// Kinds in `self` which are not in `other`.
    pub const fn difference(self, other: ProbeSet) -> ProbeSet {
        ProbeSet(self.0 & !other.0)
    }

    /// Iterate over the contained kinds in bit order.
    pub fn iter(self) -> impl Iterator<Item = ProbeKind> {
        ProbeKind::iter().filter(move |kind| self.contains(*kind))
    }

    /// Returns true if some kind in the set is backed by `point`.
    pub fn uses(self, point: AttachPoint) -> bool {
        self.iter().any(|kind| kind.attach_point() == point)
    }
}

impl From<ProbeKind> for ProbeSet {
    fn from(kind: ProbeKind) -> Self {
        ProbeSet(kind.bit())
    }
}

impl FromIterator<ProbeKind> for ProbeSet {
    fn from_iter<I: IntoIterator<Item = ProbeKind>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ProbeSet::EMPTY, |set, kind| set.union(kind.into()))
    }
}

impl fmt::Debug for ProbeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Lowercase hexadecimal, as read back from the `probes` parameter.
impl fmt::Display for ProbeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl FromStr for ProbeSet {
    type Err = ProbeSetParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(ProbeSetParseError::Empty);
        }
        let bits =
            u32::from_str_radix(digits, 16).map_err(|source| ProbeSetParseError::InvalidHex {
                value: value.to_string(),
                source,
            })?;
        ProbeSet::from_bits(bits).ok_or(ProbeSetParseError::UnknownBits(bits & !Self::ALL.0))
    }
}
