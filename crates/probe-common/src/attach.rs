//! Physical instrumentation points and the [`InstrumentationPort`] seam used
//! to install them.
//!
//! | point            | probe      | kernel symbol         | logical kinds          |
//! |------------------|------------|-----------------------|------------------------|
//! | `stream_connect` | kretprobe  | `inet_stream_connect` | tcp_connect            |
//! | `accept`         | kretprobe  | `inet_csk_accept`     | tcp_accept             |
//! | `release`        | kprobe     | `inet_release`        | tcp_close, udp_close   |
//! | `dgram_connect`  | kretprobe  | `inet_dgram_connect`  | udp_connect            |
//! | `bind`           | kretprobe  | `__sys_bind_socket`   | udp_bind               |
use std::{io, path::PathBuf};

use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum AttachPoint {
    StreamConnect,
    Accept,
    Release,
    DgramConnect,
    Bind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeType {
    Kprobe,
    Kretprobe,
}

impl AttachPoint {
    pub fn probe_type(self) -> ProbeType {
        match self {
            AttachPoint::Release => ProbeType::Kprobe,
            AttachPoint::StreamConnect
            | AttachPoint::Accept
            | AttachPoint::DgramConnect
            | AttachPoint::Bind => ProbeType::Kretprobe,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AttachPoint::StreamConnect => "inet_stream_connect",
            AttachPoint::Accept => "inet_csk_accept",
            AttachPoint::Release => "inet_release",
            AttachPoint::DgramConnect => "inet_dgram_connect",
            AttachPoint::Bind => "__sys_bind_socket",
        }
    }

    /// Fetch arguments recorded with every hit of this point.
    ///
    /// Fields are resolved through BTF, so the kernel needs
    /// `CONFIG_PROBE_EVENTS_BTF_ARGS` (and argument access from return
    /// probes for the kretprobe points).
    pub fn fetch_args(self) -> String {
        let sk = match self {
            AttachPoint::Accept => "$retval",
            _ => "sock->sk",
        };
        // failed binds are reported too, with the error as return value
        let ret = match self {
            AttachPoint::Bind => " ret=$retval:s32",
            _ => "",
        };
        format!(
            "family={sk}->__sk_common.skc_family:u16 \
             proto={sk}->sk_protocol:u16 \
             sport={sk}->__sk_common.skc_num:u16 \
             dport={sk}->__sk_common.skc_dport:u16 \
             saddr={sk}->__sk_common.skc_rcv_saddr:u32 \
             daddr={sk}->__sk_common.skc_daddr:u32 \
             saddr6={sk}->__sk_common.skc_v6_rcv_saddr.in6_u.u6_addr8:x8[16] \
             daddr6={sk}->__sk_common.skc_v6_daddr.in6_u.u6_addr8:x8[16]{ret}"
        )
    }
}

#[derive(Error, Debug)]
pub enum AttachError {
    #[error("tracefs not found")]
    TracefsNotFound,
    #[error("writing {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("attach point {0} rejected")]
    Rejected(AttachPoint),
}

/// Host mechanism able to install and remove an [`AttachPoint`].
///
/// Both calls must return promptly: they run while the probe registry lock
/// is held.
pub trait InstrumentationPort: Send {
    fn attach(&mut self, point: AttachPoint) -> Result<(), AttachError>;

    /// Detaching is best effort: failures are logged by the implementation.
    fn detach(&mut self, point: AttachPoint);
}

impl<P: InstrumentationPort + ?Sized> InstrumentationPort for Box<P> {
    fn attach(&mut self, point: AttachPoint) -> Result<(), AttachError> {
        (**self).attach(point)
    }

    fn detach(&mut self, point: AttachPoint) {
        (**self).detach(point)
    }
}
