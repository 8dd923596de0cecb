//! [`ProbeRegistry`] keeps track of the armed [`ProbeKind`]s and installs
//! their [`AttachPoint`]s through an [`InstrumentationPort`].
//!
//! Several kinds may be backed by the same point (TCP and UDP close both use
//! [`AttachPoint::Release`]): a point is attached when the first kind using
//! it is armed and detached when the last one is disarmed.
//!
//! Every mutation runs under a single mutex, which also owns the port, and
//! publishes the resulting bitmask once at the end. Readers use
//! [`ProbeRegistry::query`] or an [`ArmedProbes`] view and never lock.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU32, Ordering},
};

use thiserror::Error;

use crate::{
    attach::{AttachError, InstrumentationPort},
    probe::{ProbeKind, ProbeSet},
};

/// Failure to attach the instrumentation point of a probe kind.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to plant tcp_connect probe")]
    TcpConnect(#[source] AttachError),
    #[error("failed to plant tcp_accept probe")]
    TcpAccept(#[source] AttachError),
    #[error("failed to plant tcp_close probe")]
    TcpClose(#[source] AttachError),
    #[error("failed to plant udp_connect probe")]
    UdpConnect(#[source] AttachError),
    #[error("failed to plant udp_bind probe")]
    UdpBind(#[source] AttachError),
    #[error("failed to plant udp_close probe")]
    UdpClose(#[source] AttachError),
}

impl ProbeError {
    fn new(kind: ProbeKind, source: AttachError) -> Self {
        match kind {
            ProbeKind::TcpConnect => ProbeError::TcpConnect(source),
            ProbeKind::TcpAccept => ProbeError::TcpAccept(source),
            ProbeKind::TcpClose => ProbeError::TcpClose(source),
            ProbeKind::UdpConnect => ProbeError::UdpConnect(source),
            ProbeKind::UdpBind => ProbeError::UdpBind(source),
            ProbeKind::UdpClose => ProbeError::UdpClose(source),
        }
    }

    /// The probe kind which could not be planted.
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeError::TcpConnect(_) => ProbeKind::TcpConnect,
            ProbeError::TcpAccept(_) => ProbeKind::TcpAccept,
            ProbeError::TcpClose(_) => ProbeKind::TcpClose,
            ProbeError::UdpConnect(_) => ProbeKind::UdpConnect,
            ProbeError::UdpBind(_) => ProbeKind::UdpBind,
            ProbeError::UdpClose(_) => ProbeKind::UdpClose,
        }
    }
}

pub struct ProbeRegistry<P> {
    port: Mutex<P>,
    state: Arc<AtomicU32>,
}

/// Read-only, lock-free view of the armed probes of a [`ProbeRegistry`].
#[derive(Clone, Debug)]
pub struct ArmedProbes(Arc<AtomicU32>);

impl ArmedProbes {
    pub fn get(&self) -> ProbeSet {
        load(&self.0)
    }

    pub fn contains(&self, kind: ProbeKind) -> bool {
        self.get().contains(kind)
    }
}

fn load(state: &AtomicU32) -> ProbeSet {
    // only ever stored from a valid ProbeSet
    ProbeSet::from_bits(state.load(Ordering::Acquire)).unwrap_or_default()
}

impl<P: InstrumentationPort> ProbeRegistry<P> {
    /// Create a registry with no probe armed.
    pub fn new(port: P) -> Self {
        Self {
            port: Mutex::new(port),
            state: Arc::new(AtomicU32::new(ProbeSet::EMPTY.bits())),
        }
    }

    /// Currently armed probes.
    pub fn query(&self) -> ProbeSet {
        load(&self.state)
    }

    pub fn armed(&self) -> ArmedProbes {
        ArmedProbes(self.state.clone())
    }

    /// Arm every kind of `requested` which is not armed yet.
    ///
    /// Stops at the first attach failure: kinds planted earlier in the same
    /// call stay armed.
    pub fn plant(&self, requested: ProbeSet) -> Result<(), ProbeError> {
        self.transition(|t| t.plant(requested))
    }

    /// Disarm every kind of `requested`.
    pub fn unplant(&self, requested: ProbeSet) {
        self.transition(|t| t.unplant(requested))
    }

    /// Move to the `desired` set in a single step.
    pub fn reconcile(&self, desired: ProbeSet) -> Result<(), ProbeError> {
        self.transition(|t| {
            let current = t.state;
            t.unplant(current.difference(desired));
            t.plant(desired.difference(current))
        })
    }

    /// Arm or disarm a single kind.
    pub fn set_probe(&self, kind: ProbeKind, enabled: bool) -> Result<(), ProbeError> {
        self.transition(|t| {
            if enabled {
                t.plant(kind.into())
            } else {
                t.unplant(kind.into());
                Ok(())
            }
        })
    }

    /// Disarm everything. Events may still fire while the points go away.
    pub fn unplant_all(&self) {
        self.transition(|t| {
            let current = t.state;
            t.unplant(current)
        })
    }

    fn transition<R>(&self, f: impl FnOnce(&mut Transition<'_, P>) -> R) -> R {
        let mut port = self.port.lock().unwrap_or_else(PoisonError::into_inner);
        let mut transition = Transition {
            port: &mut *port,
            state: self.query(),
        };
        let result = f(&mut transition);
        self.state.store(transition.state.bits(), Ordering::Release);
        result
    }
}

/// Working copy of the state while the registry lock is held.
struct Transition<'a, P> {
    port: &'a mut P,
    state: ProbeSet,
}

impl<P: InstrumentationPort> Transition<'_, P> {
    fn plant(&mut self, requested: ProbeSet) -> Result<(), ProbeError> {
        for kind in requested.difference(self.state).iter() {
            let point = kind.attach_point();
            if self.state.uses(point) {
                log::debug!("{kind}: {point} already attached");
            } else {
                self.port
                    .attach(point)
                    .map_err(|err| ProbeError::new(kind, err))?;
                log::debug!("{kind}: attached {point}");
            }
            self.state.insert(kind);
        }
        Ok(())
    }

    fn unplant(&mut self, requested: ProbeSet) {
        for kind in requested.intersection(self.state).iter() {
            self.state.remove(kind);
            let point = kind.attach_point();
            if self.state.uses(point) {
                log::debug!("{kind}: {point} still in use");
            } else {
                self.port.detach(point);
                log::debug!("{kind}: detached {point}");
            }
        }
    }
}
