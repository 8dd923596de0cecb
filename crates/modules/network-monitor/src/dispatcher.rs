use std::sync::Arc;

use netlog_core::{Action, EventSink, Family, NetworkEvent, Protocol};
use probe_common::{ArmedProbes, AttachPoint, ProbeKind};
use whitelist::{MAX_EXEC_PATH, WhitelistTable};

use crate::{raw::RawSocketEvent, resolver::IdentityResolver};

/// Filters raw socket events and forwards the interesting ones to a sink.
pub struct EventDispatcher<R, S> {
    resolver: R,
    whitelist: Arc<WhitelistTable>,
    sink: S,
    armed: Option<ArmedProbes>,
}

impl<R: IdentityResolver, S: EventSink> EventDispatcher<R, S> {
    pub fn new(resolver: R, whitelist: Arc<WhitelistTable>, sink: S) -> Self {
        Self {
            resolver,
            whitelist,
            sink,
            armed: None,
        }
    }

    /// Forward close events only for the close probes which are armed.
    ///
    /// Both close kinds share the `release` attach point, so it fires for
    /// UDP sockets while only `tcp_close` is armed and vice versa.
    pub fn with_armed_probes(mut self, armed: ArmedProbes) -> Self {
        self.armed = Some(armed);
        self
    }

    pub fn whitelist(&self) -> &Arc<WhitelistTable> {
        &self.whitelist
    }

    pub fn on_socket_event(&self, raw: &RawSocketEvent) {
        let Some(path) = self.resolver.resolve_process_path(raw.pid, MAX_EXEC_PATH) else {
            return;
        };

        let family = Family::from_raw(raw.family);
        if !family.is_supported() {
            log::trace!("{}: unsupported family {family}", raw.point);
            return;
        }

        let Some(kind) = classify(raw) else {
            log::trace!("{}: ignoring protocol {}", raw.point, raw.protocol);
            return;
        };
        if let Some(armed) = &self.armed {
            if raw.point == AttachPoint::Release && !armed.contains(kind) {
                return;
            }
        }

        let Some((source, destination)) = raw.hosts() else {
            return;
        };

        if self
            .whitelist
            .is_match(&path, family, Some(destination.ip), destination.port)
        {
            log::trace!("{path} is whitelisted");
            return;
        }

        let (action, protocol) = describe(kind);
        self.sink.record(NetworkEvent {
            action,
            protocol,
            family,
            source,
            destination,
            path,
            pid: raw.pid,
        });
    }
}

/// Logical probe which produced the event, `None` if the socket is not
/// relevant for the attach point.
fn classify(raw: &RawSocketEvent) -> Option<ProbeKind> {
    let protocol = Protocol::from_raw(raw.protocol)?;
    match (raw.point, protocol) {
        (AttachPoint::StreamConnect, Protocol::Tcp) => Some(ProbeKind::TcpConnect),
        (AttachPoint::Accept, Protocol::Tcp) => Some(ProbeKind::TcpAccept),
        (AttachPoint::DgramConnect, Protocol::Udp) => Some(ProbeKind::UdpConnect),
        (AttachPoint::Bind, Protocol::Udp) if raw.ret == 0 => Some(ProbeKind::UdpBind),
        (AttachPoint::Release, Protocol::Tcp) if raw.dport != 0 => Some(ProbeKind::TcpClose),
        (AttachPoint::Release, Protocol::Udp) if raw.sport != 0 => Some(ProbeKind::UdpClose),
        _ => None,
    }
}

fn describe(kind: ProbeKind) -> (Action, Protocol) {
    match kind {
        ProbeKind::TcpConnect => (Action::Connect, Protocol::Tcp),
        ProbeKind::TcpAccept => (Action::Accept, Protocol::Tcp),
        ProbeKind::TcpClose => (Action::Close, Protocol::Tcp),
        ProbeKind::UdpConnect => (Action::Connect, Protocol::Udp),
        ProbeKind::UdpBind => (Action::Bind, Protocol::Udp),
        ProbeKind::UdpClose => (Action::Close, Protocol::Udp),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        net::{Ipv4Addr, Ipv6Addr},
        sync::Mutex,
    };

    use netlog_core::Host;
    use probe_common::{ProbeRegistry, ProbeSet, test_utils::MockPort};
    use tokio::sync::mpsc;

    use super::*;

    /// Resolver backed by a fixed pid table.
    #[derive(Default)]
    pub(crate) struct StaticResolver(pub(crate) HashMap<i32, String>);

    impl IdentityResolver for StaticResolver {
        fn resolve_process_path(&self, pid: i32, max_length: usize) -> Option<String> {
            self.0
                .get(&pid)
                .filter(|path| path.len() <= max_length)
                .cloned()
        }
    }

    #[derive(Default)]
    struct VecSink(Mutex<Vec<NetworkEvent>>);

    impl EventSink for VecSink {
        fn record(&self, event: NetworkEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl VecSink {
        fn take(&self) -> Vec<NetworkEvent> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    const AF_INET: u16 = 2;
    const AF_INET6: u16 = 10;
    const AF_UNIX: u16 = 1;
    const TCP: u16 = 6;
    const UDP: u16 = 17;

    pub(crate) fn raw(point: AttachPoint, family: u16, protocol: u16) -> RawSocketEvent {
        RawSocketEvent {
            point,
            pid: 100,
            family,
            protocol,
            sport: 40000,
            dport: 22,
            saddr: Ipv4Addr::new(10, 0, 0, 2),
            daddr: Ipv4Addr::new(10, 0, 0, 1),
            saddr6: Ipv6Addr::LOCALHOST,
            daddr6: "fe80::1".parse().unwrap(),
            ret: 0,
        }
    }

    fn dispatcher() -> EventDispatcher<StaticResolver, Arc<VecSink>> {
        let resolver = StaticResolver(HashMap::from([(100, "/usr/bin/ssh".to_string())]));
        EventDispatcher::new(
            resolver,
            Arc::new(WhitelistTable::new()),
            Arc::new(VecSink::default()),
        )
    }

    #[test]
    fn tcp_connect() {
        let dispatcher = dispatcher();
        dispatcher.on_socket_event(&raw(AttachPoint::StreamConnect, AF_INET, TCP));
        assert_eq!(
            dispatcher.sink.take(),
            vec![NetworkEvent {
                action: Action::Connect,
                protocol: Protocol::Tcp,
                family: Family::Inet,
                source: Host {
                    ip: Ipv4Addr::new(10, 0, 0, 2).into(),
                    port: 40000
                },
                destination: Host {
                    ip: Ipv4Addr::new(10, 0, 0, 1).into(),
                    port: 22
                },
                path: "/usr/bin/ssh".to_string(),
                pid: 100,
            }]
        );
    }

    #[test]
    fn ipv6_hosts() {
        let dispatcher = dispatcher();
        dispatcher.on_socket_event(&raw(AttachPoint::Accept, AF_INET6, TCP));
        let events = dispatcher.sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, Action::Accept);
        assert_eq!(events[0].family, Family::Inet6);
        assert_eq!(events[0].source.ip, Ipv6Addr::LOCALHOST);
        assert_eq!(events[0].destination.to_string(), "[fe80::1]:22");
    }

    #[test]
    fn unsupported_family_is_dropped() {
        let dispatcher = dispatcher();
        for point in [AttachPoint::StreamConnect, AttachPoint::Release] {
            dispatcher.on_socket_event(&raw(point, AF_UNIX, TCP));
        }
        assert!(dispatcher.sink.take().is_empty());
    }

    #[test]
    fn unresolved_process_is_dropped() {
        let dispatcher = dispatcher();
        let mut event = raw(AttachPoint::StreamConnect, AF_INET, TCP);
        event.pid = 101;
        dispatcher.on_socket_event(&event);
        assert!(dispatcher.sink.take().is_empty());
    }

    #[test]
    fn protocol_must_match_point() {
        let dispatcher = dispatcher();
        dispatcher.on_socket_event(&raw(AttachPoint::StreamConnect, AF_INET, UDP));
        dispatcher.on_socket_event(&raw(AttachPoint::DgramConnect, AF_INET, TCP));
        dispatcher.on_socket_event(&raw(AttachPoint::Bind, AF_INET, TCP));
        dispatcher.on_socket_event(&raw(AttachPoint::Accept, AF_INET, 1));
        assert!(dispatcher.sink.take().is_empty());

        dispatcher.on_socket_event(&raw(AttachPoint::DgramConnect, AF_INET, UDP));
        dispatcher.on_socket_event(&raw(AttachPoint::Bind, AF_INET, UDP));
        let actions: Vec<_> = dispatcher
            .sink
            .take()
            .into_iter()
            .map(|e| (e.action, e.protocol))
            .collect();
        assert_eq!(
            actions,
            vec![
                (Action::Connect, Protocol::Udp),
                (Action::Bind, Protocol::Udp)
            ]
        );
    }

    #[test]
    fn failed_bind_is_dropped() {
        let dispatcher = dispatcher();
        let mut failed = raw(AttachPoint::Bind, AF_INET, UDP);
        // EADDRINUSE
        failed.ret = -98;
        dispatcher.on_socket_event(&failed);
        assert!(dispatcher.sink.take().is_empty());

        let mut bound = raw(AttachPoint::Bind, AF_INET6, UDP);
        bound.sport = 5353;
        dispatcher.on_socket_event(&bound);
        let events = dispatcher.sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].action, events[0].source.port), (Action::Bind, 5353));
    }

    #[test]
    fn close_needs_a_port() {
        let dispatcher = dispatcher();
        let mut tcp = raw(AttachPoint::Release, AF_INET, TCP);
        tcp.dport = 0;
        let mut udp = raw(AttachPoint::Release, AF_INET, UDP);
        udp.sport = 0;
        dispatcher.on_socket_event(&tcp);
        dispatcher.on_socket_event(&udp);
        assert!(dispatcher.sink.take().is_empty());
    }

    #[test]
    fn close_gated_by_armed_probes() {
        let registry = ProbeRegistry::new(MockPort::new());
        registry
            .reconcile(ProbeSet::from(ProbeKind::TcpClose))
            .unwrap();
        let dispatcher = dispatcher().with_armed_probes(registry.armed());

        dispatcher.on_socket_event(&raw(AttachPoint::Release, AF_INET, TCP));
        dispatcher.on_socket_event(&raw(AttachPoint::Release, AF_INET, UDP));
        let events = dispatcher.sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].protocol, Protocol::Tcp);

        registry.set_probe(ProbeKind::UdpClose, true).unwrap();
        registry.set_probe(ProbeKind::TcpClose, false).unwrap();
        dispatcher.on_socket_event(&raw(AttachPoint::Release, AF_INET, TCP));
        dispatcher.on_socket_event(&raw(AttachPoint::Release, AF_INET, UDP));
        let events = dispatcher.sink.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].protocol, Protocol::Udp);
    }

    #[test]
    fn whitelisted_destination() {
        let dispatcher = dispatcher();
        dispatcher
            .whitelist()
            .rebuild_from_entries(&["/usr/bin/ssh@10.0.0.1:22"]);
        dispatcher.on_socket_event(&raw(AttachPoint::StreamConnect, AF_INET, TCP));
        assert!(dispatcher.sink.take().is_empty());

        // same process, other destination
        let mut other = raw(AttachPoint::StreamConnect, AF_INET, TCP);
        other.dport = 2222;
        dispatcher.on_socket_event(&other);
        assert_eq!(dispatcher.sink.take().len(), 1);

        dispatcher.whitelist().rebuild_from_entries(&["/usr/bin/ssh"]);
        dispatcher.on_socket_event(&other);
        assert!(dispatcher.sink.take().is_empty());
    }

    #[test]
    fn channel_sink() {
        let (tx, mut rx) = mpsc::channel(4);
        let resolver = StaticResolver(HashMap::from([(100, "/usr/bin/ssh".to_string())]));
        let dispatcher = EventDispatcher::new(resolver, Arc::new(WhitelistTable::new()), tx);
        dispatcher.on_socket_event(&raw(AttachPoint::Release, AF_INET, UDP));
        let event = rx.try_recv().unwrap();
        assert_eq!((event.action, event.protocol), (Action::Close, Protocol::Udp));
    }
}
