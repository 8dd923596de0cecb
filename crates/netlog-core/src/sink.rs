use tokio::sync::mpsc;

use crate::event::NetworkEvent;

/// Destination of the events which survived filtering.
///
/// Called once per event from the dispatching context: implementations must
/// not block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: NetworkEvent);
}

/// Queue events for a consumer task. Events are dropped when the queue is
/// full or closed.
impl EventSink for mpsc::Sender<NetworkEvent> {
    fn record(&self, event: NetworkEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!("Event queue full, dropping {event}");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                log::debug!("Event queue closed, dropping {event}");
            }
        }
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn record(&self, event: NetworkEvent) {
        (**self).record(event)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::event::{Action, Family, Host, Protocol};

    fn event(port: u16) -> NetworkEvent {
        let host = Host {
            ip: Ipv4Addr::LOCALHOST.into(),
            port,
        };
        NetworkEvent {
            action: Action::Bind,
            protocol: Protocol::Udp,
            family: Family::Inet,
            source: host,
            destination: host,
            path: "/usr/bin/nc".to_string(),
            pid: 42,
        }
    }

    #[test]
    fn channel_sink() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.record(event(1));
        // full: dropped
        tx.record(event(2));
        assert_eq!(rx.try_recv().unwrap().source.port, 1);
        assert!(rx.try_recv().is_err());

        drop(rx);
        tx.record(event(3));
    }
}
