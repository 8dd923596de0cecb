//! Turns the hits of the netlog attach points into [`NetworkEvent`]s.
//!
//! Every attach point records the socket it fired on (see
//! [`probe_common::AttachPoint::fetch_args`]). The hits are read from
//! `trace_pipe`, parsed into [`RawSocketEvent`]s and handed to the
//! [`EventDispatcher`], which decides if they are worth logging.
//!
//! # Connect
//! `inet_stream_connect` (TCP) and `inet_dgram_connect` (UDP) are probed on
//! return, when the destination address is set on the socket.
//!
//! # Accept
//! `inet_csk_accept` is probed on return: the new socket is the return value.
//!
//! # Bind
//! Only successful UDP binds are reported. `__sys_bind_socket` is probed on
//! return, so the local port is the one actually assigned, ephemeral ports
//! included. Implicit binds (`sendmsg` on an unbound socket) don't go
//! through it.
//!
//! # Close
//! `inet_release` is shared by TCP and UDP sockets. TCP sockets which never
//! got a peer and UDP sockets which were never bound are ignored.
//!
//! [`NetworkEvent`]: netlog_core::NetworkEvent

pub mod dispatcher;
pub mod pipeline;
pub mod raw;
pub mod resolver;
pub mod trace_event;

pub use dispatcher::EventDispatcher;
pub use raw::RawSocketEvent;
pub use resolver::{IdentityResolver, ProcfsResolver};
