//! Types shared by every netlog crate: the event model handed to log sinks
//! and the per-section configuration reader.

pub mod config;
pub mod event;
pub mod sink;

pub use config::{ConfigError, ModuleConfig};
pub use event::{Action, Family, Host, NetworkEvent, Protocol};
pub use sink::EventSink;
