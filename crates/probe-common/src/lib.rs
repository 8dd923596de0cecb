//! Instrumentation of the socket lifecycle: logical [`ProbeKind`]s, the
//! physical [`AttachPoint`]s backing them and the [`ProbeRegistry`] which
//! keeps the two consistent.

pub mod attach;
pub mod probe;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod trace_pipe;
pub mod tracefs;

pub use attach::{AttachError, AttachPoint, InstrumentationPort, ProbeType};
pub use probe::{ProbeKind, ProbeSet, ProbeSetParseError};
pub use registry::{ArmedProbes, ProbeError, ProbeRegistry};
pub use tracefs::TracefsPort;

/// Utility function to pretty print an error with its sources.
///
/// We use this because by default Rust won't print the source of an error message,
/// making it much less useful. Instead of re-implementing that, we'll just use
/// anyhow as an error pretty-printer.
pub fn log_error<E: std::error::Error + Send + Sync + 'static>(msg: &str, err: E) {
    log::error!("{}: {:?}", msg, anyhow::Error::from(err));
}
