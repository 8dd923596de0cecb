//! # Whitelist
//!
//! Deciding whether a network event is interesting for the rest of the
//! system or if it should be discarded.
//!
//! The administrator lists executables whose activity is not logged. Each
//! entry is the full path of an executable, optionally followed by
//! `@ENDPOINT` to whitelist it only when talking to that remote endpoint:
//!
//! - `/usr/sbin/sshd`
//! - `/usr/sbin/ntpd@10.0.0.1:123`
//! - `/usr/bin/dig@[::1]`
//! - `/usr/bin/curl@*:443`
//!
//! Paths are compared exactly: no prefix, wildcard or case folding. An empty
//! whitelist matches nothing, so by default everything is logged.
//!
//! # Implementation
//!
//! [`WhitelistTable`] is read once per event and rebuilt rarely. Each
//! rebuild parses a complete new list and publishes it with a single pointer
//! swap, readers keep using the list they started with.

pub mod config;
pub mod entry;
pub mod table;

pub use config::Config;
pub use entry::{EndpointConstraint, EntryError, MAX_EXEC_PATH, WhitelistEntry};
pub use table::{DEFAULT_DELIMITER, WhitelistTable};
