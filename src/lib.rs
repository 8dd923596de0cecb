//! Netlog keeps an audit trail of the network activity of every process on
//! the machine, except for the executables an administrator whitelisted.
//!
//! It is provided as a daemon, `netlogd`, that should be run as a service.
//!
//! ```sh
//! netlogd --config-file /etc/netlog/netlog.ini
//! ```
//!
//! Every connect, accept, bind and close of TCP and UDP sockets produces a
//! line like:
//!
//! ```text
//! [2024-05-01T12:30:00Z NETLOG /usr/bin/curl (1234)] CONNECT TCP IPv4 192.168.1.2:51000 -> 93.184.216.34:443
//! ```
//!
//! ## Components
//!
//! - [`probe_common::ProbeRegistry`] arms and disarms the probes on the
//!   kernel socket functions.
//! - [`whitelist::WhitelistTable`] holds the executables to ignore.
//! - [`network_monitor::EventDispatcher`] filters the probe hits and hands
//!   the remaining events to the [`event_logger`].
//!
//! Probes and whitelist are read and written at runtime through
//! [`params::Parameters`]. Sending `SIGHUP` to the daemon reloads its
//! configuration file.

pub mod cli;
pub mod netlogd;
pub mod params;
pub mod utils;

pub mod metadata {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Init logger. We log from info level and above.
/// If RUST_LOG is set, we assume the user wants to debug something
/// and use env_logger default behaviour.
pub fn init_logger(override_log_level: Option<log::LevelFilter>) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    } else {
        let level_filter = override_log_level.unwrap_or(log::LevelFilter::Info);

        env_logger::builder().filter_level(level_filter).init();
    }
}
