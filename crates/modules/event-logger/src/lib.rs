use std::{
    env,
    fs::File,
    io,
    os::{
        fd::AsFd,
        unix::{fs::MetadataExt, net::UnixDatagram},
    },
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, SecondsFormat, Utc};
use netlog_core::{ConfigError, EventSink, ModuleConfig, NetworkEvent};
use tokio::sync::{mpsc, watch};

const UNIX_SOCK_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];

/// Write every event received on `receiver` until the channel is closed.
/// A new [`Config`] on `config` replaces the logger.
pub async fn logger_task(
    receiver: mpsc::Receiver<NetworkEvent>,
    config: watch::Receiver<Config>,
) {
    run_logger(receiver, config, Logger::from_config).await
}

async fn run_logger<B>(
    mut receiver: mpsc::Receiver<NetworkEvent>,
    mut config: watch::Receiver<Config>,
    build: B,
) where
    B: Fn(&Config) -> Logger,
{
    let mut logger = build(&config.borrow_and_update());
    let mut config_open = true;

    loop {
        tokio::select! {
            // a configuration change applies to the events queued after it
            biased;
            changed = config.changed(), if config_open => match changed {
                Ok(()) => logger = build(&config.borrow_and_update()),
                // keep the last configuration
                Err(_) => config_open = false,
            },
            msg = receiver.recv() => match msg {
                Some(event) => logger.record(event),
                None => return,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub console: bool,
    pub syslog: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: true,
            syslog: false,
        }
    }
}

impl TryFrom<&ModuleConfig> for Config {
    type Error = ConfigError;

    fn try_from(config: &ModuleConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            console: config.with_default("console", true)?,
            syslog: config.with_default("syslog", false)?,
        })
    }
}

/// Writes events to standard output and syslog.
#[derive(Debug)]
pub struct Logger {
    console: bool,
    syslog: Mutex<Option<UnixDatagram>>,
}

impl Logger {
    /// Syslog is skipped when standard error already goes to the journal.
    pub fn from_config(config: &Config) -> Self {
        let Config { console, syslog } = *config;

        let connected_to_journal = io::stderr()
            .as_fd()
            .try_clone_to_owned()
            .and_then(|fd| File::from(fd).metadata())
            .map(|meta| format!("{}:{}", meta.dev(), meta.ino()))
            .ok()
            .and_then(|stderr| {
                env::var_os("JOURNAL_STREAM").map(|s| s.to_string_lossy() == stderr.as_str())
            })
            .unwrap_or(false);

        let opt_sock = (syslog && !connected_to_journal)
            .then(|| {
                let sock = UnixDatagram::unbound().ok()?;
                UNIX_SOCK_PATHS
                    .iter()
                    .find_map(|path| sock.connect(path).ok())
                    .map(|_| sock)
            })
            .flatten();

        if syslog && !connected_to_journal && opt_sock.is_none() {
            log::warn!("Failed to connect to syslog");
        }

        Self::new(console, opt_sock)
    }

    pub fn new(console: bool, syslog: Option<UnixDatagram>) -> Self {
        Self {
            console,
            syslog: Mutex::new(syslog),
        }
    }

    pub fn syslog_enabled(&self) -> bool {
        self.syslog
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl EventSink for Logger {
    fn record(&self, event: NetworkEvent) {
        let line = format_event(&event, Utc::now());
        if self.console {
            println!("{line}");
        }

        let mut syslog = self.syslog.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sock) = syslog.as_ref() {
            if let Err(e) = sock.send(line.as_bytes()) {
                log::warn!("Writing to syslog failed: {e}");
                *syslog = None;
            }
        }
    }
}

/// `[<time> NETLOG <path> (<pid>)] <action> <protocol> <family> <source> -> <destination>`
pub fn format_event(event: &NetworkEvent, time: DateTime<Utc>) -> String {
    format!(
        "[{} NETLOG {} ({})] {}",
        time.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.path,
        event.pid,
        event
    )
}
