//! [`TracefsPort`] installs attach points as tracefs dynamic events.
//!
//! Attaching a point appends its definition to `kprobe_events` and enables
//! `events/netlog/<point>`. Hits are then readable from `trace_pipe`, see
//! [`crate::trace_pipe`].

use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use strum::IntoEnumIterator;

use crate::{
    attach::{AttachError, AttachPoint, InstrumentationPort, ProbeType},
    log_error,
};

const TRACEFS_PATHS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];
const KPROBE_EVENTS: &str = "kprobe_events";

/// Group of every dynamic event created by netlog.
pub const EVENT_GROUP: &str = "netlog";

pub struct TracefsPort {
    root: PathBuf,
}

impl TracefsPort {
    /// Use the given tracefs mount point, or look for the usual ones.
    pub fn new(root: Option<PathBuf>) -> Result<Self, AttachError> {
        let root = match root {
            Some(root) => root,
            None => TRACEFS_PATHS
                .iter()
                .map(PathBuf::from)
                .find(|path| path.join(KPROBE_EVENTS).exists())
                .ok_or(AttachError::TracefsNotFound)?,
        };
        log::debug!("Using tracefs at {}", root.display());
        Ok(Self { root })
    }

    pub fn trace_pipe(&self) -> PathBuf {
        self.root.join("trace_pipe")
    }

    /// Remove events left behind by a previous run which didn't shut down.
    /// Defining an existing event again would fail.
    pub fn clear_stale(&mut self) {
        for point in AttachPoint::iter() {
            if self.event_dir(point).exists() {
                log::warn!("Removing stale {EVENT_GROUP}/{point} event");
                self.detach(point);
            }
        }
    }

    fn event_dir(&self, point: AttachPoint) -> PathBuf {
        self.root.join("events").join(EVENT_GROUP).join(point.to_string())
    }

    fn write(&self, path: &Path, line: &str, append: bool) -> Result<(), AttachError> {
        let map_err = |source| AttachError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(map_err)?;
        file.write_all(format!("{line}\n").as_bytes())
            .map_err(map_err)
    }

    fn kprobe_events(&self, line: &str) -> Result<(), AttachError> {
        self.write(&self.root.join(KPROBE_EVENTS), line, true)
    }

    fn enable(&self, point: AttachPoint, enabled: bool) -> Result<(), AttachError> {
        let value = if enabled { "1" } else { "0" };
        self.write(&self.event_dir(point).join("enable"), value, false)
    }
}

/// Definition line written to `kprobe_events`.
pub fn definition(point: AttachPoint) -> String {
    let prefix = match point.probe_type() {
        ProbeType::Kprobe => "p",
        ProbeType::Kretprobe => "r",
    };
    format!(
        "{prefix}:{EVENT_GROUP}/{point} {} {}",
        point.symbol(),
        point.fetch_args()
    )
}

impl InstrumentationPort for TracefsPort {
    fn attach(&mut self, point: AttachPoint) -> Result<(), AttachError> {
        self.kprobe_events(&definition(point))?;
        if let Err(err) = self.enable(point, true) {
            // don't leave a defined but disabled event around
            if let Err(remove_err) = self.kprobe_events(&format!("-:{EVENT_GROUP}/{point}")) {
                log_error("Removing event after failed enable", remove_err);
            }
            return Err(err);
        }
        Ok(())
    }

    fn detach(&mut self, point: AttachPoint) {
        if let Err(err) = self.enable(point, false) {
            log_error(&format!("Disabling {point}"), err);
        }
        if let Err(err) = self.kprobe_events(&format!("-:{EVENT_GROUP}/{point}")) {
            log_error(&format!("Removing {point}"), err);
        }
    }
}
