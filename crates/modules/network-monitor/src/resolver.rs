use std::{fs, path::PathBuf};

/// Maps a process to the path of its executable.
pub trait IdentityResolver: Send + Sync {
    /// `None` when the process is gone or its path is longer than
    /// `max_length` bytes.
    fn resolve_process_path(&self, pid: i32, max_length: usize) -> Option<String>;
}

/// Reads the `exe` link of procfs.
pub struct ProcfsResolver {
    root: PathBuf,
}

impl Default for ProcfsResolver {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcfsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl IdentityResolver for ProcfsResolver {
    fn resolve_process_path(&self, pid: i32, max_length: usize) -> Option<String> {
        let link = self.root.join(pid.to_string()).join("exe");
        let path = match fs::read_link(&link) {
            Ok(path) => path,
            Err(err) => {
                log::trace!("reading {}: {err}", link.display());
                return None;
            }
        };
        let path = path.into_os_string().into_string().ok()?;
        (path.len() <= max_length).then_some(path)
    }
}
