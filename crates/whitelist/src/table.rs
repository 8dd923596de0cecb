use std::{
    net::IpAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use netlog_core::Family;

use crate::entry::WhitelistEntry;

pub const DEFAULT_DELIMITER: char = ',';

/// One immutable version of the table.
struct Generation {
    entries: Arc<[WhitelistEntry]>,
    delimiter: char,
}

/// Executables whose network activity is not logged.
///
/// Rebuilds replace the whole entry list: a query works on the generation
/// that was published when it started and never sees a partial rebuild.
/// The lock is only held to swap or clone the generation pointer, matching
/// happens outside of it.
pub struct WhitelistTable {
    current: Mutex<Generation>,
}

impl Default for WhitelistTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WhitelistTable {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Generation {
                entries: Arc::from(Vec::new()),
                delimiter: DEFAULT_DELIMITER,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Generation> {
        // A generation is always whole, so a poisoned lock is still consistent.
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> (Arc<[WhitelistEntry]>, char) {
        let current = self.lock();
        (current.entries.clone(), current.delimiter)
    }

    /// Replace the table with the valid `entries`. Invalid ones are skipped.
    /// Returns the number of entries in the new table.
    ///
    /// Whitespace around each entry is ignored. Entries containing the
    /// current delimiter are rejected, they couldn't be told apart in
    /// [`WhitelistTable::dump`].
    pub fn rebuild_from_entries<S: AsRef<str>>(&self, entries: &[S]) -> usize {
        loop {
            let (_, delimiter) = self.snapshot();
            let parsed = parse_entries(entries.iter().map(|entry| entry.as_ref()), delimiter);
            let mut current = self.lock();
            // a delimited rebuild may have switched the delimiter meanwhile
            if current.delimiter == delimiter {
                return publish(&mut current, parsed);
            }
        }
    }

    /// Split `text` on `delimiter` and replace the table with the resulting
    /// entries. Whitespace around each item is ignored, as are empty items.
    /// The delimiter is remembered and used by [`WhitelistTable::dump`].
    pub fn rebuild_from_delimited_string(&self, text: &str, delimiter: char) -> usize {
        let parsed = parse_entries(
            text.split(delimiter).filter(|item| !item.trim().is_empty()),
            delimiter,
        );
        let mut current = self.lock();
        current.delimiter = delimiter;
        publish(&mut current, parsed)
    }

    /// Entries joined by the last used delimiter, cut to at most `capacity`
    /// bytes.
    pub fn dump(&self, capacity: usize) -> String {
        let (entries, delimiter) = self.snapshot();
        let mut dump = entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(&delimiter.to_string());
        if dump.len() > capacity {
            let mut end = capacity;
            while !dump.is_char_boundary(end) {
                end -= 1;
            }
            dump.truncate(end);
        }
        dump
    }

    /// Write [`WhitelistTable::dump`] into `buf`, returning the bytes written.
    pub fn dump_into(&self, buf: &mut [u8]) -> usize {
        let dump = self.dump(buf.len());
        buf[..dump.len()].copy_from_slice(dump.as_bytes());
        dump.len()
    }

    /// Check if an executable talking to `address`:`port` is whitelisted.
    /// Nothing is whitelisted by an empty table.
    pub fn is_match(&self, path: &str, family: Family, address: Option<IpAddr>, port: u16) -> bool {
        let (entries, _) = self.snapshot();
        entries
            .iter()
            .any(|entry| entry.matches(path, family, address, port))
    }

    /// Drop every entry.
    pub fn destroy(&self) {
        self.lock().entries = Arc::from(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Arc<[WhitelistEntry]> {
        self.snapshot().0
    }
}

fn publish(current: &mut Generation, entries: Vec<WhitelistEntry>) -> usize {
    let len = entries.len();
    current.entries = Arc::from(entries);
    log::debug!("Whitelist has {len} entries");
    len
}

fn parse_entries<'a>(items: impl Iterator<Item = &'a str>, delimiter: char) -> Vec<WhitelistEntry> {
    items
        .map(str::trim)
        .filter_map(|item| {
            if item.contains(delimiter) {
                log::warn!("Ignoring whitelist entry {item:?}: contains the delimiter {delimiter:?}");
                return None;
            }
            match item.parse::<WhitelistEntry>() {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Ignoring whitelist entry {item:?}: {err}");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
    };

    use super::*;
    use crate::entry::MAX_EXEC_PATH;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn default_deny() {
        let table = WhitelistTable::new();
        assert!(table.is_empty());
        assert!(!table.is_match("/usr/sbin/sshd", Family::Inet, ip("10.0.0.1"), 22));
        assert!(!table.is_match("", Family::Inet6, None, 0));
        assert_eq!(table.dump(100), "");
    }

    #[test]
    fn exact_match_only() {
        let table = WhitelistTable::new();
        table.rebuild_from_entries(&["/usr/sbin/sshd"]);
        assert!(table.is_match("/usr/sbin/sshd", Family::Inet, ip("10.0.0.1"), 22));
        assert!(!table.is_match("/usr/sbin/sshd-extra", Family::Inet, ip("10.0.0.1"), 22));
        assert!(!table.is_match("/usr/sbin", Family::Inet, ip("10.0.0.1"), 22));
    }

    #[test]
    fn delimited_string() {
        let table = WhitelistTable::new();
        let len = table.rebuild_from_delimited_string(" /bin/a ;;/bin/b@*:53; ", ';');
        assert_eq!(len, 2);
        assert_eq!(table.dump(100), "/bin/a;/bin/b@*:53");
        assert!(table.is_match("/bin/a", Family::Inet, ip("1.1.1.1"), 80));
        assert!(table.is_match("/bin/b", Family::Inet6, ip("::1"), 53));
        assert!(!table.is_match("/bin/b", Family::Inet6, ip("::1"), 54));
    }

    #[test]
    fn entries_keep_last_delimiter() {
        let table = WhitelistTable::new();
        table.rebuild_from_delimited_string("/bin/a:/bin/b", ':');
        table.rebuild_from_entries(&["/bin/c", "/bin/d"]);
        assert_eq!(table.dump(100), "/bin/c:/bin/d");
    }

    #[test]
    fn round_trip() {
        let source = WhitelistTable::new();
        source.rebuild_from_entries(&[
            "/usr/sbin/sshd",
            " /opt/tool ",
            "/usr/sbin/ntpd@10.0.0.1:123",
            "/usr/bin/dig@[::1]:53",
            "/usr/bin/curl@*:443",
        ]);
        let dump = source.dump(4096);

        let copy = WhitelistTable::new();
        copy.rebuild_from_delimited_string(&dump, DEFAULT_DELIMITER);
        assert_eq!(copy.entries(), source.entries());

        let probes = [
            ("/usr/sbin/sshd", Family::Inet, ip("10.0.0.9"), 22),
            ("/opt/tool", Family::Inet, ip("10.0.0.9"), 22),
            (" /opt/tool ", Family::Inet, ip("10.0.0.9"), 22),
            ("/usr/sbin/ntpd", Family::Inet, ip("10.0.0.1"), 123),
            ("/usr/sbin/ntpd", Family::Inet, ip("10.0.0.2"), 123),
            ("/usr/bin/dig", Family::Inet6, ip("::1"), 53),
            ("/usr/bin/dig", Family::Inet, ip("127.0.0.1"), 53),
            ("/usr/bin/curl", Family::Inet, ip("1.2.3.4"), 443),
            ("/usr/bin/curl", Family::Inet, ip("1.2.3.4"), 80),
            ("/usr/bin/wget", Family::Inet, ip("1.2.3.4"), 443),
        ];
        for (path, family, address, port) in probes {
            assert_eq!(
                copy.is_match(path, family, address, port),
                source.is_match(path, family, address, port),
                "{path} {address:?}:{port}"
            );
        }
    }

    #[test]
    fn dump_truncation() {
        let table = WhitelistTable::new();
        table.rebuild_from_entries(&["/bin/a", "/bin/b"]);
        assert_eq!(table.dump(8), "/bin/a,/");
        assert_eq!(table.dump(0), "");

        table.rebuild_from_entries(&["/bin/é"]);
        // the two byte character doesn't fit
        assert_eq!(table.dump(6), "/bin/");

        let mut buf = [0u8; 4];
        assert_eq!(table.dump_into(&mut buf), 4);
        assert_eq!(&buf, b"/bin");
        let mut buf = [0u8; 32];
        let written = table.dump_into(&mut buf);
        assert_eq!(&buf[..written], "/bin/é".as_bytes());
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let table = WhitelistTable::new();
        let too_long = format!("/{}", "x".repeat(MAX_EXEC_PATH));
        let len = table.rebuild_from_entries(&["", "/bin/\0nul", too_long.as_str(), "/bin/ok"]);
        assert_eq!(len, 1);
        assert_eq!(table.dump(1024), "/bin/ok");
        assert!(!table.is_match(&too_long, Family::Inet, None, 0));
        assert!(!table.is_match(&too_long[..MAX_EXEC_PATH], Family::Inet, None, 0));
    }

    #[test]
    fn delimiter_in_entry() {
        let table = WhitelistTable::new();
        assert_eq!(table.rebuild_from_entries(&["/opt/a,b", "/bin/c"]), 1);
        assert_eq!(table.dump(100), "/bin/c");

        table.rebuild_from_delimited_string("/bin/c", ';');
        assert_eq!(table.rebuild_from_entries(&["/opt/a,b", "/bin/c;d"]), 1);
        assert_eq!(table.dump(100), "/opt/a,b");
    }

    #[test]
    fn surrounding_whitespace() {
        let table = WhitelistTable::new();
        assert_eq!(table.rebuild_from_entries(&["/opt/tool ", "  ", "\t/bin/a@*:53"]), 2);
        assert_eq!(table.dump(100), "/opt/tool,/bin/a@*:53");
        assert!(table.is_match("/opt/tool", Family::Inet, None, 0));
        assert!(!table.is_match("/opt/tool ", Family::Inet, None, 0));
    }

    #[test]
    fn destroy() {
        let table = WhitelistTable::new();
        table.rebuild_from_entries(&["/bin/a"]);
        table.destroy();
        assert!(table.is_empty());
        assert!(!table.is_match("/bin/a", Family::Inet, None, 0));
        table.rebuild_from_entries(&["/bin/b"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn concurrent_rebuild_isolation() {
        // Table A whitelists /bin/a only, table B /bin/b only. A reader must
        // always see exactly one of them.
        let table = Arc::new(WhitelistTable::new());
        table.rebuild_from_entries(&["/bin/a"]);
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let table = table.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    let entries = table.entries();
                    let a = entries
                        .iter()
                        .any(|e| e.matches("/bin/a", Family::Inet, None, 0));
                    let b = entries
                        .iter()
                        .any(|e| e.matches("/bin/b", Family::Inet, None, 0));
                    assert!(a != b, "torn generation");
                    assert!(
                        table.is_match("/bin/a", Family::Inet, None, 0)
                            || table.is_match("/bin/b", Family::Inet, None, 0)
                    );
                }
            })
        };

        for i in 0..2000 {
            if i % 2 == 0 {
                table.rebuild_from_entries(&["/bin/b"]);
            } else {
                table.rebuild_from_delimited_string("/bin/a", DEFAULT_DELIMITER);
            }
        }
        done.store(true, Ordering::Relaxed);
        reader.join().unwrap();
    }

    #[test]
    fn delimiter_switch_during_rebuild() {
        // No published generation may hold an entry containing its own
        // delimiter, whatever the interleaving of the two rebuilds.
        let table = Arc::new(WhitelistTable::new());
        let done = Arc::new(AtomicBool::new(false));

        let switcher = {
            let table = table.clone();
            let done = done.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    let delimiter = if i % 2 == 0 { ';' } else { ',' };
                    table.rebuild_from_delimited_string("/bin/x", delimiter);
                }
                done.store(true, Ordering::Relaxed);
            })
        };

        while !done.load(Ordering::Relaxed) {
            table.rebuild_from_entries(&["/opt/a,b", "/opt/c;d"]);
            let (entries, delimiter) = table.snapshot();
            for entry in entries.iter() {
                assert!(!entry.to_string().contains(delimiter), "{entry} with {delimiter:?}");
            }
        }
        switcher.join().unwrap();
    }
}
