use std::{
    collections::HashMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use netlog_core::{ConfigError, ModuleConfig};
use probe_common::{InstrumentationPort, ProbeKind, ProbeSet};
use strum::IntoEnumIterator;

use crate::params::{Parameters, parse_switch};

const DEFAULT_CONFIG_FILE: &str = "/etc/netlog/netlog.ini";

/// Section with the probes and whitelist settings.
pub const NETLOG_SECTION: &str = "netlog";
pub const TRACEFS_SECTION: &str = "tracefs";
pub const LOGGER_SECTION: &str = "logger";

/// Content of the netlog `INI` configuration file, one [`ModuleConfig`] per
/// section.
#[derive(Debug, Clone)]
pub struct NetlogConfig {
    config_file: PathBuf,
    sections: HashMap<String, ModuleConfig>,
}

impl NetlogConfig {
    /// Construct a new [`NetlogConfig`] using the default file, which is
    /// created empty if missing.
    pub fn new() -> Result<Self> {
        let config_file = PathBuf::from(DEFAULT_CONFIG_FILE);
        if !config_file.exists() {
            if let Some(prefix) = config_file.parent() {
                fs::create_dir_all(prefix)
                    .with_context(|| format!("Error creating {}", prefix.display()))?;
            }
            File::create(&config_file)
                .with_context(|| format!("Error creating {}", config_file.display()))?;
        }
        Self::from_config_file(config_file)
    }

    /// Construct a new [`NetlogConfig`] using a custom file.
    pub fn with_custom_file(config_file: &str) -> Result<Self> {
        let config_file = PathBuf::from(config_file);
        if !config_file.exists() {
            bail!("Configuration file {} not found", config_file.display());
        }
        Self::from_config_file(config_file)
    }

    fn from_config_file(config_file: PathBuf) -> Result<Self> {
        let mut sections: HashMap<String, ModuleConfig> = HashMap::new();

        let conf = ini::Ini::load_from_file(&config_file)
            .with_context(|| format!("Error loading configuration from {config_file:?}"))?;

        for (section, prop) in &conf {
            if let Some(section) = section {
                let section_config = sections.entry(section.to_string()).or_default();
                for (key, value) in prop.iter() {
                    log::debug!("{}.{}={}", section, key, value);
                    section_config.insert(key.to_string(), value.to_string());
                }
            }
        }

        Ok(Self {
            config_file,
            sections,
        })
    }

    /// Read the file again.
    pub fn reload(&self) -> Result<Self> {
        Self::from_config_file(self.config_file.clone())
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Get a section, empty if missing.
    pub fn section(&self, name: &str) -> ModuleConfig {
        self.sections.get(name).cloned().unwrap_or_default()
    }
}

/// Settings of the `[netlog]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbesConfig {
    /// Probes to arm, after the per-probe switches
    pub probes: ProbeSet,
    pub whitelist: whitelist::Config,
}

impl TryFrom<&ModuleConfig> for ProbesConfig {
    type Error = ConfigError;

    fn try_from(config: &ModuleConfig) -> Result<Self, Self::Error> {
        let mut probes = config.with_default("probes", ProbeSet::ALL)?;
        for kind in ProbeKind::iter() {
            let name: &'static str = kind.into();
            let Some(value) = config.get_raw(name) else {
                continue;
            };
            match parse_switch(value) {
                Ok(true) => probes.insert(kind),
                Ok(false) => probes.remove(kind),
                Err(err) => {
                    return Err(ConfigError::InvalidValue {
                        field: name.to_string(),
                        value: value.to_string(),
                        err: err.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            probes,
            whitelist: whitelist::Config::try_from(config)?,
        })
    }
}

impl ProbesConfig {
    /// Replace the whitelist, then arm exactly the configured probes.
    pub fn apply<P: InstrumentationPort>(&self, params: &Parameters<P>) -> Result<()> {
        let accepted = self.whitelist.apply(params.whitelist());
        log::info!("Whitelist loaded with {accepted} entries");
        params
            .registry()
            .reconcile(self.probes)
            .with_context(|| format!("Error arming probes {}", self.probes))?;
        log::info!("Armed probes: {:?}", params.registry().query());
        Ok(())
    }
}

/// Tracefs mount point, autodetected if missing.
pub fn tracefs_path(config: &ModuleConfig) -> Result<Option<PathBuf>, ConfigError> {
    config.optional("path")
}

#[cfg(test)]
mod tests {
    use std::{io::Write, sync::Arc};

    use netlog_core::Family;
    use probe_common::{AttachPoint, ProbeRegistry, test_utils::MockPort};
    use whitelist::WhitelistTable;

    use super::*;

    fn write_config(content: &str) -> (tempfile::NamedTempFile, NetlogConfig) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let config = NetlogConfig::with_custom_file(&path).unwrap();
        (file, config)
    }

    #[test]
    fn sections() {
        let (_file, config) = write_config(
            "[netlog]\nprobes = 5\nwhitelist = /usr/sbin/sshd\n\
             [tracefs]\npath = /mnt/tracing\n\
             [logger]\nconsole = false\n",
        );
        let netlog = ProbesConfig::try_from(&config.section(NETLOG_SECTION)).unwrap();
        assert_eq!(netlog.probes.bits(), 0x5);
        assert_eq!(netlog.whitelist.whitelist, "/usr/sbin/sshd");
        assert_eq!(
            tracefs_path(&config.section(TRACEFS_SECTION)).unwrap(),
            Some(PathBuf::from("/mnt/tracing"))
        );
        let logger = event_logger::Config::try_from(&config.section(LOGGER_SECTION)).unwrap();
        assert!(!logger.console);
    }

    #[test]
    fn defaults() {
        let (_file, config) = write_config("");
        let netlog = ProbesConfig::try_from(&config.section(NETLOG_SECTION)).unwrap();
        assert_eq!(netlog.probes, ProbeSet::ALL);
        assert_eq!(netlog.whitelist, whitelist::Config::default());
        assert_eq!(tracefs_path(&config.section(TRACEFS_SECTION)).unwrap(), None);
    }

    #[test]
    fn per_probe_switches() {
        let (_file, config) =
            write_config("[netlog]\nprobes = 3\ntcp_accept = 0\nudp_bind = y\n");
        let netlog = ProbesConfig::try_from(&config.section(NETLOG_SECTION)).unwrap();
        assert_eq!(netlog.probes.bits(), 0x11);

        let (_file, config) = write_config("[netlog]\nudp_close = maybe\n");
        let err = ProbesConfig::try_from(&config.section(NETLOG_SECTION)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "udp_close"));
    }

    #[test]
    fn invalid_probes() {
        let (_file, config) = write_config("[netlog]\nprobes = 80\n");
        assert!(ProbesConfig::try_from(&config.section(NETLOG_SECTION)).is_err());
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netlog.ini");
        assert!(NetlogConfig::with_custom_file(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn apply_and_reload() {
        let (file, config) =
            write_config("[netlog]\nprobes = 4\nwhitelist = /bin/a|/bin/b\nwhitelist_delimiter = |\n");
        let port = MockPort::new();
        let params = Parameters::new(
            Arc::new(ProbeRegistry::new(port.clone())),
            Arc::new(WhitelistTable::new()),
        );
        ProbesConfig::try_from(&config.section(NETLOG_SECTION))
            .unwrap()
            .apply(&params)
            .unwrap();
        assert_eq!(params.probes(), "4");
        assert!(params.is_whitelisted("/bin/b", Family::Inet, None, 0));

        std::fs::write(file.path(), "[netlog]\nprobes = 1\n").unwrap();
        let config = config.reload().unwrap();
        ProbesConfig::try_from(&config.section(NETLOG_SECTION))
            .unwrap()
            .apply(&params)
            .unwrap();
        assert_eq!(params.probes(), "1");
        assert!(!port.is_attached(AttachPoint::Release));
        assert!(params.whitelist().is_empty());
    }
}
