use netlog_core::{ConfigError, ModuleConfig};

use crate::table::{DEFAULT_DELIMITER, WhitelistTable};

/// Whitelist settings of the `[netlog]` configuration section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Entries separated by `delimiter`
    pub whitelist: String,
    pub delimiter: char,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            whitelist: String::new(),
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl Config {
    /// Replace the content of `table`.
    pub fn apply(&self, table: &WhitelistTable) -> usize {
        table.rebuild_from_delimited_string(&self.whitelist, self.delimiter)
    }
}

/// Extract Config from configuration file
impl TryFrom<&ModuleConfig> for Config {
    type Error = ConfigError;

    fn try_from(config: &ModuleConfig) -> Result<Self, Self::Error> {
        Ok(Config {
            whitelist: config.with_default("whitelist", String::new())?,
            delimiter: config.with_default("whitelist_delimiter", DEFAULT_DELIMITER)?,
        })
    }
}
