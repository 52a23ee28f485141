//! Configuration file support for bandwidthd
//!
//! Loads and validates bandwidthd configuration from TOML files.
//! Default location: /etc/netd/bandwidthd.toml

use std::fs;
use std::path::{Path, PathBuf};

use netd_common::{shell, IptablesPaths, NetdError, NetdResult};
use serde::{Deserialize, Serialize};

use crate::quota::QUOTA_DIR;
use crate::types::{UidRange, SYSTEM_UID_RANGE};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/netd/bandwidthd.toml";

/// Packet-filter binary locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IptablesConfig {
    #[serde(default = "default_iptables")]
    pub iptables: String,

    #[serde(default = "default_ip6tables")]
    pub ip6tables: String,

    #[serde(default = "default_iptables_restore")]
    pub iptables_restore: String,

    #[serde(default = "default_ip6tables_restore")]
    pub ip6tables_restore: String,
}

/// Quota and app-list settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Directory of quota2 counter pseudo-files
    #[serde(default = "default_quota_dir")]
    pub quota_dir: PathBuf,

    /// UIDs exempted from the penalty path on a first-run enable
    #[serde(default = "default_system_uids")]
    pub system_uids: UidRange,
}

/// Line terminator of response messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// `\n`, for interactive and pipe use
    #[default]
    Newline,
    /// `\0`, as framed on the command socket
    Nul,
}

impl Delimiter {
    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Newline => b'\n',
            Delimiter::Nul => b'\0',
        }
    }
}

/// Daemon behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub delimiter: Delimiter,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Complete bandwidthd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthConfig {
    #[serde(default)]
    pub iptables: IptablesConfig,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

// Default functions
fn default_iptables() -> String {
    shell::IPTABLES_PATH.to_string()
}

fn default_ip6tables() -> String {
    shell::IP6TABLES_PATH.to_string()
}

fn default_iptables_restore() -> String {
    shell::IPTABLES_RESTORE_PATH.to_string()
}

fn default_ip6tables_restore() -> String {
    shell::IP6TABLES_RESTORE_PATH.to_string()
}

fn default_quota_dir() -> PathBuf {
    PathBuf::from(QUOTA_DIR)
}

fn default_system_uids() -> UidRange {
    SYSTEM_UID_RANGE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IptablesConfig {
    fn default() -> Self {
        Self {
            iptables: default_iptables(),
            ip6tables: default_ip6tables(),
            iptables_restore: default_iptables_restore(),
            ip6tables_restore: default_ip6tables_restore(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            quota_dir: default_quota_dir(),
            system_uids: default_system_uids(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            log_level: default_log_level(),
        }
    }
}

impl BandwidthConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> NetdResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                NetdError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "bandwidthd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(NetdError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> NetdResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Binary paths for the shell executor
    pub fn iptables_paths(&self) -> IptablesPaths {
        IptablesPaths {
            iptables: self.iptables.iptables.clone(),
            ip6tables: self.iptables.ip6tables.clone(),
            iptables_restore: self.iptables.iptables_restore.clone(),
            ip6tables_restore: self.iptables.ip6tables_restore.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> NetdResult<()> {
        let paths = [
            ("iptables", &self.iptables.iptables),
            ("ip6tables", &self.iptables.ip6tables),
            ("iptables_restore", &self.iptables.iptables_restore),
            ("ip6tables_restore", &self.iptables.ip6tables_restore),
        ];
        for (name, value) in paths {
            if value.trim().is_empty() {
                return Err(NetdError::Configuration(format!(
                    "{} path must not be empty",
                    name
                )));
            }
        }

        if self.quota.quota_dir.as_os_str().is_empty() {
            return Err(NetdError::Configuration(
                "quota_dir must not be empty".to_string(),
            ));
        }

        if !self.quota.system_uids.is_valid() {
            return Err(NetdError::Configuration(format!(
                "system_uids range {} is inverted",
                self.quota.system_uids
            )));
        }

        Ok(())
    }
}
