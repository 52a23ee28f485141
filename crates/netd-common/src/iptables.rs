//! iptables command and restore-transaction execution.
//!
//! Controllers never spawn iptables directly. They go through an
//! [`IptablesExecutor`], which runs either a single rule command or a
//! restore batch against one address family. Production code uses
//! [`ShellIptables`]; tests substitute a recording fake.

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::error::NetdResult;
use crate::shell::{self, quote_args, ExecResult};

/// One address family handled by the packet filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    /// `iptables` / `iptables-restore`.
    V4,
    /// `ip6tables` / `ip6tables-restore`.
    V6,
}

impl IpFamily {
    /// Human-readable family name.
    pub fn name(&self) -> &'static str {
        match self {
            IpFamily::V4 => "IPv4",
            IpFamily::V6 => "IPv6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of families a command is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IptablesTarget {
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
    /// IPv4 first, then IPv6.
    V4V6,
}

impl IptablesTarget {
    /// Families in the order commands are issued.
    pub fn families(&self) -> &'static [IpFamily] {
        match self {
            IptablesTarget::V4 => &[IpFamily::V4],
            IptablesTarget::V6 => &[IpFamily::V6],
            IptablesTarget::V4V6 => &[IpFamily::V4, IpFamily::V6],
        }
    }
}

/// Executes packet-filter commands for one address family at a time.
#[async_trait]
pub trait IptablesExecutor: Send + Sync {
    /// Runs a single rule command (e.g. `-F bw_costly_wlan0`).
    ///
    /// A non-zero exit is reported in the [`ExecResult`], not as an error;
    /// callers decide whether the failure is expected.
    async fn iptables(&self, family: IpFamily, args: &str) -> NetdResult<ExecResult>;

    /// Applies a restore batch. All tables in the batch are one invocation.
    async fn iptables_restore(&self, family: IpFamily, input: &str) -> NetdResult<()>;

    /// Applies a read-only restore batch (listing) and returns its stdout.
    async fn iptables_restore_output(&self, family: IpFamily, input: &str) -> NetdResult<String>;
}

/// Binary locations used by [`ShellIptables`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IptablesPaths {
    /// `iptables` binary.
    pub iptables: String,
    /// `ip6tables` binary.
    pub ip6tables: String,
    /// `iptables-restore` binary.
    pub iptables_restore: String,
    /// `ip6tables-restore` binary.
    pub ip6tables_restore: String,
}

impl Default for IptablesPaths {
    fn default() -> Self {
        Self {
            iptables: shell::IPTABLES_PATH.to_string(),
            ip6tables: shell::IP6TABLES_PATH.to_string(),
            iptables_restore: shell::IPTABLES_RESTORE_PATH.to_string(),
            ip6tables_restore: shell::IP6TABLES_RESTORE_PATH.to_string(),
        }
    }
}

/// Arguments passed to the restore binaries.
///
/// `--noflush` keeps chains not mentioned in the batch intact; `-w`
/// waits for the xtables lock instead of failing.
const RESTORE_ARGS: &[&str] = &["--noflush", "-w"];

/// [`IptablesExecutor`] that shells out to the system binaries.
#[derive(Debug, Clone, Default)]
pub struct ShellIptables {
    paths: IptablesPaths,
}

impl ShellIptables {
    /// Creates an executor using the given binary paths.
    pub fn new(paths: IptablesPaths) -> Self {
        Self { paths }
    }

    fn iptables_bin(&self, family: IpFamily) -> &str {
        match family {
            IpFamily::V4 => &self.paths.iptables,
            IpFamily::V6 => &self.paths.ip6tables,
        }
    }

    fn restore_bin(&self, family: IpFamily) -> &str {
        match family {
            IpFamily::V4 => &self.paths.iptables_restore,
            IpFamily::V6 => &self.paths.ip6tables_restore,
        }
    }

    async fn run_restore(&self, family: IpFamily, input: &str) -> NetdResult<String> {
        let bin = self.restore_bin(family);
        let result = shell::exec_with_input(bin, RESTORE_ARGS, input).await?;
        result.into_stdout(&format!("{} {}", bin, RESTORE_ARGS.join(" ")))
    }
}

#[async_trait]
impl IptablesExecutor for ShellIptables {
    async fn iptables(&self, family: IpFamily, args: &str) -> NetdResult<ExecResult> {
        let cmd = format!("{} -w {}", self.iptables_bin(family), quote_args(args));
        shell::exec(&cmd).await
    }

    async fn iptables_restore(&self, family: IpFamily, input: &str) -> NetdResult<()> {
        let output = self.run_restore(family, input).await?;
        if !output.trim().is_empty() {
            debug!(%family, output = %output.trim(), "Restore produced output");
        }
        Ok(())
    }

    async fn iptables_restore_output(&self, family: IpFamily, input: &str) -> NetdResult<String> {
        self.run_restore(family, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_families() {
        assert_eq!(IptablesTarget::V4.families(), &[IpFamily::V4]);
        assert_eq!(IptablesTarget::V6.families(), &[IpFamily::V6]);
        assert_eq!(
            IptablesTarget::V4V6.families(),
            &[IpFamily::V4, IpFamily::V6]
        );
    }

    #[test]
    fn test_family_display() {
        assert_eq!(IpFamily::V4.to_string(), "IPv4");
        assert_eq!(IpFamily::V6.to_string(), "IPv6");
    }

    #[test]
    fn test_default_paths() {
        let exec = ShellIptables::default();
        assert_eq!(exec.iptables_bin(IpFamily::V4), "/sbin/iptables");
        assert_eq!(exec.iptables_bin(IpFamily::V6), "/sbin/ip6tables");
        assert_eq!(exec.restore_bin(IpFamily::V4), "/sbin/iptables-restore");
        assert_eq!(exec.restore_bin(IpFamily::V6), "/sbin/ip6tables-restore");
    }

    #[tokio::test]
    async fn test_restore_output_returns_stdout() {
        // Stand-in restore binary that echoes its stdin and ignores its flags.
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-restore");
        std::fs::write(&script, "#!/bin/sh\ncat\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let script = script.to_string_lossy().to_string();
        let exec = ShellIptables::new(IptablesPaths {
            iptables: "/bin/true".to_string(),
            ip6tables: "/bin/true".to_string(),
            iptables_restore: script.clone(),
            ip6tables_restore: script,
        });

        let out = exec
            .iptables_restore_output(IpFamily::V6, "*filter\n-S\nCOMMIT\n")
            .await
            .unwrap();
        assert_eq!(out, "*filter\n-S\nCOMMIT\n");
    }

    #[tokio::test]
    async fn test_restore_failure_is_error() {
        let exec = ShellIptables::new(IptablesPaths {
            iptables: "/bin/true".to_string(),
            ip6tables: "/bin/true".to_string(),
            iptables_restore: "/bin/false".to_string(),
            ip6tables_restore: "/bin/false".to_string(),
        });
        assert!(exec
            .iptables_restore(IpFamily::V4, "*filter\nCOMMIT\n")
            .await
            .is_err());
    }
}
