//! Verification helpers for testing controllers
//!
//! Expected commands are written once per family target and expanded into
//! the per-family sequence the executor actually observes.

use netd_common::{IpFamily, IptablesTarget};
use pretty_assertions::assert_eq;
use thiserror::Error;

use crate::{FakeIptables, FakeSyscalls, SyscallEvent};

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected command '{expected}' not found in {actual:?}")]
    CommandNotFound {
        expected: String,
        actual: Vec<String>,
    },

    #[error("Command '{unexpected}' was executed")]
    UnexpectedCommand { unexpected: String },

    #[error("Expected {expected} commands, found {actual}")]
    CommandCountMismatch { expected: usize, actual: usize },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Expands single commands for `target`, every command on each family in
/// turn before the next command.
pub fn expand_commands(target: IptablesTarget, cmds: &[&str]) -> Vec<(IpFamily, String)> {
    cmds.iter()
        .flat_map(|cmd| {
            target
                .families()
                .iter()
                .map(move |family| (*family, cmd.to_string()))
        })
        .collect()
}

/// Expands restore batches, each tagged with its own target.
pub fn expand_restores(batches: &[(IptablesTarget, &str)]) -> Vec<(IpFamily, String)> {
    batches
        .iter()
        .flat_map(|(target, batch)| {
            target
                .families()
                .iter()
                .map(move |family| (*family, batch.to_string()))
        })
        .collect()
}

/// Asserts the single commands issued since the last check (both families).
pub fn expect_iptables_commands(ipt: &FakeIptables, expected: &[&str]) {
    assert_eq!(
        expand_commands(IptablesTarget::V4V6, expected),
        ipt.take_commands()
    );
}

/// Asserts the restore batches issued since the last check, each applied
/// to both families.
pub fn expect_restore_commands(ipt: &FakeIptables, expected: &[&str]) {
    let batches: Vec<_> = expected
        .iter()
        .map(|batch| (IptablesTarget::V4V6, *batch))
        .collect();
    expect_restore_batches(ipt, &batches);
}

/// Asserts restore batches with an explicit family target per batch.
pub fn expect_restore_batches(ipt: &FakeIptables, expected: &[(IptablesTarget, &str)]) {
    assert_eq!(expand_restores(expected), ipt.take_restores());
}

/// Asserts that exactly one fast-path write of `value` to `path` happened.
pub fn expect_quota_write(sys: &FakeSyscalls, path: &str, value: u64) {
    assert_eq!(FakeSyscalls::expected_write(path, value), sys.take_events());
}

/// Asserts that no file was touched.
pub fn expect_no_syscalls(sys: &FakeSyscalls) {
    assert_eq!(Vec::<SyscallEvent>::new(), sys.take_events());
}

/// Command execution verifier for substring checks over a captured log
pub struct CommandVerifier {
    captured_commands: Vec<String>,
}

impl CommandVerifier {
    /// Create a verifier over the commands captured by `ipt`
    pub fn from_fake(ipt: &FakeIptables) -> Self {
        Self::new(ipt.take_commands().into_iter().map(|(_, c)| c).collect())
    }

    /// Create a new command verifier
    pub fn new(captured_commands: Vec<String>) -> Self {
        Self { captured_commands }
    }

    /// Verify that a specific command was executed
    pub fn assert_command_executed(&self, expected: &str) -> VerifyResult<()> {
        if self
            .captured_commands
            .iter()
            .any(|cmd| cmd.contains(expected))
        {
            Ok(())
        } else {
            Err(VerificationError::CommandNotFound {
                expected: expected.to_string(),
                actual: self.captured_commands.clone(),
            })
        }
    }

    /// Verify that a command was NOT executed
    pub fn assert_command_not_executed(&self, unexpected: &str) -> VerifyResult<()> {
        if self
            .captured_commands
            .iter()
            .any(|cmd| cmd.contains(unexpected))
        {
            Err(VerificationError::UnexpectedCommand {
                unexpected: unexpected.to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Verify the number of commands executed
    pub fn assert_command_count(&self, expected: usize) -> VerifyResult<()> {
        let actual = self.captured_commands.len();
        if actual != expected {
            Err(VerificationError::CommandCountMismatch { expected, actual })
        } else {
            Ok(())
        }
    }

    /// Get all captured commands
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_commands_is_command_major() {
        let expanded = expand_commands(IptablesTarget::V4V6, &["-F a", "-N a"]);
        assert_eq!(
            expanded,
            vec![
                (IpFamily::V4, "-F a".to_string()),
                (IpFamily::V6, "-F a".to_string()),
                (IpFamily::V4, "-N a".to_string()),
                (IpFamily::V6, "-N a".to_string()),
            ]
        );
    }

    #[test]
    fn test_expand_restores_per_target() {
        let expanded = expand_restores(&[(IptablesTarget::V4, "x"), (IptablesTarget::V4V6, "y")]);
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded[0], (IpFamily::V4, "x".to_string()));
        assert_eq!(expanded[2], (IpFamily::V6, "y".to_string()));
    }

    #[test]
    fn test_command_verifier() {
        let commands = vec![
            "-A bw_costly_wlan0 -j bw_penalty_box".to_string(),
            "-D bw_INPUT -i wlan0 --jump bw_costly_wlan0".to_string(),
        ];

        let verifier = CommandVerifier::new(commands);

        assert!(verifier.assert_command_executed("bw_penalty_box").is_ok());
        assert!(verifier.assert_command_executed("-D bw_INPUT").is_ok());
        assert!(verifier.assert_command_not_executed("bw_FORWARD").is_ok());
        assert!(verifier.assert_command_count(2).is_ok());

        assert!(verifier.assert_command_count(3).is_err());
        assert!(verifier.assert_command_executed("quota2").is_err());
    }
}
