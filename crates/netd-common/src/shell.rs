//! Shell command execution utilities for netd controllers.
//!
//! This module provides command execution with proper quoting to prevent
//! command injection, plus a stdin-fed variant used for the iptables
//! restore protocol.
//!
//! # Example
//!
//! ```ignore
//! use netd_common::shell::{self, IPTABLES_PATH, shellquote};
//!
//! let cmd = format!("{} -w -F {}", IPTABLES_PATH, shellquote("bw_costly_wlan0"));
//! let result = shell::exec(&cmd).await?;
//! ```

use std::process::Stdio;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{NetdError, NetdResult};

/// Path to the `iptables` command.
pub const IPTABLES_PATH: &str = "/sbin/iptables";

/// Path to the `ip6tables` command.
pub const IP6TABLES_PATH: &str = "/sbin/ip6tables";

/// Path to the `iptables-restore` command.
pub const IPTABLES_RESTORE_PATH: &str = "/sbin/iptables-restore";

/// Path to the `ip6tables-restore` command.
pub const IP6TABLES_RESTORE_PATH: &str = "/sbin/ip6tables-restore";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// This function wraps the string in double quotes and escapes any
/// characters that have special meaning inside double quotes:
/// `$`, `` ` ``, `"`, `\` and newline.
///
/// # Example
///
/// ```
/// use netd_common::shell::shellquote;
///
/// assert_eq!(shellquote("simple"), "\"simple\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Quotes every whitespace-separated word of an argument string.
///
/// iptables rule text is built as one string; this turns it into a
/// shell-safe argument list without changing word boundaries.
pub fn quote_args(args: &str) -> String {
    args.split_whitespace()
        .map(shellquote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The combined stdout output.
    pub stdout: String,
    /// The combined stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Converts a non-zero exit into [`NetdError::ShellCommandFailed`].
    pub fn into_stdout(self, command: &str) -> NetdResult<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(NetdError::ShellCommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                output: self.combined_output(),
            })
        }
    }
}

/// Executes a shell command asynchronously.
///
/// The command runs through `/bin/sh -c`. A non-zero exit is not an
/// error at this level; only a failure to spawn is.
pub async fn exec(cmd: &str) -> NetdResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| NetdError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::debug!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Runs `program` with `args`, feeding `input` on stdin.
///
/// Stdout is returned untrimmed: restore-protocol output is parsed line
/// by line and the caller decides what is significant.
pub async fn exec_with_input(program: &str, args: &[&str], input: &str) -> NetdResult<ExecResult> {
    let command = format!("{} {}", program, args.join(" "));
    tracing::debug!(command = %command, lines = input.lines().count(), "Executing with input");

    let spawn_err = |e| NetdError::ShellExec {
        command: command.clone(),
        source: e,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await.map_err(spawn_err)?;
        // Dropping stdin closes the pipe so the child sees EOF.
    }

    let output = child.wait_with_output().await.map_err(spawn_err)?;

    Ok(ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_simple() {
        assert_eq!(shellquote("simple"), "\"simple\"");
        assert_eq!(shellquote("wlan0"), "\"wlan0\"");
        assert_eq!(shellquote("123456"), "\"123456\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$HOME"), "\"\\$HOME\"");
        assert_eq!(shellquote("`whoami`"), "\"\\`whoami\\`\"");
        assert_eq!(shellquote("say \"hello\""), "\"say \\\"hello\\\"\"");
        assert_eq!(shellquote("path\\to"), "\"path\\\\to\"");
        assert_eq!(shellquote("line1\nline2"), "\"line1\\\nline2\"");
    }

    #[test]
    fn test_shellquote_empty() {
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_quote_args() {
        assert_eq!(
            quote_args("-A bw_costly_wlan0 -m quota2 ! --quota 10"),
            "\"-A\" \"bw_costly_wlan0\" \"-m\" \"quota2\" \"!\" \"--quota\" \"10\""
        );
        assert_eq!(quote_args(""), "");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[test]
    fn test_exec_result_into_stdout() {
        let ok = ExecResult {
            exit_code: 0,
            stdout: "out".to_string(),
            stderr: String::new(),
        };
        assert_eq!(ok.into_stdout("x").unwrap(), "out");

        let failed = ExecResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: "bad".to_string(),
        };
        match failed.into_stdout("iptables -w -L") {
            Err(NetdError::ShellCommandFailed {
                exit_code, output, ..
            }) => {
                assert_eq!(exit_code, 2);
                assert_eq!(output, "bad");
            }
            other => panic!("Expected ShellCommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec("echo hello").await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_exec_failure() {
        let result = exec("exit 42").await.unwrap();
        assert!(!result.success());
        assert_eq!(result.exit_code, 42);
    }

    #[test]
    fn test_into_stdout_failure() {
        let result = ExecResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Bad rule".to_string(),
        };
        assert!(matches!(
            result.into_stdout("iptables-restore --noflush -w"),
            Err(NetdError::ShellCommandFailed { exit_code: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_exec_with_input() {
        let result = exec_with_input("/bin/cat", &[], "*filter\n-S\nCOMMIT\n")
            .await
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "*filter\n-S\nCOMMIT\n");
    }
}
