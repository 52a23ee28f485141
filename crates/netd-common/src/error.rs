//! Error types for netd controller operations.
//!
//! This module defines the error type shared by the controller crates.
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for netd operations.
pub type NetdResult<T> = Result<T, NetdError>;

/// Errors that can occur during controller operations.
#[derive(Debug, Error)]
pub enum NetdError {
    /// Failed to execute a command (spawn or pipe error).
    #[error("Failed to execute command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Command returned non-zero exit code.
    #[error("Command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Costly chain preparation did not see exactly one of flush/create fail.
    #[error(
        "Failed to prepare chain {chain} ({family}): flush_failed={flush_failed} create_failed={create_failed}"
    )]
    ChainPreparation {
        /// The chain being prepared.
        chain: String,
        /// Address family the outcome was observed on.
        family: String,
        /// Whether the flush step failed.
        flush_failed: bool,
        /// Whether the create step failed.
        create_failed: bool,
    },

    /// Removal or update of something that was never added.
    #[error("No such {kind}: {key}")]
    NotFound {
        /// What was looked up (e.g. "interface quota").
        kind: String,
        /// The key.
        key: String,
    },

    /// Caller supplied an unusable argument.
    #[error("Invalid {field}: {message}")]
    InvalidArgument {
        /// The argument that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Tether counter output was malformed or incomplete.
    ///
    /// The diagnostic carries the raw counter text.
    #[error("Failed to parse tether stats")]
    TetherStats {
        /// Raw counters (or fetch failure description) for debugging.
        diagnostic: String,
    },

    /// Quota pseudo-file I/O failed.
    #[error("Quota {op} failed for {}: {source}", .path.display())]
    QuotaIo {
        /// The quota file.
        path: PathBuf,
        /// The step that failed ("open", "write", "read", "close").
        op: &'static str,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Writing to the response transport failed.
    #[error("Failed to send response: {source}")]
    Response {
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NetdError {
    /// Creates a not-found error.
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a tether stats error carrying the raw counter text.
    pub fn tether_stats(diagnostic: impl Into<String>) -> Self {
        Self::TetherStats {
            diagnostic: diagnostic.into(),
        }
    }

    /// Creates a quota I/O error.
    pub fn quota_io(path: impl Into<PathBuf>, op: &'static str, source: io::Error) -> Self {
        Self::QuotaIo {
            path: path.into(),
            op,
            source,
        }
    }

    /// Returns true when an argument value was rejected before any
    /// kernel state was touched.
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, NetdError::InvalidArgument { .. })
    }

    /// Returns the diagnostic text attached to a tether stats failure.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            NetdError::TetherStats { diagnostic } => Some(diagnostic),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetdError::not_found("interface quota", "wlan0");
        assert_eq!(err.to_string(), "No such interface quota: wlan0");
        assert!(!err.is_parameter_error());
    }

    #[test]
    fn test_invalid_argument() {
        let err = NetdError::invalid_argument("bytes", "must be positive");
        assert_eq!(err.to_string(), "Invalid bytes: must be positive");
        assert!(err.is_parameter_error());
    }

    #[test]
    fn test_shell_command_failed() {
        let err = NetdError::ShellCommandFailed {
            command: "iptables -w -F bw_costly_wlan0".to_string(),
            exit_code: 1,
            output: "No chain/target/match by that name.".to_string(),
        };
        assert!(err.to_string().contains("-F bw_costly_wlan0"));
        assert!(err.to_string().contains("exit code 1"));
        assert!(!err.is_parameter_error());
    }

    #[test]
    fn test_chain_preparation_display() {
        let err = NetdError::ChainPreparation {
            chain: "bw_costly_wlan0".to_string(),
            family: "IPv6".to_string(),
            flush_failed: true,
            create_failed: true,
        };
        let msg = err.to_string();
        assert!(msg.contains("bw_costly_wlan0"));
        assert!(msg.contains("IPv6"));
    }

    #[test]
    fn test_tether_stats_diagnostic() {
        let err = NetdError::tether_stats("raw counters\n");
        assert_eq!(err.diagnostic(), Some("raw counters\n"));
        assert_eq!(NetdError::not_found("alert", "x").diagnostic(), None);
    }

    #[test]
    fn test_quota_io_display() {
        let err = NetdError::quota_io(
            "/proc/net/xt_quota/wlan0",
            "open",
            io::Error::from(io::ErrorKind::NotFound),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("Quota open failed for /proc/net/xt_quota/wlan0"));
    }
}
