//! Common infrastructure for netd controller daemons.
//!
//! This crate provides the collaborators a controller talks to, each
//! behind a seam so controllers can be tested without touching the
//! kernel:
//!
//! - [`shell`]: Shell command execution with proper quoting
//! - [`iptables`]: Single-command and restore-batch execution per address family
//! - [`syscalls`]: File open/write/close with a scoped handle guard
//! - [`response`]: `<code> <message>` response lines to a client
//! - [`error`]: Error types shared by the controllers
//!
//! # Example
//!
//! ```ignore
//! use netd_common::{IpFamily, IptablesExecutor, ShellIptables};
//!
//! async fn flush(chain: &str) -> netd_common::NetdResult<()> {
//!     let ipt = ShellIptables::default();
//!     let input = format!("*filter\n:{} -\nCOMMIT\n", chain);
//!     ipt.iptables_restore(IpFamily::V4, &input).await
//! }
//! ```

pub mod error;
pub mod iptables;
pub mod response;
pub mod shell;
pub mod syscalls;

// Re-export commonly used items at crate root
pub use error::{NetdError, NetdResult};
pub use iptables::{IpFamily, IptablesExecutor, IptablesPaths, IptablesTarget, ShellIptables};
pub use response::{codes, ResponseSink, SocketClient, MAX_RESPONSE_LEN};
pub use shell::ExecResult;
pub use syscalls::{FileHandle, OpenMode, RealSyscalls, Syscalls, UniqueFile};
