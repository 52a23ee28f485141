//! Test infrastructure for netd controllers
//!
//! Provides:
//! - A recording iptables executor with scripted exit codes and restore output
//! - A recording syscall layer with scripted failures
//! - Counter-dump and chain-list fixtures
//! - Command verification helpers

pub mod fixtures;
mod iptables;
mod syscalls;
mod verification;

pub use fixtures::*;
pub use iptables::FakeIptables;
pub use syscalls::{FakeSyscalls, SyscallEvent};
pub use verification::*;
