//! Quota fast path
//!
//! A live quota2 counter can be rewritten through its pseudo-file without
//! touching any rule. Each update opens the file, writes the value once and
//! closes it; the handle is released on every exit path.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use netd_common::{NetdError, NetdResult, OpenMode, Syscalls, UniqueFile};
use tracing::debug;

use crate::types::validate_quota_name;

/// Directory holding one pseudo-file per quota2 counter.
pub const QUOTA_DIR: &str = "/proc/net/xt_quota";

/// Reads and rewrites quota2 counters by name.
#[derive(Clone)]
pub struct QuotaUpdater {
    sys: Arc<dyn Syscalls>,
    dir: PathBuf,
}

impl std::fmt::Debug for QuotaUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaUpdater").field("dir", &self.dir).finish()
    }
}

impl QuotaUpdater {
    pub fn new(sys: Arc<dyn Syscalls>, dir: impl Into<PathBuf>) -> Self {
        Self {
            sys,
            dir: dir.into(),
        }
    }

    /// Pseudo-file for the counter `name`.
    pub fn path_for(&self, name: &str) -> NetdResult<PathBuf> {
        validate_quota_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Overwrites the counter `name` with `bytes`.
    pub fn update_quota(&self, name: &str, bytes: u64) -> NetdResult<()> {
        let path = self.path_for(name)?;
        debug!(name, bytes, path = %path.display(), "Updating quota");

        let mut file = UniqueFile::open(self.sys.as_ref(), &path, OpenMode::Write)
            .map_err(|e| NetdError::quota_io(&path, "open", e))?;
        file.write_all(format!("{}\n", bytes).as_bytes())
            .map_err(|e| NetdError::quota_io(&path, "write", e))?;
        file.close()
            .map_err(|e| NetdError::quota_io(&path, "close", e))
    }

    /// Reads the remaining value of the counter `name`.
    pub fn read_quota(&self, name: &str) -> NetdResult<u64> {
        let path = self.path_for(name)?;

        let mut file = UniqueFile::open(self.sys.as_ref(), &path, OpenMode::Read)
            .map_err(|e| NetdError::quota_io(&path, "open", e))?;
        let content = file
            .read_to_string()
            .map_err(|e| NetdError::quota_io(&path, "read", e))?;
        file.close()
            .map_err(|e| NetdError::quota_io(&path, "close", e))?;

        content.trim().parse::<u64>().map_err(|e| {
            NetdError::quota_io(
                &path,
                "parse",
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netd_test::{expect_no_syscalls, expect_quota_write, FakeSyscalls, SyscallEvent};

    fn updater(sys: &FakeSyscalls) -> QuotaUpdater {
        QuotaUpdater::new(Arc::new(sys.clone()), QUOTA_DIR)
    }

    #[test]
    fn test_update_writes_once_and_closes() {
        let sys = FakeSyscalls::new();
        updater(&sys).update_quota("wlan0", 123457).unwrap();
        expect_quota_write(&sys, "/proc/net/xt_quota/wlan0", 123457);
    }

    #[test]
    fn test_update_rejects_bad_name() {
        let sys = FakeSyscalls::new();
        let err = updater(&sys).update_quota("../shared", 1).unwrap_err();
        assert!(err.is_parameter_error());
        expect_no_syscalls(&sys);
    }

    #[test]
    fn test_open_failure() {
        let sys = FakeSyscalls::new();
        sys.fail_next_open();
        let err = updater(&sys).update_quota("shared", 5).unwrap_err();
        assert!(matches!(err, NetdError::QuotaIo { op: "open", .. }));
        assert_eq!(sys.take_events().len(), 1);
    }

    #[test]
    fn test_write_failure_still_closes() {
        let sys = FakeSyscalls::new();
        sys.fail_next_write();
        let err = updater(&sys).update_quota("shared", 5).unwrap_err();
        assert!(matches!(err, NetdError::QuotaIo { op: "write", .. }));

        let events = sys.take_events();
        assert_eq!(
            events.last(),
            Some(&SyscallEvent::Close(PathBuf::from("/proc/net/xt_quota/shared")))
        );
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_close_failure() {
        let sys = FakeSyscalls::new();
        sys.fail_next_close();
        let err = updater(&sys).update_quota("globalAlert", 7).unwrap_err();
        assert!(matches!(err, NetdError::QuotaIo { op: "close", .. }));
    }

    #[test]
    fn test_read_quota() {
        let sys = FakeSyscalls::new();
        sys.set_contents("/proc/net/xt_quota/rmnet0", "4096\n");
        assert_eq!(updater(&sys).read_quota("rmnet0").unwrap(), 4096);

        sys.set_contents("/proc/net/xt_quota/rmnet0", "garbage");
        let err = updater(&sys).read_quota("rmnet0").unwrap_err();
        assert!(matches!(err, NetdError::QuotaIo { op: "parse", .. }));
    }

    #[test]
    fn test_real_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wlan0"), "0\n").unwrap();

        let updater = QuotaUpdater::new(Arc::new(netd_common::RealSyscalls), dir.path());
        updater.update_quota("wlan0", 99).unwrap();
        assert_eq!(updater.read_quota("wlan0").unwrap(), 99);
        assert!(updater.update_quota("missing0", 1).is_err());
    }
}
