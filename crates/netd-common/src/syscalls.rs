//! Substitutable file syscalls with scoped handle ownership.
//!
//! The quota fast path talks to kernel pseudo-files through [`Syscalls`]
//! so tests can observe exactly which files are opened, what is written
//! and that every handle is closed. [`UniqueFile`] owns an open handle and
//! releases it on every exit path.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only.
    Read,
    /// Write-only, truncating existing content. The file must exist.
    Write,
}

/// An open file handed out by a [`Syscalls`] implementation.
pub trait FileHandle: Send {
    /// Writes the whole buffer.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Reads the remaining content.
    fn read_to_string(&mut self, buf: &mut String) -> io::Result<usize>;

    /// Releases the handle, reporting any error raised on release.
    fn close(self: Box<Self>) -> io::Result<()>;
}

/// The file-level syscall surface.
pub trait Syscalls: Send + Sync {
    /// Opens `path` in the given mode.
    fn fopen(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>>;
}

/// Owns an open [`FileHandle`] for the duration of a scope.
///
/// Call [`UniqueFile::close`] to observe release errors; if the guard is
/// dropped instead (early return on a failed write), the handle is still
/// released and the release error is only logged.
pub struct UniqueFile {
    path: PathBuf,
    handle: Option<Box<dyn FileHandle>>,
}

impl UniqueFile {
    /// Opens `path` through `sys`.
    pub fn open(sys: &dyn Syscalls, path: &Path, mode: OpenMode) -> io::Result<Self> {
        let handle = sys.fopen(path, mode)?;
        Ok(Self {
            path: path.to_path_buf(),
            handle: Some(handle),
        })
    }

    /// The path this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the whole buffer.
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.handle_mut()?.write_all(buf)
    }

    /// Reads the remaining content into a new string.
    pub fn read_to_string(&mut self) -> io::Result<String> {
        let mut buf = String::new();
        self.handle_mut()?.read_to_string(&mut buf)?;
        Ok(buf)
    }

    /// Releases the handle and reports the release result.
    pub fn close(mut self) -> io::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.close(),
            None => Ok(()),
        }
    }

    fn handle_mut(&mut self) -> io::Result<&mut Box<dyn FileHandle>> {
        self.handle
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file already closed"))
    }
}

impl Drop for UniqueFile {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.close() {
                warn!(path = %self.path.display(), error = %e, "Failed to close file");
            }
        }
    }
}

impl std::fmt::Debug for UniqueFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueFile")
            .field("path", &self.path)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

/// [`Syscalls`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealSyscalls;

struct StdFile(File);

impl FileHandle for StdFile {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.write_all(buf)
    }

    fn read_to_string(&mut self, buf: &mut String) -> io::Result<usize> {
        self.0.read_to_string(buf)
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut file = self.0;
        file.flush()
    }
}

impl Syscalls for RealSyscalls {
    fn fopen(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => OpenOptions::new().write(true).truncate(true).open(path)?,
        };
        Ok(Box::new(StdFile(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wlan0");
        std::fs::write(&path, "999999999\n").unwrap();

        let mut file = UniqueFile::open(&RealSyscalls, &path, OpenMode::Write).unwrap();
        file.write_all(b"42\n").unwrap();
        file.close().unwrap();

        let mut file = UniqueFile::open(&RealSyscalls, &path, OpenMode::Read).unwrap();
        assert_eq!(file.read_to_string().unwrap(), "42\n");
    }

    #[test]
    fn test_write_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let err = UniqueFile::open(&RealSyscalls, &path, OpenMode::Write).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!path.exists());
    }

    #[test]
    fn test_debug_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared");
        std::fs::write(&path, "").unwrap();
        let file = UniqueFile::open(&RealSyscalls, &path, OpenMode::Read).unwrap();
        assert!(format!("{:?}", file).contains("shared"));
        assert_eq!(file.path(), path.as_path());
    }
}
