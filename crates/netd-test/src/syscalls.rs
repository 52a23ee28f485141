//! Recording [`Syscalls`] for fast-path tests.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use netd_common::{FileHandle, OpenMode, Syscalls};

/// One observed file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallEvent {
    /// A file was opened.
    Open(PathBuf, OpenMode),
    /// Data was written.
    Write(PathBuf, String),
    /// Content was read.
    Read(PathBuf),
    /// A handle was released.
    Close(PathBuf),
}

#[derive(Debug, Default)]
struct State {
    events: Vec<SyscallEvent>,
    contents: HashMap<PathBuf, String>,
    fail_open: bool,
    fail_write: bool,
    fail_close: bool,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Syscall layer that records every open/write/read/close.
///
/// Written data is kept so later reads of the same path observe it.
/// Failures are one-shot: each `fail_*` call fails the next matching
/// operation only.
#[derive(Debug, Clone, Default)]
pub struct FakeSyscalls {
    state: Arc<Mutex<State>>,
}

impl FakeSyscalls {
    /// Creates an empty fake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the content returned when `path` is read.
    pub fn set_contents(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        lock(&self.state).contents.insert(path.into(), contents.into());
    }

    /// Fails the next open.
    pub fn fail_next_open(&self) {
        lock(&self.state).fail_open = true;
    }

    /// Fails the next write.
    pub fn fail_next_write(&self) {
        lock(&self.state).fail_write = true;
    }

    /// Fails the next close.
    pub fn fail_next_close(&self) {
        lock(&self.state).fail_close = true;
    }

    /// Returns and clears the recorded events.
    pub fn take_events(&self) -> Vec<SyscallEvent> {
        std::mem::take(&mut lock(&self.state).events)
    }

    /// Builds the event sequence of one successful fast-path write.
    pub fn expected_write(path: impl Into<PathBuf>, value: u64) -> Vec<SyscallEvent> {
        let path = path.into();
        vec![
            SyscallEvent::Open(path.clone(), OpenMode::Write),
            SyscallEvent::Write(path.clone(), format!("{}\n", value)),
            SyscallEvent::Close(path),
        ]
    }
}

impl Syscalls for FakeSyscalls {
    fn fopen(&self, path: &Path, mode: OpenMode) -> io::Result<Box<dyn FileHandle>> {
        let mut state = lock(&self.state);
        state.events.push(SyscallEvent::Open(path.to_path_buf(), mode));
        if std::mem::take(&mut state.fail_open) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(Box::new(FakeFile {
            path: path.to_path_buf(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeFile {
    path: PathBuf,
    state: Arc<Mutex<State>>,
}

impl FileHandle for FakeFile {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut state = lock(&self.state);
        let data = String::from_utf8_lossy(buf).into_owned();
        state
            .events
            .push(SyscallEvent::Write(self.path.clone(), data.clone()));
        if std::mem::take(&mut state.fail_write) {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        state.contents.insert(self.path.clone(), data);
        Ok(())
    }

    fn read_to_string(&mut self, buf: &mut String) -> io::Result<usize> {
        let mut state = lock(&self.state);
        state.events.push(SyscallEvent::Read(self.path.clone()));
        let contents = state.contents.get(&self.path).cloned().unwrap_or_default();
        buf.push_str(&contents);
        Ok(contents.len())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.events.push(SyscallEvent::Close(self.path.clone()));
        if std::mem::take(&mut state.fail_close) {
            return Err(io::Error::from(io::ErrorKind::Other));
        }
        Ok(())
    }
}
