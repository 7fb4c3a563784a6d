//! Filesystem access for validation checks, behind a trait so checks are
//! testable with a stub and so real calls can carry a deadline.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// The filesystem questions validation checks are allowed to ask.
/// Read-only; the gate never touches the filesystem otherwise.
pub trait Filesystem: Send + Sync {
    /// The immediate target of a symlink, or `None` for a regular path.
    fn symlink_target(&self, path: &Path) -> io::Result<Option<PathBuf>>;

    /// Fully resolved absolute path (all symlinks followed).
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Size of a regular file in bytes.
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// Real filesystem with a per-call deadline. A stalled filesystem (hung
/// NFS mount, dead FUSE daemon) must surface as an error so the caller
/// fails closed instead of wedging the decision path.
pub struct RealFilesystem {
    deadline: Duration,
}

impl RealFilesystem {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Run one blocking filesystem call on a helper thread and wait at
    /// most the deadline. The helper may outlive the wait; it holds only
    /// an owned path and a dead channel sender.
    fn with_deadline<T: Send + 'static>(
        &self,
        op: impl FnOnce() -> io::Result<T> + Send + 'static,
    ) -> io::Result<T> {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(op());
        });
        rx.recv_timeout(self.deadline).unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "filesystem check exceeded deadline",
            ))
        })
    }
}

impl Filesystem for RealFilesystem {
    fn symlink_target(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        let path = path.to_path_buf();
        self.with_deadline(move || {
            let meta = std::fs::symlink_metadata(&path)?;
            if meta.file_type().is_symlink() {
                std::fs::read_link(&path).map(Some)
            } else {
                Ok(None)
            }
        })
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let path = path.to_path_buf();
        self.with_deadline(move || std::fs::canonicalize(&path))
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        let path = path.to_path_buf();
        self.with_deadline(move || std::fs::metadata(&path).map(|m| m.len()))
    }
}

/// In-memory filesystem for tests: declared symlinks and file sizes,
/// nothing else.
#[derive(Debug, Default)]
pub struct StubFilesystem {
    links: HashMap<PathBuf, PathBuf>,
    sizes: HashMap<PathBuf, u64>,
}

impl StubFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symlink(mut self, link: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        self.links.insert(link.into(), target.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, size: u64) -> Self {
        self.sizes.insert(path.into(), size);
        self
    }
}

impl Filesystem for StubFilesystem {
    fn symlink_target(&self, path: &Path) -> io::Result<Option<PathBuf>> {
        Ok(self.links.get(path).cloned())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        let mut current = path.to_path_buf();
        // Follow declared links to a fixed point; cap to avoid loops.
        for _ in 0..16 {
            match self.links.get(&current) {
                Some(next) => current = next.clone(),
                None => return Ok(current),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::Other,
            "too many levels of symbolic links",
        ))
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.sizes
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}
