//! Filesystem seam between the collectors and `/proc`.
//!
//! Production code reads the real procfs through [`RealFs`]; tests swap in
//! [`MockFs`](crate::collector::mock::MockFs) to describe a process tree as
//! plain strings.

use std::io;
use std::path::{Path, PathBuf};

use crate::collector::procfs::{CollectError, MemoryInfo};

/// Abstraction for the handful of filesystem operations the collectors need.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD; `/proc`
    /// files carry arbitrary bytes in process names and arguments.
    ///
    /// A process that exited between listing and reading surfaces here as
    /// `io::ErrorKind::NotFound`.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory as full paths.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}

/// The OS process primitives the sampler, resolver and collector consume.
///
/// Every per-process method may fail because the process exited after it was
/// listed; callers treat that as "leave this process out".
pub trait ProcessTable: Send + Sync {
    /// Lists the PIDs currently visible, in ascending order.
    ///
    /// This is the order the sampler yields candidates in, so "first
    /// matching process" means lowest PID.
    fn pids(&self) -> Result<Vec<u32>, CollectError>;

    /// Returns the command-line arguments of a process.
    fn cmdline(&self, pid: u32) -> Result<Vec<String>, CollectError>;

    /// Returns the memory accounting record of a process.
    fn memory_info(&self, pid: u32) -> Result<MemoryInfo, CollectError>;

    /// Returns every descendant of a process (children, grandchildren, ...).
    fn children(&self, pid: u32) -> Result<Vec<u32>, CollectError>;

    /// Returns the installed physical memory of the machine in bytes.
    fn total_memory(&self) -> Result<u64, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_fs_read_to_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, "MemTotal: 16384 kB\n").unwrap();

        let fs = RealFs::new();
        let content = fs.read_to_string(&path).unwrap();
        assert!(content.starts_with("MemTotal:"));
    }

    #[test]
    fn test_real_fs_read_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmdline");
        std::fs::write(&path, b"caf\xe9\0").unwrap();

        let content = RealFs::new().read_to_string(&path).unwrap();
        assert_eq!(content, "caf\u{fffd}\0");
    }

    #[test]
    fn test_real_fs_exists() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFs::new();
        assert!(fs.exists(dir.path()));
        assert!(!fs.exists(&dir.path().join("nonexistent-12345")));
    }

    #[test]
    fn test_real_fs_read_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("1")).unwrap();
        std::fs::write(dir.path().join("meminfo"), "").unwrap();

        let fs = RealFs::new();
        let mut entries = fs.read_dir(dir.path()).unwrap();
        entries.sort();
        assert_eq!(entries, vec![dir.path().join("1"), dir.path().join("meminfo")]);
    }

    #[test]
    fn test_real_fs_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFs::new();
        let err = fs.read_to_string(&dir.path().join("42/status")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
