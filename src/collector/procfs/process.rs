//! Process table backed by `/proc/[pid]/` files.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::Path;

use tracing::trace;

use crate::collector::procfs::parser::{
    MemoryInfo, parse_cmdline, parse_mem_total, parse_proc_status, parse_stat_ppid,
};
use crate::collector::traits::{FileSystem, ProcessTable};

/// Error type for per-process read failures.
///
/// Every variant is recoverable: callers drop the affected process from the
/// current tick and move on.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// Process disappeared during collection.
    #[error("process {0} disappeared")]
    ProcessGone(u32),
    /// Process belongs to another user and its files are not readable.
    #[error("access denied to process {0}")]
    AccessDenied(u32),
    /// I/O error reading process or system files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Parse error in process or system files.
    #[error("parse error: {0}")]
    Parse(String),
}

impl CollectError {
    /// Maps an I/O error on a `/proc/[pid]/` file to the matching variant.
    fn from_process_io(pid: u32, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => CollectError::ProcessGone(pid),
            io::ErrorKind::PermissionDenied => CollectError::AccessDenied(pid),
            _ => CollectError::Io(e),
        }
    }
}

/// Reads process information from `/proc/[pid]/` files.
pub struct ProcfsTable<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> ProcfsTable<F> {
    /// Creates a new process table.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read_process_file(&self, pid: u32, file: &str) -> Result<String, CollectError> {
        let path = format!("{}/{}/{}", self.proc_path, pid, file);
        self.fs
            .read_to_string(Path::new(&path))
            .map_err(|e| CollectError::from_process_io(pid, e))
    }

    /// Reads the parent PID of a process from `/proc/[pid]/stat`.
    fn parent_of(&self, pid: u32) -> Result<u32, CollectError> {
        let content = self.read_process_file(pid, "stat")?;
        parse_stat_ppid(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Builds the parent → children map from every readable `stat` file.
    ///
    /// Processes that vanish while the map is built are left out.
    fn children_map(&self) -> Result<HashMap<u32, Vec<u32>>, CollectError> {
        let mut map: HashMap<u32, Vec<u32>> = HashMap::new();
        for pid in self.pids()? {
            match self.parent_of(pid) {
                Ok(ppid) => map.entry(ppid).or_default().push(pid),
                Err(e) => trace!(pid, error = %e, "skipping process while mapping children"),
            }
        }
        for children in map.values_mut() {
            children.sort_unstable();
        }
        Ok(map)
    }
}

impl<F: FileSystem> ProcessTable for ProcfsTable<F> {
    fn pids(&self) -> Result<Vec<u32>, CollectError> {
        let entries = self.fs.read_dir(Path::new(&self.proc_path))?;

        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|entry| entry.file_name().and_then(|n| n.to_str()))
            .filter_map(|name| name.parse::<u32>().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn cmdline(&self, pid: u32) -> Result<Vec<String>, CollectError> {
        let content = self.read_process_file(pid, "cmdline")?;
        Ok(parse_cmdline(&content))
    }

    fn memory_info(&self, pid: u32) -> Result<MemoryInfo, CollectError> {
        let content = self.read_process_file(pid, "status")?;
        parse_proc_status(&content).map_err(|e| CollectError::Parse(e.message))
    }

    fn children(&self, pid: u32) -> Result<Vec<u32>, CollectError> {
        let root_dir = format!("{}/{}", self.proc_path, pid);
        if !self.fs.exists(Path::new(&root_dir)) {
            return Err(CollectError::ProcessGone(pid));
        }

        let map = self.children_map()?;

        let mut visited = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        let mut descendants = Vec::new();

        while let Some(current) = queue.pop_front() {
            for &child in map.get(&current).into_iter().flatten() {
                if visited.insert(child) {
                    descendants.push(child);
                    queue.push_back(child);
                }
            }
        }

        Ok(descendants)
    }

    fn total_memory(&self) -> Result<u64, CollectError> {
        let path = format!("{}/meminfo", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        parse_mem_total(&content).map_err(|e| CollectError::Parse(e.message))
    }
}
