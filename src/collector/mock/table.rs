//! Process table double with exact byte counts and per-read fault injection.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::collector::procfs::{CollectError, MemoryInfo};
use crate::collector::traits::ProcessTable;

/// A failure to inject into one read of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The process exits before the read.
    Gone,
    /// The process belongs to another user.
    AccessDenied,
}

impl Fault {
    fn to_error(self, pid: u32) -> CollectError {
        match self {
            Fault::Gone => CollectError::ProcessGone(pid),
            Fault::AccessDenied => CollectError::AccessDenied(pid),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    ppid: u32,
    cmdline: Vec<String>,
    memory: MemoryInfo,
    cmdline_fault: Option<Fault>,
    memory_fault: Option<Fault>,
}

/// In-memory [`ProcessTable`]. PIDs are reported in ascending order.
#[derive(Debug, Clone, Default)]
pub struct MockProcessTable {
    entries: BTreeMap<u32, Entry>,
    total_memory: Option<u64>,
}

impl MockProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value returned by `total_memory`. Unset reads fail.
    pub fn with_total_memory(mut self, bytes: u64) -> Self {
        self.total_memory = Some(bytes);
        self
    }

    /// Adds a process reporting `rss` bytes of resident memory.
    pub fn add_process(&mut self, pid: u32, ppid: u32, args: &[&str], rss: u64) -> &mut Self {
        self.entries.insert(
            pid,
            Entry {
                ppid,
                cmdline: args.iter().map(|s| s.to_string()).collect(),
                memory: MemoryInfo {
                    rss,
                    ..MemoryInfo::default()
                },
                cmdline_fault: None,
                memory_fault: None,
            },
        );
        self
    }

    /// Makes reading the command line of `pid` fail.
    pub fn fail_cmdline(&mut self, pid: u32, fault: Fault) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(&pid) {
            entry.cmdline_fault = Some(fault);
        }
        self
    }

    /// Makes reading the memory record of `pid` fail.
    pub fn fail_memory(&mut self, pid: u32, fault: Fault) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(&pid) {
            entry.memory_fault = Some(fault);
        }
        self
    }

    /// Removes a process entirely, as if it exited.
    pub fn remove_process(&mut self, pid: u32) -> &mut Self {
        self.entries.remove(&pid);
        self
    }

    fn entry(&self, pid: u32) -> Result<&Entry, CollectError> {
        self.entries.get(&pid).ok_or(CollectError::ProcessGone(pid))
    }
}

impl ProcessTable for MockProcessTable {
    fn pids(&self) -> Result<Vec<u32>, CollectError> {
        Ok(self.entries.keys().copied().collect())
    }

    fn cmdline(&self, pid: u32) -> Result<Vec<String>, CollectError> {
        let entry = self.entry(pid)?;
        match entry.cmdline_fault {
            Some(fault) => Err(fault.to_error(pid)),
            None => Ok(entry.cmdline.clone()),
        }
    }

    fn memory_info(&self, pid: u32) -> Result<MemoryInfo, CollectError> {
        let entry = self.entry(pid)?;
        match entry.memory_fault {
            Some(fault) => Err(fault.to_error(pid)),
            None => Ok(entry.memory),
        }
    }

    fn children(&self, pid: u32) -> Result<Vec<u32>, CollectError> {
        self.entry(pid)?;

        let mut visited = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        let mut descendants = Vec::new();

        while let Some(current) = queue.pop_front() {
            for (&candidate, entry) in &self.entries {
                if entry.ppid == current && visited.insert(candidate) {
                    descendants.push(candidate);
                    queue.push_back(candidate);
                }
            }
        }

        Ok(descendants)
    }

    fn total_memory(&self) -> Result<u64, CollectError> {
        self.total_memory
            .ok_or_else(|| CollectError::Parse("MemTotal missing from meminfo".to_string()))
    }
}
