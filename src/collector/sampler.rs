//! Discovery of kernel launcher processes.

use tracing::{trace, warn};

use crate::collector::traits::ProcessTable;

/// Argument that identifies an IPython kernel process.
pub const DEFAULT_KERNEL_MARKER: &str = "ipykernel_launcher";

/// A live process whose command line carries the kernel launcher marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelProcess {
    pub pid: u32,
    pub cmdline: Vec<String>,
}

impl KernelProcess {
    /// Last command-line argument, where launchers put the connection file.
    pub fn last_arg(&self) -> Option<&str> {
        self.cmdline.last().map(String::as_str)
    }
}

/// Enumerates kernel processes from a [`ProcessTable`].
pub struct KernelSampler<'a, T: ProcessTable> {
    table: &'a T,
    marker: &'a str,
}

impl<'a, T: ProcessTable> KernelSampler<'a, T> {
    pub fn new(table: &'a T, marker: &'a str) -> Self {
        Self { table, marker }
    }

    /// Yields every live process with an argument equal to the marker.
    ///
    /// The PID list is read once up front; command lines are read one by one
    /// as the iterator advances. Processes whose command line cannot be read
    /// are skipped. Each call starts a fresh scan.
    pub fn find_kernel_processes(&self) -> impl Iterator<Item = KernelProcess> + 'a {
        let pids = match self.table.pids() {
            Ok(pids) => pids,
            Err(e) => {
                warn!(error = %e, "failed to list processes");
                Vec::new()
            }
        };

        let table = self.table;
        let marker = self.marker;
        pids.into_iter().filter_map(move |pid| {
            let cmdline = match table.cmdline(pid) {
                Ok(cmdline) => cmdline,
                Err(e) => {
                    trace!(pid, error = %e, "skipping process");
                    return None;
                }
            };
            cmdline
                .iter()
                .any(|arg| arg == marker)
                .then_some(KernelProcess { pid, cmdline })
        })
    }
}
