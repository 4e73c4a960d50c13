//! Per-tick orchestration: sessions, kernels, aggregate memory.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::collector::procfs::CollectError;
use crate::collector::resolver::resolve;
use crate::collector::sampler::{DEFAULT_KERNEL_MARKER, KernelSampler};
use crate::collector::traits::ProcessTable;
use crate::metrics::{
    GaugeSink, KERNEL_ID_LABEL, KERNEL_MEMORY_USAGE, MAX_MEMORY_USAGE, TOTAL_MEMORY_USAGE,
};
use crate::session::SessionRegistry;

/// Runtime settings of a [`MetricsCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Root of the process tree whose memory is summed into `total_memory_usage`.
    pub root_pid: u32,
    /// Command-line argument that marks a kernel process.
    pub kernel_marker: String,
}

/// PID of the process that launched the exporter.
///
/// The exporter normally runs as a child of the notebook server, so this is
/// the default root of the summed process tree.
#[cfg(unix)]
pub fn host_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
pub fn host_pid() -> u32 {
    std::process::id()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            root_pid: host_pid(),
            kernel_marker: DEFAULT_KERNEL_MARKER.to_string(),
        }
    }
}

/// Timing breakdown of one tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickTiming {
    /// Whole tick.
    pub total: Duration,
    /// Session registry query.
    pub sessions: Duration,
    /// Kernel discovery, matching and publishing.
    pub kernels: Duration,
    /// Process tree and machine memory.
    pub aggregate: Duration,
}

/// Outcome of one tick, for logging.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Sessions returned by the registry (0 when the query failed).
    pub sessions: usize,
    /// Kernels that got a gauge update.
    pub kernels_resolved: usize,
    /// Published `total_memory_usage`, if the root could be read.
    pub total_rss: Option<u64>,
    /// Published `max_memory_usage`, if meminfo could be read.
    pub machine_memory: Option<u64>,
    /// Descendants left out of the aggregate because their read failed.
    pub skipped_processes: usize,
    /// Whether the session query failed.
    pub registry_failed: bool,
    pub timing: TickTiming,
}

/// Resident memory of a process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeRss {
    /// Sum over the root and every readable descendant, in bytes.
    pub bytes: u64,
    /// Processes in the tree, root included.
    pub processes: usize,
    /// Descendants that could not be read.
    pub skipped: usize,
}

/// Sums the RSS of `root` and all its descendants.
///
/// A descendant whose memory cannot be read is left out. Failing to read
/// the root itself, or to list its descendants, is an error.
pub fn aggregate_rss<T: ProcessTable>(table: &T, root: u32) -> Result<TreeRss, CollectError> {
    let mut total = TreeRss {
        bytes: table.memory_info(root)?.rss,
        processes: 1,
        skipped: 0,
    };

    for pid in table.children(root)? {
        match table.memory_info(pid) {
            Ok(memory) => {
                total.bytes += memory.rss;
                total.processes += 1;
            }
            Err(e) => {
                trace!(pid, error = %e, "skipping process");
                total.skipped += 1;
            }
        }
    }

    Ok(total)
}

/// Samples kernel and server memory and publishes it to a [`GaugeSink`].
///
/// The collector is the only writer of the gauges. It keeps no state between
/// ticks: everything is read again from the registry and the process table.
pub struct MetricsCollector<R, T, S> {
    registry: R,
    table: T,
    sink: S,
    config: CollectorConfig,
}

impl<R, T, S> MetricsCollector<R, T, S>
where
    R: SessionRegistry,
    T: ProcessTable,
    S: GaugeSink,
{
    pub fn new(registry: R, table: T, sink: S, config: CollectorConfig) -> Self {
        Self {
            registry,
            table,
            sink,
            config,
        }
    }

    pub fn table_mut(&mut self) -> &mut T {
        &mut self.table
    }

    /// Runs one sampling cycle.
    ///
    /// Never fails: a failed session query counts as no sessions, and any
    /// process or meminfo read failure only skips the affected gauge update.
    pub async fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        let t = Instant::now();
        let sessions = match self.registry.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "failed to list sessions, skipping kernel gauges");
                report.registry_failed = true;
                Vec::new()
            }
        };
        report.sessions = sessions.len();
        report.timing.sessions = t.elapsed();

        let t = Instant::now();
        let sampler = KernelSampler::new(&self.table, &self.config.kernel_marker);
        let kernels = resolve(&sessions, sampler.find_kernel_processes(), &self.table);
        for usage in kernels.values() {
            self.sink.set_gauge(
                KERNEL_MEMORY_USAGE,
                &[(KERNEL_ID_LABEL, usage.kernel_id.as_str())],
                usage.memory.rss as f64,
            );
        }
        report.kernels_resolved = kernels.len();
        report.timing.kernels = t.elapsed();

        let t = Instant::now();
        match aggregate_rss(&self.table, self.config.root_pid) {
            Ok(tree) => {
                self.sink.set_gauge(TOTAL_MEMORY_USAGE, &[], tree.bytes as f64);
                report.total_rss = Some(tree.bytes);
                report.skipped_processes = tree.skipped;
            }
            Err(e) => {
                warn!(
                    pid = self.config.root_pid,
                    error = %e,
                    "failed to read root process, skipping total_memory_usage"
                );
            }
        }

        match self.table.total_memory() {
            Ok(bytes) => {
                self.sink.set_gauge(MAX_MEMORY_USAGE, &[], bytes as f64);
                report.machine_memory = Some(bytes);
            }
            Err(e) => {
                warn!(error = %e, "failed to read machine memory, skipping max_memory_usage");
            }
        }
        report.timing.aggregate = t.elapsed();
        report.timing.total = start.elapsed();

        debug!(
            sessions = report.sessions,
            kernels = report.kernels_resolved,
            skipped = report.skipped_processes,
            duration_ms = report.timing.total.as_millis() as u64,
            "tick sampled"
        );

        report
    }
}
