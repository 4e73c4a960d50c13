//! Memory sampling of a notebook server and its kernels.
//!
//! Reads the Linux `/proc` filesystem, with support for mocking so the whole
//! pipeline runs in tests without a real process tree.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MetricsCollector                       │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │   SessionRegistry   │   │  KernelSampler + resolve()  │  │
//! │  │  - /api/sessions    │   │  - /proc/[pid]/cmdline      │  │
//! │  └─────────────────────┘   │  - /proc/[pid]/status       │  │
//! │                            └──────────────┬──────────────┘  │
//! │       aggregate_rss() ─────────────┐      │                 │
//! │                                    │      │                 │
//! │                             ┌──────▼──────▼┐                │
//! │                             │ ProcessTable │ (trait)        │
//! │                             └──────┬───────┘                │
//! │                                    │                        │
//! │                             ┌──────▼──────┐                 │
//! │                             │  FileSystem │ (trait)         │
//! │                             └──────┬──────┘                 │
//! └────────────────────────────────────┼────────────────────────┘
//!                                      │
//!              ┌───────────────────────┼───────────────┐
//!              │                       │               │
//!       ┌──────▼──────┐         ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │         │   MockFs    │ │  Scenarios  │
//!       │ (Linux)     │         │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘         └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use nbresuse::collector::{CollectorConfig, MetricsCollector, MockFs, ProcfsTable};
//! use nbresuse::metrics::{RecordingSink, TOTAL_MEMORY_USAGE};
//! use nbresuse::session::StaticSessionRegistry;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let table = ProcfsTable::new(MockFs::notebook_server(), "/proc");
//! let sink = Arc::new(RecordingSink::new());
//! let config = CollectorConfig {
//!     root_pid: 2000,
//!     ..CollectorConfig::default()
//! };
//! let mut collector =
//!     MetricsCollector::new(StaticSessionRegistry::new(Vec::new()), table, sink.clone(), config);
//! collector.tick().await;
//! assert!(sink.get(TOTAL_MEMORY_USAGE, &[]).is_some());
//! # });
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod procfs;
pub mod resolver;
pub mod sampler;
pub mod traits;

pub use collector::{
    CollectorConfig, MetricsCollector, TickReport, TickTiming, TreeRss, aggregate_rss, host_pid,
};
pub use mock::MockFs;
pub use procfs::{CollectError, MemoryInfo, ProcfsTable};
pub use resolver::{KernelUsage, match_kernels, resolve};
pub use sampler::{DEFAULT_KERNEL_MARKER, KernelProcess, KernelSampler};
pub use traits::{FileSystem, ProcessTable, RealFs};
