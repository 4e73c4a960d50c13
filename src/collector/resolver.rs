//! Attribution of kernel processes to host sessions.
//!
//! The host knows kernels only by id, and the OS knows them only by PID.
//! The link is the connection file: kernel launchers receive it as their
//! last argument, and its file name embeds the kernel id. Matching is
//! therefore a substring test on that argument. It is a heuristic: an id that
//! happens to occur inside an unrelated path would also match, and a
//! launcher that passes the connection file elsewhere never matches.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::collector::procfs::MemoryInfo;
use crate::collector::sampler::KernelProcess;
use crate::collector::traits::ProcessTable;
use crate::session::Session;

/// Memory of the process attributed to one kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelUsage {
    pub kernel_id: String,
    pub pid: u32,
    pub memory: MemoryInfo,
}

/// Matches candidates to the kernel ids of `sessions`.
///
/// A candidate matches a kernel when its last argument contains the kernel
/// id. For each kernel the first matching candidate in iteration order wins.
/// Kernels with no match are absent. Candidates stop being consumed once
/// every kernel is matched.
pub fn match_kernels(
    sessions: &[Session],
    candidates: impl IntoIterator<Item = KernelProcess>,
) -> BTreeMap<String, KernelProcess> {
    let mut pending: Vec<&str> = Vec::with_capacity(sessions.len());
    for session in sessions {
        let id = session.kernel.id.as_str();
        if !id.is_empty() && !pending.contains(&id) {
            pending.push(id);
        }
    }

    let mut matched = BTreeMap::new();
    if pending.is_empty() {
        return matched;
    }

    for candidate in candidates {
        let Some(last_arg) = candidate.last_arg() else {
            continue;
        };
        let (hits, rest): (Vec<&str>, Vec<&str>) =
            pending.iter().copied().partition(|id| last_arg.contains(id));
        if hits.is_empty() {
            continue;
        }
        pending = rest;
        for kernel_id in hits {
            trace!(kernel_id, pid = candidate.pid, "kernel matched");
            matched.insert(kernel_id.to_string(), candidate.clone());
        }
        if pending.is_empty() {
            break;
        }
    }

    matched
}

/// Resolves each session's kernel to the memory of its process.
///
/// Kernels whose matched process cannot be read any more are dropped for
/// this round; a later candidate is not tried in its place.
pub fn resolve<T: ProcessTable>(
    sessions: &[Session],
    candidates: impl IntoIterator<Item = KernelProcess>,
    table: &T,
) -> BTreeMap<String, KernelUsage> {
    let mut resolved = BTreeMap::new();

    for (kernel_id, process) in match_kernels(sessions, candidates) {
        match table.memory_info(process.pid) {
            Ok(memory) => {
                resolved.insert(
                    kernel_id.clone(),
                    KernelUsage {
                        kernel_id,
                        pid: process.pid,
                        memory,
                    },
                );
            }
            Err(e) => {
                debug!(
                    kernel_id = %kernel_id,
                    pid = process.pid,
                    error = %e,
                    "dropping kernel for this tick"
                );
            }
        }
    }

    resolved
}
