//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions over file contents, so they are tested with
//! string inputs and never touch the real filesystem.

use std::collections::HashMap;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Parses the parent PID out of `/proc/[pid]/stat` content.
///
/// The comm field can contain spaces and parentheses, so the fields after
/// it are located from the last `)`.
pub fn parse_stat_ppid(content: &str) -> Result<u32, ParseError> {
    let close_paren = content
        .rfind(')')
        .ok_or_else(|| ParseError::new("missing ')' in stat"))?;

    // state, ppid, ...
    content[close_paren + 1..]
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ParseError::new("missing ppid in stat"))?
        .parse()
        .map_err(|_| ParseError::new("invalid ppid in stat"))
}

/// Memory accounting of a single process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Resident set size (`VmRSS`).
    pub rss: u64,
    /// Virtual memory size (`VmSize`).
    pub vms: u64,
    /// Resident file-backed and shared memory (`RssFile + RssShmem`).
    pub shared: u64,
    /// Swapped-out anonymous memory (`VmSwap`).
    pub swap: u64,
    /// Data + stack segment size (`VmData`).
    pub data: u64,
}

/// Parses the memory fields of `/proc/[pid]/status`.
///
/// Format is `key:\tvalue` pairs, one per line. Memory fields are reported
/// in kB and converted to bytes. Kernel threads and zombies have no `Vm*`
/// lines at all, which yields zeroes.
pub fn parse_proc_status(content: &str) -> Result<MemoryInfo, ParseError> {
    let mut fields: HashMap<&str, &str> = HashMap::new();

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim(), value.trim());
        }
    }

    if fields.is_empty() {
        return Err(ParseError::new("empty status"));
    }

    let parse_kb = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(|s| s.split_whitespace().next())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0)
            * 1024
    };

    Ok(MemoryInfo {
        rss: parse_kb("VmRSS"),
        vms: parse_kb("VmSize"),
        shared: parse_kb("RssFile") + parse_kb("RssShmem"),
        swap: parse_kb("VmSwap"),
        data: parse_kb("VmData"),
    })
}

/// Parses `MemTotal` out of `/proc/meminfo`, in bytes.
///
/// Fails when `MemTotal` is absent, since a zero machine size is never a
/// valid reading.
pub fn parse_mem_total(content: &str) -> Result<u64, ParseError> {
    let line = content
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .ok_or_else(|| ParseError::new("MemTotal missing from meminfo"))?;

    let kb: u64 = line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::new("invalid MemTotal in meminfo"))?;
    Ok(kb * 1024)
}

/// Splits `/proc/[pid]/cmdline` into its arguments.
///
/// Arguments are NUL-terminated and empty arguments are kept. A process that
/// rewrote its argv as one space-separated title (no trailing NUL, or a
/// single NUL-terminated string with spaces) is split on spaces instead.
pub fn parse_cmdline(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let sep = if content.ends_with('\0') { '\0' } else { ' ' };
    let trimmed = content.strip_suffix(sep).unwrap_or(content);
    let mut args: Vec<&str> = trimmed.split(sep).collect();

    if sep == '\0' && args.len() == 1 && trimmed.contains(' ') {
        args = trimmed.split(' ').collect();
    }

    args.into_iter().map(str::to_string).collect()
}
