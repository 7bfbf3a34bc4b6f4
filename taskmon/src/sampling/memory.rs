//! Host memory counter sampling
//!
//! Only the first two lines of `/proc/meminfo` matter here:
//! ```text
//! MemTotal:        4980832 kB
//! MemFree:         1376304 kB
//! ```

use std::fs;

use crate::domain::MonitorError;

/// System-wide memory snapshot, in kB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_kb: u64,
    pub free_kb: u64,
}

impl MemInfo {
    #[must_use]
    pub fn used_kb(&self) -> u64 {
        self.total_kb - self.free_kb
    }
}

/// Read the current totals out of procfs.
pub fn sample() -> Result<MemInfo, MonitorError> {
    parse(&fs::read_to_string("/proc/meminfo")?)
}

/// Parse a `/proc/meminfo` text. Missing or garbled `MemTotal`/`MemFree`
/// lines are a fatal inconsistency.
pub fn parse(text: &str) -> Result<MemInfo, MonitorError> {
    let total_kb = parse_line(text, "MemTotal:")?;
    let free_kb = parse_line(text, "MemFree:")?;
    Ok(MemInfo { total_kb, free_kb })
}

fn parse_line(text: &str, key: &str) -> Result<u64, MonitorError> {
    let malformed = |line: &str| MonitorError::MalformedCounterLine {
        source_file: "/proc/meminfo",
        line: line.to_string(),
    };
    let line = text.lines().find(|l| l.starts_with(key)).ok_or_else(|| malformed(key))?;
    line.split_whitespace().nth(1).and_then(|v| v.parse().ok()).ok_or_else(|| malformed(line))
}
