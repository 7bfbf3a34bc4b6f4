//! Per-task delta computation
//!
//! Turns one raw taskstats sample into the interval delta against the
//! registry's last-seen counters, updating the record in place. Kernel
//! counters are defined monotonic for a task's lifetime, so any decrease is
//! a fatal consistency violation rather than something to clamp away.

use log::debug;
use taskmon_common::Taskstats;

use crate::domain::{MonitorError, Pid, Tid};
use crate::tracking::TaskRegistry;

/// One thread's activity during the current interval.
///
/// Time fields are microseconds, delay fields nanoseconds, `rss` MB-usec,
/// matching the raw taskstats units.
#[derive(Debug, Clone, Default)]
pub struct DeltaRecord {
    pub pid: Pid,
    pub tid: Tid,
    pub comm: String,
    pub utime: u64,
    pub stime: u64,
    pub cpu_delay: u64,
    pub rss: u64,
    pub read_bytes: u64,
    pub written_bytes: u64,
    pub blkio_delay: u64,
}

impl DeltaRecord {
    /// Idle threads are suppressed from output: anything non-zero counts.
    #[must_use]
    pub fn has_activity(&self) -> bool {
        self.utime != 0
            || self.stime != 0
            || self.cpu_delay != 0
            || self.rss != 0
            || self.read_bytes != 0
            || self.written_bytes != 0
            || self.blkio_delay != 0
    }

    /// Combined CPU time, microseconds.
    #[must_use]
    pub fn total_time(&self) -> u64 {
        self.utime + self.stime
    }

    /// Combined I/O volume, bytes.
    #[must_use]
    pub fn total_io(&self) -> u64 {
        self.read_bytes + self.written_bytes
    }

    /// Average resident memory over the CPU time spent, MB; 0 for threads
    /// that burned no CPU this interval.
    #[must_use]
    pub fn mem_per_time(&self) -> u64 {
        match self.total_time() {
            0 => 0,
            t => self.rss / t,
        }
    }
}

/// Interval-wide sums, in milliseconds, for the cycle-end cross-check of
/// taskstats against `/proc/stat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSums {
    pub task_utime_ms: u64,
    pub task_stime_ms: u64,
    pub cpu_utime_ms: u64,
    pub cpu_stime_ms: u64,
}

impl CycleSums {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn checked_delta(
    tid: Tid,
    field: &'static str,
    old: u64,
    new: u64,
) -> Result<u64, MonitorError> {
    if new < old {
        return Err(MonitorError::CounterRegression { tid, field, old, new });
    }
    Ok(new - old)
}

/// Fold one decoded sample into the registry and produce its delta record.
///
/// `Ok(None)` means the thread is no longer tracked (it exited after the
/// query was answered); nothing to report. The registry record is acquired,
/// updated and released here; the time sums are accumulated on the way out.
pub fn apply_sample(
    registry: &TaskRegistry,
    ts: &Taskstats,
    sums: &mut CycleSums,
) -> Result<Option<DeltaRecord>, MonitorError> {
    let tid = Tid(ts.ac_pid);
    let Some(mut record) = registry.acquire(tid) else {
        debug!("no registry record for {tid}, exited after query");
        return Ok(None);
    };

    let delta = DeltaRecord {
        pid: record.tgid,
        tid,
        comm: ts.comm().to_string(),
        utime: checked_delta(tid, "utime", record.utime, ts.ac_utime)?,
        stime: checked_delta(tid, "stime", record.stime, ts.ac_stime)?,
        cpu_delay: checked_delta(tid, "cpu delay", record.cpu_delay, ts.cpu_delay_total)?,
        rss: checked_delta(tid, "rss", record.rss, ts.coremem)?,
        read_bytes: checked_delta(tid, "io read", record.read_bytes, ts.read_char)?,
        written_bytes: checked_delta(tid, "io write", record.written_bytes, ts.write_char)?,
        blkio_delay: checked_delta(tid, "blkio delay", record.blkio_delay, ts.blkio_delay_total)?,
    };

    // Store the new absolute values.
    record.utime = ts.ac_utime;
    record.stime = ts.ac_stime;
    record.cpu_delay = ts.cpu_delay_total;
    record.rss = ts.coremem;
    record.read_bytes = ts.read_char;
    record.written_bytes = ts.write_char;
    record.blkio_delay = ts.blkio_delay_total;
    drop(record);

    if ts.ac_exitcode != 0 {
        debug!("exiting task: {} [{}]", tid, ts.comm());
    }

    sums.task_utime_ms += delta.utime / 1000;
    sums.task_stime_ms += delta.stime / 1000;

    Ok(Some(delta))
}
