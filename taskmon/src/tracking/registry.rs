//! Task registry
//!
//! Maps a thread id to its last-seen cumulative counters. Chained buckets
//! keyed by `tid mod bucket_count` behind one table-wide lock - correctness
//! over per-bucket parallelism, since contention is negligible next to the
//! netlink round-trip the sampler pays per query.
//!
//! `acquire` returns a guard that holds the table lock until dropped, so a
//! record's counters can only be read or written inside an acquire/release
//! window. Every exit path (hit, miss, error) releases by dropping.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::domain::{Pid, Tid};

/// Roughly the number of threads expected on a busy host.
const BUCKET_COUNT: usize = 1024;

/// Last-seen cumulative counters of one tracked thread.
///
/// All fields are monotonically non-decreasing for the thread's lifetime;
/// the delta engine enforces that on every update.
#[derive(Debug, Clone, Default)]
pub struct TaskRecord {
    pub tid: Tid,
    pub tgid: Pid,
    /// User CPU time, microseconds.
    pub utime: u64,
    /// System CPU time, microseconds.
    pub stime: u64,
    /// Runqueue wait time, nanoseconds.
    pub cpu_delay: u64,
    /// Accumulated RSS usage, MB-usec.
    pub rss: u64,
    /// Bytes read (characters, not storage).
    pub read_bytes: u64,
    /// Bytes written.
    pub written_bytes: u64,
    /// Block I/O wait time, nanoseconds.
    pub blkio_delay: u64,
}

type Buckets = Vec<Vec<TaskRecord>>;

/// Concurrent thread-id keyed table owning all [`TaskRecord`]s.
pub struct TaskRegistry {
    buckets: Mutex<Buckets>,
}

/// Exclusive access to one record; dropping it releases the table.
pub struct RecordGuard<'a> {
    guard: MutexGuard<'a, Buckets>,
    bucket: usize,
    slot: usize,
}

impl Deref for RecordGuard<'_> {
    type Target = TaskRecord;

    fn deref(&self) -> &TaskRecord {
        &self.guard[self.bucket][self.slot]
    }
}

impl DerefMut for RecordGuard<'_> {
    fn deref_mut(&mut self) -> &mut TaskRecord {
        &mut self.guard[self.bucket][self.slot]
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { buckets: Mutex::new(vec![Vec::new(); BUCKET_COUNT]) }
    }

    fn bucket(tid: Tid) -> usize {
        tid.0 as usize % BUCKET_COUNT
    }

    /// Insert a zeroed record for `tid`. Idempotent: a duplicate add (fork
    /// event racing the bootstrap scan) is logged and ignored.
    ///
    /// Returns whether a record was created.
    pub fn create(&self, tid: Tid, tgid: Pid) -> bool {
        let mut buckets = self.buckets.lock().expect("registry lock poisoned");
        let chain = &mut buckets[Self::bucket(tid)];
        if chain.iter().any(|r| r.tid == tid) {
            debug!("duplicated add for {tid}");
            return false;
        }
        chain.push(TaskRecord { tid, tgid, ..TaskRecord::default() });
        true
    }

    /// Drop the record for `tid`. Idempotent: removing an id that was never
    /// created (or already removed) is logged and ignored.
    ///
    /// Returns whether a record was removed.
    pub fn remove(&self, tid: Tid) -> bool {
        let mut buckets = self.buckets.lock().expect("registry lock poisoned");
        let chain = &mut buckets[Self::bucket(tid)];
        match chain.iter().position(|r| r.tid == tid) {
            Some(slot) => {
                chain.swap_remove(slot);
                true
            }
            None => {
                debug!("duplicated del for {tid}");
                false
            }
        }
    }

    /// Begin a critical section on the record for `tid`.
    ///
    /// `None` means the thread is no longer (or not yet) tracked; the lock
    /// is released before returning in that case.
    pub fn acquire(&self, tid: Tid) -> Option<RecordGuard<'_>> {
        let guard = self.buckets.lock().expect("registry lock poisoned");
        let bucket = Self::bucket(tid);
        let slot = guard[bucket].iter().position(|r| r.tid == tid)?;
        Some(RecordGuard { guard, bucket, slot })
    }
}
