//! Shared task-tracking state
//!
//! The presence bitmap and the task registry are written by the
//! process-event listener and the bootstrap scanner, and read by the
//! sampling scheduler. Both wrap their own lock; the live-thread counter is
//! a bare atomic that display code may read stale.
//!
//! Everything here is constructed once in `main` and injected via `Arc` -
//! there is no ambient global state.

pub mod bitmap;
pub mod bootstrap;
pub mod registry;

pub use bitmap::PresenceBitmap;
pub use registry::{TaskRecord, TaskRegistry};

use std::sync::atomic::{AtomicU32, Ordering};

use crate::domain::{MonitorError, Pid, Tid};

/// Fallback thread-id universe when `/proc/sys/kernel/pid_max` is unreadable.
pub const DEFAULT_PID_MAX: u32 = 32768;

/// The shared tables every thread of the monitor works against.
pub struct TaskTracker {
    pub bitmap: PresenceBitmap,
    pub registry: TaskRegistry,
    live_threads: AtomicU32,
}

impl TaskTracker {
    #[must_use]
    pub fn new(universe: u32) -> Self {
        Self {
            bitmap: PresenceBitmap::new(universe),
            registry: TaskRegistry::new(),
            live_threads: AtomicU32::new(0),
        }
    }

    /// Register a thread exactly as a fork notification would: mark the
    /// presence bit, create the registry record, bump the live counter.
    ///
    /// Double-registration (a fork event racing the bootstrap scan) is
    /// absorbed by the registry's idempotent create; the counter only moves
    /// when a record was actually created.
    pub fn register(&self, tid: Tid, tgid: Pid) -> Result<(), MonitorError> {
        self.bitmap.set(tid)?;
        if self.registry.create(tid, tgid) {
            self.live_threads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Forget an exited thread. Unknown ids are a no-op.
    pub fn deregister(&self, tid: Tid) -> Result<(), MonitorError> {
        self.bitmap.clear(tid)?;
        if self.registry.remove(tid) {
            self.live_threads.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Currently tracked thread count. Display only; may be stale.
    #[must_use]
    pub fn live_threads(&self) -> u32 {
        self.live_threads.load(Ordering::Relaxed)
    }
}

/// Detect the platform thread-id limit once at startup.
///
/// Falls back to the kernel default when the sysctl cannot be read, so the
/// monitor still works in restricted environments.
#[must_use]
pub fn detect_pid_max() -> u32 {
    match std::fs::read_to_string("/proc/sys/kernel/pid_max") {
        Ok(s) => s.trim().parse().unwrap_or(DEFAULT_PID_MAX),
        Err(_) => DEFAULT_PID_MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let tracker = TaskTracker::new(1024);
        tracker.register(Tid(7), Pid(7)).unwrap();
        tracker.register(Tid(7), Pid(7)).unwrap();
        assert_eq!(tracker.live_threads(), 1);
        assert!(tracker.bitmap.test(Tid(7)).unwrap());
    }

    #[test]
    fn test_deregister_unknown_leaves_counter_alone() {
        let tracker = TaskTracker::new(1024);
        tracker.register(Tid(7), Pid(7)).unwrap();
        tracker.deregister(Tid(99)).unwrap();
        assert_eq!(tracker.live_threads(), 1);
        tracker.deregister(Tid(7)).unwrap();
        assert_eq!(tracker.live_threads(), 0);
        assert!(!tracker.bitmap.test(Tid(7)).unwrap());
    }
}
