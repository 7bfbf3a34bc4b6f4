//! Procfs bootstrap scan
//!
//! One-shot enumeration of every thread already alive when the monitor
//! starts. Runs concurrently with the event listener (which is subscribed
//! first, so a thread forked mid-scan is caught by one side or the other);
//! double-registration resolves through the registry's idempotent create.

use std::fs;

use log::debug;

use crate::domain::{MonitorError, Pid, Tid};
use crate::tracking::TaskTracker;

/// Seed the tracker with all currently running threads.
///
/// Returns the number of threads found. Processes vanishing mid-scan are
/// expected and skipped; only tracker failures (bitmap overflow) are errors.
pub fn scan(tracker: &TaskTracker) -> Result<u32, MonitorError> {
    let mut found = 0;
    for entry in fs::read_dir("/proc")? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        found += scan_threads(tracker, Pid(pid))?;
    }
    debug!("initial threads found: {found}");
    Ok(found)
}

/// Register every thread of one process, exactly as fork events would.
///
/// The process may be gone by the time we look; that yields zero threads,
/// not an error.
fn scan_threads(tracker: &TaskTracker, pid: Pid) -> Result<u32, MonitorError> {
    let task_dir = format!("/proc/{}/task", pid.0);
    let Ok(entries) = fs::read_dir(task_dir) else {
        return Ok(0);
    };

    let mut count = 0;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        let Some(tid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        tracker.register(Tid(tid), pid)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::detect_pid_max;

    #[test]
    fn test_scan_threads_self() {
        // The test process has at least one thread.
        let tracker = TaskTracker::new(detect_pid_max());
        let pid = Pid(std::process::id());
        let count = scan_threads(&tracker, pid).unwrap();

        #[cfg(target_os = "linux")]
        {
            assert!(count >= 1);
            assert_eq!(tracker.live_threads(), count);
        }
        #[cfg(not(target_os = "linux"))]
        assert_eq!(count, 0);
    }

    #[test]
    fn test_scan_threads_gone_process() {
        let tracker = TaskTracker::new(1024);
        // No such pid can exist, so the task directory read fails cleanly.
        assert_eq!(scan_threads(&tracker, Pid(u32::MAX)).unwrap(), 0);
    }
}
