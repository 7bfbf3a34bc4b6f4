//! Realtime priority elevation
//!
//! Puts the monitor into `SCHED_RR` at maximum priority so heavy load on
//! the host cannot starve the sampling loop into interval overruns.

#![allow(unsafe_code)] // scheduler syscalls require unsafe

use std::fs::OpenOptions;
use std::io::{self, Write};

use log::debug;

/// Elevate the calling process to maximum `SCHED_RR` priority.
///
/// On hosts with a cpu cgroup hierarchy the process first registers itself
/// in the root group's task list; without that the kernel refuses realtime
/// scheduling for cgrouped processes.
pub fn elevate_realtime() -> io::Result<()> {
    if let Ok(mut tasks) = OpenOptions::new().write(true).open("/sys/fs/cgroup/cpu/tasks") {
        write!(tasks, "{}", std::process::id())?;
    }

    // SAFETY: plain syscall.
    let priority = unsafe { libc::sched_get_priority_max(libc::SCHED_RR) };
    if priority < 0 {
        return Err(io::Error::last_os_error());
    }
    let param = libc::sched_param { sched_priority: priority };
    // SAFETY: param is a properly initialized sched_param; 0 targets the
    // calling process.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    debug!("elevated to SCHED_RR priority {priority}");
    Ok(())
}
