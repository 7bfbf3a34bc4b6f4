//! Cycle scheduler
//!
//! Drives one measurement cycle: enumerate the presence bitmap, query every
//! live thread over netlink, sample host CPU and memory counters, drain the
//! ranking cache to the renderer, then sleep whatever is left of the target
//! interval. A cycle that does not fit its interval is fatal - the monitor
//! refuses to silently drift.
//!
//! Cycle 0 is the sync cycle: it seeds the delta baselines on a fixed
//! one-second interval and renders no data rows.

use std::mem::size_of;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use taskmon_common::Taskstats;

use crate::domain::{CpuId, MonitorError, Tid};
use crate::netlink::StatsClient;
use crate::render::Renderer;
use crate::sampling::cache::RankingCache;
use crate::sampling::cpu::CpuData;
use crate::sampling::delta::{self, CycleSums};
use crate::sampling::memory;
use crate::tracking::TaskTracker;

/// Baseline seeding runs on a fixed short interval regardless of the target.
const SYNC_INTERVAL: Duration = Duration::from_secs(1);

pub struct CycleScheduler {
    tracker: Arc<TaskTracker>,
    stats: StatsClient,
    cpu: CpuData,
    cache: RankingCache,
    renderer: Box<dyn Renderer>,
    target: Duration,
    cycles_done: u64,
    banner_shown: bool,
    sums: CycleSums,
}

impl CycleScheduler {
    #[must_use]
    pub fn new(
        tracker: Arc<TaskTracker>,
        stats: StatsClient,
        cpu: CpuData,
        cache: RankingCache,
        renderer: Box<dyn Renderer>,
        target: Duration,
    ) -> Self {
        Self {
            tracker,
            stats,
            cpu,
            cache,
            renderer,
            target,
            cycles_done: 0,
            banner_shown: false,
            sums: CycleSums::default(),
        }
    }

    /// Run measurement cycles until the optional limit is reached.
    ///
    /// The renderer is torn down on every exit path, fatal aborts included,
    /// so a full-screen renderer leaves the terminal usable behind it.
    pub fn run(&mut self, limit: Option<u64>) -> Result<(), MonitorError> {
        self.renderer.init()?;
        let result = self.run_cycles(limit);
        let teardown = self.renderer.finish();
        if result.is_ok() {
            self.stats.deregister_cpumask();
        }
        result.and(teardown.map_err(MonitorError::from))
    }

    fn run_cycles(&mut self, limit: Option<u64>) -> Result<(), MonitorError> {
        let mut remaining = limit;
        loop {
            if remaining == Some(0) {
                return Ok(());
            }
            self.one_cycle()?;
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }
    }

    fn one_cycle(&mut self) -> Result<(), MonitorError> {
        self.sums.reset();
        if self.cycles_done == 0 {
            self.renderer.sync();
        } else {
            self.renderer.cycle_start(self.cycles_done, self.tracker.live_threads());
        }

        let started = Instant::now();

        self.collect()?;
        let mem = memory::sample()?;
        self.cpu.sample()?;

        for rec in self.cache.walk() {
            self.renderer.task_row(rec);
        }
        if self.cycles_done > 0 {
            self.renderer.mem_row(mem.total_kb, mem.free_kb);
            #[allow(clippy::cast_possible_truncation)]
            for (cpu, delta) in self.cpu.deltas().iter().enumerate() {
                self.sums.cpu_utime_ms += delta.user;
                self.sums.cpu_stime_ms += delta.system;
                self.renderer.cpu_row(CpuId(cpu as u32), delta);
            }
        }
        self.cache.flush();

        let elapsed = started.elapsed();
        if self.cycles_done > 0 {
            self.renderer.cycle_end(elapsed, &self.sums);
        }

        // Overrun check against the target even on the sync cycle.
        remaining_in(elapsed, self.target)?;
        let interval = if self.cycles_done == 0 { SYNC_INTERVAL } else { self.target };
        sleep_until(started + interval);

        self.cycles_done += 1;
        Ok(())
    }

    /// Query every thread the bitmap knows about, in increasing id order.
    fn collect(&mut self) -> Result<(), MonitorError> {
        for id in 0..self.tracker.bitmap.universe() {
            let tid = Tid(id);
            if !self.tracker.bitmap.test(tid)? {
                continue;
            }
            let Some(ts) = self.stats.query(tid)? else {
                // Exited between the bitmap scan and the query.
                continue;
            };
            if !self.banner_shown {
                self.renderer.banner(ts.version, size_of::<Taskstats>());
                self.banner_shown = true;
            }
            let Some(rec) = delta::apply_sample(&self.tracker.registry, &ts, &mut self.sums)?
            else {
                continue;
            };
            // The sync cycle only seeds baselines; idle threads stay out of
            // the cache in any cycle.
            if self.cycles_done > 0 && rec.has_activity() {
                self.cache.insert(rec);
            }
        }
        debug!("cycle {} collected, cache empty: {}", self.cycles_done, self.cache.is_empty());
        Ok(())
    }
}

/// Sleep budget left in the interval; an exhausted budget means the
/// configured interval cannot absorb the sampling overhead.
pub fn remaining_in(elapsed: Duration, target: Duration) -> Result<Duration, MonitorError> {
    if elapsed >= target {
        return Err(MonitorError::IntervalTooShort { elapsed, target });
    }
    Ok(target - elapsed)
}

/// Deadline-based wait: an interrupted or short sleep resumes with the
/// remainder instead of restarting the full duration.
fn sleep_until(deadline: Instant) {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(deadline - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_cannot_be_met() {
        let err = remaining_in(Duration::from_micros(1), Duration::ZERO).unwrap_err();
        assert!(matches!(err, MonitorError::IntervalTooShort { .. }));
    }

    #[test]
    fn test_exactly_exhausted_interval_is_fatal() {
        let target = Duration::from_millis(100);
        assert!(remaining_in(target, target).is_err());
    }

    #[test]
    fn test_remaining_budget() {
        let left =
            remaining_in(Duration::from_millis(300), Duration::from_secs(1)).unwrap();
        assert_eq!(left, Duration::from_millis(700));
    }

    #[test]
    fn test_sleep_until_past_deadline_returns() {
        let before = Instant::now();
        sleep_until(before);
        sleep_until(before + Duration::from_millis(5));
        assert!(before.elapsed() >= Duration::from_millis(5));
    }
}
