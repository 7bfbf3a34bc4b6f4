//! End-to-end pipeline test: fork events seed the tracker, raw samples flow
//! through the delta engine into the ranking cache, exits tear state down.
//! Everything below the netlink socket is exercised with synthetic samples.

#![allow(unsafe_code)] // synthesizing kernel accounting records

use taskmon::domain::{Pid, Tid};
use taskmon::sampling::{CycleSums, RankingCache, SortKey};
use taskmon::sampling::delta::apply_sample;
use taskmon::tracking::TaskTracker;
use taskmon_common::{Taskstats, TS_COMM_LEN};

fn raw_sample(tid: u32, comm: &str, utime: u64, stime: u64) -> Taskstats {
    // SAFETY: Taskstats is plain-old-data, all-zeroes is valid.
    let mut ts: Taskstats = unsafe { std::mem::zeroed() };
    ts.version = 8;
    ts.ac_pid = tid;
    ts.ac_utime = utime;
    ts.ac_stime = stime;
    ts.ac_comm[..comm.len().min(TS_COMM_LEN)].copy_from_slice(comm.as_bytes());
    ts
}

#[test]
fn test_sampled_delta_reaches_the_cache() {
    let tracker = TaskTracker::new(1024);
    let mut cache = RankingCache::new(SortKey::Time);
    let mut sums = CycleSums::default();

    // Fork notification for tid 42, then a first (baseline) sample.
    tracker.register(Tid(42), Pid(40)).unwrap();
    let baseline = raw_sample(42, "worker", 1000, 500);
    let delta = apply_sample(&tracker.registry, &baseline, &mut sums).unwrap().unwrap();
    assert_eq!(delta.utime, 1000);

    // Next cycle: counters moved by 500/200.
    let second = raw_sample(42, "worker", 1500, 700);
    let delta = apply_sample(&tracker.registry, &second, &mut sums).unwrap().unwrap();
    assert_eq!(delta.utime, 500);
    assert_eq!(delta.stime, 200);
    assert_eq!(delta.pid, Pid(40));
    assert!(delta.has_activity());
    cache.insert(delta);

    // The registry now carries the new absolutes.
    {
        let rec = tracker.registry.acquire(Tid(42)).unwrap();
        assert_eq!(rec.utime, 1500);
        assert_eq!(rec.stime, 700);
    }

    let walked: Vec<_> = cache.walk().collect();
    assert_eq!(walked.len(), 1);
    assert_eq!(walked[0].tid, Tid(42));
    assert_eq!(walked[0].comm, "worker");
}

#[test]
fn test_idle_threads_are_suppressed() {
    let tracker = TaskTracker::new(1024);
    let mut cache = RankingCache::new(SortKey::Time);
    let mut sums = CycleSums::default();

    tracker.register(Tid(7), Pid(7)).unwrap();
    let sample = raw_sample(7, "sleeper", 300, 100);
    apply_sample(&tracker.registry, &sample, &mut sums).unwrap();

    // Identical raw counters one cycle later: an all-zero delta that must
    // never reach the renderer.
    let delta = apply_sample(&tracker.registry, &sample, &mut sums).unwrap().unwrap();
    assert!(!delta.has_activity());
    if delta.has_activity() {
        cache.insert(delta);
    }
    assert_eq!(cache.walk().count(), 0);
}

#[test]
fn test_fork_exit_interleaving_keeps_registry_consistent() {
    let tracker = TaskTracker::new(1024);

    // Bootstrap scan and a racing fork event both report tid 10.
    tracker.register(Tid(10), Pid(10)).unwrap();
    tracker.register(Tid(10), Pid(10)).unwrap();
    tracker.register(Tid(11), Pid(10)).unwrap();
    assert_eq!(tracker.live_threads(), 2);

    // Exit of 10, then a duplicate (late) exit.
    tracker.deregister(Tid(10)).unwrap();
    tracker.deregister(Tid(10)).unwrap();
    assert_eq!(tracker.live_threads(), 1);
    assert!(!tracker.bitmap.test(Tid(10)).unwrap());
    assert!(tracker.registry.acquire(Tid(10)).is_none());
    assert!(tracker.registry.acquire(Tid(11)).is_some());
}

#[test]
fn test_cycle_ranking_across_tasks() {
    let tracker = TaskTracker::new(1024);
    let mut cache = RankingCache::new(SortKey::Time);
    let mut sums = CycleSums::default();

    for (tid, utime, stime) in [(1u32, 100u64, 50u64), (2, 500, 200), (3, 300, 0)] {
        tracker.register(Tid(tid), Pid(tid)).unwrap();
        let baseline = raw_sample(tid, "task", 0, 0);
        apply_sample(&tracker.registry, &baseline, &mut sums).unwrap();
        let moved = raw_sample(tid, "task", utime, stime);
        let delta = apply_sample(&tracker.registry, &moved, &mut sums).unwrap().unwrap();
        if delta.has_activity() {
            cache.insert(delta);
        }
    }

    let order: Vec<_> = cache.walk().map(|r| r.tid.0).collect();
    assert_eq!(order, vec![2, 3, 1]); // descending by user+system

    cache.flush();
    assert!(cache.is_empty());
    assert_eq!(cache.walk().count(), 0);
}
