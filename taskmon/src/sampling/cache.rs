//! Ranking cache
//!
//! Ordered view over this interval's delta records, rebuilt every cycle.
//! The sort key is chosen once at startup; records with equal keys are kept
//! (not replaced) and tie-broken by insertion order. The cache lives only
//! for one cycle: the renderer walks it in order, then it is flushed.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use clap::ValueEnum;

use crate::sampling::delta::DeltaRecord;

/// Ranking key selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    /// Ascending thread id.
    Id,
    /// Task name, case-insensitive ascending.
    Name,
    /// Combined user+system time, descending.
    Time,
    /// Combined read+written bytes, descending.
    Io,
    /// Resident memory per unit of CPU time, descending.
    Mem,
}

/// Precomputed ordering key. Only one variant is ever in play per run, so
/// cross-variant ordering never matters.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum RankKey {
    Id(u32),
    Name(String),
    Time(Reverse<u64>),
    Io(Reverse<u64>),
    Mem(Reverse<u64>),
}

impl RankKey {
    fn compute(sort: SortKey, rec: &DeltaRecord) -> Self {
        match sort {
            SortKey::Id => RankKey::Id(rec.tid.0),
            SortKey::Name => RankKey::Name(rec.comm.to_lowercase()),
            SortKey::Time => RankKey::Time(Reverse(rec.total_time())),
            SortKey::Io => RankKey::Io(Reverse(rec.total_io())),
            SortKey::Mem => RankKey::Mem(Reverse(rec.mem_per_time())),
        }
    }
}

/// One cycle's worth of delta records in ranking order.
pub struct RankingCache {
    sort: SortKey,
    seq: u64,
    tree: BTreeMap<(RankKey, u64), DeltaRecord>,
}

impl RankingCache {
    #[must_use]
    pub fn new(sort: SortKey) -> Self {
        Self { sort, seq: 0, tree: BTreeMap::new() }
    }

    /// Add one record. Always succeeds; duplicate keys are kept and ordered
    /// by insertion.
    pub fn insert(&mut self, rec: DeltaRecord) {
        let key = RankKey::compute(self.sort, &rec);
        self.seq += 1;
        self.tree.insert((key, self.seq), rec);
    }

    /// Lazy in-order walk. Calling `walk` again restarts from the first
    /// record.
    pub fn walk(&self) -> impl Iterator<Item = &DeltaRecord> {
        self.tree.values()
    }

    /// Drop every record. Required at the end of every cycle; the next
    /// cycle's inserts expect an empty cache.
    pub fn flush(&mut self) {
        self.tree.clear();
        self.seq = 0;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Tid;

    fn named(comm: &str) -> DeltaRecord {
        DeltaRecord { comm: comm.to_string(), utime: 1, ..DeltaRecord::default() }
    }

    fn timed(tid: u32, utime: u64, stime: u64) -> DeltaRecord {
        DeltaRecord { tid: Tid(tid), utime, stime, ..DeltaRecord::default() }
    }

    fn walk_tids(cache: &RankingCache) -> Vec<u32> {
        cache.walk().map(|r| r.tid.0).collect()
    }

    #[test]
    fn test_insert_walk_flush_roundtrip() {
        let mut cache = RankingCache::new(SortKey::Id);
        for tid in [30, 10, 20] {
            cache.insert(timed(tid, 1, 0));
        }
        assert_eq!(walk_tids(&cache), vec![10, 20, 30]);
        // A second walk restarts from the beginning.
        assert_eq!(cache.walk().count(), 3);

        cache.flush();
        assert!(cache.is_empty());
        assert_eq!(cache.walk().count(), 0);
    }

    #[test]
    fn test_id_orders_ascending() {
        let mut cache = RankingCache::new(SortKey::Id);
        cache.insert(timed(100_000_000, 1, 0));
        cache.insert(timed(5, 1, 0));
        assert_eq!(walk_tids(&cache), vec![5, 100_000_000]);
    }

    #[test]
    fn test_name_orders_case_insensitively() {
        let mut cache = RankingCache::new(SortKey::Name);
        for comm in ["zsh", "Bash", "bash"] {
            cache.insert(named(comm));
        }
        let names: Vec<_> = cache.walk().map(|r| r.comm.clone()).collect();
        // "Bash" and "bash" are equal-rank; insertion order breaks the tie.
        assert_eq!(names, vec!["Bash", "bash", "zsh"]);
    }

    #[test]
    fn test_time_orders_descending() {
        let mut cache = RankingCache::new(SortKey::Time);
        cache.insert(timed(1, 100, 50));
        cache.insert(timed(2, 500, 200));
        assert_eq!(walk_tids(&cache), vec![2, 1]);
    }

    #[test]
    fn test_io_orders_descending() {
        let mut cache = RankingCache::new(SortKey::Io);
        let mut small = DeltaRecord { tid: Tid(1), read_bytes: 10, ..DeltaRecord::default() };
        let mut big = DeltaRecord { tid: Tid(2), written_bytes: 999, ..DeltaRecord::default() };
        small.comm = "a".into();
        big.comm = "b".into();
        cache.insert(small);
        cache.insert(big);
        assert_eq!(walk_tids(&cache), vec![2, 1]);
    }

    #[test]
    fn test_mem_ranks_zero_cpu_time_last() {
        let mut cache = RankingCache::new(SortKey::Mem);
        // rss but no cpu time: efficiency counts as 0.
        cache.insert(DeltaRecord { tid: Tid(1), rss: 5000, ..DeltaRecord::default() });
        cache.insert(DeltaRecord { tid: Tid(2), rss: 100, utime: 10, ..DeltaRecord::default() });
        assert_eq!(walk_tids(&cache), vec![2, 1]);
    }

    #[test]
    fn test_duplicate_keys_are_all_kept() {
        let mut cache = RankingCache::new(SortKey::Time);
        for tid in [1, 2, 3] {
            cache.insert(timed(tid, 100, 0));
        }
        assert_eq!(walk_tids(&cache), vec![1, 2, 3]);
    }
}
