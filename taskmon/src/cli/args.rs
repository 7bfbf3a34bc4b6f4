//! CLI argument definitions

use std::time::Duration;

use clap::Parser;

use crate::render::OutputMode;
use crate::sampling::cache::SortKey;

#[derive(Parser)]
#[command(
    name = "taskmon",
    about = "Per-thread CPU, memory and I/O monitor over netlink taskstats",
    after_help = "\
EXAMPLES:
    sudo taskmon                             Dashboard, 1s interval, sorted by CPU time
    sudo taskmon -o stdout -s io             Console output ranked by I/O volume
    sudo taskmon -o csv -m 500 -c 120        500ms intervals, 120 cycles of CSV"
)]
pub struct Args {
    /// Output mode
    #[arg(short, long, value_enum, default_value = "term")]
    pub output: OutputMode,

    /// Ranking key for the per-thread table
    #[arg(short, long, value_enum, default_value = "time")]
    pub sort: SortKey,

    /// Measurement interval, seconds part
    #[arg(short = 't', long, default_value_t = 1)]
    pub seconds: u64,

    /// Measurement interval, milliseconds part (added to the seconds part)
    #[arg(short = 'm', long, default_value_t = 0)]
    pub milliseconds: u64,

    /// Stop after N cycles (0 = run until interrupted)
    #[arg(short, long, default_value_t = 0)]
    pub cycles: u64,

    /// Run with SCHED_RR realtime priority
    #[arg(long)]
    pub realtime: bool,

    /// Report each CPU separately instead of the aggregate line
    #[arg(long)]
    pub all_cpus: bool,
}

impl Args {
    /// The target measurement interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.seconds) + Duration::from_millis(self.milliseconds)
    }

    /// The cycle limit, if one was requested.
    #[must_use]
    pub fn cycle_limit(&self) -> Option<u64> {
        (self.cycles > 0).then_some(self.cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["taskmon"]);
        assert_eq!(args.interval(), Duration::from_secs(1));
        assert_eq!(args.cycle_limit(), None);
        assert_eq!(args.output, OutputMode::Term);
        assert_eq!(args.sort, SortKey::Time);
    }

    #[test]
    fn test_interval_parts_add_up() {
        let args = Args::parse_from(["taskmon", "-t", "0", "-m", "250"]);
        assert_eq!(args.interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_cycle_limit() {
        let args = Args::parse_from(["taskmon", "-c", "10"]);
        assert_eq!(args.cycle_limit(), Some(10));
    }
}
