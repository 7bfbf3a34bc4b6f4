//! Host CPU counter sampling
//!
//! Reads `/proc/stat` once per cycle, keeps the previous sample per CPU and
//! turns the difference into milliseconds using the clock-tick rate detected
//! at startup. The aggregate line is always parsed; per-CPU lines only when
//! requested. An optional current-frequency value is picked up from sysfs
//! where the host exposes it.

use std::fs;

use crate::domain::{CpuId, MonitorError};

/// One row of `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuSample {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

/// Per-interval CPU activity, in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuDelta {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
    /// Current frequency in kHz, where the host exposes it.
    pub freq_khz: Option<u64>,
}

/// CPU counter source with one interval of history.
///
/// History and delta are separate storage; history is overwritten every
/// cycle and only ever touched by the scheduler thread.
pub struct CpuData {
    nr_cpus: usize,
    all_cpus: bool,
    tick_ms: u64,
    hist: Vec<CpuSample>,
    delta: Vec<CpuDelta>,
}

impl CpuData {
    /// Detect the configured CPU count and clock-tick rate once.
    /// No CPU hotplug support.
    pub fn new(all_cpus: bool) -> Result<Self, MonitorError> {
        let nr_cpus = nr_cpus()?;
        let tick_ms = 1000 / clock_ticks_per_sec()?;
        let slots = if all_cpus { nr_cpus } else { 1 };
        Ok(Self {
            nr_cpus,
            all_cpus,
            tick_ms,
            hist: vec![CpuSample::default(); slots],
            delta: vec![CpuDelta::default(); slots],
        })
    }

    /// Configured CPU count, some may be offline.
    #[must_use]
    pub fn nr_cpus(&self) -> usize {
        self.nr_cpus
    }

    /// Take a fresh `/proc/stat` sample and recompute the interval deltas.
    pub fn sample(&mut self) -> Result<(), MonitorError> {
        let text = fs::read_to_string("/proc/stat")?;
        self.sample_from(&text)?;
        if self.all_cpus {
            for cpu in 0..self.nr_cpus {
                self.delta[cpu].freq_khz = read_freq_khz(CpuId(cpu as u32));
            }
        }
        Ok(())
    }

    /// This interval's deltas: one aggregate entry, or one per CPU.
    #[must_use]
    pub fn deltas(&self) -> &[CpuDelta] {
        &self.delta
    }

    fn sample_from(&mut self, text: &str) -> Result<(), MonitorError> {
        let mut lines = text.lines();
        let summary = lines.next().unwrap_or_default();
        if self.all_cpus {
            for (cpu, line) in lines.take_while(|l| l.starts_with("cpu")).enumerate() {
                if cpu >= self.nr_cpus {
                    break;
                }
                let now = parse_cpu_line(line)?;
                self.roll(cpu, now);
            }
        } else {
            let now = parse_cpu_line(summary)?;
            self.roll(0, now);
        }
        Ok(())
    }

    /// Store `now` into history and its scaled difference into the delta slot.
    fn roll(&mut self, slot: usize, now: CpuSample) {
        let prev = self.hist[slot];
        let tick_ms = self.tick_ms;
        let ms = move |new: u64, old: u64| new.saturating_sub(old) * tick_ms;
        let freq_khz = self.delta[slot].freq_khz;
        self.delta[slot] = CpuDelta {
            user: ms(now.user, prev.user),
            nice: ms(now.nice, prev.nice),
            system: ms(now.system, prev.system),
            idle: ms(now.idle, prev.idle),
            iowait: ms(now.iowait, prev.iowait),
            irq: ms(now.irq, prev.irq),
            softirq: ms(now.softirq, prev.softirq),
            steal: ms(now.steal, prev.steal),
            guest: ms(now.guest, prev.guest),
            guest_nice: ms(now.guest_nice, prev.guest_nice),
            freq_khz,
        };
        self.hist[slot] = now;
    }
}

/// Parse one `cpu` or `cpuN` line of `/proc/stat`.
///
/// A line not carrying at least the user/nice/system/idle columns is a
/// fatal inconsistency; trailing columns absent on old kernels default to 0.
pub fn parse_cpu_line(line: &str) -> Result<CpuSample, MonitorError> {
    let mut fields = line.split_whitespace();
    let label = fields.next().unwrap_or_default();
    let values: Vec<u64> = fields.map_while(|f| f.parse().ok()).collect();
    if !label.starts_with("cpu") || values.len() < 4 {
        return Err(MonitorError::MalformedCounterLine {
            source_file: "/proc/stat",
            line: line.to_string(),
        });
    }
    let col = |i: usize| values.get(i).copied().unwrap_or(0);
    Ok(CpuSample {
        user: col(0),
        nice: col(1),
        system: col(2),
        idle: col(3),
        iowait: col(4),
        irq: col(5),
        softirq: col(6),
        steal: col(7),
        guest: col(8),
        guest_nice: col(9),
    })
}

/// Current frequency of one CPU, if the host exposes cpufreq.
fn read_freq_khz(cpu: CpuId) -> Option<u64> {
    let path = format!("/sys/devices/system/cpu/cpu{}/cpufreq/scaling_cur_freq", cpu.0);
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Number of configured CPUs.
#[allow(unsafe_code, clippy::cast_sign_loss)]
fn nr_cpus() -> Result<usize, MonitorError> {
    // SAFETY: plain syscall.
    let cpus = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
    if cpus < 1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(cpus as usize)
}

/// Clock ticks per second (the unit of `/proc/stat` counters).
#[allow(unsafe_code, clippy::cast_sign_loss)]
fn clock_ticks_per_sec() -> Result<u64, MonitorError> {
    // SAFETY: plain syscall.
    let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if hz < 1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(hz as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "\
cpu  100 5 50 1000 20 3 7 0 0 0
cpu0 60 3 30 500 12 2 4 0 0 0
cpu1 40 2 20 500 8 1 3 0 0 0
intr 12345
ctxt 6789
";

    fn test_data(all_cpus: bool) -> CpuData {
        CpuData {
            nr_cpus: 2,
            all_cpus,
            tick_ms: 10,
            hist: vec![CpuSample::default(); if all_cpus { 2 } else { 1 }],
            delta: vec![CpuDelta::default(); if all_cpus { 2 } else { 1 }],
        }
    }

    #[test]
    fn test_parse_summary_line() {
        let s = parse_cpu_line("cpu  2255 34 2290 22625563 6290 127 456 0 0 0").unwrap();
        assert_eq!(s.user, 2255);
        assert_eq!(s.nice, 34);
        assert_eq!(s.system, 2290);
        assert_eq!(s.idle, 22_625_563);
        assert_eq!(s.softirq, 456);
    }

    #[test]
    fn test_parse_line_without_guest_columns() {
        let s = parse_cpu_line("cpu0 2255 34 2290 22625563 6290 127 456 0").unwrap();
        assert_eq!(s.steal, 0);
        assert_eq!(s.guest, 0);
        assert_eq!(s.guest_nice, 0);
    }

    #[test]
    fn test_malformed_line_is_fatal() {
        for line in ["cpu", "cpu 1 2 3", "intr 1 2 3 4 5", ""] {
            assert!(matches!(
                parse_cpu_line(line),
                Err(MonitorError::MalformedCounterLine { source_file: "/proc/stat", .. })
            ));
        }
    }

    #[test]
    fn test_aggregate_delta_in_ms() {
        let mut data = test_data(false);
        data.sample_from(STAT).unwrap();
        // Second sample 10 ticks of user time later.
        let later = STAT.replace("cpu  100", "cpu  110");
        data.sample_from(&later).unwrap();
        assert_eq!(data.deltas()[0].user, 100); // 10 ticks at 10ms each
        assert_eq!(data.deltas()[0].system, 0);
    }

    #[test]
    fn test_per_cpu_deltas() {
        let mut data = test_data(true);
        data.sample_from(STAT).unwrap();
        let later = STAT.replace("cpu0 60 3 30", "cpu0 65 3 32");
        data.sample_from(&later).unwrap();
        assert_eq!(data.deltas().len(), 2);
        assert_eq!(data.deltas()[0].user, 50);
        assert_eq!(data.deltas()[0].system, 20);
        assert_eq!(data.deltas()[1].user, 0);
    }
}
