//! Console output

use std::io::{self, Write};
use std::time::Duration;

use crate::domain::CpuId;
use crate::render::{Renderer, NSECS_PER_MSEC};
use crate::sampling::cpu::CpuDelta;
use crate::sampling::delta::{CycleSums, DeltaRecord};

/// Plain line-per-event console renderer.
pub struct ConsoleRenderer<W: Write = io::Stdout> {
    out: W,
}

impl ConsoleRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> ConsoleRenderer<W> {
    /// Render into an arbitrary writer (used by tests).
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Renderer for ConsoleRenderer<W> {
    fn sync(&mut self) {
        let _ = writeln!(self.out, "... Syncing ...");
    }

    fn banner(&mut self, version: u16, record_size: usize) {
        let _ = writeln!(self.out, "\nTaskstats version: {version}  Taskstat size: {record_size}\n");
    }

    fn cycle_start(&mut self, cycle: u64, live_threads: u32) {
        let _ = writeln!(self.out, "measurement cycle: {cycle}  threads: {live_threads}");
    }

    fn task_row(&mut self, rec: &DeltaRecord) {
        let _ = writeln!(
            self.out,
            "PID: {:5} [{:>16}]  user: {:6}  system: {:6}  rss: {:6}  io_rd: {:8}  io_wr: {:8}  blkio_delay: {:9}",
            rec.tid.0,
            rec.comm,
            rec.utime / 1000,
            rec.stime / 1000,
            rec.mem_per_time(),
            rec.read_bytes,
            rec.written_bytes,
            rec.blkio_delay / NSECS_PER_MSEC,
        );
    }

    fn cpu_row(&mut self, cpu: CpuId, delta: &CpuDelta) {
        let _ = writeln!(
            self.out,
            "CPU{}  [ms]  user: {:4}  system: {:4}  irq: {:4}  softirq: {:4}  iowait: {:4}  idle: {:4}  freq: {:8}",
            cpu.0,
            delta.user,
            delta.system,
            delta.irq,
            delta.softirq,
            delta.iowait,
            delta.idle,
            delta.freq_khz.unwrap_or(0),
        );
    }

    fn mem_row(&mut self, total_kb: u64, free_kb: u64) {
        let _ = writeln!(
            self.out,
            "MEM   [kB]  total: {:9}  used: {:9}  free: {:9}",
            total_kb,
            total_kb - free_kb,
            free_kb
        );
    }

    fn cycle_end(&mut self, elapsed: Duration, sums: &CycleSums) {
        let _ = writeln!(
            self.out,
            "SUM   [ms]  user: {:4}  system: {:4}  total: {:4}",
            sums.task_utime_ms,
            sums.task_stime_ms,
            sums.task_utime_ms + sums.task_stime_ms,
        );
        let _ = writeln!(
            self.out,
            "... took: {}s {}ms\n",
            elapsed.as_secs(),
            elapsed.subsec_millis()
        );
        let _ = self.out.flush();
    }
}
