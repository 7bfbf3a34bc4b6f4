//! CSV output
//!
//! Semicolon-separated records, each section preceded by a HEADER line so
//! the stream stays self-describing when sections interleave.

use std::io::{self, Write};
use std::time::Duration;

use crate::domain::CpuId;
use crate::render::{Renderer, NSECS_PER_MSEC};
use crate::sampling::cpu::CpuDelta;
use crate::sampling::delta::{CycleSums, DeltaRecord};

pub struct CsvRenderer<W: Write = io::Stdout> {
    out: W,
    cycle: u64,
    /// Set at cycle start so the thread header is emitted once per cycle.
    new_cycle: bool,
}

impl CsvRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for CsvRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> CsvRenderer<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out, cycle: 0, new_cycle: false }
    }
}

impl<W: Write> Renderer for CsvRenderer<W> {
    fn sync(&mut self) {}

    fn banner(&mut self, version: u16, record_size: usize) {
        let _ = writeln!(self.out, "HEADER;TSVersion;TSSize");
        let _ = writeln!(self.out, "BANNER;{version};{record_size}");
    }

    fn cycle_start(&mut self, cycle: u64, live_threads: u32) {
        self.cycle = cycle;
        self.new_cycle = true;
        let _ = writeln!(self.out, "HEADER;Cycle;Threads");
        let _ = writeln!(self.out, "MEASUREMENT;{cycle};{live_threads}");
    }

    #[allow(clippy::cast_precision_loss)]
    fn task_row(&mut self, rec: &DeltaRecord) {
        if self.new_cycle {
            let _ = writeln!(
                self.out,
                "HEADER;PID;TID;Name;UserT[ms];SysT[ms];TotalT[sec];Rss[MB];IORead[Bytes];IOWrite[Bytes];IODelay[ms];Iteration"
            );
            self.new_cycle = false;
        }
        let total_sec = rec.total_time() as f64 / 1e6;
        let _ = writeln!(
            self.out,
            "THREAD;{};{};{};{};{};{:.6};{};{};{};{};{}",
            rec.pid.0,
            rec.tid.0,
            rec.comm,
            rec.utime / 1000,
            rec.stime / 1000,
            total_sec,
            rec.mem_per_time(),
            rec.read_bytes,
            rec.written_bytes,
            rec.blkio_delay / NSECS_PER_MSEC,
            self.cycle,
        );
    }

    fn cpu_row(&mut self, cpu: CpuId, delta: &CpuDelta) {
        let _ = writeln!(self.out, "HEADER;CPU;USER;SYSTEM;IRQ;SOFTIRQ;IOWAIT;IDLE");
        let _ = writeln!(
            self.out,
            "CPU{};{};{};{};{};{};{}",
            cpu.0, delta.user, delta.system, delta.irq, delta.softirq, delta.iowait, delta.idle,
        );
    }

    fn mem_row(&mut self, total_kb: u64, free_kb: u64) {
        let _ = writeln!(self.out, "HEADER;MEM_TOTAL;MEM_USED;MEM_FREE");
        let _ = writeln!(self.out, "{};{};{}", total_kb, total_kb - free_kb, free_kb);
    }

    fn cycle_end(&mut self, elapsed: Duration, _sums: &CycleSums) {
        let _ = writeln!(self.out, "HEADER;Cycle_used_sec;Cycle_used_ms");
        let _ =
            writeln!(self.out, "MEASUREMENT;{};{}", elapsed.as_secs(), elapsed.subsec_millis());
        let _ = self.out.flush();
    }
}
