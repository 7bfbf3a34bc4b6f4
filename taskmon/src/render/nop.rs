//! No output
//!
//! Keeps the cycle bookkeeping lines so overhead measurements still show
//! progress, drops every data row.

use std::time::Duration;

use crate::domain::CpuId;
use crate::render::Renderer;
use crate::sampling::cpu::CpuDelta;
use crate::sampling::delta::{CycleSums, DeltaRecord};

#[derive(Default)]
pub struct NopRenderer;

impl Renderer for NopRenderer {
    fn sync(&mut self) {}

    fn banner(&mut self, version: u16, record_size: usize) {
        println!("\nTaskstats version: {version}  Taskstat size: {record_size}\n");
    }

    fn cycle_start(&mut self, cycle: u64, live_threads: u32) {
        println!("measurement cycle: {cycle}  threads: {live_threads}");
    }

    fn task_row(&mut self, _rec: &DeltaRecord) {}

    fn cpu_row(&mut self, _cpu: CpuId, _delta: &CpuDelta) {}

    fn mem_row(&mut self, _total_kb: u64, _free_kb: u64) {}

    fn cycle_end(&mut self, elapsed: Duration, _sums: &CycleSums) {
        println!("... took: {}s {}ms\n", elapsed.as_secs(), elapsed.subsec_millis());
    }
}
