//! Output renderers
//!
//! One renderer is selected at startup and driven by the cycle scheduler
//! through the callback set below; no other dispatch happens at runtime.
//!
//! - `stdout` - plain console lines
//! - `csv` - semicolon-separated records with header lines
//! - `term` - full-screen dashboard (ratatui)
//! - `nop` - cycle bookkeeping only, for overhead measurements

pub mod csv;
pub mod nop;
pub mod stdout;
pub mod term;

use std::io;
use std::time::Duration;

use clap::ValueEnum;

use crate::domain::CpuId;
use crate::sampling::cpu::CpuDelta;
use crate::sampling::delta::{CycleSums, DeltaRecord};

/// Nanoseconds per millisecond, for scaling delay counters in output.
pub const NSECS_PER_MSEC: u64 = 1_000_000;

/// Output mode selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Stdout,
    Csv,
    Term,
    Nop,
}

/// The callback set every output implements. Exactly one implementation is
/// active per process run.
pub trait Renderer {
    /// One-time setup before the first cycle.
    fn init(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Final teardown; also called before a fatal scheduler abort so the
    /// terminal is restored first.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// The baseline-seeding cycle is running instead of a measurement.
    fn sync(&mut self);

    /// Stats protocol version and record size, once after the first sample.
    fn banner(&mut self, version: u16, record_size: usize);

    fn cycle_start(&mut self, cycle: u64, live_threads: u32);

    fn task_row(&mut self, rec: &DeltaRecord);

    fn cpu_row(&mut self, cpu: CpuId, delta: &CpuDelta);

    fn mem_row(&mut self, total_kb: u64, free_kb: u64);

    fn cycle_end(&mut self, elapsed: Duration, sums: &CycleSums);
}

/// Build the configured renderer.
#[must_use]
pub fn create(mode: OutputMode, interval: Duration) -> Box<dyn Renderer> {
    match mode {
        OutputMode::Stdout => Box::new(stdout::ConsoleRenderer::new()),
        OutputMode::Csv => Box::new(csv::CsvRenderer::new()),
        OutputMode::Term => Box::new(term::TermRenderer::new(interval)),
        OutputMode::Nop => Box::new(nop::NopRenderer::default()),
    }
}
