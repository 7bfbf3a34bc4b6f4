//! Terminal dashboard
//!
//! Full-screen renderer with two panes: the per-thread ranking on top, CPU
//! and memory summary below. Rows are collected during the cycle and the
//! screen is redrawn once at cycle end.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use std::io::{self, Stdout};
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};

use crate::domain::CpuId;
use crate::render::{Renderer, NSECS_PER_MSEC};
use crate::sampling::cpu::CpuDelta;
use crate::sampling::delta::{CycleSums, DeltaRecord};

pub struct TermRenderer {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    interval: Duration,
    version: u16,
    record_size: usize,
    cycle: u64,
    live_threads: u32,
    task_lines: Vec<String>,
    summary_lines: Vec<String>,
}

impl TermRenderer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            terminal: None,
            interval,
            version: 0,
            record_size: 0,
            cycle: 0,
            live_threads: 0,
            task_lines: Vec::new(),
            summary_lines: Vec::new(),
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        let Some(terminal) = self.terminal.as_mut() else {
            return Ok(());
        };
        let threads = Paragraph::new(self.task_lines.join("\n"))
            .block(Block::default().borders(Borders::ALL).title("threads"));
        let summary = Paragraph::new(self.summary_lines.join("\n"))
            .block(Block::default().borders(Borders::ALL).title("cpus"));
        let summary_height = self.summary_lines.len() as u16 + 2;

        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(5), Constraint::Length(summary_height)])
                .split(frame.area());
            frame.render_widget(threads, chunks[0]);
            frame.render_widget(summary, chunks[1]);
        })?;
        Ok(())
    }
}

impl Renderer for TermRenderer {
    fn init(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        self.terminal = Some(Terminal::new(CrosstermBackend::new(stdout))?);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if let Some(mut terminal) = self.terminal.take() {
            disable_raw_mode()?;
            execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
            terminal.show_cursor()?;
        }
        Ok(())
    }

    fn sync(&mut self) {
        self.task_lines = vec![String::new(), "                    ... Synching ...".to_string()];
        self.summary_lines.clear();
        let _ = self.draw();
    }

    fn banner(&mut self, version: u16, record_size: usize) {
        // Shown in the dashboard header line instead of its own screen.
        self.version = version;
        self.record_size = record_size;
    }

    fn cycle_start(&mut self, cycle: u64, live_threads: u32) {
        self.cycle = cycle;
        self.live_threads = live_threads;
        self.task_lines.clear();
        self.summary_lines.clear();
        self.task_lines.push(format!(
            "Taskstats version: {}  Taskstat size: {}  Measurement cycle: {}  \
             Interval: {}s.{}ms  Threads: {}",
            self.version,
            self.record_size,
            self.cycle,
            self.interval.as_secs(),
            self.interval.subsec_millis(),
            self.live_threads,
        ));
        self.task_lines.push(String::new());
        self.task_lines.push(format!(
            "{:>5}  {:>16}  {:>8}  {:>10}  {:>12}  {:>7}  {:>13}  {:>14}  {:>11}",
            "TID",
            "Name",
            "User[ms]",
            "System[ms]",
            "CpuDelay[ms]",
            "Rss[MB]",
            "IORead[Bytes]",
            "IOWrite[Bytes]",
            "IODelay[ms]",
        ));
    }

    fn task_row(&mut self, rec: &DeltaRecord) {
        self.task_lines.push(format!(
            "{:>5}  {:>16}  {:>8}  {:>10}  {:>12}  {:>7}  {:>13}  {:>14}  {:>11}",
            rec.tid.0,
            rec.comm,
            rec.utime / 1000,
            rec.stime / 1000,
            rec.cpu_delay / NSECS_PER_MSEC,
            rec.mem_per_time(),
            rec.read_bytes,
            rec.written_bytes,
            rec.blkio_delay / NSECS_PER_MSEC,
        ));
    }

    fn cpu_row(&mut self, cpu: CpuId, delta: &CpuDelta) {
        self.summary_lines.push(format!(
            "CPU{}  [ms]  user: {:4}  system: {:4}  irq: {:4}  softirq: {:4}  iowait: {:4}  idle: {:4}  freq: {:8}",
            cpu.0,
            delta.user,
            delta.system,
            delta.irq,
            delta.softirq,
            delta.iowait,
            delta.idle,
            delta.freq_khz.unwrap_or(0),
        ));
    }

    fn mem_row(&mut self, total_kb: u64, free_kb: u64) {
        self.summary_lines.push(format!(
            "MEM   [kB]  total: {:9}  used: {:9}  free: {:9}",
            total_kb,
            total_kb - free_kb,
            free_kb
        ));
    }

    fn cycle_end(&mut self, elapsed: Duration, sums: &CycleSums) {
        let task_total = sums.task_utime_ms + sums.task_stime_ms;
        let cpu_total = sums.cpu_utime_ms + sums.cpu_stime_ms;
        let err_utime = sums.cpu_utime_ms.abs_diff(sums.task_utime_ms);
        let err_stime = sums.cpu_stime_ms.abs_diff(sums.task_stime_ms);
        let scale = task_total.max(cpu_total).max(1);

        self.summary_lines.push(String::new());
        self.summary_lines.push(format!(
            "SUM NETLINK [ms]: user: {:4}  system: {:4}  total: {:4}",
            sums.task_utime_ms, sums.task_stime_ms, task_total,
        ));
        self.summary_lines.push(format!(
            "SUM CPUS    [ms]: user: {:4}  system: {:4}  total: {:4}",
            sums.cpu_utime_ms, sums.cpu_stime_ms, cpu_total,
        ));
        self.summary_lines.push(format!(
            "ERROR       [ms]: user: {:4}  system: {:4}  total: {:4}  ({:3.1}%)",
            err_utime,
            err_stime,
            err_utime + err_stime,
            (100 * (err_utime + err_stime)) as f64 / scale as f64,
        ));
        self.summary_lines.push(format!(
            "                                ... took: {}s {}ms",
            elapsed.as_secs(),
            elapsed.subsec_millis()
        ));
        let _ = self.draw();
    }
}
