//! # taskmon - Main Entry Point
//!
//! Wires the shared tracker, the two netlink channels and the renderer
//! together, then hands control to the cycle scheduler:
//!
//! 1. subscribe to process events (so nothing slips past the scan)
//! 2. seed the tracker from procfs, concurrently with live events
//! 3. resolve the taskstats family, register the CPU mask
//! 4. run measurement cycles until the limit or a fatal condition

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::debug;
use std::sync::Arc;
use std::thread;

use taskmon::cli::Args;
use taskmon::netlink::{ProcEventListener, StatsClient};
use taskmon::priority;
use taskmon::render;
use taskmon::sampling::{CpuData, CycleScheduler, RankingCache};
use taskmon::tracking::{self, bootstrap, TaskTracker};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("operation not permitted") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let interval = args.interval();

    // Shared tables, sized from the platform pid limit, injected everywhere.
    let tracker = Arc::new(TaskTracker::new(tracking::detect_pid_max()));

    // Subscribe before scanning: a thread forked between the two is seen by
    // the listener, one forked before the scan is found in procfs, and the
    // overlap resolves through idempotent creates.
    let listener = ProcEventListener::connect()
        .context("process event connector setup failed (taskmon needs root)")?;
    listener.set_listen(true).context("process event subscription failed")?;

    let (seeded_tx, seeded_rx) = bounded(1);
    {
        let tracker = Arc::clone(&tracker);
        thread::Builder::new()
            .name("taskmon-scan".into())
            .spawn(move || {
                let _ = seeded_tx.send(bootstrap::scan(&tracker));
            })
            .context("spawning the bootstrap scanner failed")?;
    }
    {
        let tracker = Arc::clone(&tracker);
        thread::Builder::new()
            .name("taskmon-pevent".into())
            .spawn(move || {
                if let Err(e) = listener.run(&tracker) {
                    // There is no supervisor to restart the listener; take
                    // the whole monitor down with a diagnostic.
                    eprintln!("error: {e}");
                    std::process::exit(EXIT_ERROR);
                }
            })
            .context("spawning the event listener failed")?;
    }

    let mut stats = StatsClient::connect().context("taskstats netlink setup failed")?;
    let cpu = CpuData::new(args.all_cpus)?;
    stats.register_cpumask(cpu.nr_cpus()).context("cpumask registration failed")?;

    // The first cycle must see a fully seeded registry.
    let seeded = seeded_rx.recv().context("bootstrap scanner died")??;
    debug!("bootstrap scan seeded {seeded} threads");

    if args.realtime {
        priority::elevate_realtime().context("realtime elevation failed")?;
    }

    let renderer = render::create(args.output, interval);
    let mut scheduler = CycleScheduler::new(
        tracker,
        stats,
        cpu,
        RankingCache::new(args.sort),
        renderer,
        interval,
    );
    scheduler.run(args.cycle_limit())?;
    Ok(())
}
