//! # taskmon - Netlink-based per-thread activity monitor
//!
//! taskmon tracks every thread on a Linux host and reports per-interval
//! CPU, memory, I/O and scheduling-delay deltas. Thread lifecycles arrive
//! asynchronously over the kernel's process-event connector; live counters
//! are pulled per thread over the generic-netlink taskstats family; once
//! per interval the deltas are ranked and rendered.
//!
//! ## Architecture Overview
//!
//! ```text
//!  kernel connector            kernel taskstats           /proc, /sys
//!  (fork/exit events)          (per-task counters)        (host counters)
//!        │                            │                        │
//!        ▼                            │                        │
//!  ┌──────────────┐   bitmap +        │                        │
//!  │   listener   │──▶ registry ◀──┐  │                        │
//!  │   (thread)   │   (shared)     │  ▼                        ▼
//!  └──────────────┘       ▲      ┌─────────────────────────────────┐
//!  ┌──────────────┐       │      │        cycle scheduler          │
//!  │  bootstrap   │───────┘      │  query → delta → rank → render  │
//!  │  scan (once) │              │        → sleep → repeat         │
//!  └──────────────┘              └─────────────────────────────────┘
//!                                                 │
//!                                                 ▼
//!                                     stdout / csv / term / nop
//! ```
//!
//! ## Module Structure
//!
//! - [`tracking`]: the shared presence bitmap, task registry and the
//!   one-shot procfs bootstrap scan that seeds them
//! - [`netlink`]: the raw socket wrapper, generic-netlink framing, the
//!   taskstats query client and the process-event listener
//! - [`sampling`]: host CPU/memory counters, the delta engine, the per-cycle
//!   ranking cache and the cycle scheduler
//! - [`render`]: the renderer trait and its four implementations
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: core domain types (Tid, Pid, CpuId) and the error taxonomy
//!
//! ## Concurrency Model
//!
//! Three threads: the event listener (unbounded receive loop), the one-shot
//! bootstrap scanner, and the scheduler (the main thread). The scheduler
//! blocks on a completion message from the scanner before its first cycle,
//! so no live thread is missed at startup. Netlink queries are synchronous;
//! one outstanding query at a time.

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod netlink;
pub mod priority;
pub mod render;
pub mod sampling;
pub mod tracking;
