//! Netlink plumbing
//!
//! taskmon speaks two kernel-facing netlink channels:
//!
//! - `genl` + `stats`: the generic-netlink taskstats family, queried
//!   synchronously once per tracked thread per cycle
//! - `events`: the process-event connector multicast channel feeding the
//!   fork/exit listener
//!
//! `socket` is the thin raw-socket wrapper both sit on.

pub mod events;
pub mod genl;
pub mod socket;
pub mod stats;

pub use events::{decode_event, ProcEvent, ProcEventListener};
pub use socket::NetlinkSocket;
pub use stats::StatsClient;
