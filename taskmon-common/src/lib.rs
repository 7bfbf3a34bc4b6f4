//! # Kernel ABI (netlink ↔ userspace)
//!
//! Wire structures and constants shared with the kernel over the two netlink
//! channels taskmon speaks: the generic-netlink taskstats family and the
//! process-event connector. All types use `#[repr(C)]` so they can be read
//! straight out of received datagrams.
//!
//! ## Key Types
//!
//! - [`Taskstats`] - per-task cumulative accounting record (struct version 8)
//! - [`NlMsgHdr`] / [`GenlMsgHdr`] / [`NlAttr`] - netlink framing headers
//! - [`CnMsgHdr`] / [`ForkEvent`] / [`ExitEvent`] - connector channel payloads

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Netlink framing
// ============================================================================

/// Message carries a request.
pub const NLM_F_REQUEST: u16 = 1;

/// Error frame; payload starts with a negative errno.
pub const NLMSG_ERROR: u16 = 2;

/// Terminal frame of a multipart reply.
pub const NLMSG_DONE: u16 = 3;

/// Netlink message header (`struct nlmsghdr`).
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NlMsgHdr {
    /// Total frame length including this header.
    pub nlmsg_len: u32,
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    pub nlmsg_seq: u32,
    pub nlmsg_pid: u32,
}

/// Size of [`NlMsgHdr`], already 4-byte aligned.
pub const NLMSG_HDRLEN: usize = 16;

/// Payload of an `NLMSG_ERROR` frame (`struct nlmsgerr`, header part).
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NlMsgErr {
    /// Negative errno, or 0 for an ACK.
    pub error: i32,
    pub msg: NlMsgHdr,
}

/// Attribute header (`struct nlattr`): length includes the header itself.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NlAttr {
    pub nla_len: u16,
    pub nla_type: u16,
}

/// Size of [`NlAttr`].
pub const NLA_HDRLEN: usize = 4;

/// Attribute boundaries are padded to 4 bytes.
pub const NLA_ALIGNTO: usize = 4;

/// Round `len` up to the attribute alignment boundary.
#[must_use]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

// ============================================================================
// Generic netlink
// ============================================================================

/// Generic netlink header (`struct genlmsghdr`), follows [`NlMsgHdr`].
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct GenlMsgHdr {
    pub cmd: u8,
    pub version: u8,
    pub reserved: u16,
}

/// Size of [`GenlMsgHdr`].
pub const GENL_HDRLEN: usize = 4;

/// Fixed family id of the generic-netlink controller.
pub const GENL_ID_CTRL: u16 = 0x10;

/// Controller command: resolve a family name to its id.
pub const CTRL_CMD_GETFAMILY: u8 = 3;

/// Controller reply attribute: the numeric family id (u16 payload).
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;

/// Controller request attribute: the family name (NUL-terminated string).
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;

// ============================================================================
// Taskstats family
// ============================================================================

/// Name under which the kernel registers the taskstats family.
pub const TASKSTATS_GENL_NAME: &str = "TASKSTATS";

/// Generic netlink protocol version used in requests.
pub const TASKSTATS_GENL_VERSION: u8 = 0x1;

/// Command: fetch statistics (request and reply use the same command).
pub const TASKSTATS_CMD_GET: u8 = 1;

/// Request attribute: query a single thread by tid (u32 payload).
pub const TASKSTATS_CMD_ATTR_PID: u16 = 1;

/// Request attribute: query an aggregated process by tgid (u32 payload).
pub const TASKSTATS_CMD_ATTR_TGID: u16 = 2;

/// Request attribute: subscribe to exit records for a CPU mask string.
pub const TASKSTATS_CMD_ATTR_REGISTER_CPUMASK: u16 = 3;

/// Request attribute: drop a CPU mask subscription.
pub const TASKSTATS_CMD_ATTR_DEREGISTER_CPUMASK: u16 = 4;

/// Reply attribute: padding, no payload.
pub const TASKSTATS_TYPE_NULL: u16 = 0;

/// Nested reply attribute: the confirmed tid (u32 payload).
pub const TASKSTATS_TYPE_PID: u16 = 1;

/// Nested reply attribute: the confirmed tgid (u32 payload).
pub const TASKSTATS_TYPE_TGID: u16 = 2;

/// Nested reply attribute: the [`Taskstats`] blob.
pub const TASKSTATS_TYPE_STATS: u16 = 3;

/// Aggregate reply attribute nesting PID + STATS.
pub const TASKSTATS_TYPE_AGGR_PID: u16 = 4;

/// Aggregate reply attribute nesting TGID + STATS.
pub const TASKSTATS_TYPE_AGGR_TGID: u16 = 5;

/// Length of the `ac_comm` field.
pub const TS_COMM_LEN: usize = 32;

/// Per-task accounting record, struct version 8 (`linux/taskstats.h`).
///
/// The kernel lays this out with 64-bit members forced onto 8-byte
/// boundaries; the `_pad*` fields reproduce the resulting holes so the
/// struct can be copied byte-for-byte out of the reply attribute.
/// Total size is 328 bytes.
///
/// All cumulative counters are monotonically non-decreasing for the
/// lifetime of the task. Times are in microseconds unless the field name
/// says otherwise; delay totals are in nanoseconds; `coremem` is
/// accumulated RSS usage in MB-usec.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Taskstats {
    pub version: u16,
    pub ac_exitcode: u32,
    pub ac_flag: u8,
    pub ac_nice: u8,

    /* Delay accounting fields, 8-byte aligned. */
    pub cpu_count: u64,
    pub cpu_delay_total: u64,
    pub blkio_count: u64,
    pub blkio_delay_total: u64,
    pub swapin_count: u64,
    pub swapin_delay_total: u64,
    pub cpu_run_real_total: u64,
    pub cpu_run_virtual_total: u64,

    /* Basic accounting fields. */
    pub ac_comm: [u8; TS_COMM_LEN],
    pub ac_sched: u8,
    pub ac_pad: [u8; 3],
    /// Hole from the kernel's 64-bit alignment of `ac_uid`.
    #[allow(clippy::pub_underscore_fields)]
    pub _pad_uid: [u8; 4],
    pub ac_uid: u32,
    pub ac_gid: u32,
    /// The kernel calls the thread id "pid" here; this is the tid.
    pub ac_pid: u32,
    pub ac_ppid: u32,
    pub ac_btime: u32,
    pub ac_etime: u64,
    pub ac_utime: u64,
    pub ac_stime: u64,
    pub ac_minflt: u64,
    pub ac_majflt: u64,

    /* Extended accounting fields. */
    pub coremem: u64,
    pub virtmem: u64,
    pub hiwater_rss: u64,
    pub hiwater_vm: u64,
    pub read_char: u64,
    pub write_char: u64,
    pub read_syscalls: u64,
    pub write_syscalls: u64,

    /* Per-task storage I/O accounting. */
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub cancelled_write_bytes: u64,

    pub nvcsw: u64,
    pub nivcsw: u64,

    /* Scaled time accounting. */
    pub ac_utimescaled: u64,
    pub ac_stimescaled: u64,
    pub cpu_scaled_run_real_total: u64,

    /* Memory reclaim delay accounting. */
    pub freepages_count: u64,
    pub freepages_delay_total: u64,
}

impl Taskstats {
    /// Short command name, truncated at the first NUL.
    #[must_use]
    pub fn comm(&self) -> &str {
        let end = self.ac_comm.iter().position(|&b| b == 0).unwrap_or(TS_COMM_LEN);
        core::str::from_utf8(&self.ac_comm[..end]).unwrap_or("")
    }
}

// ============================================================================
// Process-event connector
// ============================================================================

/// Connector index of the process-event channel.
pub const CN_IDX_PROC: u32 = 1;

/// Connector value of the process-event channel.
pub const CN_VAL_PROC: u32 = 1;

/// Multicast control word: start delivering process events.
pub const PROC_CN_MCAST_LISTEN: u32 = 1;

/// Multicast control word: stop delivering process events.
pub const PROC_CN_MCAST_IGNORE: u32 = 2;

/// Connector message header (`struct cn_msg`), follows [`NlMsgHdr`].
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CnMsgHdr {
    /// Channel id: `{CN_IDX_PROC, CN_VAL_PROC}` for process events.
    pub idx: u32,
    pub val: u32,
    pub seq: u32,
    pub ack: u32,
    /// Payload length following this header.
    pub len: u16,
    pub flags: u16,
}

/// Size of [`CnMsgHdr`].
pub const CN_MSG_HDRLEN: usize = 20;

/// Event kind words of `struct proc_event` (`linux/cn_proc.h`).
pub const PROC_EVENT_NONE: u32 = 0;
pub const PROC_EVENT_FORK: u32 = 0x0000_0001;
pub const PROC_EVENT_EXEC: u32 = 0x0000_0002;
pub const PROC_EVENT_COREDUMP: u32 = 0x4000_0000;
pub const PROC_EVENT_EXIT: u32 = 0x8000_0000;

/// Common prefix of every `struct proc_event`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ProcEventHdr {
    /// One of the `PROC_EVENT_*` words.
    pub what: u32,
    pub cpu: u32,
    pub timestamp_ns: u64,
}

/// Size of [`ProcEventHdr`]; event payloads start here.
pub const PROC_EVENT_HDRLEN: usize = 16;

/// Payload of a fork event.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ForkEvent {
    pub parent_pid: i32,
    pub parent_tgid: i32,
    pub child_pid: i32,
    pub child_tgid: i32,
}

/// Payload of an exit event.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ExitEvent {
    pub process_pid: i32,
    pub process_tgid: i32,
    pub exit_code: u32,
    pub exit_signal: u32,
}
