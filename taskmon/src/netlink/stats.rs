//! Taskstats query client
//!
//! Synchronous request/response exchange with the kernel taskstats family:
//! resolve the family id once, then query one thread at a time. Replies
//! nest the per-task counters inside an aggregate attribute together with an
//! id confirmation; a confirmed id different from the queried one is the
//! exit record of an unrelated task (delivered because we registered for the
//! CPU mask) and must never be merged into the current sample.

#![allow(unsafe_code)] // decoding the kernel taskstats blob requires unsafe

use std::mem::size_of;

use log::{debug, warn};
use taskmon_common::{
    Taskstats, TASKSTATS_CMD_ATTR_DEREGISTER_CPUMASK, TASKSTATS_CMD_ATTR_PID,
    TASKSTATS_CMD_ATTR_REGISTER_CPUMASK, TASKSTATS_CMD_GET, TASKSTATS_GENL_NAME,
    TASKSTATS_TYPE_AGGR_PID, TASKSTATS_TYPE_AGGR_TGID, TASKSTATS_TYPE_NULL, TASKSTATS_TYPE_PID,
    TASKSTATS_TYPE_STATS, TASKSTATS_TYPE_TGID,
};

use crate::domain::{MonitorError, Tid};
use crate::netlink::genl::{self, attrs, GenlReply, MAX_MSG_SIZE};
use crate::netlink::socket::NetlinkSocket;

/// Client for the generic-netlink taskstats family.
pub struct StatsClient {
    sock: NetlinkSocket,
    family: u16,
    port: u32,
    cpumask: String,
}

/// Outcome of decoding one reply frame against the queried id.
enum Decoded {
    /// Counters for the queried thread.
    Stats(Box<Taskstats>),
    /// The queried id was confirmed but no stats followed.
    ResolvedEmpty,
    /// Frame did not resolve the query (async exits only, keep receiving).
    Pending,
    /// Error frame or garbage; the query is abandoned.
    Failed,
}

impl StatsClient {
    /// Open the stats socket and resolve the family id. Fatal on failure.
    pub fn connect() -> Result<Self, MonitorError> {
        let sock = NetlinkSocket::open(libc::NETLINK_GENERIC, libc::SOCK_RAW, 0, 0)?;
        let family = genl::resolve_family(&sock, TASKSTATS_GENL_NAME)?;
        debug!("taskstats family id {family}");
        Ok(Self { sock, family, port: std::process::id(), cpumask: String::new() })
    }

    /// Subscribe to exit records for CPUs `0..nr_cpus`.
    ///
    /// This is what makes the kernel push a final accounting record for
    /// every dying task to this socket.
    pub fn register_cpumask(&mut self, nr_cpus: usize) -> Result<(), MonitorError> {
        self.cpumask = format!("0-{}", nr_cpus.saturating_sub(1));
        debug!("registering for task exit records on CPUs {}", self.cpumask);
        let mut payload = self.cpumask.clone().into_bytes();
        payload.push(0);
        let req = genl::build_request(
            self.family,
            self.port,
            TASKSTATS_CMD_GET,
            TASKSTATS_CMD_ATTR_REGISTER_CPUMASK,
            &payload,
        );
        self.sock.send(&req)?;
        Ok(())
    }

    /// Drop the exit-record subscription. Best effort at shutdown.
    pub fn deregister_cpumask(&self) {
        if self.cpumask.is_empty() {
            return;
        }
        let mut payload = self.cpumask.clone().into_bytes();
        payload.push(0);
        let req = genl::build_request(
            self.family,
            self.port,
            TASKSTATS_CMD_GET,
            TASKSTATS_CMD_ATTR_DEREGISTER_CPUMASK,
            &payload,
        );
        if let Err(e) = self.sock.send(&req) {
            debug!("cpumask deregistration failed: {e}");
        }
    }

    /// Query the cumulative counters of one thread.
    ///
    /// `Ok(None)` means the thread could not be sampled this cycle (it
    /// usually exited between the bitmap scan and the query); the cycle
    /// carries on. Unrelated exit records received while waiting are logged
    /// and skipped, never attributed to `tid`.
    pub fn query(&self, tid: Tid) -> Result<Option<Box<Taskstats>>, MonitorError> {
        let req = genl::build_request(
            self.family,
            self.port,
            TASKSTATS_CMD_GET,
            TASKSTATS_CMD_ATTR_PID,
            &tid.0.to_ne_bytes(),
        );
        self.sock.send(&req)?;

        let mut buf = [0u8; MAX_MSG_SIZE];
        loop {
            let len = match self.sock.recv(&mut buf) {
                Ok(len) => len,
                Err(e) => {
                    warn!("receive failed while querying {tid}: {e}");
                    return Ok(None);
                }
            };
            match decode_frame(&buf[..len], tid) {
                Decoded::Stats(ts) => return Ok(Some(ts)),
                Decoded::ResolvedEmpty | Decoded::Failed => return Ok(None),
                Decoded::Pending => {}
            }
        }
    }
}

/// Decode one reply frame. Top level is a stream of aggregate attributes;
/// each aggregate nests an id confirmation followed by the stats blob.
fn decode_frame(frame: &[u8], queried: Tid) -> Decoded {
    let payload = match genl::parse_reply(frame) {
        Some(GenlReply::Payload(p)) => p,
        Some(GenlReply::Error(errno)) => {
            // The common case: the task exited before we could ask.
            debug!("query for {queried} answered with errno {errno}");
            return Decoded::Failed;
        }
        None => {
            debug!("malformed reply while querying {queried}");
            return Decoded::Failed;
        }
    };

    let mut resolved = false;
    let mut stats = None;
    for attr in attrs(payload) {
        match attr.ty {
            TASKSTATS_TYPE_AGGR_PID | TASKSTATS_TYPE_AGGR_TGID => {
                let mut confirmed: Option<u32> = None;
                for nested in attrs(attr.payload) {
                    match nested.ty {
                        TASKSTATS_TYPE_PID | TASKSTATS_TYPE_TGID => {
                            confirmed = nested.as_u32();
                            if confirmed == Some(queried.0) {
                                resolved = true;
                            }
                        }
                        TASKSTATS_TYPE_STATS => match decode_taskstats(nested.payload) {
                            Some(ts) if confirmed == Some(queried.0) => stats = Some(ts),
                            Some(ts) => note_async_exit(&ts, confirmed),
                            None => debug!("short stats attribute while querying {queried}"),
                        },
                        other => debug!("unknown nested attribute type {other}"),
                    }
                }
            }
            TASKSTATS_TYPE_NULL => {}
            other => debug!("unknown attribute type {other}"),
        }
    }

    match (resolved, stats) {
        (_, Some(ts)) => Decoded::Stats(ts),
        (true, None) => Decoded::ResolvedEmpty,
        (false, None) => Decoded::Pending,
    }
}

/// Copy the taskstats blob out of an attribute payload.
///
/// Newer kernels append fields past version 8; anything at least as large
/// as our view of the struct is accepted.
fn decode_taskstats(payload: &[u8]) -> Option<Box<Taskstats>> {
    if payload.len() < size_of::<Taskstats>() {
        return None;
    }
    // SAFETY: length was checked and Taskstats is plain-old-data readable
    // from any alignment.
    let ts = unsafe { std::ptr::read_unaligned(payload.as_ptr().cast::<Taskstats>()) };
    Some(Box::new(ts))
}

/// Side channel for the exit record of a task that died between the bitmap
/// scan and its query. Its final totals were never sampled, so they are
/// reported here instead of being merged into anyone's delta.
fn note_async_exit(ts: &Taskstats, tid: Option<u32>) {
    debug!(
        "exit record for pid {} [{}] exitcode {}: utime {} stime {}",
        tid.unwrap_or(0),
        ts.comm(),
        ts.ac_exitcode,
        ts.ac_utime,
        ts.ac_stime,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmon_common::{nla_align, NLA_HDRLEN, NLMSG_DONE, TS_COMM_LEN};

    fn push_attr(buf: &mut Vec<u8>, ty: u16, payload: &[u8]) {
        #[allow(clippy::cast_possible_truncation)]
        let nla_len = (NLA_HDRLEN + payload.len()) as u16;
        buf.extend_from_slice(&nla_len.to_ne_bytes());
        buf.extend_from_slice(&ty.to_ne_bytes());
        buf.extend_from_slice(payload);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }

    fn taskstats_bytes(tid: u32, utime: u64, comm: &str) -> Vec<u8> {
        let mut ts: Taskstats = unsafe { std::mem::zeroed() };
        ts.version = 8;
        ts.ac_pid = tid;
        ts.ac_utime = utime;
        ts.ac_comm[..comm.len().min(TS_COMM_LEN)].copy_from_slice(comm.as_bytes());
        // SAFETY: Taskstats is plain-old-data; viewing it as bytes is fine.
        let bytes = unsafe {
            std::slice::from_raw_parts(std::ptr::addr_of!(ts).cast::<u8>(), size_of::<Taskstats>())
        };
        bytes.to_vec()
    }

    fn reply_frame(confirmed_tid: u32, stats: &[u8]) -> Vec<u8> {
        let mut nested = Vec::new();
        push_attr(&mut nested, TASKSTATS_TYPE_PID, &confirmed_tid.to_ne_bytes());
        push_attr(&mut nested, TASKSTATS_TYPE_STATS, stats);

        let mut payload = Vec::new();
        push_attr(&mut payload, TASKSTATS_TYPE_AGGR_PID, &nested);

        let mut frame = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        let len = (16 + 4 + payload.len()) as u32;
        frame.extend_from_slice(&len.to_ne_bytes());
        frame.extend_from_slice(&NLMSG_DONE.to_ne_bytes());
        frame.extend_from_slice(&0u16.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&[1, 1, 0, 0]);
        frame.extend_from_slice(&payload);
        frame
    }

    #[test]
    fn test_matching_reply_decodes() {
        let frame = reply_frame(42, &taskstats_bytes(42, 1500, "bash"));
        match decode_frame(&frame, Tid(42)) {
            Decoded::Stats(ts) => {
                assert_eq!(ts.ac_pid, 42);
                assert_eq!(ts.ac_utime, 1500);
                assert_eq!(ts.comm(), "bash");
            }
            _ => panic!("expected stats"),
        }
    }

    #[test]
    fn test_mismatched_id_is_not_merged() {
        // An exit record for tid 99 arriving while tid 42 is in flight must
        // leave the query pending, never resolve it with foreign counters.
        let frame = reply_frame(99, &taskstats_bytes(99, 7777, "dying"));
        assert!(matches!(decode_frame(&frame, Tid(42)), Decoded::Pending));
    }

    #[test]
    fn test_error_frame_fails_query() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&36u32.to_ne_bytes());
        frame.extend_from_slice(&taskmon_common::NLMSG_ERROR.to_ne_bytes());
        frame.extend_from_slice(&0u16.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&(-3i32).to_ne_bytes());
        frame.extend_from_slice(&[0u8; 16]);
        assert!(matches!(decode_frame(&frame, Tid(42)), Decoded::Failed));
    }

    #[test]
    fn test_truncated_stats_attribute() {
        let frame = reply_frame(42, &[0u8; 16]); // far too short for taskstats
        assert!(matches!(decode_frame(&frame, Tid(42)), Decoded::ResolvedEmpty));
    }

    #[test]
    fn test_nested_padding_is_honored() {
        // The PID attribute payload is 4 bytes, already aligned; fabricate a
        // 2-byte attribute ahead of it to force nested padding.
        let mut nested = Vec::new();
        push_attr(&mut nested, TASKSTATS_TYPE_NULL, &[0u8; 2]);
        push_attr(&mut nested, TASKSTATS_TYPE_PID, &42u32.to_ne_bytes());
        push_attr(&mut nested, TASKSTATS_TYPE_STATS, &taskstats_bytes(42, 1, "t"));
        assert_eq!(nested.len() % 4, 0);
        assert_eq!(nla_align(NLA_HDRLEN + 2), 8);

        let mut payload = Vec::new();
        push_attr(&mut payload, TASKSTATS_TYPE_AGGR_PID, &nested);

        let mut frame = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        let len = (16 + 4 + payload.len()) as u32;
        frame.extend_from_slice(&len.to_ne_bytes());
        frame.extend_from_slice(&NLMSG_DONE.to_ne_bytes());
        frame.extend_from_slice(&[0u8; 10]);
        frame.extend_from_slice(&[1, 1, 0, 0]);
        frame.extend_from_slice(&payload);

        assert!(matches!(decode_frame(&frame, Tid(42)), Decoded::Stats(_)));
    }
}
