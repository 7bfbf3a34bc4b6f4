//! Process-event listener
//!
//! Subscribes to the kernel's process lifecycle multicast channel (the
//! netlink connector) and mutates the shared tracker: forks create tracking
//! state, exits tear it down, everything else is ignored. Events are applied
//! strictly in kernel delivery order on one dedicated thread.

#![allow(unsafe_code)] // decoding connector payloads requires unsafe

use std::io;
use std::mem::size_of;

use log::debug;
use taskmon_common::{
    ExitEvent, ForkEvent, ProcEventHdr, CN_IDX_PROC, CN_MSG_HDRLEN, CN_VAL_PROC, NLMSG_DONE,
    NLMSG_HDRLEN, PROC_CN_MCAST_IGNORE, PROC_CN_MCAST_LISTEN, PROC_EVENT_EXIT, PROC_EVENT_FORK,
    PROC_EVENT_HDRLEN,
};

use crate::domain::{MonitorError, Pid, Tid};
use crate::netlink::socket::NetlinkSocket;
use crate::tracking::TaskTracker;

/// A decoded process lifecycle notification.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcEvent {
    Fork { parent_tid: Tid, parent_tgid: Pid, child_tid: Tid, child_tgid: Pid },
    Exit { tid: Tid, tgid: Pid, exit_code: u32 },
    /// Exec, uid changes, coredumps...: delivered but not interesting here.
    Other,
}

/// Connector-channel subscriber feeding the task tracker.
pub struct ProcEventListener {
    sock: NetlinkSocket,
}

impl ProcEventListener {
    /// Open the connector socket, joined to the process-event group.
    pub fn connect() -> io::Result<Self> {
        let sock = NetlinkSocket::open(
            libc::NETLINK_CONNECTOR,
            libc::SOCK_DGRAM,
            std::process::id(),
            CN_IDX_PROC,
        )?;
        Ok(Self { sock })
    }

    /// Turn event delivery on or off for this socket.
    pub fn set_listen(&self, enable: bool) -> io::Result<()> {
        let op = if enable { PROC_CN_MCAST_LISTEN } else { PROC_CN_MCAST_IGNORE };
        let msg_len = NLMSG_HDRLEN + CN_MSG_HDRLEN + size_of::<u32>();

        let mut buf = Vec::with_capacity(msg_len);
        // struct nlmsghdr
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(msg_len as u32).to_ne_bytes());
        buf.extend_from_slice(&NLMSG_DONE.to_ne_bytes());
        buf.extend_from_slice(&0u16.to_ne_bytes()); // flags
        buf.extend_from_slice(&0u32.to_ne_bytes()); // seq
        buf.extend_from_slice(&std::process::id().to_ne_bytes());
        // struct cn_msg
        buf.extend_from_slice(&CN_IDX_PROC.to_ne_bytes());
        buf.extend_from_slice(&CN_VAL_PROC.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes()); // seq
        buf.extend_from_slice(&0u32.to_ne_bytes()); // ack
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(size_of::<u32>() as u16).to_ne_bytes());
        buf.extend_from_slice(&0u16.to_ne_bytes()); // flags
        // the mcast op itself
        buf.extend_from_slice(&op.to_ne_bytes());

        self.sock.send(&buf)
    }

    /// Unbounded receive loop. Returns cleanly when the kernel shuts the
    /// channel down; any other receive failure is fatal.
    pub fn run(&self, tracker: &TaskTracker) -> Result<(), MonitorError> {
        let mut buf = [0u8; 256];
        loop {
            let len = self.sock.recv(&mut buf)?;
            if len == 0 {
                return Err(MonitorError::EventChannelClosed);
            }
            match decode_event(&buf[..len]) {
                Some(ProcEvent::Fork { parent_tid, parent_tgid, child_tid, child_tgid }) => {
                    debug!(
                        "fork: parent tid={parent_tid} pid={parent_tgid} -> \
                         child tid={child_tid} pid={child_tgid}"
                    );
                    tracker.register(child_tid, child_tgid)?;
                }
                Some(ProcEvent::Exit { tid, tgid, exit_code }) => {
                    debug!("exit: tid={tid} pid={tgid} exit_code={exit_code}");
                    tracker.deregister(tid)?;
                }
                Some(ProcEvent::Other) => {}
                None => debug!("short connector datagram ({len} bytes)"),
            }
        }
    }
}

/// Decode one connector datagram into a [`ProcEvent`].
///
/// Returns `None` for frames too short to carry an event.
#[must_use]
pub fn decode_event(frame: &[u8]) -> Option<ProcEvent> {
    let event = frame.get(NLMSG_HDRLEN + CN_MSG_HDRLEN..)?;
    if event.len() < PROC_EVENT_HDRLEN {
        return None;
    }
    // SAFETY: length was checked; connector payloads are plain-old-data
    // readable from any alignment.
    let hdr = unsafe { std::ptr::read_unaligned(event.as_ptr().cast::<ProcEventHdr>()) };
    let data = &event[PROC_EVENT_HDRLEN..];

    match hdr.what {
        PROC_EVENT_FORK => {
            if data.len() < size_of::<ForkEvent>() {
                return None;
            }
            // SAFETY: as above.
            let fork = unsafe { std::ptr::read_unaligned(data.as_ptr().cast::<ForkEvent>()) };
            Some(ProcEvent::Fork {
                parent_tid: Tid::from(fork.parent_pid),
                parent_tgid: Pid::from(fork.parent_tgid),
                child_tid: Tid::from(fork.child_pid),
                child_tgid: Pid::from(fork.child_tgid),
            })
        }
        PROC_EVENT_EXIT => {
            if data.len() < size_of::<ExitEvent>() {
                return None;
            }
            // SAFETY: as above.
            let exit = unsafe { std::ptr::read_unaligned(data.as_ptr().cast::<ExitEvent>()) };
            Some(ProcEvent::Exit {
                tid: Tid::from(exit.process_pid),
                tgid: Pid::from(exit.process_tgid),
                exit_code: exit.exit_code,
            })
        }
        _ => Some(ProcEvent::Other),
    }
}
