//! Raw netlink datagram socket

#![allow(unsafe_code)] // socket syscalls require unsafe

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

/// A bound `AF_NETLINK` socket.
///
/// Closed on drop via [`OwnedFd`]. Both send and receive retry transparently
/// on `EINTR`; everything else is reported to the caller.
pub struct NetlinkSocket {
    fd: OwnedFd,
}

impl NetlinkSocket {
    /// Open and bind a netlink socket.
    ///
    /// `pid` and `groups` go into the bound address: the stats socket binds
    /// with zeros (the kernel assigns a port), the connector socket binds
    /// its process id and the multicast group it wants to join.
    pub fn open(protocol: i32, socket_type: i32, pid: u32, groups: u32) -> io::Result<Self> {
        // SAFETY: plain syscall, no pointers involved.
        let raw = unsafe { libc::socket(libc::AF_NETLINK, socket_type, protocol) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: raw is a freshly created, otherwise unowned descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // SAFETY: sockaddr_nl is plain-old-data, zeroes are a valid value.
        let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
        addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
        addr.nl_pid = pid;
        addr.nl_groups = groups;

        // SAFETY: addr points to a properly initialized sockaddr_nl.
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                std::ptr::addr_of!(addr).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Send a complete datagram, resuming after short writes and `EINTR`.
    pub fn send(&self, buf: &[u8]) -> io::Result<()> {
        let mut sent = 0;
        while sent < buf.len() {
            // SAFETY: the pointer/length pair describes the unsent tail of buf.
            let rc = unsafe {
                libc::send(
                    self.fd.as_raw_fd(),
                    buf[sent..].as_ptr().cast::<libc::c_void>(),
                    buf.len() - sent,
                    0,
                )
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                    _ => return Err(err),
                }
            }
            #[allow(clippy::cast_sign_loss)]
            {
                sent += rc as usize;
            }
        }
        Ok(())
    }

    /// Receive one datagram, retrying on `EINTR`. Returns the frame length;
    /// zero means the channel was shut down.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            // SAFETY: buf is valid writable memory of the given length.
            let rc = unsafe {
                libc::recv(self.fd.as_raw_fd(), buf.as_mut_ptr().cast::<libc::c_void>(), buf.len(), 0)
            };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            #[allow(clippy::cast_sign_loss)]
            return Ok(rc as usize);
        }
    }
}
