//! Generic netlink framing
//!
//! Request building and reply walking for the generic-netlink layer:
//! a netlink header, a generic header, then a stream of type-tagged
//! attributes padded to 4-byte boundaries, possibly nesting further
//! attribute streams.

use log::debug;
use taskmon_common::{
    nla_align, CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_CMD_GETFAMILY, GENL_HDRLEN,
    GENL_ID_CTRL, NLA_HDRLEN, NLMSG_ERROR, NLMSG_HDRLEN, NLM_F_REQUEST, TASKSTATS_GENL_VERSION,
};

use crate::domain::MonitorError;
use crate::netlink::socket::NetlinkSocket;

/// Largest reply we expect from the kernel on the stats channel.
pub const MAX_MSG_SIZE: usize = 1024;

/// Build a single-attribute generic-netlink request frame.
///
/// `nlmsg_type` is the family id (or [`GENL_ID_CTRL`] for the controller),
/// `port` the sender id placed in the netlink header.
#[must_use]
pub fn build_request(nlmsg_type: u16, port: u32, cmd: u8, attr_type: u16, payload: &[u8]) -> Vec<u8> {
    let attr_len = NLA_HDRLEN + payload.len();
    let msg_len = NLMSG_HDRLEN + GENL_HDRLEN + nla_align(attr_len);

    let mut buf = Vec::with_capacity(msg_len);
    // struct nlmsghdr
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(msg_len as u32).to_ne_bytes());
    buf.extend_from_slice(&nlmsg_type.to_ne_bytes());
    buf.extend_from_slice(&NLM_F_REQUEST.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes()); // seq
    buf.extend_from_slice(&port.to_ne_bytes());
    // struct genlmsghdr
    buf.push(cmd);
    buf.push(TASKSTATS_GENL_VERSION);
    buf.extend_from_slice(&0u16.to_ne_bytes()); // reserved
    // the one attribute
    #[allow(clippy::cast_possible_truncation)]
    buf.extend_from_slice(&(attr_len as u16).to_ne_bytes());
    buf.extend_from_slice(&attr_type.to_ne_bytes());
    buf.extend_from_slice(payload);
    buf.resize(msg_len, 0); // alignment padding

    buf
}

/// A decoded reply frame: either the generic-netlink attribute payload or
/// the errno of an `NLMSG_ERROR` frame.
#[derive(Debug)]
pub enum GenlReply<'a> {
    Payload(&'a [u8]),
    Error(i32),
}

/// Split a received frame into its generic-netlink payload.
///
/// `None` means the frame was too short or inconsistent to interpret.
#[must_use]
pub fn parse_reply(frame: &[u8]) -> Option<GenlReply<'_>> {
    if frame.len() < NLMSG_HDRLEN {
        return None;
    }
    let nlmsg_len = u32::from_ne_bytes(frame[0..4].try_into().ok()?) as usize;
    let nlmsg_type = u16::from_ne_bytes(frame[4..6].try_into().ok()?);
    if nlmsg_len < NLMSG_HDRLEN || nlmsg_len > frame.len() {
        return None;
    }
    if nlmsg_type == NLMSG_ERROR {
        if nlmsg_len < NLMSG_HDRLEN + 4 {
            return None;
        }
        let errno = i32::from_ne_bytes(frame[NLMSG_HDRLEN..NLMSG_HDRLEN + 4].try_into().ok()?);
        return Some(GenlReply::Error(errno));
    }
    if nlmsg_len < NLMSG_HDRLEN + GENL_HDRLEN {
        return None;
    }
    Some(GenlReply::Payload(&frame[NLMSG_HDRLEN + GENL_HDRLEN..nlmsg_len]))
}

/// One attribute of a (possibly nested) attribute stream.
#[derive(Debug)]
pub struct Attr<'a> {
    pub ty: u16,
    pub payload: &'a [u8],
}

impl Attr<'_> {
    /// Interpret the payload as a native-endian u32 (ids are sent this way).
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        Some(u32::from_ne_bytes(self.payload.get(..4)?.try_into().ok()?))
    }

    /// Interpret the payload as a native-endian u16 (the family id).
    #[must_use]
    pub fn as_u16(&self) -> Option<u16> {
        Some(u16::from_ne_bytes(self.payload.get(..2)?.try_into().ok()?))
    }
}

/// Lazy walk over an attribute stream. Stops at the first header that does
/// not fit; the caller treats a short walk as a malformed frame.
pub struct AttrIter<'a> {
    buf: &'a [u8],
}

/// Walk the attributes of `payload`; nest by calling [`attrs`] again on an
/// aggregate attribute's payload.
#[must_use]
pub fn attrs(payload: &[u8]) -> AttrIter<'_> {
    AttrIter { buf: payload }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Attr<'a>;

    fn next(&mut self) -> Option<Attr<'a>> {
        if self.buf.len() < NLA_HDRLEN {
            return None;
        }
        let nla_len = u16::from_ne_bytes(self.buf[0..2].try_into().ok()?) as usize;
        let ty = u16::from_ne_bytes(self.buf[2..4].try_into().ok()?);
        if nla_len < NLA_HDRLEN || nla_len > self.buf.len() {
            return None;
        }
        let payload = &self.buf[NLA_HDRLEN..nla_len];
        let advance = nla_align(nla_len).min(self.buf.len());
        self.buf = &self.buf[advance..];
        Some(Attr { ty, payload })
    }
}

/// Pull the numeric family id out of a `CTRL_CMD_GETFAMILY` reply payload.
#[must_use]
pub fn family_id_from_payload(payload: &[u8]) -> Option<u16> {
    attrs(payload).find(|a| a.ty == CTRL_ATTR_FAMILY_ID)?.as_u16()
}

/// Resolve a generic-netlink family name to its id via the controller.
///
/// Performed once at startup; any failure here is fatal for the monitor.
pub fn resolve_family(sock: &NetlinkSocket, name: &'static str) -> Result<u16, MonitorError> {
    let mut payload = name.as_bytes().to_vec();
    payload.push(0); // family names go NUL-terminated
    let request = build_request(
        GENL_ID_CTRL,
        std::process::id(),
        CTRL_CMD_GETFAMILY,
        CTRL_ATTR_FAMILY_NAME,
        &payload,
    );
    sock.send(&request)?;

    let mut buf = [0u8; MAX_MSG_SIZE];
    let len = sock.recv(&mut buf)?;
    match parse_reply(&buf[..len]) {
        Some(GenlReply::Payload(attr_stream)) => {
            family_id_from_payload(attr_stream).ok_or(MonitorError::FamilyResolutionFailed(name))
        }
        Some(GenlReply::Error(errno)) => {
            debug!("family lookup for {name} failed with errno {errno}");
            Err(MonitorError::FamilyResolutionFailed(name))
        }
        None => Err(MonitorError::FamilyResolutionFailed(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmon_common::NLMSG_DONE;

    /// Append one attribute (with padding) to a byte stream.
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

    fn wrap_frame(nlmsg_type: u16, genl_payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        #[allow(clippy::cast_possible_truncation)]
        let len = (NLMSG_HDRLEN + GENL_HDRLEN + genl_payload.len()) as u32;
        frame.extend_from_slice(&len.to_ne_bytes());
        frame.extend_from_slice(&nlmsg_type.to_ne_bytes());
        frame.extend_from_slice(&0u16.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&[1, 1, 0, 0]); // genlmsghdr
        frame.extend_from_slice(genl_payload);
        frame
    }

    #[test]
    fn test_build_request_layout() {
        let tid = 1234u32;
        let req = build_request(0x19, 4242, 1, 1, &tid.to_ne_bytes());

        // nlmsghdr: 16 + genl: 4 + attr: 4 + 4 payload, already aligned
        assert_eq!(req.len(), 28);
        assert_eq!(u32::from_ne_bytes(req[0..4].try_into().unwrap()), 28);
        assert_eq!(u16::from_ne_bytes(req[4..6].try_into().unwrap()), 0x19);
        assert_eq!(u16::from_ne_bytes(req[6..8].try_into().unwrap()), NLM_F_REQUEST);
        assert_eq!(u32::from_ne_bytes(req[12..16].try_into().unwrap()), 4242);
        assert_eq!(req[16], 1); // cmd
        assert_eq!(req[17], TASKSTATS_GENL_VERSION);
        assert_eq!(u16::from_ne_bytes(req[20..22].try_into().unwrap()), 8); // nla_len
        assert_eq!(u32::from_ne_bytes(req[24..28].try_into().unwrap()), tid);
    }

    #[test]
    fn test_unaligned_attribute_is_padded() {
        let req = build_request(0x19, 1, 1, 3, b"0-3\0");
        // 4-byte payload happens to align; a 5-byte one must not.
        let req5 = build_request(0x19, 1, 1, 3, b"0-15\0");
        assert_eq!(req.len() % 4, 0);
        assert_eq!(req5.len() % 4, 0);
        assert_eq!(req5.len(), NLMSG_HDRLEN + GENL_HDRLEN + nla_align(NLA_HDRLEN + 5));
    }

    #[test]
    fn test_attr_walk_with_padding() {
        let mut stream = Vec::new();
        push_attr(&mut stream, 7, b"abcde"); // 5-byte payload forces padding
        push_attr(&mut stream, 9, &42u32.to_ne_bytes());

        let collected: Vec<_> = attrs(&stream).collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].ty, 7);
        assert_eq!(collected[0].payload, b"abcde");
        assert_eq!(collected[1].ty, 9);
        assert_eq!(collected[1].as_u32(), Some(42));
    }

    #[test]
    fn test_attr_walk_stops_on_truncated_header() {
        let mut stream = Vec::new();
        push_attr(&mut stream, 1, &1u32.to_ne_bytes());
        stream.extend_from_slice(&[200u8, 0]); // bogus trailing half-header
        assert_eq!(attrs(&stream).count(), 1);
    }

    #[test]
    fn test_family_id_resolution_from_reply() {
        // Reply carries the echoed name first, then the id - the walk must
        // skip past the name attribute and its padding.
        let mut payload = Vec::new();
        push_attr(&mut payload, CTRL_ATTR_FAMILY_NAME, b"TASKSTATS\0");
        push_attr(&mut payload, CTRL_ATTR_FAMILY_ID, &0x19u16.to_ne_bytes());

        assert_eq!(family_id_from_payload(&payload), Some(0x19));
        let frame = wrap_frame(NLMSG_DONE, &payload);
        match parse_reply(&frame) {
            Some(GenlReply::Payload(p)) => assert_eq!(family_id_from_payload(p), Some(0x19)),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_error_frame() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&36u32.to_ne_bytes());
        frame.extend_from_slice(&NLMSG_ERROR.to_ne_bytes());
        frame.extend_from_slice(&0u16.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&0u32.to_ne_bytes());
        frame.extend_from_slice(&(-3i32).to_ne_bytes()); // -ESRCH
        frame.extend_from_slice(&[0u8; 16]); // echoed request header
        match parse_reply(&frame) {
            Some(GenlReply::Error(errno)) => assert_eq!(errno, -3),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_short_frame_is_rejected() {
        assert!(parse_reply(&[0u8; 8]).is_none());
        // Header claims more bytes than received.
        let mut frame = wrap_frame(NLMSG_DONE, &[]);
        frame[0] = 200;
        assert!(parse_reply(&frame).is_none());
    }
}
