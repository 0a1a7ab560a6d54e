use std::cell::Cell;
use std::net::IpAddr;

use crate::netfilter::{
    AttributeWriter, DecodeError, EncodeError, Flow, Header, NFNL_SUBSYS_CTNETLINK, NLM_F_CREATE,
    NLM_F_EXCL, NetlinkMessage, walk,
};

use super::{IPPROTO_TCP, Status, Tuple, attr};

/// Conntrack message types (`IPCTNL_MSG_CT_*`).
const CT_NEW: u8 = 0;
const CT_DELETE: u8 = 2;

/// What happened to a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    New,
    Update,
    Destroy,
    Other,
}

impl EventKind {
    /// Derive the event kind from a conntrack netfilter header.
    pub fn from_header(header: &Header) -> Self {
        if header.subsystem != NFNL_SUBSYS_CTNETLINK {
            return EventKind::Other;
        }
        match header.message_type {
            // New and update share a message type and differ only in flags.
            CT_NEW if header.flags & (NLM_F_CREATE | NLM_F_EXCL) != 0 => EventKind::New,
            CT_NEW => EventKind::Update,
            CT_DELETE => EventKind::Destroy,
            _ => EventKind::Other,
        }
    }

    fn message_type_and_flags(self) -> (u8, u16) {
        match self {
            EventKind::New => (CT_NEW, NLM_F_CREATE | NLM_F_EXCL),
            EventKind::Update => (CT_NEW, 0),
            EventKind::Destroy => (CT_DELETE, 0),
            EventKind::Other => (1, 0),
        }
    }
}

/// A classified conntrack notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Original-direction tuple; its destination is the remote endpoint.
    pub tuple: Tuple,
    pub status: Status,
}

impl Event {
    /// Destination (address, protocol, port) of the original direction.
    pub fn destination(&self) -> Option<(IpAddr, u8, u16)> {
        let address = self.tuple.ip.destination?;
        Some((
            address,
            self.tuple.proto.protocol,
            self.tuple.proto.destination_port,
        ))
    }

    /// Build the notification message that `classify` reads this event from.
    pub fn to_message(&self) -> Result<NetlinkMessage, EncodeError> {
        let family = match self.tuple.ip.destination {
            Some(IpAddr::V6(_)) => libc::AF_INET6 as u8,
            _ => libc::AF_INET as u8,
        };

        let mut writer = AttributeWriter::new();
        self.tuple.encode(attr::TUPLE_ORIG, &mut writer)?;
        writer.put_be32(attr::STATUS, self.status.0);

        let mut data = Header::nfgen_bytes(family, 0, 0).to_vec();
        data.extend(writer.into_bytes());

        let (message_type, flags) = self.kind.message_type_and_flags();
        let kind = (u16::from(NFNL_SUBSYS_CTNETLINK) << 8) | u16::from(message_type);
        Ok(NetlinkMessage::new(kind, flags, data))
    }
}

/// Classify a conntrack notification.
///
/// Returns `Ok(None)` when the message is filtered:
/// - not a conntrack message, or neither a destroy nor an update
/// - a destroy whose connection saw a reply (it completed a handshake)
/// - a protocol other than TCP
///
/// Attributes that are present but malformed are errors, as is an accepted
/// message lacking the attributes the tracker needs.
pub fn classify(message: &NetlinkMessage) -> Result<Option<Event>, DecodeError> {
    let kind = Cell::new(EventKind::Other);
    let mut status = None;
    let mut tuple = None;

    let flow = walk(
        message,
        |header| {
            kind.set(EventKind::from_header(header));
            Ok(match kind.get() {
                EventKind::Destroy | EventKind::Update => Flow::Continue,
                _ => Flow::Stop,
            })
        },
        |attribute| {
            match attribute.kind {
                attr::STATUS => {
                    if kind.get() != EventKind::Destroy {
                        return Ok(Flow::Continue);
                    }
                    let decoded = Status::decode(&attribute)?;
                    status = Some(decoded);
                    if decoded.seen_reply() {
                        return Ok(Flow::Stop);
                    }
                }
                attr::TUPLE_ORIG => {
                    let decoded = Tuple::decode(&attribute)?;
                    tuple = Some(decoded);
                    if decoded.proto.protocol != IPPROTO_TCP {
                        return Ok(Flow::Stop);
                    }
                }
                _ => {}
            }
            Ok::<_, DecodeError>(Flow::Continue)
        },
    )?;

    if flow == Flow::Stop {
        return Ok(None);
    }

    let kind = kind.get();
    let tuple = tuple.ok_or(DecodeError::MissingAttribute("original tuple"))?;
    if !tuple.filled() {
        return Err(DecodeError::Incomplete);
    }
    let status = match kind {
        EventKind::Destroy => status.ok_or(DecodeError::MissingAttribute("status"))?,
        _ => status.unwrap_or_default(),
    };

    Ok(Some(Event {
        kind,
        tuple,
        status,
    }))
}
