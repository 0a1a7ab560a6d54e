use super::DecodeError;

/// Size of `struct nlmsghdr`.
pub const NLMSG_HEADER_LEN: usize = 16;
/// Size of `struct nfgenmsg` that follows the netlink header.
pub const NFGEN_HEADER_LEN: usize = 4;

/// Netlink control message carrying an errno.
pub const NLMSG_ERROR: u16 = 2;

/// The fixed netlink header, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetlinkHeader {
    pub length: u32,
    pub kind: u16,
    pub flags: u16,
    pub sequence: u32,
    pub pid: u32,
}

/// One netlink message: header plus everything after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetlinkMessage {
    pub header: NetlinkHeader,
    pub data: Vec<u8>,
}

impl NetlinkMessage {
    pub fn new(kind: u16, flags: u16, data: Vec<u8>) -> Self {
        Self {
            header: NetlinkHeader {
                length: (NLMSG_HEADER_LEN + data.len()) as u32,
                kind,
                flags,
                sequence: 0,
                pid: 0,
            },
            data,
        }
    }

    /// Attribute bytes following the netfilter header.
    pub fn payload(&self) -> Result<&[u8], DecodeError> {
        self.data
            .get(NFGEN_HEADER_LEN..)
            .ok_or(DecodeError::Truncated {
                what: "netfilter header",
                len: self.data.len(),
            })
    }

    /// If this is an `NLMSG_ERROR` carrying a non-zero errno, return it.
    pub fn errno(&self) -> Option<i32> {
        if self.header.kind != NLMSG_ERROR || self.data.len() < 4 {
            return None;
        }
        let code = i32::from_ne_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]);
        (code != 0).then_some(code.wrapping_neg())
    }

    /// Serialize to wire format, padding to a 4-byte boundary.
    pub fn encode(&self) -> Vec<u8> {
        let length = NLMSG_HEADER_LEN + self.data.len();
        let mut buf = Vec::with_capacity(align(length));
        buf.extend_from_slice(&(length as u32).to_ne_bytes());
        buf.extend_from_slice(&self.header.kind.to_ne_bytes());
        buf.extend_from_slice(&self.header.flags.to_ne_bytes());
        buf.extend_from_slice(&self.header.sequence.to_ne_bytes());
        buf.extend_from_slice(&self.header.pid.to_ne_bytes());
        buf.extend_from_slice(&self.data);
        buf.resize(align(length), 0);
        buf
    }
}

/// Split a received datagram into its netlink messages.
pub fn parse_messages(mut buf: &[u8]) -> Result<Vec<NetlinkMessage>, DecodeError> {
    let mut messages = Vec::new();

    while !buf.is_empty() {
        if buf.len() < NLMSG_HEADER_LEN {
            return Err(DecodeError::Truncated {
                what: "netlink header",
                len: buf.len(),
            });
        }

        let header = NetlinkHeader {
            length: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            kind: u16::from_ne_bytes([buf[4], buf[5]]),
            flags: u16::from_ne_bytes([buf[6], buf[7]]),
            sequence: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            pid: u32::from_ne_bytes([buf[12], buf[13], buf[14], buf[15]]),
        };

        let length = header.length as usize;
        if length < NLMSG_HEADER_LEN || length > buf.len() {
            return Err(DecodeError::MessageLength {
                length,
                remaining: buf.len(),
            });
        }

        messages.push(NetlinkMessage {
            header,
            data: buf[NLMSG_HEADER_LEN..length].to_vec(),
        });

        buf = &buf[align(length).min(buf.len())..];
    }

    Ok(messages)
}

/// The netfilter view of a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub subsystem: u8,
    pub message_type: u8,
    pub flags: u16,
    pub family: u8,
    pub version: u8,
    pub resource_id: u16,
}

impl Header {
    pub fn decode(message: &NetlinkMessage) -> Result<Self, DecodeError> {
        let data = &message.data;
        if data.len() < NFGEN_HEADER_LEN {
            return Err(DecodeError::Truncated {
                what: "netfilter header",
                len: data.len(),
            });
        }

        Ok(Self {
            subsystem: (message.header.kind >> 8) as u8,
            message_type: (message.header.kind & 0xff) as u8,
            flags: message.header.flags,
            family: data[0],
            version: data[1],
            resource_id: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Encode the `nfgenmsg` portion.
    pub fn nfgen_bytes(family: u8, version: u8, resource_id: u16) -> [u8; NFGEN_HEADER_LEN] {
        let id = resource_id.to_be_bytes();
        [family, version, id[0], id[1]]
    }
}

pub(crate) const fn align(len: usize) -> usize {
    (len + 3) & !3
}
