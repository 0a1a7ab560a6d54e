//! Conntrack records carried in netfilter notifications, and the classifier
//! that turns a notification into a tracker event.

pub mod event;
pub mod status;
pub mod tuple;

pub use event::*;
pub use status::*;
pub use tuple::*;

/// Top-level conntrack attribute types (`CTA_*`).
pub mod attr {
    pub const TUPLE_ORIG: u16 = 1;
    pub const TUPLE_REPLY: u16 = 2;
    pub const STATUS: u16 = 3;
}

/// Children of a tuple attribute (`CTA_TUPLE_*`).
pub mod tuple_attr {
    pub const IP: u16 = 1;
    pub const PROTO: u16 = 2;
    pub const ZONE: u16 = 3;
}

/// Children of an IP tuple (`CTA_IP_*`).
pub mod ip_attr {
    pub const V4_SRC: u16 = 1;
    pub const V4_DST: u16 = 2;
    pub const V6_SRC: u16 = 3;
    pub const V6_DST: u16 = 4;
}

/// Children of a protocol tuple (`CTA_PROTO_*`).
pub mod proto_attr {
    pub const NUM: u16 = 1;
    pub const SRC_PORT: u16 = 2;
    pub const DST_PORT: u16 = 3;
    pub const ICMP_ID: u16 = 4;
    pub const ICMP_TYPE: u16 = 5;
    pub const ICMP_CODE: u16 = 6;
    pub const ICMPV6_ID: u16 = 7;
    pub const ICMPV6_TYPE: u16 = 8;
    pub const ICMPV6_CODE: u16 = 9;
}

pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_IGMP: u8 = 2;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_DCCP: u8 = 33;
pub const IPPROTO_ICMPV6: u8 = 58;
pub const IPPROTO_SCTP: u8 = 132;
pub const IPPROTO_UDPLITE: u8 = 136;

/// Short name used in metric labels.
pub fn protocol_name(protocol: u8) -> String {
    match protocol {
        IPPROTO_ICMP => "icmp".into(),
        IPPROTO_IGMP => "igmp".into(),
        IPPROTO_TCP => "tcp".into(),
        IPPROTO_UDP => "udp".into(),
        IPPROTO_ICMPV6 => "ipv6-icmp".into(),
        other => other.to_string(),
    }
}
