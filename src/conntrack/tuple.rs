//! Tuple codec: IP address pair, protocol fields and the composite tuple that
//! identifies one direction of a tracked flow.

use std::net::IpAddr;

use crate::netfilter::{Attribute, AttributeWriter, DecodeError, EncodeError};

use super::{
    IPPROTO_DCCP, IPPROTO_SCTP, IPPROTO_TCP, IPPROTO_UDP, IPPROTO_UDPLITE, ip_attr, proto_attr,
    tuple_attr,
};

/// Source and destination address of a flow direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct IpTuple {
    pub source: Option<IpAddr>,
    pub destination: Option<IpAddr>,
}

impl IpTuple {
    pub fn new(source: IpAddr, destination: IpAddr) -> Self {
        Self {
            source: Some(source),
            destination: Some(destination),
        }
    }

    /// Both addresses are present and IPv6.
    pub fn is_ipv6(&self) -> bool {
        matches!(
            (self.source, self.destination),
            (Some(IpAddr::V6(_)), Some(IpAddr::V6(_)))
        )
    }

    pub fn decode(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        Self::decode_children(attribute).map_err(|e| e.during("ip tuple"))
    }

    fn decode_children(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        if attribute.kind != tuple_attr::IP {
            return Err(DecodeError::WrongType {
                got: attribute.kind,
                want: "ip tuple",
            });
        }

        let children = attribute.children()?;
        if children.len() != 2 {
            return Err(DecodeError::NeedChildren {
                want: "exactly 2",
                got: children.len(),
            });
        }

        let mut tuple = IpTuple::default();
        for child in &children {
            // Length decides the family, so check it before the type.
            let address = match child.data.len() {
                4 => {
                    let mut octets = [0u8; 4];
                    octets.copy_from_slice(child.data);
                    IpAddr::from(octets)
                }
                16 => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(child.data);
                    IpAddr::from(octets)
                }
                _ => return Err(child.incorrect_size()),
            };

            match child.kind {
                ip_attr::V4_SRC | ip_attr::V6_SRC => tuple.source = Some(address),
                ip_attr::V4_DST | ip_attr::V6_DST => tuple.destination = Some(address),
                other => {
                    return Err(DecodeError::UnknownChild {
                        child: other,
                        parent: "ip tuple",
                    });
                }
            }
        }

        Ok(tuple)
    }

    /// Append this tuple as a nested `CTA_TUPLE_IP` attribute.
    pub fn encode(&self, writer: &mut AttributeWriter) -> Result<(), EncodeError> {
        match (self.source, self.destination) {
            (Some(IpAddr::V4(src)), Some(IpAddr::V4(dst))) => {
                writer.nest(tuple_attr::IP, |w| {
                    w.put(ip_attr::V4_SRC, &src.octets());
                    w.put(ip_attr::V4_DST, &dst.octets());
                });
                Ok(())
            }
            (Some(IpAddr::V6(src)), Some(IpAddr::V6(dst))) => {
                writer.nest(tuple_attr::IP, |w| {
                    w.put(ip_attr::V6_SRC, &src.octets());
                    w.put(ip_attr::V6_DST, &dst.octets());
                });
                Ok(())
            }
            _ => Err(EncodeError::AddressFamily),
        }
    }
}

/// Protocol number plus the transport fields conntrack keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ProtoTuple {
    pub protocol: u8,
    pub source_port: u16,
    pub destination_port: u16,
    pub icmp_v4: bool,
    pub icmp_v6: bool,
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub icmp_id: u16,
}

impl ProtoTuple {
    pub fn ports(protocol: u8, source_port: u16, destination_port: u16) -> Self {
        Self {
            protocol,
            source_port,
            destination_port,
            ..Self::default()
        }
    }

    pub fn tcp(source_port: u16, destination_port: u16) -> Self {
        Self::ports(IPPROTO_TCP, source_port, destination_port)
    }

    pub fn icmp(protocol: u8, icmp_type: u8, icmp_code: u8, icmp_id: u16, v6: bool) -> Self {
        Self {
            protocol,
            icmp_v4: !v6,
            icmp_v6: v6,
            icmp_type,
            icmp_code,
            icmp_id,
            ..Self::default()
        }
    }

    /// Protocols whose tuples carry source and destination ports.
    pub fn carries_ports(protocol: u8) -> bool {
        matches!(
            protocol,
            IPPROTO_TCP | IPPROTO_UDP | IPPROTO_UDPLITE | IPPROTO_SCTP | IPPROTO_DCCP
        )
    }

    pub fn decode(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        Self::decode_children(attribute).map_err(|e| e.during("proto tuple"))
    }

    fn decode_children(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        if attribute.kind != tuple_attr::PROTO {
            return Err(DecodeError::WrongType {
                got: attribute.kind,
                want: "proto tuple",
            });
        }

        let children = attribute.children()?;
        if children.is_empty() {
            return Err(DecodeError::NeedChildren {
                want: "at least 1",
                got: 0,
            });
        }

        let mut tuple = ProtoTuple::default();
        for child in &children {
            match child.kind {
                proto_attr::NUM => tuple.protocol = child.as_u8()?,
                proto_attr::SRC_PORT => tuple.source_port = child.as_be16()?,
                proto_attr::DST_PORT => tuple.destination_port = child.as_be16()?,
                proto_attr::ICMP_TYPE => {
                    tuple.icmp_v4 = true;
                    tuple.icmp_type = child.as_u8()?;
                }
                proto_attr::ICMP_CODE => {
                    tuple.icmp_v4 = true;
                    tuple.icmp_code = child.as_u8()?;
                }
                proto_attr::ICMP_ID => {
                    tuple.icmp_v4 = true;
                    tuple.icmp_id = child.as_be16()?;
                }
                proto_attr::ICMPV6_TYPE => {
                    tuple.icmp_v6 = true;
                    tuple.icmp_type = child.as_u8()?;
                }
                proto_attr::ICMPV6_CODE => {
                    tuple.icmp_v6 = true;
                    tuple.icmp_code = child.as_u8()?;
                }
                proto_attr::ICMPV6_ID => {
                    tuple.icmp_v6 = true;
                    tuple.icmp_id = child.as_be16()?;
                }
                other => {
                    return Err(DecodeError::UnknownChild {
                        child: other,
                        parent: "proto tuple",
                    });
                }
            }
        }

        Ok(tuple)
    }

    /// Append this tuple as a nested `CTA_TUPLE_PROTO` attribute.
    pub fn encode(&self, writer: &mut AttributeWriter) {
        writer.nest(tuple_attr::PROTO, |w| {
            w.put_u8(proto_attr::NUM, self.protocol);
            if self.icmp_v4 {
                w.put_u8(proto_attr::ICMP_TYPE, self.icmp_type);
                w.put_u8(proto_attr::ICMP_CODE, self.icmp_code);
                w.put_be16(proto_attr::ICMP_ID, self.icmp_id);
            } else if self.icmp_v6 {
                w.put_u8(proto_attr::ICMPV6_TYPE, self.icmp_type);
                w.put_u8(proto_attr::ICMPV6_CODE, self.icmp_code);
                w.put_be16(proto_attr::ICMPV6_ID, self.icmp_id);
            } else if Self::carries_ports(self.protocol) {
                w.put_be16(proto_attr::SRC_PORT, self.source_port);
                w.put_be16(proto_attr::DST_PORT, self.destination_port);
            }
        });
    }
}

/// One direction of a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Tuple {
    pub ip: IpTuple,
    pub proto: ProtoTuple,
    pub zone: Option<u16>,
}

impl Tuple {
    pub fn new(ip: IpTuple, proto: ProtoTuple) -> Self {
        Self {
            ip,
            proto,
            zone: None,
        }
    }

    /// Both addresses and the protocol number are set.
    pub fn filled(&self) -> bool {
        self.ip.source.is_some() && self.ip.destination.is_some() && self.proto.protocol != 0
    }

    /// Decode a nested tuple attribute (original or reply direction).
    pub fn decode(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        Self::decode_children(attribute).map_err(|e| e.during("tuple"))
    }

    fn decode_children(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        let children = attribute.children()?;
        if children.len() < 2 {
            return Err(DecodeError::NeedChildren {
                want: "at least 2",
                got: children.len(),
            });
        }

        let mut tuple = Tuple::default();
        let (mut saw_ip, mut saw_proto) = (false, false);
        for child in &children {
            match child.kind {
                tuple_attr::IP => {
                    tuple.ip = IpTuple::decode(child)?;
                    saw_ip = true;
                }
                tuple_attr::PROTO => {
                    tuple.proto = ProtoTuple::decode(child)?;
                    saw_proto = true;
                }
                tuple_attr::ZONE => tuple.zone = Some(child.as_be16()?),
                other => {
                    return Err(DecodeError::UnknownChild {
                        child: other,
                        parent: "tuple",
                    });
                }
            }
        }

        if !saw_ip {
            return Err(DecodeError::MissingAttribute("ip tuple"));
        }
        if !saw_proto {
            return Err(DecodeError::MissingAttribute("proto tuple"));
        }
        Ok(tuple)
    }

    /// Append this tuple as a nested attribute of type `kind`.
    ///
    /// On error the writer holds a partial attribute and should be discarded.
    pub fn encode(&self, kind: u16, writer: &mut AttributeWriter) -> Result<(), EncodeError> {
        writer.nest(kind, |w| -> Result<(), EncodeError> {
            self.ip.encode(w)?;
            self.proto.encode(w);
            if let Some(zone) = self.zone {
                w.put_be16(tuple_attr::ZONE, zone);
            }
            Ok(())
        })
    }

    pub fn to_bytes(&self, kind: u16) -> Result<Vec<u8>, EncodeError> {
        let mut writer = AttributeWriter::new();
        self.encode(kind, &mut writer)?;
        Ok(writer.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conntrack::{IPPROTO_ICMP, IPPROTO_ICMPV6, attr};
    use crate::netfilter::decode_attributes;
    use proptest::prelude::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn single(bytes: &[u8]) -> Attribute<'_> {
        let attrs = decode_attributes(bytes).unwrap();
        assert_eq!(attrs.len(), 1);
        attrs[0]
    }

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn test_ip_tuple_v4() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::IP, |w| {
            w.put(ip_attr::V4_SRC, &[1, 2, 3, 4]);
            w.put(ip_attr::V4_DST, &[4, 3, 2, 1]);
        });
        let bytes = w.into_bytes();

        let tuple = IpTuple::decode(&single(&bytes)).unwrap();
        assert_eq!(tuple, IpTuple::new(v4(1, 2, 3, 4), v4(4, 3, 2, 1)));
        assert!(!tuple.is_ipv6());

        let mut again = AttributeWriter::new();
        tuple.encode(&mut again).unwrap();
        assert_eq!(again.into_bytes(), bytes);
    }

    #[test]
    fn test_ip_tuple_v6() {
        let src: Ipv6Addr = "1:1:2:2:3:3:4:4".parse().unwrap();
        let dst: Ipv6Addr = "4:4:3:3:2:2:1:1".parse().unwrap();
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::IP, |w| {
            w.put(ip_attr::V6_SRC, &src.octets());
            w.put(ip_attr::V6_DST, &dst.octets());
        });
        let bytes = w.into_bytes();

        let tuple = IpTuple::decode(&single(&bytes)).unwrap();
        assert_eq!(tuple, IpTuple::new(src.into(), dst.into()));
        assert!(tuple.is_ipv6());
    }

    #[test]
    fn test_ip_tuple_not_nested() {
        let mut w = AttributeWriter::new();
        w.put(tuple_attr::IP, &[]);
        let bytes = w.into_bytes();

        let err = IpTuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ip tuple: need a nested attribute to decode this structure"
        );
    }

    #[test]
    fn test_ip_tuple_child_count() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::IP, |w| w.put(ip_attr::V4_SRC, &[1, 2, 3, 4]));
        let bytes = w.into_bytes();

        let err = IpTuple::decode(&single(&bytes)).unwrap_err();
        assert!(matches!(err.root(), DecodeError::NeedChildren { got: 1, .. }));
    }

    #[test]
    fn test_ip_tuple_bad_address_length() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::IP, |w| {
            w.put(ip_attr::V4_SRC, &[1, 2, 3, 4, 5]);
            w.put(ip_attr::V4_DST, &[1, 2, 3, 4]);
        });
        let bytes = w.into_bytes();

        let err = IpTuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(
            err.root(),
            &DecodeError::IncorrectSize {
                kind: ip_attr::V4_SRC,
                len: 5
            }
        );
    }

    #[test]
    fn test_ip_tuple_unknown_child() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::IP, |w| {
            w.put(0x3fff, &[0, 0, 0, 0]);
            w.put(ip_attr::V4_DST, &[1, 2, 3, 4]);
        });
        let bytes = w.into_bytes();

        let err = IpTuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ip tuple: unknown child attribute type 16383 in ip tuple"
        );
    }

    #[test]
    fn test_ip_tuple_wrong_type() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::PROTO, |w| w.put_u8(proto_attr::NUM, 6));
        let bytes = w.into_bytes();

        let err = IpTuple::decode(&single(&bytes)).unwrap_err();
        assert!(matches!(err.root(), DecodeError::WrongType { got: 2, .. }));
    }

    #[test]
    fn test_ip_tuple_encode_family_mismatch() {
        let mixed = IpTuple::new(v4(1, 2, 3, 4), IpAddr::V6(Ipv6Addr::LOCALHOST));
        let err = mixed.encode(&mut AttributeWriter::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "IPTuple source and destination addresses must be valid and belong to the same address family"
        );

        let missing = IpTuple {
            source: Some(v4(1, 2, 3, 4)),
            destination: None,
        };
        assert_eq!(
            missing.encode(&mut AttributeWriter::new()),
            Err(EncodeError::AddressFamily)
        );
    }

    #[test]
    fn test_proto_tuple_icmp() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::PROTO, |w| {
            w.put_u8(proto_attr::NUM, IPPROTO_ICMP);
            w.put_u8(proto_attr::ICMP_TYPE, 1);
            w.put_u8(proto_attr::ICMP_CODE, 0xf);
            w.put_be16(proto_attr::ICMP_ID, 0x1234);
        });
        let bytes = w.into_bytes();

        let tuple = ProtoTuple::decode(&single(&bytes)).unwrap();
        assert_eq!(tuple, ProtoTuple::icmp(IPPROTO_ICMP, 1, 0xf, 0x1234, false));

        let mut again = AttributeWriter::new();
        tuple.encode(&mut again);
        assert_eq!(again.into_bytes(), bytes);
    }

    #[test]
    fn test_proto_tuple_icmpv6() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::PROTO, |w| {
            w.put_u8(proto_attr::NUM, IPPROTO_ICMPV6);
            w.put_u8(proto_attr::ICMPV6_TYPE, 2);
            w.put_u8(proto_attr::ICMPV6_CODE, 0xe);
            w.put_be16(proto_attr::ICMPV6_ID, 0x5678);
        });
        let bytes = w.into_bytes();

        let tuple = ProtoTuple::decode(&single(&bytes)).unwrap();
        assert!(tuple.icmp_v6);
        assert!(!tuple.icmp_v4);
        assert_eq!(tuple.icmp_type, 2);
        assert_eq!(tuple.icmp_code, 0xe);
        assert_eq!(tuple.icmp_id, 0x5678);
    }

    #[test]
    fn test_proto_tuple_needs_children() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::PROTO, |_| {});
        let bytes = w.into_bytes();

        let err = ProtoTuple::decode(&single(&bytes)).unwrap_err();
        assert!(matches!(err.root(), DecodeError::NeedChildren { got: 0, .. }));
    }

    #[test]
    fn test_proto_tuple_unknown_child() {
        let mut w = AttributeWriter::new();
        w.nest(tuple_attr::PROTO, |w| {
            w.put_u8(proto_attr::NUM, 6);
            w.put_u8(0x3fff, 0);
        });
        let bytes = w.into_bytes();

        let err = ProtoTuple::decode(&single(&bytes)).unwrap_err();
        assert!(matches!(
            err.root(),
            DecodeError::UnknownChild { child: 0x3fff, .. }
        ));
    }

    #[test]
    fn test_tuple_with_zone_round_trip() {
        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| {
            w.nest(tuple_attr::IP, |w| {
                w.put(ip_attr::V6_SRC, &Ipv6Addr::LOCALHOST.octets());
                w.put(ip_attr::V6_DST, &Ipv6Addr::LOCALHOST.octets());
            });
            w.nest(tuple_attr::PROTO, |w| {
                w.put_u8(proto_attr::NUM, 6);
                w.put(proto_attr::SRC_PORT, &[0x80, 0x0c]);
                w.put(proto_attr::DST_PORT, &[0x00, 0x50]);
            });
            w.put(tuple_attr::ZONE, &[0x00, 0x7b]);
        });
        let bytes = w.into_bytes();

        let tuple = Tuple::decode(&single(&bytes)).unwrap();
        assert_eq!(
            tuple,
            Tuple {
                ip: IpTuple::new(Ipv6Addr::LOCALHOST.into(), Ipv6Addr::LOCALHOST.into()),
                proto: ProtoTuple::tcp(32780, 80),
                zone: Some(123),
            }
        );
        assert!(tuple.filled());
        assert_eq!(tuple.to_bytes(attr::TUPLE_ORIG).unwrap(), bytes);
    }

    #[test]
    fn test_tuple_bad_zone_size() {
        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_REPLY, |w| {
            w.put(tuple_attr::ZONE, &[0xab, 0xcd, 0xef, 0x01]);
            w.put_u8(0, 0);
        });
        let bytes = w.into_bytes();

        let err = Tuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(
            err.root(),
            &DecodeError::IncorrectSize {
                kind: tuple_attr::ZONE,
                len: 4
            }
        );
    }

    #[test]
    fn test_tuple_wraps_sub_errors() {
        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| {
            w.put(tuple_attr::IP, &[]);
            w.put(tuple_attr::ZONE, &[0, 1]);
        });
        let bytes = w.into_bytes();

        let err = Tuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tuple: ip tuple: need a nested attribute to decode this structure"
        );

        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| {
            w.put(tuple_attr::PROTO, &[]);
            w.put(tuple_attr::ZONE, &[0, 1]);
        });
        let bytes = w.into_bytes();

        let err = Tuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "tuple: proto tuple: need a nested attribute to decode this structure"
        );
    }

    #[test]
    fn test_tuple_structure_errors() {
        let mut w = AttributeWriter::new();
        w.put(attr::TUPLE_ORIG, &[]);
        let bytes = w.into_bytes();
        assert_eq!(
            Tuple::decode(&single(&bytes)).unwrap_err().root(),
            &DecodeError::NotNested
        );

        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| w.put(tuple_attr::ZONE, &[0, 1]));
        let bytes = w.into_bytes();
        assert!(matches!(
            Tuple::decode(&single(&bytes)).unwrap_err().root(),
            DecodeError::NeedChildren { got: 1, .. }
        ));

        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| {
            w.put(0x3fff, &[]);
            w.put(0x3fff, &[]);
        });
        let bytes = w.into_bytes();
        assert!(matches!(
            Tuple::decode(&single(&bytes)).unwrap_err().root(),
            DecodeError::UnknownChild { child: 0x3fff, parent: "tuple" }
        ));
    }

    #[test]
    fn test_tuple_requires_ip_and_proto() {
        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| {
            w.nest(tuple_attr::IP, |w| {
                w.put(ip_attr::V4_SRC, &[10, 0, 0, 1]);
                w.put(ip_attr::V4_DST, &[10, 0, 0, 2]);
            });
            w.put(tuple_attr::ZONE, &[0, 1]);
        });
        let bytes = w.into_bytes();

        let err = Tuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(err.root(), &DecodeError::MissingAttribute("proto tuple"));
        assert_eq!(err.to_string(), "tuple: missing proto tuple attribute");

        let mut w = AttributeWriter::new();
        w.nest(attr::TUPLE_ORIG, |w| {
            w.nest(tuple_attr::PROTO, |w| {
                w.put_u8(proto_attr::NUM, 6);
                w.put(proto_attr::SRC_PORT, &[0x80, 0x0c]);
                w.put(proto_attr::DST_PORT, &[0x00, 0x50]);
            });
            w.put(tuple_attr::ZONE, &[0, 1]);
        });
        let bytes = w.into_bytes();

        let err = Tuple::decode(&single(&bytes)).unwrap_err();
        assert_eq!(err.root(), &DecodeError::MissingAttribute("ip tuple"));
    }

    #[test]
    fn test_tuple_encode_error() {
        let tuple = Tuple::new(
            IpTuple::new(v4(1, 2, 3, 4), IpAddr::V6(Ipv6Addr::LOCALHOST)),
            ProtoTuple::tcp(1, 2),
        );
        assert_eq!(
            tuple.to_bytes(attr::TUPLE_ORIG),
            Err(EncodeError::AddressFamily)
        );
    }

    #[test]
    fn test_tuple_filled() {
        assert!(!Tuple::default().filled());

        let addresses = IpTuple::new(v4(0, 0, 0, 0), v4(0, 0, 0, 0));
        assert!(!Tuple::new(addresses, ProtoTuple::default()).filled());
        assert!(!Tuple::new(IpTuple::default(), ProtoTuple::tcp(0, 0)).filled());
        assert!(Tuple::new(addresses, ProtoTuple::tcp(0, 0)).filled());

        let half = IpTuple {
            source: None,
            destination: Some(v4(1, 1, 1, 1)),
        };
        assert!(!Tuple::new(half, ProtoTuple::tcp(0, 0)).filled());
    }

    fn proto_tuple_strategy() -> impl Strategy<Value = ProtoTuple> {
        prop_oneof![
            (
                prop::sample::select(vec![
                    IPPROTO_TCP,
                    IPPROTO_UDP,
                    IPPROTO_UDPLITE,
                    IPPROTO_SCTP,
                    IPPROTO_DCCP
                ]),
                any::<u16>(),
                any::<u16>()
            )
                .prop_map(|(p, s, d)| ProtoTuple::ports(p, s, d)),
            (any::<u8>(), any::<u8>(), any::<u16>())
                .prop_map(|(t, c, id)| ProtoTuple::icmp(IPPROTO_ICMP, t, c, id, false)),
            (any::<u8>(), any::<u8>(), any::<u16>())
                .prop_map(|(t, c, id)| ProtoTuple::icmp(IPPROTO_ICMPV6, t, c, id, true)),
            (1u8..=255)
                .prop_filter("no transport fields", |p| !ProtoTuple::carries_ports(*p)
                    && *p != IPPROTO_ICMP
                    && *p != IPPROTO_ICMPV6)
                .prop_map(|p| ProtoTuple::ports(p, 0, 0)),
        ]
    }

    fn ip_tuple_strategy() -> impl Strategy<Value = IpTuple> {
        prop_oneof![
            (any::<[u8; 4]>(), any::<[u8; 4]>())
                .prop_map(|(s, d)| IpTuple::new(IpAddr::from(s), IpAddr::from(d))),
            (any::<[u8; 16]>(), any::<[u8; 16]>())
                .prop_map(|(s, d)| IpTuple::new(IpAddr::from(s), IpAddr::from(d))),
        ]
    }

    proptest! {
        #[test]
        fn proto_tuple_decode_inverts_encode(tuple in proto_tuple_strategy()) {
            let mut w = AttributeWriter::new();
            tuple.encode(&mut w);
            let bytes = w.into_bytes();
            let decoded = ProtoTuple::decode(&single(&bytes)).unwrap();
            prop_assert_eq!(decoded, tuple);
        }

        #[test]
        fn tuple_bytes_survive_decode(
            ip in ip_tuple_strategy(),
            proto in proto_tuple_strategy(),
            zone in proptest::option::of(any::<u16>()),
        ) {
            let tuple = Tuple { ip, proto, zone };
            let bytes = tuple.to_bytes(attr::TUPLE_ORIG).unwrap();
            let decoded = Tuple::decode(&single(&bytes)).unwrap();
            prop_assert_eq!(decoded, tuple);
            prop_assert_eq!(decoded.to_bytes(attr::TUPLE_ORIG).unwrap(), bytes);
        }
    }
}
