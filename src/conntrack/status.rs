use crate::netfilter::{Attribute, DecodeError};

use super::attr;

/// Conntrack status bits (`IPS_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Status(pub u32);

impl Status {
    pub const SEEN_REPLY: u32 = 1 << 1;
    pub const CONFIRMED: u32 = 1 << 3;

    pub fn decode(attribute: &Attribute<'_>) -> Result<Self, DecodeError> {
        if attribute.kind != attr::STATUS {
            return Err(DecodeError::WrongType {
                got: attribute.kind,
                want: "status",
            });
        }
        attribute.as_be32().map(Status).map_err(|e| e.during("status"))
    }

    /// Traffic has been seen in the reply direction, i.e. the remote answered.
    pub fn seen_reply(self) -> bool {
        self.0 & Self::SEEN_REPLY != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netfilter::{AttributeWriter, decode_attributes};

    #[test]
    fn test_decode_status() {
        let mut writer = AttributeWriter::new();
        writer.put_be32(attr::STATUS, Status::SEEN_REPLY | Status::CONFIRMED);
        let bytes = writer.into_bytes();
        let attrs = decode_attributes(&bytes).unwrap();

        let status = Status::decode(&attrs[0]).unwrap();
        assert!(status.seen_reply());
    }

    #[test]
    fn test_decode_status_wrong_size() {
        let mut writer = AttributeWriter::new();
        writer.put_be16(attr::STATUS, 2);
        let bytes = writer.into_bytes();
        let attrs = decode_attributes(&bytes).unwrap();

        let err = Status::decode(&attrs[0]).unwrap_err();
        assert_eq!(
            err.root(),
            &DecodeError::IncorrectSize {
                kind: attr::STATUS,
                len: 2
            }
        );
    }
}
