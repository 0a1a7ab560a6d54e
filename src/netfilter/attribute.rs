use super::message::align;
use super::DecodeError;

/// Size of `struct nlattr`.
pub const ATTR_HEADER_LEN: usize = 4;

/// Type flag: payload is itself an attribute stream.
pub const NLA_F_NESTED: u16 = 0x8000;
/// Type flag: scalar payload is in network byte order.
pub const NLA_F_NET_BYTEORDER: u16 = 0x4000;
const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// A decoded attribute borrowing its payload from the message buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute<'a> {
    /// Type code with the flag bits stripped.
    pub kind: u16,
    pub nested: bool,
    pub net_byte_order: bool,
    pub data: &'a [u8],
}

impl<'a> Attribute<'a> {
    /// Decode the children of a nested attribute.
    pub fn children(&self) -> Result<Vec<Attribute<'a>>, DecodeError> {
        if !self.nested {
            return Err(DecodeError::NotNested);
        }
        decode_attributes(self.data)
    }

    pub fn as_u8(&self) -> Result<u8, DecodeError> {
        match self.data {
            [v] => Ok(*v),
            _ => Err(self.incorrect_size()),
        }
    }

    pub fn as_be16(&self) -> Result<u16, DecodeError> {
        match self.data {
            [a, b] => Ok(u16::from_be_bytes([*a, *b])),
            _ => Err(self.incorrect_size()),
        }
    }

    pub fn as_be32(&self) -> Result<u32, DecodeError> {
        match self.data {
            [a, b, c, d] => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
            _ => Err(self.incorrect_size()),
        }
    }

    pub(crate) fn incorrect_size(&self) -> DecodeError {
        DecodeError::IncorrectSize {
            kind: self.kind,
            len: self.data.len(),
        }
    }
}

/// Iterator over an attribute stream. Yields at most one error, then stops.
#[derive(Debug, Clone)]
pub struct Attributes<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Attributes<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }
}

impl<'a> Iterator for Attributes<'a> {
    type Item = Result<Attribute<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }

        match decode_one(self.buf) {
            Ok((attribute, rest)) => {
                self.buf = rest;
                Some(Ok(attribute))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a whole attribute stream, failing on the first malformed entry.
pub fn decode_attributes(buf: &[u8]) -> Result<Vec<Attribute<'_>>, DecodeError> {
    Attributes::new(buf).collect()
}

fn decode_one(buf: &[u8]) -> Result<(Attribute<'_>, &[u8]), DecodeError> {
    if buf.len() < ATTR_HEADER_LEN {
        return Err(DecodeError::AttributeLength {
            length: buf.len(),
            remaining: buf.len(),
        });
    }

    let length = u16::from_ne_bytes([buf[0], buf[1]]) as usize;
    let raw_kind = u16::from_ne_bytes([buf[2], buf[3]]);

    if length < ATTR_HEADER_LEN || length > buf.len() {
        return Err(DecodeError::AttributeLength {
            length,
            remaining: buf.len(),
        });
    }

    let kind = raw_kind & NLA_TYPE_MASK;
    let nested = raw_kind & NLA_F_NESTED != 0;
    let net_byte_order = raw_kind & NLA_F_NET_BYTEORDER != 0;
    if nested && net_byte_order {
        return Err(DecodeError::InvalidFlags { kind });
    }

    let attribute = Attribute {
        kind,
        nested,
        net_byte_order,
        data: &buf[ATTR_HEADER_LEN..length],
    };
    let rest = &buf[align(length).min(buf.len())..];

    Ok((attribute, rest))
}

/// Builds an attribute stream in canonical form: host-order headers, payloads
/// padded to 4 bytes, nested containers flagged with `NLA_F_NESTED`.
#[derive(Debug, Default, Clone)]
pub struct AttributeWriter {
    buf: Vec<u8>,
}

impl AttributeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, kind: u16, data: &[u8]) {
        let length = (ATTR_HEADER_LEN + data.len()) as u16;
        self.buf.extend_from_slice(&length.to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(data);
        self.pad();
    }

    pub fn put_u8(&mut self, kind: u16, value: u8) {
        self.put(kind, &[value]);
    }

    pub fn put_be16(&mut self, kind: u16, value: u16) {
        self.put(kind, &value.to_be_bytes());
    }

    pub fn put_be32(&mut self, kind: u16, value: u32) {
        self.put(kind, &value.to_be_bytes());
    }

    /// Write a nested container whose children are produced by `f`.
    pub fn nest<T>(&mut self, kind: u16, f: impl FnOnce(&mut Self) -> T) -> T {
        let start = self.buf.len();
        self.buf.extend_from_slice(&[0; ATTR_HEADER_LEN]);

        let out = f(self);

        let length = (self.buf.len() - start) as u16;
        self.buf[start..start + 2].copy_from_slice(&length.to_ne_bytes());
        self.buf[start + 2..start + 4].copy_from_slice(&(kind | NLA_F_NESTED).to_ne_bytes());
        out
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn pad(&mut self) {
        let padded = align(self.buf.len());
        self.buf.resize(padded, 0);
    }
}
