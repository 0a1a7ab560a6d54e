use thiserror::Error;

/// Structural errors found while decoding a netlink/netfilter message.
///
/// These are fatal to the message being decoded. Decoders for compound
/// records wrap the errors of their children with [`DecodeError::during`] so
/// the final message names the path that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{what} too short: {len} bytes")]
    Truncated { what: &'static str, len: usize },

    #[error("attribute length {length} invalid with {remaining} bytes remaining")]
    AttributeLength { length: usize, remaining: usize },

    #[error("netlink message length {length} invalid with {remaining} bytes remaining")]
    MessageLength { length: usize, remaining: usize },

    #[error("attribute {kind} has both nested and network byte order flags set")]
    InvalidFlags { kind: u16 },

    #[error("need a nested attribute to decode this structure")]
    NotNested,

    #[error("need {want} child attributes, got {got}")]
    NeedChildren { want: &'static str, got: usize },

    #[error("attribute {kind} has incorrect size {len}")]
    IncorrectSize { kind: u16, len: usize },

    #[error("attribute type {got} is not a {want}")]
    WrongType { got: u16, want: &'static str },

    #[error("unknown child attribute type {child} in {parent}")]
    UnknownChild { child: u16, parent: &'static str },

    #[error("missing {0} attribute")]
    MissingAttribute(&'static str),

    #[error("tuple is incomplete")]
    Incomplete,

    #[error("{op}: {source}")]
    During {
        op: &'static str,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    /// Wrap this error with the name of the operation that hit it.
    pub fn during(self, op: &'static str) -> Self {
        DecodeError::During {
            op,
            source: Box::new(self),
        }
    }

    /// The innermost error, with all operation wrappers removed.
    pub fn root(&self) -> &DecodeError {
        match self {
            DecodeError::During { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors returned when encoding a record back into attributes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("IPTuple source and destination addresses must be valid and belong to the same address family")]
    AddressFamily,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_during_wraps_message() {
        let err = DecodeError::NotNested.during("ip tuple").during("tuple");
        assert_eq!(
            err.to_string(),
            "tuple: ip tuple: need a nested attribute to decode this structure"
        );
        assert_eq!(err.root(), &DecodeError::NotNested);
    }
}
