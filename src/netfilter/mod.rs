//! Netlink/netfilter wire decoding.
//!
//! Conntrack notifications arrive as netlink messages carrying a netfilter
//! header followed by a stream of type-length-value attributes, some of which
//! nest further attribute streams. This module decodes that framing; the
//! conntrack-specific meaning of attribute types lives in [`crate::conntrack`].

pub mod attribute;
pub mod error;
pub mod message;

pub use attribute::*;
pub use error::*;
pub use message::*;

/// Netfilter subsystem id of connection tracking (`NFNL_SUBSYS_CTNETLINK`).
pub const NFNL_SUBSYS_CTNETLINK: u8 = 1;

/// Netlink header flag set on "new" notifications.
pub const NLM_F_CREATE: u16 = 0x400;
/// Netlink header flag set on "new" notifications.
pub const NLM_F_EXCL: u16 = 0x200;

/// Result of a single filter step while walking a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep going.
    Continue,
    /// Halt the walk; the message is not interesting.
    Stop,
}

/// Decode the netfilter header of `message` and feed each top-level attribute
/// to `on_attribute` in order.
///
/// Returns `Flow::Stop` if either callback stopped the walk (the header was not
/// matched or an attribute filtered the message), `Flow::Continue` if every
/// attribute was visited. Nested attributes are not expanded; callbacks decode
/// children only for the attributes they care about.
pub fn walk<'a, E, H, A>(
    message: &'a NetlinkMessage,
    mut on_header: H,
    mut on_attribute: A,
) -> Result<Flow, E>
where
    E: From<DecodeError>,
    H: FnMut(&Header) -> Result<Flow, E>,
    A: FnMut(Attribute<'a>) -> Result<Flow, E>,
{
    let header = Header::decode(message)?;
    if on_header(&header)? == Flow::Stop {
        return Ok(Flow::Stop);
    }

    for attribute in Attributes::new(message.payload()?) {
        if on_attribute(attribute?)? == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }

    Ok(Flow::Continue)
}
