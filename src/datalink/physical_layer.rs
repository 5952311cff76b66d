use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use crate::network::link::LinkId;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteOutcome {
    Sent,
    /// The link can not accept the frame right now, and the frame was discarded. This is
    ///  transient and not an error.
    TooBusy,
}

/// This is the abstraction for putting a frame on a node's numbered physical link. Delivery is
///  best effort: frames may be lost, duplicated or corrupted on the way, and there is no
///  ordering across links.
///
/// Writing never blocks. An `Err` result means the link is unusable, which is fatal to the node.
#[cfg_attr(test, automock)]
pub trait PhysicalLayer: Send + Sync + 'static {
    fn write_physical(&self, link: LinkId, frame: Bytes) -> anyhow::Result<WriteOutcome>;
}
