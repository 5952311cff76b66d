//! A store-and-forward network layer for nodes connected by point-to-point links. Packets are
//!  flooded through the network, with a per-destination stop-and-wait protocol providing
//!  exactly-once, in-order delivery between each pair of nodes.
//!
//! * [network] contains the protocol logic without any I/O
//! * [datalink] frames packets for the physical links
//! * [node] runs a node's stack in a tokio task

pub mod datalink;
pub mod network;
pub mod node;
pub mod test_util;
