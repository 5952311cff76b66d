//! Utilities for testing code based on this crate's nodes. They are used for testing the
//!  protocol stack itself, but they are also exported for application testing.
//!
//! [engine_harness] drives [PacketEngine](crate::network::packet_engine::PacketEngine)s
//!  synchronously in virtual time, [sim_network] runs complete [Node](crate::node::node_driver::Node)s
//!  over simulated links in a tokio runtime.

pub mod engine_harness;
pub mod sim_network;
