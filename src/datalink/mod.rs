//! The datalink layer sits between the physical links and the network layer. It adds nothing
//!  but a checksum to each packet: there are no datalink-level acknowledgements or retries,
//!  reliability is entirely the network layer's concern.
//!
//! Frame layout (numbers in network byte order):
//! ```ascii
//! 0: CRC-16 checksum of the serialized packet (u16)
//! 2: the serialized packet
//! ```

pub mod dll_basic;
pub mod physical_layer;
