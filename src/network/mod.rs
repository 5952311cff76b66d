pub mod flood_selector;
pub mod link;
pub mod node_addr;
pub mod packet;
pub mod packet_engine;
pub mod peer_table;
pub mod retransmit;
pub mod sequence;
