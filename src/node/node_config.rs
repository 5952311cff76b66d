use std::time::Duration;
use anyhow::bail;
use crate::network::flood_selector::FloodStrategy;
use crate::network::link::{LinkConfig, LinkId};
use crate::network::node_addr::NodeAddr;
use crate::network::retransmit::RetransmitTimeout;
use crate::network::sequence::SequenceSpace;

pub struct NodeConfig {
    pub address: NodeAddr,

    /// Configuration of the node's links: link number `n` is at index `n-1`. A node's links are
    ///  fixed for its lifetime.
    pub links: Vec<LinkConfig>,

    /// A packet is relayed only if its hop count (including the hop to this node) is below
    ///  this limit
    pub max_hops: u16,

    /// Submissions with a bigger payload are rejected
    pub max_payload_len: usize,

    pub flood_strategy: FloodStrategy,

    pub retransmit_timeout: RetransmitTimeout,

    /// The number of retransmissions after which delivery of a packet is abandoned. `None`
    ///  means retransmitting forever, so that a destination that never acknowledges stalls.
    pub max_retransmissions: Option<u32>,

    pub sequence_space: SequenceSpace,

    /// If set, the node periodically logs its peer table and outstanding packets
    pub state_dump_interval: Option<Duration>,

    /// Capacity of the queues buffering frames and submissions for a node. Queues that are full
    ///  report 'too busy' on send.
    pub inbound_queue_len: usize,
}

impl NodeConfig {
    pub const DEFAULT_MAX_HOPS: u16 = 4;

    pub fn new(address: NodeAddr, links: Vec<LinkConfig>) -> NodeConfig {
        NodeConfig {
            address,
            links,
            max_hops: Self::DEFAULT_MAX_HOPS,
            max_payload_len: 8*1024,
            flood_strategy: FloodStrategy::default(),
            retransmit_timeout: RetransmitTimeout::default(),
            max_retransmissions: None,
            sequence_space: SequenceSpace::default(),
            state_dump_interval: None,
            inbound_queue_len: 64,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.links.is_empty() {
            bail!("a node needs at least one link");
        }
        if self.links.len() > u16::MAX as usize {
            bail!("a node can have at most {} links, was {}", u16::MAX, self.links.len());
        }
        for (idx, link) in self.links.iter().enumerate() {
            if link.bandwidth_bits_per_sec == 0 {
                bail!("link {} has zero bandwidth", idx + 1);
            }
            if link.propagation_delay > RetransmitTimeout::MAX_TIMEOUT {
                bail!("link {} has a propagation delay of {:?}, maximum is {:?}", idx + 1, link.propagation_delay, RetransmitTimeout::MAX_TIMEOUT);
            }
        }
        if self.max_hops == 0 {
            bail!("max_hops must be at least 1");
        }
        if self.max_payload_len == 0 {
            bail!("max_payload_len must be positive");
        }
        if self.inbound_queue_len == 0 {
            bail!("inbound_queue_len must be positive");
        }
        self.retransmit_timeout.validate()?;
        self.sequence_space.validate()?;
        Ok(())
    }

    pub fn link_count(&self) -> u16 {
        self.links.len().min(u16::MAX as usize) as u16
    }

    pub fn link_config(&self, link: LinkId) -> Option<&LinkConfig> {
        self.links.get(link.number() as usize - 1)
    }
}
