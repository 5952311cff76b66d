use std::fmt::{Display, Formatter};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use crate::network::link::{LinkHint, LinkId};
use crate::network::node_addr::NodeAddr;
use crate::network::sequence::{SequenceNumber, SequenceSpace};

/// Stable index of a peer's record in a [PeerTable]. Handles remain valid for the table's
///  lifetime since records are never removed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PeerHandle(usize);

#[derive(Clone, Debug)]
struct PeerRecord {
    address: NodeAddr,
    ack_expected: SequenceNumber,
    next_to_send: SequenceNumber,
    packet_expected: SequenceNumber,
    /// `None` means 'unknown', which compares as larger than any hop count
    min_hops: Option<u16>,
    min_hop_link: Option<LinkId>,
}

impl PeerRecord {
    fn new(address: NodeAddr) -> PeerRecord {
        PeerRecord {
            address,
            ack_expected: SequenceNumber::ZERO,
            next_to_send: SequenceNumber::ZERO,
            packet_expected: SequenceNumber::ZERO,
            min_hops: None,
            min_hop_link: None,
        }
    }
}

/// The per-peer state of the network layer: sequence counters for both directions, and the
///  routing knowledge learned from observed traffic.
///
/// Records are created lazily the first time an address is referenced, and all accessors
///  go through [PeerTable::lookup_or_create], so none of them can fail.
pub struct PeerTable {
    sequence_space: SequenceSpace,
    records: Vec<PeerRecord>,
    index: FxHashMap<NodeAddr, PeerHandle>,
}

impl PeerTable {
    pub fn new(sequence_space: SequenceSpace) -> PeerTable {
        PeerTable {
            sequence_space,
            records: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lookup_or_create(&mut self, address: NodeAddr) -> PeerHandle {
        if let Some(handle) = self.index.get(&address) {
            return *handle;
        }

        trace!("new peer table entry for {:?}", address);
        let handle = PeerHandle(self.records.len());
        self.records.push(PeerRecord::new(address));
        self.index.insert(address, handle);
        handle
    }

    fn record_mut(&mut self, address: NodeAddr) -> &mut PeerRecord {
        let handle = self.lookup_or_create(address);
        &mut self.records[handle.0]
    }

    pub fn ack_expected(&mut self, address: NodeAddr) -> SequenceNumber {
        self.record_mut(address).ack_expected
    }

    pub fn advance_ack_expected(&mut self, address: NodeAddr) {
        let space = self.sequence_space;
        let record = self.record_mut(address);
        record.ack_expected = space.next(record.ack_expected);
    }

    /// Returns the sequence number for the next packet to the given address, and advances the
    ///  counter
    pub fn next_to_send(&mut self, address: NodeAddr) -> SequenceNumber {
        let space = self.sequence_space;
        let record = self.record_mut(address);
        let result = record.next_to_send;
        record.next_to_send = space.next(result);
        result
    }

    pub fn packet_expected(&mut self, address: NodeAddr) -> SequenceNumber {
        self.record_mut(address).packet_expected
    }

    pub fn advance_packet_expected(&mut self, address: NodeAddr) {
        let space = self.sequence_space;
        let record = self.record_mut(address);
        record.packet_expected = space.next(record.packet_expected);
    }

    /// This is the table's only learning rule: a packet from `address` that arrived on `link`
    ///  after `hops` hops replaces the known route only if it is strictly shorter. For equally
    ///  short routes, the link that was seen first is kept.
    ///
    /// Returns `true` if the observation changed the route.
    pub fn record_hop_observation(&mut self, address: NodeAddr, hops: u16, link: LinkId) -> bool {
        let record = self.record_mut(address);
        match record.min_hops {
            Some(min_hops) if min_hops <= hops => false,
            _ => {
                debug!("learned route to {:?}: {} hops via {:?}", address, hops, link);
                record.min_hops = Some(hops);
                record.min_hop_link = Some(link);
                true
            }
        }
    }

    pub fn best_link_for(&mut self, address: NodeAddr) -> LinkHint {
        match self.record_mut(address).min_hop_link {
            Some(link) => LinkHint::Only(link),
            None => LinkHint::AllLinks,
        }
    }

    pub fn min_hops(&mut self, address: NodeAddr) -> Option<(u16, LinkId)> {
        let record = self.record_mut(address);
        record.min_hops.zip(record.min_hop_link)
    }

    pub fn snapshot(&self) -> Vec<PeerSnapshot> {
        self.records.iter()
            .map(|r| PeerSnapshot {
                address: r.address,
                ack_expected: r.ack_expected,
                next_to_send: r.next_to_send,
                packet_expected: r.packet_expected,
                min_hops: r.min_hops,
                min_hop_link: r.min_hop_link,
            })
            .collect()
    }
}


/// A copy of a peer's state for diagnostic output
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerSnapshot {
    pub address: NodeAddr,
    pub ack_expected: SequenceNumber,
    pub next_to_send: SequenceNumber,
    pub packet_expected: SequenceNumber,
    pub min_hops: Option<u16>,
    pub min_hop_link: Option<LinkId>,
}

impl PeerSnapshot {
    pub const TABLE_HEADER: &'static str = "  destination   ackexpected nextpkttosend   pktexpected  minhops minhop_link";
}

impl Display for PeerSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>13} {:>13} {:>13} {:>13}", self.address, self.ack_expected, self.next_to_send, self.packet_expected)?;
        if let (Some(hops), Some(link)) = (self.min_hops, self.min_hop_link) {
            write!(f, " {:>8} {:>11}", hops, link)?;
        }
        Ok(())
    }
}
