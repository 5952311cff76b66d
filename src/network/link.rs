use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;
use bit_set::BitSet;

/// Links are numbered locally per node, starting at 1. The number 0 is never a valid link, 'no
///  link' is represented as `Option::None`.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LinkId(u16);

impl LinkId {
    /// Returns `None` for link number 0
    pub fn new(number: u16) -> Option<LinkId> {
        if number == 0 {
            None
        }
        else {
            Some(LinkId(number))
        }
    }

    pub fn number(&self) -> u16 {
        self.0
    }

    /// All links of a node with `link_count` links, in ascending order
    pub fn all(link_count: u16) -> impl Iterator<Item = LinkId> {
        (1..=link_count).map(LinkId)
    }

    fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Debug for LinkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

impl Display for LinkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}


/// Routing hint for a destination, as known to the peer table
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkHint {
    /// Nothing was learned yet, so all links are candidates
    AllLinks,
    /// The link on which the packet with the lowest hop count from this peer arrived
    Only(LinkId),
}


/// A set of link numbers, with no upper limit on the number of links
#[derive(Clone, Default, Eq, PartialEq)]
pub struct LinkSet {
    links: BitSet,
}

impl LinkSet {
    pub fn empty() -> LinkSet {
        LinkSet::default()
    }

    pub fn single(link: LinkId) -> LinkSet {
        let mut result = LinkSet::empty();
        result.insert(link);
        result
    }

    pub fn all(link_count: u16) -> LinkSet {
        LinkId::all(link_count).collect()
    }

    pub fn insert(&mut self, link: LinkId) {
        self.links.insert(link.index());
    }

    pub fn remove(&mut self, link: LinkId) {
        self.links.remove(link.index());
    }

    pub fn contains(&self, link: LinkId) -> bool {
        self.links.contains(link.index())
    }

    pub fn len(&self) -> usize {
        self.links.count()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// iterates in ascending link order
    pub fn iter(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.links.iter()
            .map(|idx| LinkId(idx as u16))
    }
}

impl FromIterator<LinkId> for LinkSet {
    fn from_iter<T: IntoIterator<Item=LinkId>>(iter: T) -> Self {
        let mut result = LinkSet::empty();
        for link in iter {
            result.insert(link);
        }
        result
    }
}

impl Debug for LinkSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.iter().map(|l| l.0))
            .finish()
    }
}


/// Physical attributes of a single link, used to estimate retransmission timeouts
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    pub bandwidth_bits_per_sec: u64,
    pub propagation_delay: Duration,
}

impl LinkConfig {
    pub fn new(bandwidth_bits_per_sec: u64, propagation_delay: Duration) -> LinkConfig {
        LinkConfig {
            bandwidth_bits_per_sec,
            propagation_delay,
        }
    }

    /// The time it takes a frame of the given size to travel the link: the time to put its
    ///  bits on the wire plus the link's propagation delay.
    pub fn transit_time(&self, frame_len: usize) -> Duration {
        let bits = frame_len as u128 * 8;
        let transmission_micros = bits * 1_000_000 / self.bandwidth_bits_per_sec.max(1) as u128;
        Duration::from_micros(transmission_micros.min(u64::MAX as u128) as u64)
            .saturating_add(self.propagation_delay)
    }
}
