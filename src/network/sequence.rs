use std::fmt::{Display, Formatter};
use anyhow::bail;

/// Sequence number of a DATA packet (and of the ACK acknowledging it) between a pair of nodes.
///
/// Sequence numbers are only ever compared for equality, so wrap-around is harmless as long as
///  the sequence space is larger than the number of packets that can be in flight between two
///  peers - which is one, since there is at most one unacknowledged packet per destination.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct SequenceNumber(u32);

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl SequenceNumber {
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }
}


/// Determines how sequence counters wrap around.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum SequenceSpace {
    /// wrap around at 2^32
    #[default]
    Full,
    /// wrap around modulo the given value
    Modulo(u32),
}

impl SequenceSpace {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let SequenceSpace::Modulo(m) = self {
            if *m < 2 {
                bail!("a sequence space must have at least two sequence numbers, was {}", m);
            }
        }
        Ok(())
    }

    pub fn next(&self, seq: SequenceNumber) -> SequenceNumber {
        match self {
            SequenceSpace::Full => SequenceNumber(seq.0.wrapping_add(1)),
            SequenceSpace::Modulo(m) => SequenceNumber(((seq.0 as u64 + 1) % *m as u64) as u32),
        }
    }
}
