use std::fmt::{Debug, Display, Formatter};
use std::time::Duration;
use anyhow::bail;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, trace};
use crate::network::link::{LinkConfig, LinkSet};
use crate::network::node_addr::NodeAddr;
use crate::network::packet::{Packet, PacketKind};
use crate::network::sequence::SequenceNumber;

/// Identity of an armed retransmission timer. An expiry event carries the id of the timer it
///  belongs to, so events for a timer that was cancelled in the meantime can be recognized.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub fn from_raw(value: u64) -> TimerId {
        TimerId(value)
    }

    pub fn to_raw(&self) -> u64 {
        self.0
    }
}

impl Debug for TimerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

impl Display for TimerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}


/// How long to wait for an ACK before retransmitting
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetransmitTimeout {
    /// The time it takes the packet to travel the slowest of the links it was sent on,
    ///  multiplied by a safety factor
    LinkEstimate { multiplier: u32 },
    Fixed(Duration),
}

impl Default for RetransmitTimeout {
    fn default() -> Self {
        RetransmitTimeout::LinkEstimate { multiplier: 3 }
    }
}

impl RetransmitTimeout {
    /// Upper bound for any retransmission timeout. Link estimates above it are capped.
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(3600);

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            RetransmitTimeout::LinkEstimate { multiplier: 0 } => bail!("retransmit timeout multiplier must be positive"),
            RetransmitTimeout::Fixed(d) if d.is_zero() => bail!("fixed retransmit timeout must be positive"),
            RetransmitTimeout::Fixed(d) if *d > Self::MAX_TIMEOUT => bail!("fixed retransmit timeout {:?} exceeds the maximum of {:?}", d, Self::MAX_TIMEOUT),
            _ => Ok(()),
        }
    }

    /// `links` holds the configuration for all of a node's links, link number `n` at index
    ///  `n-1`. If no links were selected, the estimate is based on all links.
    pub fn timeout_for(&self, links: &[LinkConfig], selected: &LinkSet, frame_len: usize) -> Duration {
        match self {
            RetransmitTimeout::Fixed(d) => (*d).min(Self::MAX_TIMEOUT),
            RetransmitTimeout::LinkEstimate { multiplier } => {
                let config_for = |number: u16| links.get(number as usize - 1);

                let slowest = if selected.is_empty() {
                    links.iter()
                        .map(|l| l.transit_time(frame_len))
                        .max()
                }
                else {
                    selected.iter()
                        .filter_map(|l| config_for(l.number()))
                        .map(|l| l.transit_time(frame_len))
                        .max()
                };
                slowest.unwrap_or_default()
                    .saturating_mul(*multiplier)
                    .min(Self::MAX_TIMEOUT)
            }
        }
    }
}


struct Outstanding {
    timer: TimerId,
    packet: Packet,
    timeout: Duration,
    deadline: Instant,
    retransmissions: u32,
}

/// The result of handling a timer expiry
#[derive(Debug, Eq, PartialEq)]
pub enum Expiry {
    /// The timer was cancelled or re-armed after the expiry event was created
    Stale,
    /// The timer was re-armed, and the packet should be sent again
    Retransmit(Packet),
    /// The maximum number of retransmissions was reached, and the outstanding packet was
    ///  discarded
    GaveUp(Packet),
}

/// Bookkeeping for DATA packets waiting for their ACK, at most one per destination.
///
/// The scheduler does not sleep or spawn anything itself: the owner asks for
///  [RetransmitScheduler::next_deadline], waits for it in whatever way fits, and then collects
///  the [RetransmitScheduler::expired] timers.
#[derive(Default)]
pub struct RetransmitScheduler {
    outstanding: FxHashMap<NodeAddr, Outstanding>,
    next_timer_id: u64,
}

impl RetransmitScheduler {
    pub fn new() -> RetransmitScheduler {
        RetransmitScheduler::default()
    }

    pub fn is_armed(&self, destination: NodeAddr) -> bool {
        self.outstanding.contains_key(&destination)
    }

    pub fn num_outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn arm(&mut self, destination: NodeAddr, packet: Packet, timeout: Duration, now: Instant) -> anyhow::Result<TimerId> {
        if let Some(existing) = self.outstanding.get(&destination) {
            bail!("retransmit timer for {:?} armed while {:?} is still active", destination, existing.timer);
        }

        let Some(deadline) = now.checked_add(timeout) else {
            bail!("retransmit timeout {:?} for {:?} is out of range", timeout, destination);
        };

        let timer = TimerId(self.next_timer_id);
        self.next_timer_id += 1;

        trace!("arming {:?} for {:?} with {:?}: {:?}", timer, destination, timeout, packet);
        self.outstanding.insert(destination, Outstanding {
            timer,
            packet,
            timeout,
            deadline,
            retransmissions: 0,
        });
        Ok(timer)
    }

    /// Returns `true` if there was an armed timer
    pub fn cancel(&mut self, destination: NodeAddr) -> bool {
        match self.outstanding.remove(&destination) {
            Some(o) => {
                trace!("cancelled {:?} for {:?} after {} retransmissions", o.timer, destination, o.retransmissions);
                true
            }
            None => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.outstanding.values()
            .map(|o| o.deadline)
            .min()
    }

    /// All timers with a deadline at or before `now`, earliest first
    pub fn expired(&self, now: Instant) -> Vec<(NodeAddr, TimerId)> {
        let mut result = self.outstanding.iter()
            .filter(|(_, o)| o.deadline <= now)
            .map(|(destination, o)| (o.deadline, o.timer, *destination))
            .collect::<Vec<_>>();
        result.sort_by_key(|(deadline, timer, _)| (*deadline, timer.0));
        result.into_iter()
            .map(|(_, timer, destination)| (destination, timer))
            .collect()
    }

    /// Re-arms the timer with its original duration and returns the packet for retransmission,
    ///  or discards it if `max_retransmissions` is reached
    pub fn on_expiry(&mut self, destination: NodeAddr, timer: TimerId, now: Instant, max_retransmissions: Option<u32>) -> Expiry {
        let Some(outstanding) = self.outstanding.get_mut(&destination) else {
            debug!("expiry of {:?} for {:?} after it was cancelled - ignoring", timer, destination);
            return Expiry::Stale;
        };
        if outstanding.timer != timer || outstanding.deadline > now {
            debug!("stale expiry of {:?} for {:?} - ignoring", timer, destination);
            return Expiry::Stale;
        }

        if let Some(max) = max_retransmissions {
            if outstanding.retransmissions >= max {
                debug!("giving up on {:?} for {:?} after {} retransmissions", outstanding.packet, destination, outstanding.retransmissions);
                return match self.outstanding.remove(&destination) {
                    Some(o) => Expiry::GaveUp(o.packet),
                    None => Expiry::Stale,
                };
            }
        }

        outstanding.retransmissions += 1;
        // the timeout was representable when the timer was armed
        outstanding.deadline = now.checked_add(outstanding.timeout).unwrap_or(outstanding.deadline);
        trace!("{:?} for {:?} expired, retransmission #{}", timer, destination, outstanding.retransmissions);
        Expiry::Retransmit(outstanding.packet.clone())
    }

    pub fn snapshot(&self) -> Vec<OutstandingSnapshot> {
        let mut result = self.outstanding.iter()
            .map(|(destination, o)| OutstandingSnapshot {
                destination: *destination,
                timer: o.timer,
                source: o.packet.source,
                kind: o.packet.kind,
                sequence: o.packet.sequence,
                hop_count: o.packet.hop_count,
                payload_len: o.packet.payload.len(),
                retransmissions: o.retransmissions,
            })
            .collect::<Vec<_>>();
        result.sort_by_key(|s| s.destination);
        result
    }
}


/// Diagnostic copy of an outstanding packet's header and timer state
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutstandingSnapshot {
    pub destination: NodeAddr,
    pub timer: TimerId,
    pub source: NodeAddr,
    pub kind: PacketKind,
    pub sequence: SequenceNumber,
    pub hop_count: u16,
    pub payload_len: usize,
    pub retransmissions: u32,
}

impl OutstandingSnapshot {
    pub const TABLE_HEADER: &'static str = "  destination   timer      src     kind      seq  hops  length retries";
}

impl Display for OutstandingSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            PacketKind::Data => "DATA",
            PacketKind::Ack => "ACK",
        };
        write!(f, "{:>13} {:>7} {:>8} {:>8} {:>8} {:>5} {:>7} {:>7}",
               self.destination, self.timer, self.source, kind, self.sequence, self.hop_count, self.payload_len, self.retransmissions)
    }
}
