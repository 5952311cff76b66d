use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use anyhow::bail;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use crate::network::flood_selector::FloodSelector;
use crate::network::link::{LinkId, LinkSet};
use crate::network::node_addr::NodeAddr;
use crate::network::packet::{Packet, PacketKind};
use crate::network::peer_table::{PeerSnapshot, PeerTable};
use crate::network::retransmit::{Expiry, OutstandingSnapshot, RetransmitScheduler, TimerId};
use crate::network::sequence::SequenceNumber;
use crate::node::node_config::NodeConfig;

/// Everything that can happen to a node's network layer
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeEvent {
    /// The application has a payload for `destination`, which must currently be enabled
    ApplicationReady { destination: NodeAddr, payload: Bytes },
    FrameArrived { link: LinkId, packet: Packet },
    RetransmitTimeout { destination: NodeAddr, timer: TimerId },
}

/// An action the network layer asks its environment to perform
#[derive(Clone, Eq, PartialEq)]
pub enum Effect {
    Transmit { link: LinkId, packet: Packet },
    Deliver { source: NodeAddr, payload: Bytes },
    EnableApplication(NodeAddr),
    DisableApplication(NodeAddr),
    /// The configured maximum number of retransmissions was reached without an ACK. The
    ///  destination stays disabled.
    DeliveryFailed { destination: NodeAddr, sequence: SequenceNumber },
}

impl Debug for Effect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Transmit { link, packet } => write!(f, "TRANSMIT on {:?}: {:?}", link, packet),
            Effect::Deliver { source, payload } => write!(f, "DELIVER from {:?}: {} bytes", source, payload.len()),
            Effect::EnableApplication(addr) => write!(f, "ENABLE {:?}", addr),
            Effect::DisableApplication(addr) => write!(f, "DISABLE {:?}", addr),
            Effect::DeliveryFailed { destination, sequence } => write!(f, "FAILED #{} to {:?}", sequence, destination),
        }
    }
}

/// The protocol state machine of a node's network layer.
///
/// The engine performs no I/O and reads no clock: every call to [PacketEngine::handle_event]
///  processes a single event to completion and returns the resulting effects, which the caller
///  applies in order. Retransmission timers are managed by polling
///  [PacketEngine::next_deadline] and [PacketEngine::expired_timers].
pub struct PacketEngine {
    config: Arc<NodeConfig>,
    peers: PeerTable,
    selector: FloodSelector,
    scheduler: RetransmitScheduler,
}

impl PacketEngine {
    pub fn new(config: Arc<NodeConfig>) -> anyhow::Result<PacketEngine> {
        config.validate()?;

        Ok(PacketEngine {
            peers: PeerTable::new(config.sequence_space),
            selector: FloodSelector::new(config.flood_strategy, config.link_count()),
            scheduler: RetransmitScheduler::new(),
            config,
        })
    }

    pub fn address(&self) -> NodeAddr {
        self.config.address
    }

    pub fn config(&self) -> &Arc<NodeConfig> {
        &self.config
    }

    pub fn handle_event(&mut self, event: NodeEvent, now: Instant) -> anyhow::Result<Vec<Effect>> {
        trace!("{:?}: handling {:?}", self.config.address, event);

        let mut effects = Vec::new();
        match event {
            NodeEvent::ApplicationReady { destination, payload } => self.on_application_ready(destination, payload, now, &mut effects)?,
            NodeEvent::FrameArrived { link, packet } => self.on_frame_arrived(link, packet, &mut effects)?,
            NodeEvent::RetransmitTimeout { destination, timer } => self.on_retransmit_timeout(destination, timer, now, &mut effects),
        }

        for effect in &effects {
            trace!("{:?}: {:?}", self.config.address, effect);
        }
        Ok(effects)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Timeout events for all retransmission timers that are due at `now`
    pub fn expired_timers(&self, now: Instant) -> Vec<NodeEvent> {
        self.scheduler.expired(now)
            .into_iter()
            .map(|(destination, timer)| NodeEvent::RetransmitTimeout { destination, timer })
            .collect()
    }

    pub fn is_outstanding(&self, destination: NodeAddr) -> bool {
        self.scheduler.is_armed(destination)
    }

    pub fn peer_snapshot(&self) -> Vec<PeerSnapshot> {
        self.peers.snapshot()
    }

    pub fn outstanding_snapshot(&self) -> Vec<OutstandingSnapshot> {
        self.scheduler.snapshot()
    }

    fn transmit(links: LinkSet, packet: &Packet, effects: &mut Vec<Effect>) {
        for link in links.iter() {
            effects.push(Effect::Transmit { link, packet: packet.clone() });
        }
    }

    fn on_application_ready(&mut self, destination: NodeAddr, payload: Bytes, now: Instant, effects: &mut Vec<Effect>) -> anyhow::Result<()> {
        if destination == self.config.address {
            bail!("application submitted a payload to its own node {:?}", destination);
        }
        if payload.len() > self.config.max_payload_len {
            bail!("payload for {:?} has {} bytes, maximum is {}", destination, payload.len(), self.config.max_payload_len);
        }
        if self.scheduler.is_armed(destination) {
            bail!("application submitted a payload for {:?} while a packet is outstanding", destination);
        }

        let sequence = self.peers.next_to_send(destination);
        let packet = Packet::new_data(self.config.address, destination, sequence, payload);

        let hint = self.peers.best_link_for(destination);
        let links = self.selector.select_links(None, None, hint);
        let timeout = self.config.retransmit_timeout.timeout_for(&self.config.links, &links, packet.serialized_len());
        debug!("{:?}: sending {:?} on links {:?}, timeout {:?}", self.config.address, packet, links, timeout);

        Self::transmit(links, &packet, effects);
        self.scheduler.arm(destination, packet, timeout, now)?;
        effects.push(Effect::DisableApplication(destination));
        Ok(())
    }

    fn on_frame_arrived(&mut self, link: LinkId, mut packet: Packet, effects: &mut Vec<Effect>) -> anyhow::Result<()> {
        if link.number() > self.selector.link_count() {
            bail!("frame arrived on {:?}, but the node has only {} links", link, self.selector.link_count());
        }

        packet.hop_count = packet.hop_count.saturating_add(1);

        if packet.destination == self.config.address {
            match packet.kind {
                PacketKind::Data => self.on_data_for_self(link, packet, effects),
                PacketKind::Ack => self.on_ack_for_self(link, packet, effects),
            }
        }
        else {
            self.relay(link, packet, effects);
        }
        Ok(())
    }

    /// DATA with any sequence other than the expected one is acknowledged without delivery.
    ///  Besides duplicates, this includes sequence numbers ahead of the expected one, which only
    ///  a restarted peer sends: their ACK confirms a payload that was never delivered.
    fn on_data_for_self(&mut self, link: LinkId, packet: Packet, effects: &mut Vec<Effect>) {
        let expected = self.peers.packet_expected(packet.source);
        if packet.sequence == expected {
            trace!("{:?}: delivering {:?}", self.config.address, packet);
            self.peers.advance_packet_expected(packet.source);
            self.peers.record_hop_observation(packet.source, packet.hop_count, link);
            effects.push(Effect::Deliver { source: packet.source, payload: packet.payload.clone() });
        }
        else {
            debug!("{:?}: duplicate {:?} (expected #{}) - acknowledging again", self.config.address, packet, expected);
        }

        let ack = packet.to_ack();
        let hint = self.peers.best_link_for(packet.source);
        let links = self.selector.select_links(Some(link), None, hint);
        Self::transmit(links, &ack, effects);
    }

    fn on_ack_for_self(&mut self, link: LinkId, packet: Packet, effects: &mut Vec<Effect>) {
        let expected = self.peers.ack_expected(packet.source);
        if packet.sequence != expected {
            debug!("{:?}: discarding {:?}, expected #{}", self.config.address, packet, expected);
            return;
        }
        if !self.scheduler.is_armed(packet.source) {
            debug!("{:?}: discarding {:?} - nothing outstanding", self.config.address, packet);
            return;
        }

        trace!("{:?}: {:?} acknowledged", self.config.address, packet);
        self.peers.advance_ack_expected(packet.source);
        self.peers.record_hop_observation(packet.source, packet.hop_count, link);
        self.scheduler.cancel(packet.source);
        effects.push(Effect::EnableApplication(packet.source));
    }

    fn relay(&mut self, link: LinkId, packet: Packet, effects: &mut Vec<Effect>) {
        if packet.hop_count >= self.config.max_hops {
            debug!("{:?}: dropping {:?} - hop limit reached", self.config.address, packet);
            return;
        }

        // own packets coming back around a loop
        if packet.source != self.config.address {
            self.peers.record_hop_observation(packet.source, packet.hop_count, link);
        }
        let hint = self.peers.best_link_for(packet.destination);
        let links = self.selector.select_links(None, Some(link), hint);
        trace!("{:?}: relaying {:?} on links {:?}", self.config.address, packet, links);
        Self::transmit(links, &packet, effects);
    }

    fn on_retransmit_timeout(&mut self, destination: NodeAddr, timer: TimerId, now: Instant, effects: &mut Vec<Effect>) {
        match self.scheduler.on_expiry(destination, timer, now, self.config.max_retransmissions) {
            Expiry::Stale => {}
            Expiry::Retransmit(packet) => {
                let hint = self.peers.best_link_for(destination);
                let links = self.selector.select_links(None, None, hint);
                debug!("{:?}: retransmitting {:?} on links {:?}", self.config.address, packet, links);
                Self::transmit(links, &packet, effects);
            }
            Expiry::GaveUp(packet) => {
                warn!("{:?}: no ACK for {:?} - giving up", self.config.address, packet);
                effects.push(Effect::DeliveryFailed { destination, sequence: packet.sequence });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use rstest::rstest;
    use crate::network::flood_selector::FloodStrategy;
    use crate::network::link::LinkConfig;
    use crate::network::retransmit::RetransmitTimeout;
    use super::*;

    const SELF: NodeAddr = NodeAddr(10);
    const PEER: NodeAddr = NodeAddr(20);
    const OTHER: NodeAddr = NodeAddr(30);

    fn link(n: u16) -> LinkId {
        LinkId::new(n).unwrap()
    }

    fn config(num_links: usize, strategy: FloodStrategy) -> NodeConfig {
        let links = (0..num_links)
            .map(|_| LinkConfig::new(56_000, Duration::from_millis(2)))
            .collect();
        let mut result = NodeConfig::new(SELF, links);
        result.flood_strategy = strategy;
        result.retransmit_timeout = RetransmitTimeout::Fixed(Duration::from_secs(1));
        result
    }

    fn engine(num_links: usize) -> PacketEngine {
        PacketEngine::new(Arc::new(config(num_links, FloodStrategy::Learned))).unwrap()
    }

    fn data(source: NodeAddr, destination: NodeAddr, sequence: u32, hop_count: u16, payload: &'static [u8]) -> Packet {
        let mut result = Packet::new_data(source, destination, SequenceNumber::from_raw(sequence), Bytes::from_static(payload));
        result.hop_count = hop_count;
        result
    }

    fn ack(source: NodeAddr, destination: NodeAddr, sequence: u32, hop_count: u16) -> Packet {
        let mut result = data(destination, source, sequence, 0, b"").to_ack();
        result.hop_count = hop_count;
        result
    }

    fn arrive(engine: &mut PacketEngine, link_no: u16, packet: Packet, now: Instant) -> Vec<Effect> {
        engine.handle_event(NodeEvent::FrameArrived { link: link(link_no), packet }, now).unwrap()
    }

    fn submit(engine: &mut PacketEngine, destination: NodeAddr, payload: &'static [u8], now: Instant) -> Vec<Effect> {
        engine.handle_event(NodeEvent::ApplicationReady { destination, payload: Bytes::from_static(payload) }, now).unwrap()
    }

    fn transmit_links(effects: &[Effect]) -> Vec<u16> {
        effects.iter()
            .filter_map(|e| match e {
                Effect::Transmit { link, .. } => Some(link.number()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_validates_config() {
        assert!(PacketEngine::new(Arc::new(config(0, FloodStrategy::Learned))).is_err());
    }

    #[test]
    fn test_submit_floods_and_disables() {
        let mut engine = engine(3);
        let now = Instant::now();

        let effects = submit(&mut engine, PEER, b"PING", now);
        let expected_packet = data(SELF, PEER, 0, 0, b"PING");
        assert_eq!(effects, vec![
            Effect::Transmit { link: link(1), packet: expected_packet.clone() },
            Effect::Transmit { link: link(2), packet: expected_packet.clone() },
            Effect::Transmit { link: link(3), packet: expected_packet },
            Effect::DisableApplication(PEER),
        ]);
        assert!(engine.is_outstanding(PEER));
        assert_eq!(engine.next_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[rstest]
    #[case::own_address(SELF, 4)]
    #[case::too_big(PEER, 8*1024 + 1)]
    fn test_submit_rejected(#[case] destination: NodeAddr, #[case] payload_len: usize) {
        let mut engine = engine(2);
        let event = NodeEvent::ApplicationReady { destination, payload: Bytes::from(vec![0u8; payload_len]) };
        assert!(engine.handle_event(event, Instant::now()).is_err());
    }

    #[test]
    fn test_submit_while_outstanding_is_an_error() {
        let mut engine = engine(2);
        let now = Instant::now();
        submit(&mut engine, PEER, b"a", now);

        let event = NodeEvent::ApplicationReady { destination: PEER, payload: Bytes::from_static(b"b") };
        assert!(engine.handle_event(event, now).is_err());

        // other destinations are independent
        submit(&mut engine, OTHER, b"c", now);
    }

    #[test]
    fn test_frame_on_unknown_link_is_an_error() {
        let mut engine = engine(2);
        let event = NodeEvent::FrameArrived { link: link(3), packet: data(PEER, SELF, 0, 0, b"x") };
        assert!(engine.handle_event(event, Instant::now()).is_err());
    }

    #[test]
    fn test_data_for_self_is_delivered_and_acknowledged() {
        let mut engine = engine(3);
        let effects = arrive(&mut engine, 2, data(PEER, SELF, 0, 1, b"PING"), Instant::now());

        assert_eq!(effects, vec![
            Effect::Deliver { source: PEER, payload: Bytes::from_static(b"PING") },
            Effect::Transmit { link: link(2), packet: ack(SELF, PEER, 0, 0) },
        ]);
        assert_eq!(engine.peers.packet_expected(PEER), SequenceNumber::from_raw(1));
        assert_eq!(engine.peers.min_hops(PEER), Some((2, link(2))));
    }

    #[test]
    fn test_duplicate_data_is_acknowledged_but_not_delivered() {
        let mut engine = engine(3);
        let now = Instant::now();
        let first = arrive(&mut engine, 2, data(PEER, SELF, 0, 1, b"PING"), now);
        let second = arrive(&mut engine, 3, data(PEER, SELF, 0, 0, b"PING"), now);

        assert_eq!(first.iter().filter(|e| matches!(e, Effect::Deliver { .. })).count(), 1);
        assert_eq!(second, vec![
            Effect::Transmit { link: link(3), packet: ack(SELF, PEER, 0, 0) },
        ]);
        assert_eq!(engine.peers.packet_expected(PEER), SequenceNumber::from_raw(1));
        // the duplicate's lower hop count is not learned
        assert_eq!(engine.peers.min_hops(PEER), Some((2, link(2))));
    }

    #[test]
    fn test_out_of_order_data_is_not_delivered() {
        let mut engine = engine(1);
        let effects = arrive(&mut engine, 1, data(PEER, SELF, 1, 0, b"later"), Instant::now());
        assert_eq!(effects, vec![
            Effect::Transmit { link: link(1), packet: ack(SELF, PEER, 1, 0) },
        ]);
        assert_eq!(engine.peers.packet_expected(PEER), SequenceNumber::ZERO);
    }

    #[test]
    fn test_matching_ack_cancels_and_enables() {
        let mut engine = engine(3);
        let now = Instant::now();
        submit(&mut engine, PEER, b"PING", now);

        let effects = arrive(&mut engine, 3, ack(PEER, SELF, 0, 1), now);
        assert_eq!(effects, vec![Effect::EnableApplication(PEER)]);
        assert!(!engine.is_outstanding(PEER));
        assert_eq!(engine.next_deadline(), None);
        assert_eq!(engine.peers.ack_expected(PEER), SequenceNumber::from_raw(1));
        assert_eq!(engine.peers.min_hops(PEER), Some((2, link(3))));

        // the same ACK again is discarded
        assert!(arrive(&mut engine, 3, ack(PEER, SELF, 0, 1), now).is_empty());
    }

    #[test]
    fn test_mismatched_ack_is_discarded() {
        let mut engine = engine(3);
        let now = Instant::now();
        submit(&mut engine, PEER, b"PING", now);

        assert!(arrive(&mut engine, 1, ack(PEER, SELF, 5, 0), now).is_empty());
        assert!(engine.is_outstanding(PEER));
        assert_eq!(engine.peers.min_hops(PEER), None);
    }

    #[test]
    fn test_learned_link_is_used_for_next_submission() {
        let mut engine = engine(3);
        let now = Instant::now();
        submit(&mut engine, PEER, b"1", now);
        arrive(&mut engine, 2, ack(PEER, SELF, 0, 0), now);

        let effects = submit(&mut engine, PEER, b"2", now);
        assert_eq!(transmit_links(&effects), vec![2]);
        assert!(effects.contains(&Effect::Transmit { link: link(2), packet: data(SELF, PEER, 1, 0, b"2") }));
    }

    #[rstest]
    #[case::first_hop(0, Some(vec![1, 3]))]
    #[case::below_limit(2, Some(vec![1, 3]))]
    #[case::reaches_limit(3, None)]
    #[case::beyond_limit(7, None)]
    fn test_relay_hop_limit(#[case] hop_count: u16, #[case] expected_links: Option<Vec<u16>>) {
        let mut engine = engine(3);
        let effects = arrive(&mut engine, 2, data(PEER, OTHER, 0, hop_count, b"x"), Instant::now());

        match expected_links {
            Some(links) => {
                assert_eq!(transmit_links(&effects), links);
                let relayed = data(PEER, OTHER, 0, hop_count + 1, b"x");
                assert!(effects.iter().all(|e| matches!(e, Effect::Transmit { packet, .. } if *packet == relayed)));
                assert_eq!(engine.peers.min_hops(PEER), Some((hop_count + 1, link(2))));
            }
            None => {
                assert!(effects.is_empty());
                assert_eq!(engine.peers.min_hops(PEER), None);
            }
        }
    }

    #[test]
    fn test_own_packet_coming_back_is_not_learned() {
        let mut engine = engine(2);
        let effects = arrive(&mut engine, 2, data(SELF, PEER, 0, 2, b"x"), Instant::now());

        assert_eq!(transmit_links(&effects), vec![1]);
        assert!(engine.peer_snapshot().iter().all(|p| p.address != SELF));
    }

    #[test]
    fn test_extreme_link_estimate_is_capped() {
        let mut config = config(1, FloodStrategy::Learned);
        config.links[0].propagation_delay = RetransmitTimeout::MAX_TIMEOUT;
        config.retransmit_timeout = RetransmitTimeout::LinkEstimate { multiplier: u32::MAX };
        let mut engine = PacketEngine::new(Arc::new(config)).unwrap();

        let now = Instant::now();
        submit(&mut engine, PEER, b"PING", now);
        assert_eq!(engine.next_deadline(), Some(now + RetransmitTimeout::MAX_TIMEOUT));
    }

    #[test]
    fn test_new_rejects_unbounded_timeout() {
        let mut config = config(1, FloodStrategy::Learned);
        config.retransmit_timeout = RetransmitTimeout::Fixed(Duration::MAX);
        assert!(PacketEngine::new(Arc::new(config)).is_err());
    }

    #[test]
    fn test_relay_uses_learned_link() {
        let mut engine = engine(4);
        let now = Instant::now();
        // learn that OTHER is reachable via link 4
        arrive(&mut engine, 4, data(OTHER, PEER, 0, 0, b"x"), now);

        let effects = arrive(&mut engine, 1, data(PEER, OTHER, 0, 0, b"y"), now);
        assert_eq!(transmit_links(&effects), vec![4]);

        // ... but never back on the arrival link
        let effects = arrive(&mut engine, 4, data(PEER, OTHER, 1, 0, b"z"), now);
        assert_eq!(transmit_links(&effects), vec![1, 2, 3]);
    }

    #[rstest]
    #[case::naive(FloodStrategy::Naive, vec![1, 2, 3], vec![1, 2, 3], vec![1, 2, 3])]
    #[case::directional(FloodStrategy::Directional, vec![2], vec![1, 3], vec![1, 2, 3])]
    #[case::learned(FloodStrategy::Learned, vec![2], vec![1, 3], vec![2])]
    fn test_strategies(
        #[case] strategy: FloodStrategy,
        #[case] expected_ack_links: Vec<u16>,
        #[case] expected_relay_links: Vec<u16>,
        #[case] expected_send_links: Vec<u16>,
    ) {
        let mut engine = PacketEngine::new(Arc::new(config(3, strategy))).unwrap();
        let now = Instant::now();

        let effects = arrive(&mut engine, 2, data(PEER, SELF, 0, 0, b"x"), now);
        assert_eq!(transmit_links(&effects), expected_ack_links);

        let effects = arrive(&mut engine, 2, data(OTHER, PEER, 0, 0, b"x"), now);
        assert_eq!(transmit_links(&effects), expected_relay_links);

        // hop observations are recorded regardless of the strategy
        assert_eq!(engine.peers.min_hops(PEER), Some((1, link(2))));

        let effects = submit(&mut engine, PEER, b"y", now);
        assert_eq!(transmit_links(&effects), expected_send_links);
    }

    #[test]
    fn test_retransmit_on_timeout() {
        let mut engine = engine(2);
        let start = Instant::now();
        submit(&mut engine, PEER, b"PING", start);

        assert!(engine.expired_timers(start + Duration::from_millis(999)).is_empty());

        let now = start + Duration::from_secs(1);
        let expired = engine.expired_timers(now);
        assert_eq!(expired.len(), 1);

        let effects = engine.handle_event(expired[0].clone(), now).unwrap();
        let packet = data(SELF, PEER, 0, 0, b"PING");
        assert_eq!(effects, vec![
            Effect::Transmit { link: link(1), packet: packet.clone() },
            Effect::Transmit { link: link(2), packet },
        ]);
        assert_eq!(engine.next_deadline(), Some(now + Duration::from_secs(1)));

        // processing the same event again has no effect
        assert!(engine.handle_event(expired[0].clone(), now).unwrap().is_empty());
    }

    #[test]
    fn test_no_retransmit_after_ack() {
        let mut engine = engine(2);
        let start = Instant::now();
        submit(&mut engine, PEER, b"PING", start);
        let later = start + Duration::from_secs(1);
        let expired = engine.expired_timers(later);

        arrive(&mut engine, 1, ack(PEER, SELF, 0, 0), start + Duration::from_millis(500));
        assert!(engine.handle_event(expired[0].clone(), later).unwrap().is_empty());
    }

    #[test]
    fn test_give_up_after_max_retransmissions() {
        let mut config = config(1, FloodStrategy::Learned);
        config.max_retransmissions = Some(2);
        let mut engine = PacketEngine::new(Arc::new(config)).unwrap();

        let mut now = Instant::now();
        submit(&mut engine, PEER, b"PING", now);

        let mut all_effects = Vec::new();
        while let Some(deadline) = engine.next_deadline() {
            now = deadline;
            for event in engine.expired_timers(now) {
                all_effects.extend(engine.handle_event(event, now).unwrap());
            }
        }

        assert_eq!(transmit_links(&all_effects), vec![1, 1]);
        assert_eq!(all_effects.last(), Some(&Effect::DeliveryFailed { destination: PEER, sequence: SequenceNumber::ZERO }));
        assert!(!engine.is_outstanding(PEER));

        // a late ACK does not re-enable the application
        assert!(arrive(&mut engine, 1, ack(PEER, SELF, 0, 0), now).is_empty());
    }

    #[test]
    fn test_snapshots() {
        let mut engine = engine(2);
        let now = Instant::now();
        submit(&mut engine, PEER, b"PING", now);
        arrive(&mut engine, 2, data(OTHER, SELF, 0, 1, b"x"), now);

        let peers = engine.peer_snapshot();
        assert_eq!(peers.iter().map(|p| p.address).collect::<Vec<_>>(), vec![PEER, OTHER]);
        assert_eq!(peers[1].min_hops, Some(2));

        let outstanding = engine.outstanding_snapshot();
        assert_eq!(outstanding.len(), 1);
        assert_eq!(outstanding[0].destination, PEER);
        assert_eq!(outstanding[0].payload_len, 4);
    }
}
