use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{anyhow, bail};
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, trace};
use crate::datalink::dll_basic::DllBasic;
use crate::network::link::LinkId;
use crate::network::node_addr::NodeAddr;
use crate::network::packet::Packet;
use crate::network::packet_engine::{Effect, NodeEvent, PacketEngine};
use crate::network::sequence::SequenceNumber;
use crate::node::application::ApplicationGate;
use crate::node::node_config::NodeConfig;
use crate::test_util::sim_network::FilterAction;

/// A frame that a node put on a link
#[derive(Clone, Debug)]
pub struct Transmission {
    pub at: Instant,
    pub from: NodeAddr,
    pub link: LinkId,
    pub packet: Packet,
}

struct HarnessNode {
    engine: PacketEngine,
    gate: ApplicationGate,
    delivered: Vec<(NodeAddr, Bytes)>,
    failed: Vec<(NodeAddr, SequenceNumber)>,
}

struct InFlight {
    to: NodeAddr,
    link: LinkId,
    packet: Packet,
}

type TransmissionFilter = Box<dyn FnMut(&Transmission) -> FilterAction>;

/// Wires several [PacketEngine]s together synchronously, with a manually advanced clock. Frames
///  take their link's transit time to arrive, and a configurable filter decides which frames
///  are lost or duplicated.
///
/// Everything happens in a single thread without a tokio runtime, so scenarios are fully
///  deterministic.
pub struct EngineHarness {
    now: Instant,
    nodes: BTreeMap<NodeAddr, HarnessNode>,
    wiring: FxHashMap<(NodeAddr, LinkId), (NodeAddr, LinkId)>,
    in_flight: BTreeMap<(Instant, u64), InFlight>,
    next_in_flight_id: u64,
    transmissions: Vec<Transmission>,
    filter: TransmissionFilter,
}

impl Default for EngineHarness {
    fn default() -> Self {
        EngineHarness::new()
    }
}

impl EngineHarness {
    pub fn new() -> EngineHarness {
        EngineHarness {
            now: Instant::now(),
            nodes: BTreeMap::new(),
            wiring: FxHashMap::default(),
            in_flight: BTreeMap::new(),
            next_in_flight_id: 0,
            transmissions: Vec::new(),
            filter: Box::new(|_| FilterAction::Pass),
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn add_node(&mut self, config: NodeConfig) -> anyhow::Result<()> {
        let address = config.address;
        if self.nodes.contains_key(&address) {
            bail!("duplicate node {:?}", address);
        }

        let engine = PacketEngine::new(Arc::new(config))?;
        self.nodes.insert(address, HarnessNode {
            engine,
            gate: ApplicationGate::new(),
            delivered: Vec::new(),
            failed: Vec::new(),
        });
        Ok(())
    }

    /// Connects link `link_a` of node `a` with link `link_b` of node `b`. Each direction uses
    ///  the sending node's link configuration for the transit time.
    pub fn connect(&mut self, a: NodeAddr, link_a: u16, b: NodeAddr, link_b: u16) -> anyhow::Result<()> {
        let link_a = self.checked_link(a, link_a)?;
        let link_b = self.checked_link(b, link_b)?;

        if self.wiring.contains_key(&(a, link_a)) || self.wiring.contains_key(&(b, link_b)) {
            bail!("{:?} of {:?} or {:?} of {:?} is already connected", link_a, a, link_b, b);
        }
        self.wiring.insert((a, link_a), (b, link_b));
        self.wiring.insert((b, link_b), (a, link_a));
        Ok(())
    }

    fn checked_link(&self, address: NodeAddr, link_no: u16) -> anyhow::Result<LinkId> {
        let node = self.nodes.get(&address)
            .ok_or_else(|| anyhow!("no node {:?}", address))?;
        match LinkId::new(link_no) {
            Some(link) if link_no <= node.engine.config().link_count() => Ok(link),
            _ => bail!("{:?} has no link {}", address, link_no),
        }
    }

    /// The filter is called once for every transmission, in order. Corrupted frames are
    ///  discarded by the receiver's datalink, so they are treated as lost.
    pub fn filter_with(&mut self, filter: impl FnMut(&Transmission) -> FilterAction + 'static) {
        self.filter = Box::new(filter);
    }

    /// Frames for which the predicate returns `true` are lost
    pub fn drop_when(&mut self, mut predicate: impl FnMut(&Transmission) -> bool + 'static) {
        self.filter_with(move |t| if predicate(t) { FilterAction::Drop } else { FilterAction::Pass });
    }

    pub fn engine(&self, address: NodeAddr) -> Option<&PacketEngine> {
        self.nodes.get(&address)
            .map(|n| &n.engine)
    }

    pub fn delivered(&self, address: NodeAddr) -> &[(NodeAddr, Bytes)] {
        self.nodes.get(&address)
            .map(|n| n.delivered.as_slice())
            .unwrap_or_default()
    }

    pub fn failed(&self, address: NodeAddr) -> &[(NodeAddr, SequenceNumber)] {
        self.nodes.get(&address)
            .map(|n| n.failed.as_slice())
            .unwrap_or_default()
    }

    pub fn pending_submissions(&self, address: NodeAddr) -> usize {
        self.nodes.get(&address)
            .map(|n| n.gate.pending_len())
            .unwrap_or_default()
    }

    /// All transmissions so far, including lost ones, in chronological order
    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    pub fn submit(&mut self, from: NodeAddr, to: NodeAddr, payload: impl Into<Bytes>) -> anyhow::Result<()> {
        let node = self.nodes.get_mut(&from)
            .ok_or_else(|| anyhow!("no node {:?}", from))?;
        node.gate.submit(to, payload.into());
        self.pump_application(from)
    }

    fn pump_application(&mut self, address: NodeAddr) -> anyhow::Result<()> {
        loop {
            let Some(node) = self.nodes.get_mut(&address) else {
                return Ok(());
            };
            let Some((destination, payload)) = node.gate.take_outbound() else {
                return Ok(());
            };
            self.handle_event(address, NodeEvent::ApplicationReady { destination, payload })?;
        }
    }

    fn handle_event(&mut self, address: NodeAddr, event: NodeEvent) -> anyhow::Result<()> {
        let now = self.now;
        let node = self.nodes.get_mut(&address)
            .ok_or_else(|| anyhow!("no node {:?}", address))?;
        let effects = node.engine.handle_event(event, now)?;

        for effect in effects {
            match effect {
                Effect::Transmit { link, packet } => self.transmit(address, link, packet),
                Effect::Deliver { source, payload } => self.node_mut(address)?.delivered.push((source, payload)),
                Effect::EnableApplication(destination) => self.node_mut(address)?.gate.enable(destination),
                Effect::DisableApplication(destination) => self.node_mut(address)?.gate.disable(destination),
                Effect::DeliveryFailed { destination, sequence } => self.node_mut(address)?.failed.push((destination, sequence)),
            }
        }
        Ok(())
    }

    fn node_mut(&mut self, address: NodeAddr) -> anyhow::Result<&mut HarnessNode> {
        self.nodes.get_mut(&address)
            .ok_or_else(|| anyhow!("no node {:?}", address))
    }

    fn transmit(&mut self, from: NodeAddr, link: LinkId, packet: Packet) {
        let transmission = Transmission {
            at: self.now,
            from,
            link,
            packet,
        };
        let action = (self.filter)(&transmission);
        let packet = transmission.packet.clone();
        self.transmissions.push(transmission);

        let num_copies = match action {
            FilterAction::Pass => 1,
            FilterAction::Duplicate => 2,
            FilterAction::Drop | FilterAction::Corrupt => {
                debug!("{:?} on {:?}: lost {:?}", from, link, packet);
                return;
            }
        };
        let Some(&(to, remote_link)) = self.wiring.get(&(from, link)) else {
            debug!("{:?} on {:?}: link is not connected, {:?} is lost", from, link, packet);
            return;
        };

        let frame_len = DllBasic::CHECKSUM_LEN + packet.serialized_len();
        let transit_time = self.nodes.get(&from)
            .and_then(|n| n.engine.config().link_config(link))
            .map(|l| l.transit_time(frame_len))
            .unwrap_or_default();

        for _ in 0..num_copies {
            let id = self.next_in_flight_id;
            self.next_in_flight_id += 1;
            self.in_flight.insert((self.now + transit_time, id), InFlight {
                to,
                link: remote_link,
                packet: packet.clone(),
            });
        }
    }

    fn next_event_time(&self) -> Option<Instant> {
        let next_arrival = self.in_flight.keys().next().map(|(at, _)| *at);
        let next_timer = self.nodes.values()
            .filter_map(|n| n.engine.next_deadline())
            .min();

        match (next_arrival, next_timer) {
            (Some(a), Some(t)) => Some(a.min(t)),
            (a, t) => a.or(t),
        }
    }

    /// Advances the clock to the next frame arrival or timer expiry and processes everything
    ///  that is due at that time. Returns `false` if there is nothing left to do.
    pub fn step(&mut self) -> anyhow::Result<bool> {
        let Some(next) = self.next_event_time() else {
            return Ok(false);
        };
        self.now = self.now.max(next);
        trace!("harness time advanced to {:?}", next);

        while let Some(entry) = self.in_flight.first_entry() {
            if entry.key().0 > self.now {
                break;
            }
            let in_flight = entry.remove();
            self.handle_event(in_flight.to, NodeEvent::FrameArrived { link: in_flight.link, packet: in_flight.packet })?;
            self.pump_application(in_flight.to)?;
        }

        let addresses = self.nodes.keys().copied().collect::<Vec<_>>();
        for address in addresses {
            let expired = self.nodes.get(&address)
                .map(|n| n.engine.expired_timers(self.now))
                .unwrap_or_default();
            for event in expired {
                self.handle_event(address, event)?;
            }
            self.pump_application(address)?;
        }
        Ok(true)
    }

    /// Processes events until there is nothing left to do or `max_duration` has passed. Timers
    ///  retransmit forever unless the nodes are configured otherwise, so a scenario with a
    ///  destination that never acknowledges runs into the limit.
    pub fn run_for(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        let end = self.now + max_duration;
        while let Some(next) = self.next_event_time() {
            if next > end {
                break;
            }
            self.step()?;
        }
        self.now = self.now.max(end);
        Ok(())
    }

    /// Processes events until nothing is in flight and no retransmission timer is armed
    pub fn run_until_idle(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        let end = self.now + max_duration;
        while let Some(next) = self.next_event_time() {
            if next > end {
                bail!("still busy after {:?}", max_duration);
            }
            self.step()?;
        }
        Ok(())
    }
}
