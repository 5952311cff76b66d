use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};
use crate::datalink::dll_basic::DllBasic;
use crate::datalink::physical_layer::{PhysicalLayer, WriteOutcome};
use crate::network::link::{LinkConfig, LinkId};
use crate::network::node_addr::NodeAddr;
use crate::network::packet::Packet;
use crate::network::sequence::SequenceNumber;
use crate::node::application::Application;
use crate::node::node_config::NodeConfig;
use crate::node::node_driver::{InboundFrame, Node, NodeHandle, NodeStateSnapshot};

/// What happens to a frame on a simulated link
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterAction {
    Pass,
    Drop,
    Duplicate,
    /// flip a bit in the frame, which the receiving datalink detects
    Corrupt,
}

/// Fault injection for a simulated link. The filter sees the packet inside each frame that is
///  sent in the link's direction.
pub trait FrameFilter: Send + Sync + 'static {
    fn on_frame(&self, packet: &Packet) -> FilterAction;
}

pub struct PassAll;

impl FrameFilter for PassAll {
    fn on_frame(&self, _packet: &Packet) -> FilterAction {
        FilterAction::Pass
    }
}

/// Applies `action` to the first `n` frames, passing everything after that
pub struct FirstFrames {
    remaining: AtomicUsize,
    action: FilterAction,
}

impl FirstFrames {
    pub fn new(n: usize, action: FilterAction) -> FirstFrames {
        FirstFrames {
            remaining: AtomicUsize::new(n),
            action,
        }
    }
}

impl FrameFilter for FirstFrames {
    fn on_frame(&self, _packet: &Packet) -> FilterAction {
        match self.remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)) {
            Ok(_) => self.action,
            Err(_) => FilterAction::Pass,
        }
    }
}

/// Applies `action` to all packets matching the predicate
pub struct PacketPredicate<F> {
    predicate: F,
    action: FilterAction,
}

impl <F: Fn(&Packet) -> bool + Send + Sync + 'static> PacketPredicate<F> {
    pub fn new(predicate: F, action: FilterAction) -> PacketPredicate<F> {
        PacketPredicate {
            predicate,
            action,
        }
    }
}

impl <F: Fn(&Packet) -> bool + Send + Sync + 'static> FrameFilter for PacketPredicate<F> {
    fn on_frame(&self, packet: &Packet) -> FilterAction {
        if (self.predicate)(packet) {
            self.action
        }
        else {
            FilterAction::Pass
        }
    }
}

/// Loses each frame independently with the given probability. The random sequence is seeded,
///  so a scenario plays out the same way on every run.
pub struct RandomLoss {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl RandomLoss {
    pub fn new(probability: f64, seed: u64) -> anyhow::Result<RandomLoss> {
        if !(0.0..=1.0).contains(&probability) {
            bail!("loss probability must be between 0 and 1, was {}", probability);
        }
        Ok(RandomLoss {
            probability,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }
}

impl FrameFilter for RandomLoss {
    fn on_frame(&self, _packet: &Packet) -> FilterAction {
        let mut rng = self.rng.lock()
            .unwrap_or_else(|e| e.into_inner());
        if rng.gen_bool(self.probability) {
            FilterAction::Drop
        }
        else {
            FilterAction::Pass
        }
    }
}


/// One direction of a simulated link, as seen from the sending node
#[derive(Clone)]
struct SimLinkEnd {
    config: LinkConfig,
    remote: NodeAddr,
    remote_link: LinkId,
    filter: Arc<dyn FrameFilter>,
}

struct SimNodeSetup {
    links: Vec<SimLinkEnd>,
    inbound_send: mpsc::Sender<InboundFrame>,
    inbound_recv: mpsc::Receiver<InboundFrame>,
}

/// The physical layer of a node in a [SimNetwork]. Frames take their link's transit time to
///  arrive, and a full receive queue on the remote end makes the link report 'too busy'.
struct SimPhysicalLayer {
    address: NodeAddr,
    links: Vec<(SimLinkEnd, mpsc::Sender<InboundFrame>)>,
}

impl PhysicalLayer for SimPhysicalLayer {
    fn write_physical(&self, link: LinkId, frame: Bytes) -> anyhow::Result<WriteOutcome> {
        let (end, sender) = self.links.get(link.number() as usize - 1)
            .ok_or_else(|| anyhow!("{:?} has no {:?}", self.address, link))?;

        let action = match frame.get(DllBasic::CHECKSUM_LEN..).map(Packet::deser) {
            Some(Ok(packet)) => end.filter.on_frame(&packet),
            _ => FilterAction::Pass,
        };

        let frames = match action {
            FilterAction::Pass => vec![frame],
            FilterAction::Drop => {
                debug!("{:?}: dropping frame on {:?}", self.address, link);
                return Ok(WriteOutcome::Sent);
            }
            FilterAction::Duplicate => vec![frame.clone(), frame],
            FilterAction::Corrupt => {
                let mut corrupted = frame.to_vec();
                if let Some(last) = corrupted.last_mut() {
                    *last ^= 0x01;
                }
                vec![Bytes::from(corrupted)]
            }
        };

        let transit_time = end.config.transit_time(frame_len(&frames));
        for (idx, frame) in frames.into_iter().enumerate() {
            let Ok(permit) = sender.clone().try_reserve_owned() else {
                trace!("{:?}: receive queue of {:?} is full", self.address, end.remote);
                if idx > 0 {
                    // a copy is on its way, only the duplicate is lost
                    return Ok(WriteOutcome::Sent);
                }
                return Ok(WriteOutcome::TooBusy);
            };

            let remote_link = end.remote_link;
            tokio::spawn(async move {
                sleep(transit_time).await;
                permit.send((remote_link, frame));
            });
        }
        Ok(WriteOutcome::Sent)
    }
}

fn frame_len(frames: &[Bytes]) -> usize {
    frames.first()
        .map(|f| f.len())
        .unwrap_or_default()
}


/// Collects everything the network layer hands to the application
#[derive(Default)]
pub struct RecordingApplication {
    delivered: RwLock<Vec<(NodeAddr, Bytes)>>,
    failed: RwLock<Vec<(NodeAddr, SequenceNumber)>>,
}

impl RecordingApplication {
    pub async fn delivered(&self) -> Vec<(NodeAddr, Bytes)> {
        self.delivered.read().await.clone()
    }

    pub async fn failed(&self) -> Vec<(NodeAddr, SequenceNumber)> {
        self.failed.read().await.clone()
    }
}

#[async_trait]
impl Application for RecordingApplication {
    async fn deliver(&self, source: NodeAddr, payload: Bytes) {
        self.delivered.write().await.push((source, payload));
    }

    async fn delivery_failed(&self, destination: NodeAddr, sequence: SequenceNumber) {
        self.failed.write().await.push((destination, sequence));
    }
}


/// An in-memory network of [Node]s connected by simulated point-to-point links, for testing
///  the full stack in a tokio runtime (preferably with paused time).
///
/// Nodes and links are defined first, and [SimNetwork::start] spawns all nodes.
pub struct SimNetwork {
    queue_len: usize,
    nodes: BTreeMap<NodeAddr, SimNodeSetup>,
}

impl SimNetwork {
    /// `queue_len` is the capacity of each node's inbound frame queue
    pub fn new(queue_len: usize) -> SimNetwork {
        SimNetwork {
            queue_len,
            nodes: BTreeMap::new(),
        }
    }

    pub fn add_node(&mut self, address: NodeAddr) -> anyhow::Result<()> {
        if self.nodes.contains_key(&address) {
            bail!("duplicate node {:?}", address);
        }

        let (inbound_send, inbound_recv) = mpsc::channel(self.queue_len);
        self.nodes.insert(address, SimNodeSetup {
            links: Vec::new(),
            inbound_send,
            inbound_recv,
        });
        Ok(())
    }

    /// Adds a link between `a` and `b`, using the next free link number on either side.
    ///  Returns the link numbers at `a` and `b`.
    pub fn connect(&mut self, a: NodeAddr, b: NodeAddr, config: LinkConfig) -> anyhow::Result<(LinkId, LinkId)> {
        if a == b {
            bail!("can not connect {:?} to itself", a);
        }
        let link_a = self.next_link(a)?;
        let link_b = self.next_link(b)?;

        self.node_mut(a)?.links.push(SimLinkEnd {
            config: config.clone(),
            remote: b,
            remote_link: link_b,
            filter: Arc::new(PassAll),
        });
        self.node_mut(b)?.links.push(SimLinkEnd {
            config,
            remote: a,
            remote_link: link_a,
            filter: Arc::new(PassAll),
        });
        Ok((link_a, link_b))
    }

    fn next_link(&self, address: NodeAddr) -> anyhow::Result<LinkId> {
        let node = self.nodes.get(&address)
            .ok_or_else(|| anyhow!("no node {:?}", address))?;
        u16::try_from(node.links.len() + 1).ok()
            .and_then(LinkId::new)
            .ok_or_else(|| anyhow!("{:?} has too many links", address))
    }

    fn node_mut(&mut self, address: NodeAddr) -> anyhow::Result<&mut SimNodeSetup> {
        self.nodes.get_mut(&address)
            .ok_or_else(|| anyhow!("no node {:?}", address))
    }

    /// Installs a filter for frames that `address` sends on `link`
    pub fn set_filter(&mut self, address: NodeAddr, link: LinkId, filter: Arc<dyn FrameFilter>) -> anyhow::Result<()> {
        let end = self.node_mut(address)?
            .links.get_mut(link.number() as usize - 1)
            .ok_or_else(|| anyhow!("{:?} has no {:?}", address, link))?;
        end.filter = filter;
        Ok(())
    }

    /// Spawns a [Node] for every node in the network. `configure` can adjust each node's
    ///  configuration before it is validated.
    pub fn start(self, configure: impl Fn(&mut NodeConfig)) -> anyhow::Result<SimCluster> {
        let senders = self.nodes.iter()
            .map(|(address, setup)| (*address, setup.inbound_send.clone()))
            .collect::<BTreeMap<_, _>>();

        let mut cluster = SimCluster {
            nodes: BTreeMap::new(),
        };

        for (address, setup) in self.nodes {
            let mut links = Vec::new();
            for end in setup.links {
                let sender = senders.get(&end.remote)
                    .ok_or_else(|| anyhow!("no node {:?}", end.remote))?
                    .clone();
                links.push((end, sender));
            }

            let mut config = NodeConfig::new(address, links.iter().map(|(end, _)| end.config.clone()).collect());
            config.inbound_queue_len = self.queue_len;
            configure(&mut config);

            let physical = Arc::new(SimPhysicalLayer { address, links });
            let application = Arc::new(RecordingApplication::default());
            let (node, handle) = Node::new(Arc::new(config), physical, setup.inbound_recv, application.clone())?;

            cluster.nodes.insert(address, SimClusterNode {
                handle,
                application,
                join_handle: tokio::spawn(node.run()),
            });
        }
        Ok(cluster)
    }
}


struct SimClusterNode {
    handle: NodeHandle,
    application: Arc<RecordingApplication>,
    join_handle: JoinHandle<anyhow::Result<()>>,
}

/// The running nodes of a [SimNetwork]
pub struct SimCluster {
    nodes: BTreeMap<NodeAddr, SimClusterNode>,
}

impl SimCluster {
    fn node(&self, address: NodeAddr) -> anyhow::Result<&SimClusterNode> {
        self.nodes.get(&address)
            .ok_or_else(|| anyhow!("no node {:?}", address))
    }

    pub fn handle(&self, address: NodeAddr) -> anyhow::Result<&NodeHandle> {
        Ok(&self.node(address)?.handle)
    }

    pub async fn submit(&self, from: NodeAddr, to: NodeAddr, payload: impl Into<Bytes>) -> anyhow::Result<()> {
        self.node(from)?.handle.submit(to, payload.into()).await
    }

    pub async fn delivered(&self, address: NodeAddr) -> anyhow::Result<Vec<(NodeAddr, Bytes)>> {
        Ok(self.node(address)?.application.delivered().await)
    }

    pub async fn failed(&self, address: NodeAddr) -> anyhow::Result<Vec<(NodeAddr, SequenceNumber)>> {
        Ok(self.node(address)?.application.failed().await)
    }

    pub async fn snapshot(&self, address: NodeAddr) -> anyhow::Result<NodeStateSnapshot> {
        self.node(address)?.handle.snapshot().await
    }

    /// Shuts down all nodes, returning the first error any of them terminated with
    pub async fn shutdown(self) -> anyhow::Result<()> {
        for node in self.nodes.values() {
            node.handle.shutdown().await;
        }

        let mut result = Ok(());
        for (address, node) in self.nodes {
            let node_result = node.join_handle.await
                .map_err(|e| anyhow!("task of {:?} failed: {}", address, e))
                .and_then(|r| r);
            if result.is_ok() {
                result = node_result;
            }
        }
        result
    }
}
