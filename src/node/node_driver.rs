use std::future::pending;
use std::sync::Arc;
use anyhow::{anyhow, bail};
use bytes::Bytes;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};
use crate::datalink::dll_basic::DllBasic;
use crate::datalink::physical_layer::PhysicalLayer;
use crate::network::link::LinkId;
use crate::network::node_addr::NodeAddr;
use crate::network::packet_engine::{Effect, NodeEvent, PacketEngine};
use crate::network::peer_table::PeerSnapshot;
use crate::network::retransmit::OutstandingSnapshot;
use crate::node::application::{Application, ApplicationGate};
use crate::node::node_config::NodeConfig;

/// A frame as it arrives from the physical layer, tagged with the link it arrived on
pub type InboundFrame = (LinkId, Bytes);

enum NodeCommand {
    Submit { destination: NodeAddr, payload: Bytes },
    DumpState,
    Snapshot(oneshot::Sender<NodeStateSnapshot>),
    Shutdown,
}

/// A node's complete protocol state, for diagnostics and tests
#[derive(Clone, Debug)]
pub struct NodeStateSnapshot {
    pub address: NodeAddr,
    pub peers: Vec<PeerSnapshot>,
    pub outstanding: Vec<OutstandingSnapshot>,
    pub pending_submissions: usize,
    pub count_sent: u64,
    pub count_too_busy: u64,
    pub count_corrupted: u64,
}


/// The API for interacting with a running [Node]. Handles are cheap to clone, and all clones
///  refer to the same node.
#[derive(Clone)]
pub struct NodeHandle {
    config: Arc<NodeConfig>,
    commands: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    pub fn address(&self) -> NodeAddr {
        self.config.address
    }

    /// Queues a payload for delivery to `destination`. Payloads for the same destination are
    ///  delivered in the order they were submitted.
    pub async fn submit(&self, destination: NodeAddr, payload: Bytes) -> anyhow::Result<()> {
        if destination == self.config.address {
            bail!("{:?} can not send to itself", destination);
        }
        if payload.len() > self.config.max_payload_len {
            bail!("payload has {} bytes, maximum is {}", payload.len(), self.config.max_payload_len);
        }

        debug!("submitting {} bytes from {:?} to {:?}", payload.len(), self.config.address, destination);
        self.send_command(NodeCommand::Submit { destination, payload }).await
    }

    /// Logs the node's peer table and outstanding packets
    pub async fn dump_state(&self) -> anyhow::Result<()> {
        self.send_command(NodeCommand::DumpState).await
    }

    pub async fn snapshot(&self) -> anyhow::Result<NodeStateSnapshot> {
        let (send, recv) = oneshot::channel();
        self.send_command(NodeCommand::Snapshot(send)).await?;
        Ok(recv.await?)
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(NodeCommand::Shutdown).await;
    }

    async fn send_command(&self, command: NodeCommand) -> anyhow::Result<()> {
        self.commands.send(command).await
            .map_err(|_| anyhow!("node {:?} is not running", self.config.address))
    }
}


/// Runs a node's protocol stack: it feeds inbound frames, application submissions and timer
///  expiries into the [PacketEngine] one at a time and performs the resulting effects.
pub struct Node {
    config: Arc<NodeConfig>,
    engine: PacketEngine,
    datalink: DllBasic,
    gate: ApplicationGate,
    application: Arc<dyn Application>,
    inbound: mpsc::Receiver<InboundFrame>,
    commands: mpsc::Receiver<NodeCommand>,
}

impl Node {
    pub fn new(
        config: Arc<NodeConfig>,
        physical: Arc<dyn PhysicalLayer>,
        inbound: mpsc::Receiver<InboundFrame>,
        application: Arc<dyn Application>,
    ) -> anyhow::Result<(Node, NodeHandle)> {
        let engine = PacketEngine::new(config.clone())?;
        let (send, recv) = mpsc::channel(config.inbound_queue_len);

        let node = Node {
            config: config.clone(),
            engine,
            datalink: DllBasic::new(physical),
            gate: ApplicationGate::new(),
            application,
            inbound,
            commands: recv,
        };
        let handle = NodeHandle {
            config,
            commands: send,
        };
        Ok((node, handle))
    }

    /// Runs until shutdown is requested, all handles are dropped, or the inbound frame channel
    ///  is closed. Returns an error if the node terminated because of a fatal error.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("starting node {:?} with {} links", self.config.address, self.config.link_count());

        let result = self.do_run().await;
        match &result {
            Ok(_) => info!("node {:?} shut down", self.config.address),
            Err(e) => error!("node {:?} terminated: {}", self.config.address, e),
        }
        result
    }

    async fn do_run(&mut self) -> anyhow::Result<()> {
        let mut dump_ticks = self.config.state_dump_interval.map(|d| {
            let mut ticks = interval(d);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks
        });

        loop {
            let deadline = self.engine.next_deadline();

            select! {
                frame = self.inbound.recv() => {
                    let Some((link, frame)) = frame else {
                        info!("inbound frame channel of {:?} was closed", self.config.address);
                        return Ok(());
                    };
                    if let Some((link, packet)) = self.datalink.up_from_physical(link, &frame) {
                        self.handle_event(NodeEvent::FrameArrived { link, packet }).await?;
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(NodeCommand::Submit { destination, payload }) => self.gate.submit(destination, payload),
                        Some(NodeCommand::DumpState) => self.dump_state(),
                        Some(NodeCommand::Snapshot(reply_to)) => {
                            let _ = reply_to.send(self.snapshot());
                        }
                        Some(NodeCommand::Shutdown) | None => return Ok(()),
                    }
                }
                _ = sleep_until_deadline(deadline) => {
                    let now = Instant::now();
                    for event in self.engine.expired_timers(now) {
                        self.handle_event(event).await?;
                    }
                }
                _ = next_tick(&mut dump_ticks) => {
                    self.dump_state();
                }
            }

            self.pump_application().await?;
        }
    }

    async fn handle_event(&mut self, event: NodeEvent) -> anyhow::Result<()> {
        let effects = self.engine.handle_event(event, Instant::now())?;
        for effect in effects {
            self.apply_effect(effect).await?;
        }
        Ok(())
    }

    async fn apply_effect(&mut self, effect: Effect) -> anyhow::Result<()> {
        match effect {
            Effect::Transmit { link, packet } => {
                self.datalink.down_to_datalink(link, &packet)?;
            }
            Effect::Deliver { source, payload } => self.application.deliver(source, payload).await,
            Effect::EnableApplication(destination) => self.gate.enable(destination),
            Effect::DisableApplication(destination) => self.gate.disable(destination),
            Effect::DeliveryFailed { destination, sequence } => self.application.delivery_failed(destination, sequence).await,
        }
        Ok(())
    }

    /// Hands buffered payloads to the engine while there are any for enabled destinations
    async fn pump_application(&mut self) -> anyhow::Result<()> {
        while let Some((destination, payload)) = self.gate.take_outbound() {
            self.handle_event(NodeEvent::ApplicationReady { destination, payload }).await?;
        }
        Ok(())
    }

    fn snapshot(&self) -> NodeStateSnapshot {
        NodeStateSnapshot {
            address: self.config.address,
            peers: self.engine.peer_snapshot(),
            outstanding: self.engine.outstanding_snapshot(),
            pending_submissions: self.gate.pending_len(),
            count_sent: self.datalink.count_sent(),
            count_too_busy: self.datalink.count_too_busy(),
            count_corrupted: self.datalink.count_corrupted(),
        }
    }

    fn dump_state(&self) {
        let snapshot = self.snapshot();

        info!("state of node {:?}: {} frames sent, {} too busy, {} corrupted, {} submissions pending",
            snapshot.address, snapshot.count_sent, snapshot.count_too_busy, snapshot.count_corrupted, snapshot.pending_submissions);
        info!("{}", PeerSnapshot::TABLE_HEADER);
        for peer in &snapshot.peers {
            info!("{}", peer);
        }
        if !snapshot.outstanding.is_empty() {
            info!("{}", OutstandingSnapshot::TABLE_HEADER);
            for outstanding in &snapshot.outstanding {
                info!("{}", outstanding);
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn next_tick(ticks: &mut Option<Interval>) {
    match ticks {
        Some(ticks) => {
            ticks.tick().await;
        }
        None => pending().await,
    }
}
