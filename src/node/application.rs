use std::collections::VecDeque;
use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;
use crate::network::node_addr::NodeAddr;
use crate::network::sequence::SequenceNumber;

/// The consumer side of the application running on a node
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Called once per payload, in the order the source submitted them
    async fn deliver(&self, source: NodeAddr, payload: Bytes);

    /// Called if a node is configured with a maximum number of retransmissions and a packet
    ///  exceeded it. No further payloads are sent to `destination` after this.
    async fn delivery_failed(&self, destination: NodeAddr, sequence: SequenceNumber);
}


/// Buffers the payloads an application submitted, handing them out only for destinations that
///  are currently enabled. The network layer disables a destination while a packet to it is
///  awaiting its ACK.
#[derive(Default)]
pub struct ApplicationGate {
    queues: FxHashMap<NodeAddr, VecDeque<Bytes>>,
    /// destinations with pending payloads, in round-robin order
    ready_order: VecDeque<NodeAddr>,
    disabled: FxHashSet<NodeAddr>,
}

impl ApplicationGate {
    pub fn new() -> ApplicationGate {
        ApplicationGate::default()
    }

    pub fn submit(&mut self, destination: NodeAddr, payload: Bytes) {
        let queue = self.queues.entry(destination).or_default();
        if queue.is_empty() {
            self.ready_order.push_back(destination);
        }
        queue.push_back(payload);
    }

    pub fn enable(&mut self, destination: NodeAddr) {
        self.disabled.remove(&destination);
    }

    pub fn disable(&mut self, destination: NodeAddr) {
        self.disabled.insert(destination);
    }

    pub fn is_enabled(&self, destination: NodeAddr) -> bool {
        !self.disabled.contains(&destination)
    }

    /// The total number of buffered payloads
    pub fn pending_len(&self) -> usize {
        self.queues.values()
            .map(|q| q.len())
            .sum()
    }

    /// Takes the next payload for an enabled destination. Destinations take turns, so a
    ///  destination with many buffered payloads can not starve the others.
    pub fn take_outbound(&mut self) -> Option<(NodeAddr, Bytes)> {
        for _ in 0..self.ready_order.len() {
            let destination = self.ready_order.pop_front()?;
            if self.disabled.contains(&destination) {
                self.ready_order.push_back(destination);
                continue;
            }

            let queue = self.queues.get_mut(&destination)?;
            let payload = queue.pop_front()?;
            if queue.is_empty() {
                self.queues.remove(&destination);
            }
            else {
                self.ready_order.push_back(destination);
            }

            trace!("taking outbound payload for {:?}, {} bytes", destination, payload.len());
            return Some((destination, payload));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// formats as "destination:payload"
    fn take_all(gate: &mut ApplicationGate) -> Vec<String> {
        let mut result = Vec::new();
        while let Some((destination, payload)) = gate.take_outbound() {
            result.push(format!("{}:{}", destination, String::from_utf8_lossy(&payload)));
        }
        result
    }

    fn gate_with_payloads() -> ApplicationGate {
        let mut gate = ApplicationGate::new();
        gate.submit(NodeAddr(1), Bytes::from_static(b"a1"));
        gate.submit(NodeAddr(1), Bytes::from_static(b"a2"));
        gate.submit(NodeAddr(1), Bytes::from_static(b"a3"));
        gate.submit(NodeAddr(2), Bytes::from_static(b"b1"));
        gate.submit(NodeAddr(2), Bytes::from_static(b"b2"));
        gate.submit(NodeAddr(3), Bytes::from_static(b"c1"));
        gate
    }

    #[test]
    fn test_round_robin() {
        let mut gate = gate_with_payloads();
        assert_eq!(gate.pending_len(), 6);
        assert_eq!(take_all(&mut gate), vec!["1:a1", "2:b1", "3:c1", "1:a2", "2:b2", "1:a3"]);
        assert_eq!(gate.pending_len(), 0);
        assert!(gate.take_outbound().is_none());
    }

    #[test]
    fn test_disabled_destinations_are_skipped() {
        let mut gate = gate_with_payloads();
        gate.disable(NodeAddr(1));
        gate.disable(NodeAddr(3));
        assert!(!gate.is_enabled(NodeAddr(1)));

        assert_eq!(take_all(&mut gate), vec!["2:b1", "2:b2"]);
        assert_eq!(gate.pending_len(), 4);

        gate.enable(NodeAddr(3));
        assert_eq!(take_all(&mut gate), vec!["3:c1"]);

        gate.enable(NodeAddr(1));
        assert_eq!(take_all(&mut gate), vec!["1:a1", "1:a2", "1:a3"]);
    }

    #[test]
    fn test_submit_after_drain() {
        let mut gate = ApplicationGate::new();
        gate.submit(NodeAddr(1), Bytes::from_static(b"a1"));
        assert_eq!(take_all(&mut gate), vec!["1:a1"]);

        gate.submit(NodeAddr(1), Bytes::from_static(b"a2"));
        assert_eq!(take_all(&mut gate), vec!["1:a2"]);
    }
}
