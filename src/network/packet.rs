use std::fmt::{Debug, Formatter};
use anyhow::{anyhow, bail};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::network::node_addr::NodeAddr;
use crate::network::sequence::SequenceNumber;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PacketKind {
    Data = 0,
    Ack = 1,
}

/// The unit of data exchanged between nodes' network layers.
///
/// Wire format (all numbers in network byte order):
/// ```ascii
///  0: source address (u32)
///  4: destination address (u32)
///  8: kind (u8): 0 = DATA, 1 = ACK
///  9: sequence number (u32)
/// 13: hop count (u16)
/// 15: payload length (u32)
/// 19: payload
/// ```
///
/// The header has a fixed size, and the payload length is always transmitted explicitly - it is
///  never inferred from the size of the frame that carried the packet.
#[derive(Clone, Eq, PartialEq)]
pub struct Packet {
    pub source: NodeAddr,
    pub destination: NodeAddr,
    pub kind: PacketKind,
    pub sequence: SequenceNumber,
    pub hop_count: u16,
    pub payload: Bytes,
}

impl Debug for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}#{} {} -> {} (hops: {}, {} bytes)", self.kind, self.sequence, self.source, self.destination, self.hop_count, self.payload.len())
    }
}

impl Packet {
    pub const HEADER_LEN: usize = 2*NodeAddr::SERIALIZED_LEN
        + size_of::<u8>()
        + size_of::<u32>()
        + size_of::<u16>()
        + size_of::<u32>();

    pub fn new_data(source: NodeAddr, destination: NodeAddr, sequence: SequenceNumber, payload: Bytes) -> Packet {
        Packet {
            source,
            destination,
            kind: PacketKind::Data,
            sequence,
            hop_count: 0,
            payload,
        }
    }

    /// The acknowledgement for this packet: addresses swapped, a fresh hop count and no payload
    pub fn to_ack(&self) -> Packet {
        Packet {
            source: self.destination,
            destination: self.source,
            kind: PacketKind::Ack,
            sequence: self.sequence,
            hop_count: 0,
            payload: Bytes::new(),
        }
    }

    pub fn serialized_len(&self) -> usize {
        Self::HEADER_LEN + self.payload.len()
    }

    pub fn ser(&self, buf: &mut BytesMut) {
        buf.reserve(self.serialized_len());
        buf.put_u32(self.source.to_raw());
        buf.put_u32(self.destination.to_raw());
        buf.put_u8(self.kind.into());
        buf.put_u32(self.sequence.to_raw());
        buf.put_u16(self.hop_count);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Parses a packet that must fill the buffer exactly
    pub fn deser(mut buf: &[u8]) -> anyhow::Result<Packet> {
        if buf.remaining() < Self::HEADER_LEN {
            bail!("incomplete packet header: {} bytes", buf.remaining());
        }

        let source = NodeAddr(buf.get_u32());
        let destination = NodeAddr(buf.get_u32());
        let raw_kind = buf.get_u8();
        let kind = PacketKind::try_from(raw_kind)
            .map_err(|_| anyhow!("invalid packet kind {}", raw_kind))?;
        let sequence = SequenceNumber::from_raw(buf.get_u32());
        let hop_count = buf.get_u16();
        let payload_len = buf.get_u32() as usize;

        if buf.remaining() != payload_len {
            bail!("payload length {} does not match the remaining {} bytes", payload_len, buf.remaining());
        }
        if kind == PacketKind::Ack && payload_len != 0 {
            bail!("ACK packet with a payload of {} bytes", payload_len);
        }

        Ok(Packet {
            source,
            destination,
            kind,
            sequence,
            hop_count,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}
