use std::sync::Arc;
use bytes::{Buf, BufMut, BytesMut};
use crc::Crc;
use tracing::{debug, trace};
use crate::datalink::physical_layer::{PhysicalLayer, WriteOutcome};
use crate::network::link::LinkId;
use crate::network::packet::Packet;

const CHECKSUM: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_IBM_3740);

/// A pass-through datalink: packets are framed with a checksum and written to the physical
///  link once. Frames that arrive corrupted are discarded silently, there is no retry.
pub struct DllBasic {
    physical: Arc<dyn PhysicalLayer>,
    count_sent: u64,
    count_too_busy: u64,
    count_corrupted: u64,
}

impl DllBasic {
    pub const CHECKSUM_LEN: usize = size_of::<u16>();

    pub fn new(physical: Arc<dyn PhysicalLayer>) -> DllBasic {
        DllBasic {
            physical,
            count_sent: 0,
            count_too_busy: 0,
            count_corrupted: 0,
        }
    }

    pub fn count_sent(&self) -> u64 {
        self.count_sent
    }

    /// The number of frames the physical layer rejected because the link was saturated
    pub fn count_too_busy(&self) -> u64 {
        self.count_too_busy
    }

    pub fn count_corrupted(&self) -> u64 {
        self.count_corrupted
    }

    pub fn frame(packet: &Packet) -> BytesMut {
        let mut packet_buf = BytesMut::with_capacity(packet.serialized_len());
        packet.ser(&mut packet_buf);

        let mut buf = BytesMut::with_capacity(Self::CHECKSUM_LEN + packet_buf.len());
        buf.put_u16(CHECKSUM.checksum(&packet_buf));
        buf.put_slice(&packet_buf);
        buf
    }

    pub fn down_to_datalink(&mut self, link: LinkId, packet: &Packet) -> anyhow::Result<WriteOutcome> {
        let frame = Self::frame(packet);
        trace!("writing frame to {:?}: {:?}", link, packet);

        let outcome = self.physical.write_physical(link, frame.freeze())?;
        match outcome {
            WriteOutcome::Sent => self.count_sent += 1,
            WriteOutcome::TooBusy => {
                debug!("{:?} is too busy - discarding {:?}", link, packet);
                self.count_too_busy += 1;
            }
        }
        Ok(outcome)
    }

    pub fn up_from_physical(&mut self, link: LinkId, mut frame: &[u8]) -> Option<(LinkId, Packet)> {
        if frame.remaining() < Self::CHECKSUM_LEN {
            debug!("frame of {} bytes on {:?} is too short - dropping", frame.len(), link);
            self.count_corrupted += 1;
            return None;
        }

        let checksum = frame.get_u16();
        if checksum != CHECKSUM.checksum(frame) {
            debug!("frame with invalid checksum on {:?} - dropping", link);
            self.count_corrupted += 1;
            return None;
        }

        match Packet::deser(frame) {
            Ok(packet) => {
                trace!("received frame on {:?}: {:?}", link, packet);
                Some((link, packet))
            }
            Err(e) => {
                debug!("unparseable packet on {:?}: {} - dropping", link, e);
                self.count_corrupted += 1;
                None
            }
        }
    }
}
