//! Packet abstractions for encoded stream data.
//!
//! A packet is one unit handed to the container layer: a header packet or the
//! payload of one compressed frame, plus its Ogg-style metadata.

use bitflags::bitflags;
use std::borrow::Cow;
use std::fmt;

bitflags! {
    /// Flags for packet properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// This packet contains a keyframe.
        const KEYFRAME = 0x0001;
        /// First packet of a logical stream.
        const BEGIN_OF_STREAM = 0x0002;
        /// Last packet of a logical stream.
        const END_OF_STREAM = 0x0004;
        /// Stream header rather than frame data.
        const HEADER = 0x0008;
    }
}

/// An encoded packet.
///
/// Packets either own their bytes or borrow them from the encoder that
/// produced them; a borrowed packet stays valid until the encoder is used
/// mutably again.
#[derive(Clone)]
pub struct Packet<'a> {
    /// The packet data.
    data: Cow<'a, [u8]>,
    /// Packet flags.
    pub flags: PacketFlags,
    /// Sequence number within the logical stream.
    pub packet_no: i64,
    /// Granule position (codec-defined timestamp).
    pub granule_pos: i64,
}

impl<'a> Packet<'a> {
    /// Create a new packet with owned data.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Cow::Owned(data),
            flags: PacketFlags::empty(),
            packet_no: 0,
            granule_pos: 0,
        }
    }

    /// Create a new packet referencing external data.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
            flags: PacketFlags::empty(),
            packet_no: 0,
            granule_pos: 0,
        }
    }

    /// Get the packet data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the size of the packet data.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if this packet is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if this is a keyframe packet.
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }

    /// Check if this packet opens the stream.
    pub fn is_bos(&self) -> bool {
        self.flags.contains(PacketFlags::BEGIN_OF_STREAM)
    }

    /// Check if this packet closes the stream.
    pub fn is_eos(&self) -> bool {
        self.flags.contains(PacketFlags::END_OF_STREAM)
    }

    /// Make the packet own its data.
    pub fn into_owned(self) -> Packet<'static> {
        Packet {
            data: Cow::Owned(self.data.into_owned()),
            flags: self.flags,
            packet_no: self.packet_no,
            granule_pos: self.granule_pos,
        }
    }

    /// Set the sequence number.
    pub fn with_packet_no(mut self, packet_no: i64) -> Self {
        self.packet_no = packet_no;
        self
    }

    /// Set the granule position.
    pub fn with_granule_pos(mut self, granule_pos: i64) -> Self {
        self.granule_pos = granule_pos;
        self
    }

    /// Set the packet flags.
    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl<'a> fmt::Debug for Packet<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("size", &self.size())
            .field("packet_no", &self.packet_no)
            .field("granule_pos", &self.granule_pos)
            .field("flags", &self.flags)
            .finish()
    }
}

/// An owned packet suitable for storage.
pub type OwnedPacket = Packet<'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_creation() {
        let packet = Packet::new(vec![0u8; 100]);
        assert_eq!(packet.size(), 100);
        assert!(!packet.is_empty());
        assert!(!packet.is_bos());
    }

    #[test]
    fn test_packet_from_slice() {
        let data = [1u8, 2, 3, 4, 5];
        let packet = Packet::from_slice(&data);
        assert_eq!(packet.data(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_packet_builders() {
        let packet = Packet::new(vec![1])
            .with_packet_no(7)
            .with_granule_pos(64)
            .with_flags(PacketFlags::KEYFRAME | PacketFlags::END_OF_STREAM);
        assert_eq!(packet.packet_no, 7);
        assert_eq!(packet.granule_pos, 64);
        assert!(packet.is_keyframe());
        assert!(packet.is_eos());
    }

    #[test]
    fn test_packet_into_owned() {
        let data = [1u8, 2, 3];
        let packet = Packet::from_slice(&data).with_packet_no(3);
        let owned: OwnedPacket = packet.into_owned();
        assert_eq!(owned.data(), &[1, 2, 3]);
        assert_eq!(owned.packet_no, 3);
    }
}
