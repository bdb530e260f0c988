//! Axon protocol core data types
//!
//! This crate provides basic data type definitions used by other Axon crates.
//! Axon users should not depend on this crate directly. Use the `axon::core` reexport instead.
#![no_std]

/// Wire header length in bytes
pub const HEADER_SIZE: usize = 7;

/// Frame check sequence length in bytes
pub const CRC_SIZE: usize = 2;

/// Upper clamp on the payload carried by a single frame
pub const MAX_DATA_SIZE: usize = 128;

/// Upper bound of the 12-bit wire addresses (target, source, endpoint ids)
pub const MAX_ID: u16 = 0x0fff;

/// Protocol revision carried in the header's low nibble
pub const PROTOCOL_REVISION: u8 = 0;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Frame addressing mode
///
/// The type has explicit numeric encoding matching the 4-bit wire field.
/// The allocator never interprets it; routing does, via `TryFrom<u8>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TargetMode {
    /// A single endpoint designated by its id.
    Id = 0,
    /// A single endpoint designated by its id, acknowledged.
    IdAck = 1,
    /// Every endpoint of a given type.
    Type = 2,
    /// Every endpoint on the bus.
    Broadcast = 3,
    /// Every endpoint subscribed to a multicast group.
    Multicast = 4,
    /// Every endpoint hosted by a given node.
    NodeId = 5,
}

impl TargetMode {
    pub const MAX: TargetMode = TargetMode::NodeId;

    pub const fn try_from_u8(code: u8) -> Option<TargetMode> {
        match code {
            0 => Some(TargetMode::Id),
            1 => Some(TargetMode::IdAck),
            2 => Some(TargetMode::Type),
            3 => Some(TargetMode::Broadcast),
            4 => Some(TargetMode::Multicast),
            5 => Some(TargetMode::NodeId),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<TargetMode> for u8 {
    fn from(value: TargetMode) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for TargetMode {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Opaque routing key designating an addressable destination inside the host
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointId(u16);

impl EndpointId {
    pub const MAX: EndpointId = EndpointId(MAX_ID);

    pub const fn new(value: u16) -> Option<Self> {
        if value <= MAX_ID {
            Some(Self::from_u16_truncating(value))
        } else {
            None
        }
    }

    pub const fn from_u16_truncating(value: u16) -> Self {
        Self(value & MAX_ID)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl From<EndpointId> for u16 {
    fn from(value: EndpointId) -> Self {
        value.into_u16()
    }
}

impl From<EndpointId> for usize {
    fn from(value: EndpointId) -> Self {
        u16::from(value).into()
    }
}

impl TryFrom<u16> for EndpointId {
    type Error = InvalidValue;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// Frame header as laid out on the wire
///
/// Seven bytes, little-endian:
///
/// ```text
/// byte 0..2  protocol:4  target:12
/// byte 2..4  target_mode:4  source:12
/// byte 4     cmd
/// byte 5..7  size
/// ```
///
/// `target_mode` is carried raw; only routing gives it meaning (see
/// [`TargetMode`]). Decoding is total: 12-bit fields are masked, unknown
/// mode nibbles pass through. The buffer manager materialises headers from
/// bytes that may still be mid-reception, so decoding must never fail.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub protocol: u8,
    pub target: u16,
    pub target_mode: u8,
    pub source: u16,
    pub cmd: u8,
    pub size: u16,
}

impl Header {
    pub const fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let w0 = u16::from_le_bytes([bytes[0], bytes[1]]);
        let w1 = u16::from_le_bytes([bytes[2], bytes[3]]);
        Self {
            protocol: (w0 & 0x000f) as u8,
            target: (w0 >> 4) & MAX_ID,
            target_mode: (w1 & 0x000f) as u8,
            source: (w1 >> 4) & MAX_ID,
            cmd: bytes[4],
            size: u16::from_le_bytes([bytes[5], bytes[6]]),
        }
    }

    pub const fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let w0 = (self.protocol & 0x0f) as u16 | ((self.target & MAX_ID) << 4);
        let w1 = (self.target_mode & 0x0f) as u16 | ((self.source & MAX_ID) << 4);
        let w0 = w0.to_le_bytes();
        let w1 = w1.to_le_bytes();
        let size = self.size.to_le_bytes();
        [w0[0], w0[1], w1[0], w1[1], self.cmd, size[0], size[1]]
    }
}
