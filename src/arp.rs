//! Address Resolution Protocol for IPv4 over Ethernet, RFC 826.
//!
//! Not a distinct network layer, but required so the router can discover
//! the hardware address behind an IPv4 address before it can hand a frame
//! to the link layer.

use byte_struct::*;
use static_assertions::const_assert;

use crate::error::ParseError;
use crate::{Ipv4Addr, MacAddr};

const_assert!(ArpHeader::BYTE_LEN == 28);

/// ARP header for IPv4-over-Ethernet (hardware size 6, protocol size 4).
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct ArpHeader {
    /// Hardware type; always 1 (Ethernet) for this router.
    pub hardware_type: u16,
    /// Protocol type; always 0x0800 (IPv4) for this router.
    pub protocol_type: u16,
    /// Hardware address length in bytes; always 6.
    pub hardware_size: u8,
    /// Protocol address length in bytes; always 4.
    pub protocol_size: u8,
    /// Request (1) or reply (2).
    pub opcode: ArpOperation,
    /// Sender's hardware address.
    pub sender_hardware: MacAddr,
    /// Sender's protocol address.
    pub sender_protocol: Ipv4Addr,
    /// Target's hardware address (all-zero in a request).
    pub target_hardware: MacAddr,
    /// Target's protocol address.
    pub target_protocol: Ipv4Addr,
}

impl ArpHeader {
    /// Build an ARP header for IPv4-over-Ethernet, filling in the fixed
    /// hardware/protocol type and size fields so that no field is ever
    /// left unset (`spec.md` §3 invariant).
    pub fn new(
        opcode: ArpOperation,
        sender_hardware: MacAddr,
        sender_protocol: Ipv4Addr,
        target_hardware: MacAddr,
        target_protocol: Ipv4Addr,
    ) -> Self {
        ArpHeader {
            hardware_type: 1,
            protocol_type: 0x0800,
            hardware_size: 6,
            protocol_size: 4,
            opcode,
            sender_hardware,
            sender_protocol,
            target_hardware,
            target_protocol,
        }
    }

    /// Parse a 28-byte ARP header.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < Self::BYTE_LEN {
            return Err(ParseError::Truncated {
                needed: Self::BYTE_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self::read_bytes(&bytes[..Self::BYTE_LEN]))
    }

    /// Serialize to the wire's 28-byte representation.
    pub fn serialize(&self) -> [u8; 28] {
        let mut out = [0_u8; 28];
        self.write_bytes(&mut out);
        out
    }
}

crate::enum_with_unknown! {
    /// ARP request/reply opcode.
    pub enum ArpOperation(u16) {
        /// Confirm the target IP address and acquire its MAC address.
        Request = 1,
        /// Respond to a request, providing the associated MAC address.
        Reply = 2,
    }
}

impl ByteStructLen for ArpOperation {
    const BYTE_LEN: usize = 2;
}

impl ByteStruct for ArpOperation {
    fn read_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0_u8; 2];
        raw.copy_from_slice(&bytes[0..2]);
        ArpOperation::from(u16::from_be_bytes(raw))
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0..2].copy_from_slice(&u16::from(*self).to_be_bytes());
    }
}
