//! Link layer: IEEE 802.3 Ethernet II framing.
//!
//! No VLAN tags, no 802.1Q, no jumbo frames — see `spec.md` §6.

use byte_struct::*;

use crate::error::ParseError;
use crate::MacAddr;

/// Fixed size of the Ethernet II header, in bytes.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Ethernet II header: destination MAC, source MAC, ethertype.
#[derive(ByteStruct, Clone, Copy, Debug, PartialEq, Eq)]
#[byte_struct_be]
pub struct EthernetHeader {
    /// Destination hardware address.
    pub destination: MacAddr,
    /// Source hardware address.
    pub source: MacAddr,
    /// Tags the payload that follows (ARP, IPv4, or otherwise).
    pub ether_type: EtherType,
}

impl EthernetHeader {
    /// Parse a 14-byte Ethernet header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < ETHERNET_HEADER_LEN {
            return Err(ParseError::Truncated {
                needed: ETHERNET_HEADER_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self::read_bytes(&bytes[..ETHERNET_HEADER_LEN]))
    }

    /// Serialize to the wire's 14-byte representation.
    pub fn serialize(&self) -> [u8; ETHERNET_HEADER_LEN] {
        let mut out = [0_u8; ETHERNET_HEADER_LEN];
        self.write_bytes(&mut out);
        out
    }
}

crate::enum_with_unknown! {
    /// EtherType values relevant to this router; anything else is stored
    /// verbatim as `Unknown` and carried as a raw-bytes payload layer.
    pub enum EtherType(u16) {
        /// 0x0800 — IPv4.
        Ipv4 = 0x0800,
        /// 0x0806 — Address Resolution Protocol.
        Arp = 0x0806,
    }
}

impl ByteStructLen for EtherType {
    const BYTE_LEN: usize = 2;
}

impl ByteStruct for EtherType {
    fn read_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0_u8; 2];
        raw.copy_from_slice(&bytes[0..2]);
        EtherType::from(u16::from_be_bytes(raw))
    }

    fn write_bytes(&self, bytes: &mut [u8]) {
        bytes[0..2].copy_from_slice(&u16::from(*self).to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serialize_roundtrip() {
        let header = EthernetHeader {
            destination: MacAddr::BROADCAST,
            source: MacAddr::new([0x13, 0x9D, 0x10, 0xF4, 0x10, 0x54]),
            ether_type: EtherType::Arp,
        };
        let bytes = header.serialize();
        assert_eq!(
            bytes,
            [
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x13, 0x9d, 0x10, 0xf4, 0x10, 0x54, 0x08, 0x06
            ]
        );
        assert_eq!(EthernetHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn parse_truncated_errors() {
        let short = [0_u8; 10];
        assert_eq!(
            EthernetHeader::parse(&short),
            Err(ParseError::Truncated {
                needed: ETHERNET_HEADER_LEN,
                got: 10
            })
        );
    }

    #[test]
    fn unknown_ether_type_is_preserved() {
        let mut bytes = [0_u8; ETHERNET_HEADER_LEN];
        bytes[12] = 0x86;
        bytes[13] = 0xdd; // IPv6, not modeled as a named variant
        let header = EthernetHeader::parse(&bytes).unwrap();
        assert_eq!(header.ether_type, EtherType::Unknown(0x86dd));
        assert_eq!(header.serialize(), bytes);
    }
}
