//! A frame, layered: Ethernet at the bottom, then ARP or IPv4, then
//! (for IPv4) ICMP or an opaque upper-layer payload.
//!
//! Frames are classified once on arrival into this enum tree rather than
//! kept as a flat byte slice re-parsed at every access, and built back up
//! directly from headers on the way out — there is never a round trip
//! through bytes for a packet this router constructs itself (`spec.md` §9).

use crate::arp::ArpHeader;
use crate::error::ParseError;
use crate::ethernet::{EtherType, EthernetHeader, ETHERNET_HEADER_LEN};
use crate::icmp::IcmpHeader;
use crate::ipv4::{Ipv4Flags, Ipv4Header, Protocol};

/// The network-layer payload of a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum L3 {
    /// An ARP request or reply.
    Arp(ArpHeader),
    /// An IPv4 datagram: header plus its upper-layer payload.
    Ipv4 { header: Ipv4Header, payload: L4 },
    /// Anything else — preserved verbatim, never interpreted.
    Raw(Vec<u8>),
}

/// The transport-layer payload of an IPv4 datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum L4 {
    /// An ICMP message.
    Icmp(IcmpHeader),
    /// Any other protocol, or an IPv4 fragment that isn't the first one —
    /// this router never reassembles fragments (`spec.md` §7 Non-goals),
    /// so a fragment's payload is always carried raw regardless of protocol.
    Raw(Vec<u8>),
}

impl L4 {
    fn parse(protocol: Protocol, is_fragment: bool, bytes: &[u8]) -> L4 {
        if !is_fragment && protocol == Protocol::Icmp {
            if let Ok(icmp) = IcmpHeader::parse(bytes) {
                return L4::Icmp(icmp);
            }
        }
        L4::Raw(bytes.to_vec())
    }

    /// Serialize this layer's bytes (just the ICMP message, or the raw
    /// payload as captured).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            L4::Icmp(icmp) => icmp.serialize(),
            L4::Raw(bytes) => bytes.clone(),
        }
    }

    /// Serialized byte length of this layer.
    pub fn len(&self) -> usize {
        match self {
            L4::Icmp(icmp) => icmp.len(),
            L4::Raw(bytes) => bytes.len(),
        }
    }

    /// Whether this layer serializes to zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fully classified frame: an Ethernet header and whatever it carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// The link-layer header.
    pub ethernet: EthernetHeader,
    /// Everything above the link layer.
    pub l3: L3,
}

impl Packet {
    /// Wrap an ARP message in an Ethernet header.
    pub fn new_arp(ethernet: EthernetHeader, arp: ArpHeader) -> Self {
        Packet {
            ethernet,
            l3: L3::Arp(arp),
        }
    }

    /// Wrap an IPv4 datagram in an Ethernet header.
    pub fn new_ipv4(ethernet: EthernetHeader, header: Ipv4Header, payload: L4) -> Self {
        Packet {
            ethernet,
            l3: L3::Ipv4 { header, payload },
        }
    }

    /// Classify a captured frame: Ethernet header, then ARP or IPv4 by
    /// `ether_type`, then (for an unfragmented IPv4 datagram) ICMP or raw
    /// by `protocol`. Unrecognized ether types and fragments are carried
    /// as raw bytes rather than rejected — `spec.md` §5 parse-never-fails
    /// policy at this boundary.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let ethernet = EthernetHeader::parse(bytes)?;
        let rest = &bytes[ETHERNET_HEADER_LEN..];

        let l3 = match ethernet.ether_type {
            EtherType::Arp => L3::Arp(ArpHeader::parse(rest)?),
            EtherType::Ipv4 => {
                let header = Ipv4Header::parse(rest)?;
                let header_length = header.len();
                let total_length = header.total_length as usize;
                let end = total_length.max(header_length).min(rest.len());
                let payload_bytes = &rest[header_length..end];

                let is_fragment =
                    header.flags.contains(Ipv4Flags::MORE_FRAGMENTS) || header.fragment_offset != 0;
                let payload = L4::parse(header.protocol, is_fragment, payload_bytes);
                L3::Ipv4 { header, payload }
            }
            EtherType::Unknown(_) => L3::Raw(rest.to_vec()),
        };

        Ok(Packet { ethernet, l3 })
    }

    /// Serialize the full frame back to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.ethernet.serialize());
        match &self.l3 {
            L3::Arp(arp) => out.extend_from_slice(&arp.serialize()),
            L3::Ipv4 { header, payload } => {
                out.extend_from_slice(&header.serialize());
                out.extend_from_slice(&payload.to_bytes());
            }
            L3::Raw(bytes) => out.extend_from_slice(bytes),
        }
        out
    }

    /// Total serialized length, in bytes.
    pub fn len(&self) -> usize {
        ETHERNET_HEADER_LEN
            + match &self.l3 {
                L3::Arp(arp) => arp.serialize().len(),
                L3::Ipv4 { header, payload } => header.len() + payload.len(),
                L3::Raw(bytes) => bytes.len(),
            }
    }

    /// Whether this packet's ARP layer, if any, is this variant.
    pub fn as_arp(&self) -> Option<&ArpHeader> {
        match &self.l3 {
            L3::Arp(arp) => Some(arp),
            _ => None,
        }
    }

    /// The IPv4 header and payload, if this is an IPv4 frame.
    pub fn as_ipv4(&self) -> Option<(&Ipv4Header, &L4)> {
        match &self.l3 {
            L3::Ipv4 { header, payload } => Some((header, payload)),
            _ => None,
        }
    }

    /// The ICMP message carried in this frame's IPv4 payload, if any.
    pub fn as_icmp(&self) -> Option<&IcmpHeader> {
        match &self.l3 {
            L3::Ipv4 {
                payload: L4::Icmp(icmp),
                ..
            } => Some(icmp),
            _ => None,
        }
    }
}
