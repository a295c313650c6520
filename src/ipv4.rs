//! Internet layer: IPv4 header, RFC 791.
//!
//! Variable-length (20-60 byte) header with an options tail, so unlike
//! the fixed-size Ethernet and ARP headers this one is parsed and
//! serialized by hand rather than through `byte_struct`'s derive.

use bitflags::bitflags;

use crate::error::ParseError;
use crate::{internet_checksum, Ipv4Addr};

/// Minimum (and default, absent options) IPv4 header length, in bytes.
pub const MINIMUM_HEADER_LENGTH: usize = 20;
/// Maximum IPv4 header length (15 32-bit words), in bytes.
pub const MAXIMUM_HEADER_LENGTH: usize = 60;

bitflags! {
    /// The 3-bit flags field: bit 1 is Don't Fragment, bit 0 is More Fragments.
    /// The reserved evil bit (bit 2) is never set by this router.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Ipv4Flags: u8 {
        /// Don't Fragment.
        const DONT_FRAGMENT = 0b010;
        /// More Fragments follow this one.
        const MORE_FRAGMENTS = 0b001;
    }
}

crate::enum_with_unknown! {
    /// IP protocol number carried in the IPv4 header's `protocol` field.
    pub enum Protocol(u8) {
        /// Internet Control Message Protocol.
        Icmp = 1,
        /// Transmission Control Protocol.
        Tcp = 6,
        /// User Datagram Protocol.
        Udp = 17,
    }
}

/// An IPv4 header, including its (possibly empty) options tail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Header length in bytes (20-60); serialized as IHL * 4.
    pub header_length: u8,
    /// Differentiated Services / ToS byte.
    pub dsf: u8,
    /// Header + payload length, in bytes.
    pub total_length: u16,
    /// Fragment identification, shared across all fragments of one datagram.
    pub identification: u16,
    /// Don't-Fragment / More-Fragments flags.
    pub flags: Ipv4Flags,
    /// Fragment offset in bytes (a multiple of 8); serialized as offset / 8.
    pub fragment_offset: u16,
    /// Time to live.
    pub ttl: u8,
    /// Upper-layer protocol.
    pub protocol: Protocol,
    /// Internet Checksum; recomputed whenever the header is serialized.
    pub checksum: u16,
    /// Source address.
    pub source: Ipv4Addr,
    /// Destination address.
    pub destination: Ipv4Addr,
    /// Options, `header_length - 20` bytes.
    pub options: Vec<u8>,
}

impl Ipv4Header {
    /// Build a minimal header with no options, DF set, TTL 64 — the
    /// router's own defaults when it constructs a packet from scratch
    /// (an ARP reply's IPv4 layer never exists, but an ICMP echo reply
    /// does).
    pub fn new(protocol: Protocol, source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Ipv4Header {
            header_length: MINIMUM_HEADER_LENGTH as u8,
            dsf: 0,
            total_length: MINIMUM_HEADER_LENGTH as u16,
            identification: 0,
            flags: Ipv4Flags::DONT_FRAGMENT,
            fragment_offset: 0,
            ttl: 64,
            protocol,
            checksum: 0,
            source,
            destination,
            options: Vec::new(),
        }
    }

    /// Set `total_length`, applying the "equal to the bare minimum means
    /// no payload yet" normalization from `spec.md` §3: assigning the
    /// fixed minimum header length is treated as "not yet set" and
    /// normalized to this header's actual `header_length`.
    pub fn with_total_length(mut self, value: u16) -> Self {
        self.total_length = if value as usize == MINIMUM_HEADER_LENGTH {
            self.header_length as u16
        } else {
            value
        };
        self
    }

    /// Read the header length (IHL * 4, in bytes) straight out of the raw
    /// byte 0 of an IPv4 header, without parsing the rest.
    pub fn get_header_length(header: &[u8]) -> usize {
        ((header[0] & 0x0F) as usize) * 4
    }

    /// Read the 3-bit flags field straight out of bytes 6-7.
    pub fn get_flags(header: &[u8]) -> Ipv4Flags {
        let word = u16::from_be_bytes([header[6], header[7]]);
        Ipv4Flags::from_bits_truncate(((word & 0xE000) >> 13) as u8)
    }

    /// Read the 13-bit fragment offset (in bytes) straight out of bytes 6-7.
    pub fn get_fragment_offset(header: &[u8]) -> u16 {
        let word = u16::from_be_bytes([header[6], header[7]]);
        (word & 0x1FFF) * 8
    }

    /// Parse an IPv4 header, including its options, from the front of
    /// `bytes`. `bytes` need only contain at least `header_length` bytes;
    /// any payload bytes beyond that are ignored here.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < MINIMUM_HEADER_LENGTH {
            return Err(ParseError::Truncated {
                needed: MINIMUM_HEADER_LENGTH,
                got: bytes.len(),
            });
        }
        let header_length = Self::get_header_length(bytes);
        if !(MINIMUM_HEADER_LENGTH..=MAXIMUM_HEADER_LENGTH).contains(&header_length) {
            return Err(ParseError::InvalidHeaderLength(header_length));
        }
        if bytes.len() < header_length {
            return Err(ParseError::Truncated {
                needed: header_length,
                got: bytes.len(),
            });
        }

        Ok(Ipv4Header {
            header_length: header_length as u8,
            dsf: bytes[1],
            total_length: u16::from_be_bytes([bytes[2], bytes[3]]),
            identification: u16::from_be_bytes([bytes[4], bytes[5]]),
            flags: Self::get_flags(bytes),
            fragment_offset: Self::get_fragment_offset(bytes),
            ttl: bytes[8],
            protocol: Protocol::from(bytes[9]),
            checksum: u16::from_be_bytes([bytes[10], bytes[11]]),
            source: Ipv4Addr::new([bytes[12], bytes[13], bytes[14], bytes[15]]),
            destination: Ipv4Addr::new([bytes[16], bytes[17], bytes[18], bytes[19]]),
            options: bytes[MINIMUM_HEADER_LENGTH..header_length].to_vec(),
        })
    }

    /// Serialize to `header_length` bytes, recomputing the checksum over
    /// the freshly-serialized header with the checksum field zeroed
    /// (`spec.md` §4.7 — IPv4 always recomputes on serialize here).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_length as usize);
        out.push((4_u8 << 4) | (self.header_length / 4));
        out.push(self.dsf);
        out.extend_from_slice(&self.total_length.to_be_bytes());
        out.extend_from_slice(&self.identification.to_be_bytes());
        let flags_and_offset = ((self.flags.bits() as u16) << 13) | (self.fragment_offset / 8);
        out.extend_from_slice(&flags_and_offset.to_be_bytes());
        out.push(self.ttl);
        out.push(u8::from(self.protocol));
        let checksum_at = out.len();
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&self.source.octets());
        out.extend_from_slice(&self.destination.octets());
        out.extend_from_slice(&self.options);

        let checksum = internet_checksum(&out);
        out[checksum_at..checksum_at + 2].copy_from_slice(&checksum.to_be_bytes());
        out
    }

    /// Byte length of the serialized header (`header_length`).
    pub fn len(&self) -> usize {
        self.header_length as usize
    }
}
