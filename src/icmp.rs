//! ICMP Echo Request/Reply, RFC 792.
//!
//! Only the Echo message kind is modeled — the router only ever needs to
//! answer pings addressed to itself, never to originate or relay any other
//! ICMP type.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ParseError;
use crate::internet_checksum;

/// Fixed size of the ICMP Echo header, before the variable-length `data` tail.
pub const ICMP_HEADER_LEN: usize = 16;

static NEXT_IDENTIFIER: AtomicU16 = AtomicU16::new(0);

/// Draw the next value of the process-wide cycling ICMP identifier,
/// wrapping modulo 2^16 (`spec.md` §3, §9).
pub fn next_identifier() -> u16 {
    NEXT_IDENTIFIER.fetch_add(1, Ordering::Relaxed)
}

/// Seconds since the Unix epoch, packed little-endian as `spec.md` §3
/// requires for newly emitted messages.
pub fn timestamp_now() -> [u8; 8] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    secs.to_le_bytes()
}

crate::enum_with_unknown! {
    /// ICMP message type. Only echo request/reply are meaningful here.
    pub enum IcmpType(u8) {
        /// Echo reply.
        EchoReply = 0,
        /// Echo request.
        EchoRequest = 8,
    }
}

/// An ICMP Echo message: fixed 16-byte header plus an opaque data tail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IcmpHeader {
    /// Echo request (8) or reply (0).
    pub icmp_type: IcmpType,
    /// Always 0 for echo.
    pub code: u8,
    /// Internet Checksum over the full message; recomputed on serialize.
    pub checksum: u16,
    /// Identifier, used to match replies to requests.
    pub identifier: u16,
    /// Sequence number.
    pub sequence_number: u16,
    /// Raw 8-byte timestamp, carried verbatim — interpreting it is the
    /// sender/receiver's business, not the router's.
    pub timestamp: [u8; 8],
    /// Opaque echoed payload.
    pub data: Vec<u8>,
}

impl IcmpHeader {
    /// Build a new Echo Request with the next cycling identifier, sequence
    /// number 1, and the current time as its timestamp.
    pub fn new_echo_request(data: Vec<u8>) -> Self {
        IcmpHeader {
            icmp_type: IcmpType::EchoRequest,
            code: 0,
            checksum: 0,
            identifier: next_identifier(),
            sequence_number: 1,
            timestamp: timestamp_now(),
            data,
        }
    }

    /// Parse an ICMP Echo message: 16-byte fixed header plus whatever
    /// bytes remain as `data`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < ICMP_HEADER_LEN {
            return Err(ParseError::Truncated {
                needed: ICMP_HEADER_LEN,
                got: bytes.len(),
            });
        }
        let mut timestamp = [0_u8; 8];
        timestamp.copy_from_slice(&bytes[8..16]);
        Ok(IcmpHeader {
            icmp_type: IcmpType::from(bytes[0]),
            code: bytes[1],
            checksum: u16::from_be_bytes([bytes[2], bytes[3]]),
            identifier: u16::from_be_bytes([bytes[4], bytes[5]]),
            sequence_number: u16::from_be_bytes([bytes[6], bytes[7]]),
            timestamp,
            data: bytes[ICMP_HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize to `16 + data.len()` bytes, recomputing the checksum over
    /// the full message with the checksum field zeroed.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ICMP_HEADER_LEN + self.data.len());
        out.push(u8::from(self.icmp_type));
        out.push(self.code);
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&self.identifier.to_be_bytes());
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.timestamp);
        out.extend_from_slice(&self.data);

        let checksum = internet_checksum(&out);
        out[2..4].copy_from_slice(&checksum.to_be_bytes());
        out
    }

    /// Byte length of the serialized message.
    pub fn len(&self) -> usize {
        ICMP_HEADER_LEN + self.data.len()
    }

    /// Whether this message carries no payload beyond the fixed header.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Build the Echo Reply for this Echo Request: same identifier,
    /// sequence number, timestamp, and data, with `icmp_type` flipped to
    /// `EchoReply` (`spec.md` §4.5).
    pub fn build_reply(&self) -> IcmpHeader {
        IcmpHeader {
            icmp_type: IcmpType::EchoReply,
            ..self.clone()
        }
    }
}
