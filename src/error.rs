//! Error types for wire parsing, configuration loading, and the router engine.
//!
//! Parse errors and config errors are local and recoverable; callers that
//! hit them drop the current frame or reject the file. Lookup misses (ARP,
//! routing) are `Option`, not errors — see `spec.md` §7.

use std::path::PathBuf;

use thiserror::Error;

use crate::Ipv4Addr;

/// A frame or header could not be decoded from its bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Fewer bytes were available than the header requires.
    #[error("buffer too short: need at least {needed} bytes, got {got}")]
    Truncated {
        /// Minimum number of bytes required.
        needed: usize,
        /// Number of bytes actually available.
        got: usize,
    },

    /// The IPv4 `header_length` (IHL) field decoded to a value outside the
    /// valid range of 20 to 60 bytes.
    #[error("invalid IPv4 header length: {0} bytes")]
    InvalidHeaderLength(usize),

    /// A MAC address string could not be parsed.
    #[error("invalid MAC address: {0:?}")]
    InvalidMacAddr(String),

    /// An IPv4 address string could not be parsed.
    #[error("invalid IPv4 address: {0:?}")]
    InvalidIpv4Addr(String),
}

/// The routing-table seed file, or a CLI argument derived from the same
/// grammar, was malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The seed file could not be opened or read.
    #[error("failed to read routing table file {path:?}: {source}")]
    Io {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line did not have the four whitespace-separated fields the format
    /// requires, or was blank.
    #[error("malformed routing table entry on line {line}: {text:?}")]
    MalformedEntry {
        /// 1-based line number within the file.
        line: usize,
        /// The offending line, verbatim.
        text: String,
    },

    /// A `<CIDR>` field did not parse as an IPv4 network.
    #[error("invalid network: {0:?}")]
    InvalidNetwork(String),

    /// An address field did not parse as an IPv4 address.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// A metric field did not parse as an integer.
    #[error("invalid metric: {0:?}")]
    InvalidMetric(String),
}

/// Errors surfaced by the router engine's decision logic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// The routing table has no entry containing the given address.
    #[error("no route to host {0}")]
    NoRoute(Ipv4Addr),

    /// ARP resolution for the given address did not complete within the
    /// bounded retry budget.
    #[error("ARP resolution for {0} failed after {1} requests")]
    ArpTimeout(Ipv4Addr, u8),
}
