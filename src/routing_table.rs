//! The forwarding table: IPv4 networks mapped to a next hop and an
//! outgoing interface, selected by longest-prefix match.
//!
//! No dynamic routing protocol maintains this table (`spec.md` §7
//! Non-goals) — it is seeded once from a file at startup.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::{Ipv4Addr, Ipv4Network};

/// The metric assigned to an entry whose seed line omits one.
pub const DEFAULT_METRIC: u32 = 100;

/// One forwarding entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingTableEntry {
    /// The destination network.
    pub network: Ipv4Network,
    /// The next-hop address to ARP-resolve and forward toward.
    pub next_hop: Ipv4Addr,
    /// Preference among otherwise-equal matches; lower is not inherently
    /// better here — see `find_network` for the tie-break this router
    /// actually applies.
    pub metric: u32,
}

/// The forwarding table proper: networks paired with their outgoing
/// interface name.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    entries: Vec<(RoutingTableEntry, String)>,
}

impl RoutingTable {
    /// An empty table.
    pub fn new() -> Self {
        RoutingTable { entries: Vec::new() }
    }

    /// Add a route, suppressing it (silently) if some already-present
    /// network contains `network`'s network address *and* the current
    /// longest-prefix match for that address already resolves to
    /// `outgoing_interface` (`spec.md` §3) — a route duplicated under
    /// today's LPM, whether it's a literal re-add or a narrower host
    /// route subsumed by a broader one through the same interface, is a
    /// no-op rather than a replacement.
    pub fn add(&mut self, network: Ipv4Network, next_hop: Ipv4Addr, outgoing_interface: &str, metric: u32) {
        if let Some(existing_interface) = self.find_interface(network.network_address()) {
            if existing_interface == outgoing_interface {
                return;
            }
        }
        let entry = RoutingTableEntry {
            network,
            next_hop,
            metric,
        };
        self.entries.push((entry, outgoing_interface.to_string()));
    }

    /// Find the best-matching network for `ip`, by longest prefix; among
    /// networks of equal prefix length, the most recently added wins
    /// (`spec.md` §9 — ported verbatim from the reference implementation's
    /// `<=` comparison while scanning in insertion order).
    pub fn find_network(&self, ip: Ipv4Addr) -> Option<Ipv4Network> {
        self.best_match(ip).map(|(e, _)| e.network)
    }

    /// Find the outgoing interface for the best-matching network for `ip`.
    pub fn find_interface(&self, ip: Ipv4Addr) -> Option<&str> {
        self.best_match(ip).map(|(_, iface)| iface.as_str())
    }

    /// Find the next hop for the best-matching network for `ip`.
    pub fn find_next_hop(&self, ip: Ipv4Addr) -> Option<Ipv4Addr> {
        self.best_match(ip).map(|(e, _)| e.next_hop)
    }

    fn best_match(&self, ip: Ipv4Addr) -> Option<&(RoutingTableEntry, String)> {
        let mut best: Option<&(RoutingTableEntry, String)> = None;
        for candidate in &self.entries {
            if !candidate.0.network.contains(ip) {
                continue;
            }
            match best {
                Some(current) if candidate.0.network.prefix_len() < current.0.network.prefix_len() => {}
                _ => best = Some(candidate),
            }
        }
        best
    }

    /// Iterate over the configured networks, in table order.
    pub fn networks(&self) -> impl Iterator<Item = Ipv4Network> + '_ {
        self.entries.iter().map(|(e, _)| e.network)
    }

    /// Load a table from a seed file: one route per line, as
    /// `<network/prefix> <next-hop> <interface> <metric>`, whitespace
    /// separated. Blank lines and lines starting with `#` are skipped.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut table = RoutingTable::new();
        for (idx, line) in contents.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(ConfigError::MalformedEntry {
                    line: idx + 1,
                    text: line.to_string(),
                });
            }
            let network: Ipv4Network = fields[0]
                .parse()
                .map_err(|_| ConfigError::InvalidNetwork(fields[0].to_string()))?;
            let next_hop: Ipv4Addr = fields[1]
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(fields[1].to_string()))?;
            let metric: u32 = fields[3]
                .parse()
                .map_err(|_| ConfigError::InvalidMetric(fields[3].to_string()))?;
            table.add(network, next_hop, fields[2], metric);
        }
        Ok(table)
    }
}
