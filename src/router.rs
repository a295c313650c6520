//! The router engine: ties the wire codecs, the ARP cache, and the
//! forwarding table together into the actual forward/answer/fragment
//! decisions (`spec.md` §4, §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::arp::{ArpHeader, ArpOperation};
use crate::arp_table::{ArpEntryKind, ArpTable};
use crate::error::RouterError;
use crate::ethernet::{EtherType, EthernetHeader};
use crate::icmp::IcmpHeader;
use crate::io::{FrameIo, InboundFrame};
use crate::ipv4::{Ipv4Flags, Ipv4Header, Protocol};
use crate::packet::{L3, L4, Packet};
use crate::routing_table::{RoutingTable, DEFAULT_METRIC};
use crate::{Ipv4Addr, Ipv4Network, MacAddr};

/// How many ARP requests the router sends for one unresolved address
/// before giving up on the packet that needed it (`spec.md` §4.3).
pub const MAXIMUM_ARP_REQUESTS: u8 = 5;

/// How long to wait for an ARP reply between retries.
const ARP_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Per-interface configuration the router was started with: its own
/// address and hardware address.
#[derive(Clone, Copy, Debug)]
struct InterfaceConfig {
    ip: Ipv4Addr,
    mac: MacAddr,
}

/// The router engine. Owns the shared ARP cache and routing table, and
/// dispatches one worker thread per inbound frame (`spec.md` §5).
pub struct Router {
    io: Arc<dyn FrameIo>,
    interfaces: HashMap<String, InterfaceConfig>,
    arp_table: Mutex<ArpTable>,
    routing_table: Mutex<RoutingTable>,
    mtu: u16,
}

impl Router {
    /// Build a router attached to `io`, owning the given interfaces (name
    /// to its own IPv4 address), forwarding per `routing_table`, and
    /// fragmenting any outgoing IPv4 payload larger than `mtu` bytes.
    pub fn new(
        io: Arc<dyn FrameIo>,
        interface_ips: HashMap<String, Ipv4Addr>,
        routing_table: RoutingTable,
        mtu: u16,
    ) -> Self {
        let interfaces = interface_ips
            .into_iter()
            .map(|(name, ip)| {
                let mac = io.mac_address(&name).unwrap_or(MacAddr::UNSPECIFIED);
                (name, InterfaceConfig { ip, mac })
            })
            .collect();
        Router {
            io,
            interfaces,
            arp_table: Mutex::new(ArpTable::new()),
            routing_table: Mutex::new(routing_table),
            mtu,
        }
    }

    /// Seed a static ARP binding, e.g. from startup configuration.
    pub fn add_static_arp_entry(&self, ip: Ipv4Addr, mac: MacAddr) {
        self.arp_table.lock().add(ip, mac, ArpEntryKind::Static);
    }

    /// This router's own IPv4 address on `interface`, if it owns one.
    pub fn own_address(&self, interface: &str) -> Option<Ipv4Addr> {
        self.interfaces.get(interface).map(|c| c.ip)
    }

    /// Run the capture loop forever: block for the next frame, then hand
    /// it to a freshly spawned worker thread so that one slow ARP
    /// resolution never stalls capture on other interfaces.
    pub fn run(self: Arc<Self>) -> ! {
        loop {
            match self.io.recv() {
                Ok(frame) => {
                    let router = Arc::clone(&self);
                    thread::spawn(move || router.handle_frame(frame));
                }
                Err(err) => warn!("frame capture failed: {err}"),
            }
        }
    }

    /// Classify and act on one captured frame. `run` calls this on a
    /// freshly spawned thread per frame; exposed directly so a custom
    /// capture loop (or a test) can drive the router one frame at a time.
    pub fn dispatch(&self, inbound: InboundFrame) {
        self.handle_frame(inbound);
    }

    fn handle_frame(&self, inbound: InboundFrame) {
        let packet = match Packet::parse(&inbound.bytes) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("dropping unparseable frame on {}: {err}", inbound.interface);
                return;
            }
        };

        match packet.l3 {
            L3::Arp(arp) => {
                // spec.md §4.4 step 2: only a request/reply addressed to
                // this interface's own IP is handled; anything else is
                // dropped before it ever touches the shared tables.
                let targets_us = self
                    .interfaces
                    .get(&inbound.interface)
                    .is_some_and(|config| config.ip == arp.target_protocol);
                if targets_us {
                    self.handle_arp(&inbound.interface, packet.ethernet, arp);
                }
            }
            L3::Ipv4 { header, payload } => {
                // spec.md §4.4 step 1: a frame whose IP source is one of
                // our own addresses is our own transmission looped back by
                // the capture path, not a new arrival.
                let self_originated = self.interfaces.values().any(|config| config.ip == header.source);
                if self_originated {
                    debug!("dropping self-originated frame looped back on {}", inbound.interface);
                    return;
                }
                self.handle_ipv4(&inbound.interface, packet.ethernet, header, payload)
            }
            L3::Raw(_) => debug!("dropping frame of unhandled ethertype on {}", inbound.interface),
        }
    }

    fn handle_arp(&self, interface: &str, ethernet: EthernetHeader, arp: ArpHeader) {
        self.arp_table
            .lock()
            .add(arp.sender_protocol, arp.sender_hardware, ArpEntryKind::Dynamic);

        // spec.md §4.4: every observed ARP sender earns a /32 host route
        // through the interface it was heard on, so a reply can later be
        // routed straight back without a broader route existing yet.
        let next_hop = self.get_next_hop_for_learned_route(arp.sender_protocol);
        self.routing_table.lock().add(
            Ipv4Network::new(arp.sender_protocol, 32),
            next_hop,
            interface,
            DEFAULT_METRIC,
        );

        let Some(config) = self.interfaces.get(interface) else {
            return;
        };
        if arp.opcode != ArpOperation::Request {
            return;
        }

        let reply = ArpHeader::new(
            ArpOperation::Reply,
            config.mac,
            config.ip,
            arp.sender_hardware,
            arp.sender_protocol,
        );
        let reply_ethernet = EthernetHeader {
            destination: ethernet.source,
            source: config.mac,
            ether_type: EtherType::Arp,
        };
        self.transmit(interface, &Packet::new_arp(reply_ethernet, reply).to_bytes());
    }

    /// The next hop recorded for a freshly learned /32 host route: the
    /// first address already present in both the ARP table and the
    /// most-specific routing network containing `ip`, or `ip` itself when
    /// no such address exists (`spec.md` §4.4, §9 — the source leaves this
    /// underspecified; recording the sender's own address is the
    /// observable-behavior-preserving choice this crate makes).
    fn get_next_hop_for_learned_route(&self, ip: Ipv4Addr) -> Ipv4Addr {
        let network = self.routing_table.lock().find_network(ip);
        if let Some(network) = network {
            let arp_table = self.arp_table.lock();
            if let Some(entry) = arp_table.entries().find(|e| network.contains(e.ip)) {
                return entry.ip;
            }
        }
        ip
    }

    fn handle_ipv4(&self, interface: &str, ethernet: EthernetHeader, header: Ipv4Header, payload: L4) {
        self.arp_table
            .lock()
            .add(header.source, ethernet.source, ArpEntryKind::Dynamic);

        let addressed_to_us = self
            .interfaces
            .values()
            .any(|config| config.ip == header.destination);

        if addressed_to_us {
            if let L4::Icmp(request) = payload {
                if request.icmp_type == crate::IcmpType::EchoRequest {
                    self.reply_to_echo(interface, &ethernet, &header, &request);
                }
            }
            return;
        }

        // spec.md §4.4 step 4 / original_source router.py::handle_ipv4: forward
        // only when the destination falls outside the network that best
        // matches the source (else source and destination are on the same
        // routed segment and can reach each other without us) and the
        // frame didn't originate from one of our own interfaces.
        let destination_in_source_network = {
            let table = self.routing_table.lock();
            table
                .find_network(header.source)
                .is_some_and(|network| network.contains(header.destination))
        };
        let from_ourselves = self.interfaces.values().any(|config| config.mac == ethernet.source);
        if destination_in_source_network || from_ourselves {
            debug!(
                "not forwarding {} -> {} (same-network or self-originated loop guard)",
                header.source, header.destination
            );
            return;
        }

        if let Err(err) = self.forward_ipv4(&header, &payload) {
            debug!("not forwarding datagram from {}: {err}", header.source);
        }
    }

    /// Sent back out `interface` (the wire the request arrived on), but
    /// the reply's own IPv4 source and Ethernet source MAC are drawn from
    /// whichever interface owns `header.destination` — ordinarily the
    /// same interface, but not necessarily if the request arrived on a
    /// different one (`spec.md` §4.5).
    fn reply_to_echo(&self, interface: &str, ethernet: &EthernetHeader, header: &Ipv4Header, request: &IcmpHeader) {
        let Some(owner) = self.interfaces.values().find(|config| config.ip == header.destination) else {
            return;
        };
        let reply_icmp = request.build_reply();
        let reply_header = Ipv4Header::new(Protocol::Icmp, owner.ip, header.source)
            .with_total_length(20 + reply_icmp.len() as u16);
        let reply_ethernet = EthernetHeader {
            destination: ethernet.source,
            source: owner.mac,
            ether_type: EtherType::Ipv4,
        };
        let reply = Packet::new_ipv4(reply_ethernet, reply_header, L4::Icmp(reply_icmp));
        self.transmit(interface, &reply.to_bytes());
    }

    /// Decide where `header`/`payload` should go next and send it there,
    /// decrementing TTL and fragmenting if the outgoing link's MTU
    /// requires it (`spec.md` §4.4).
    fn forward_ipv4(&self, header: &Ipv4Header, payload: &L4) -> Result<(), RouterError> {
        let outgoing_interface = {
            let table = self.routing_table.lock();
            table
                .find_interface(header.destination)
                .map(str::to_string)
                .ok_or(RouterError::NoRoute(header.destination))?
        };
        let out_config = *self
            .interfaces
            .get(&outgoing_interface)
            .ok_or(RouterError::NoRoute(header.destination))?;

        // ARP-resolve the datagram's own destination, not the route's
        // next hop (`original_source/router/router.py::forward_ipv4` keys
        // its ARP-table lookup off `ip_header.destination` directly).
        let destination_mac = self.resolve(&outgoing_interface, out_config, header.destination)?;

        let mut forwarded_header = header.clone();
        forwarded_header.ttl = header.ttl.saturating_sub(1);

        let ethernet = EthernetHeader {
            destination: destination_mac,
            source: out_config.mac,
            ether_type: EtherType::Ipv4,
        };

        self.send_ipv4(&outgoing_interface, ethernet, forwarded_header, payload.clone());
        Ok(())
    }

    /// Resolve `ip`'s hardware address, sending up to
    /// `MAXIMUM_ARP_REQUESTS` ARP requests on `interface` and waiting
    /// between each for the reply to land in the shared ARP table.
    fn resolve(&self, interface: &str, via: InterfaceConfig, ip: Ipv4Addr) -> Result<MacAddr, RouterError> {
        if let Some(mac) = self.arp_table.lock().lookup(ip) {
            return Ok(mac);
        }

        for attempt in 1..=MAXIMUM_ARP_REQUESTS {
            let request = ArpHeader::new(
                ArpOperation::Request,
                via.mac,
                via.ip,
                MacAddr::UNSPECIFIED,
                ip,
            );
            let ethernet = EthernetHeader {
                destination: MacAddr::BROADCAST,
                source: via.mac,
                ether_type: EtherType::Arp,
            };
            self.transmit(interface, &Packet::new_arp(ethernet, request).to_bytes());
            thread::sleep(ARP_RETRY_INTERVAL);

            if let Some(mac) = self.arp_table.lock().lookup(ip) {
                return Ok(mac);
            }
            debug!("ARP request {attempt}/{MAXIMUM_ARP_REQUESTS} for {ip} unanswered");
        }

        Err(RouterError::ArpTimeout(ip, MAXIMUM_ARP_REQUESTS))
    }

    /// Send an IPv4 datagram, splitting it into fragments if it would
    /// exceed `self.mtu` and the Don't Fragment flag is not set
    /// (`spec.md` §4.4).
    fn send_ipv4(&self, interface: &str, ethernet: EthernetHeader, header: Ipv4Header, payload: L4) {
        let total_len = header.len() + payload.len();
        if total_len <= self.mtu as usize {
            let packet = Packet::new_ipv4(ethernet, header, payload);
            self.transmit(interface, &packet.to_bytes());
            return;
        }

        if header.flags.contains(Ipv4Flags::DONT_FRAGMENT) {
            debug!(
                "dropping oversize datagram to {} (DF set, {} > mtu {})",
                header.destination, total_len, self.mtu
            );
            return;
        }

        for (fragment, chunk) in self.fragment_packet(&header, &payload.to_bytes()) {
            let frame = Packet::new_ipv4(ethernet, fragment, L4::Raw(chunk));
            self.transmit(interface, &frame.to_bytes());
        }
    }

    /// Split `header` + `payload` into IPv4 fragments no larger than
    /// `self.mtu`, each paired with its own slice of `payload`, with
    /// `fragment_offset` and `MORE_FRAGMENTS` set appropriately.
    ///
    /// The per-fragment payload length is rounded down to a multiple of
    /// 8 bytes, as `fragment_offset` is itself measured in 8-byte units.
    /// `end = min(start + payload_mtu, payload.len())` — bounded by the
    /// payload's own length, not the whole datagram's.
    fn fragment_packet(&self, header: &Ipv4Header, payload: &[u8]) -> Vec<(Ipv4Header, Vec<u8>)> {
        let payload_mtu = ((self.mtu as usize - header.len()) / 8) * 8;
        let mut fragments = Vec::new();
        let mut start = 0;
        while start < payload.len() {
            let end = (start + payload_mtu).min(payload.len());
            let mut fragment = header.clone();
            fragment.fragment_offset = start as u16;
            fragment.flags = if end < payload.len() {
                Ipv4Flags::MORE_FRAGMENTS
            } else {
                Ipv4Flags::empty()
            };
            fragment = fragment.with_total_length((header.len() + (end - start)) as u16);
            fragments.push((fragment, payload[start..end].to_vec()));
            start = end;
        }
        fragments
    }

    fn transmit(&self, interface: &str, frame: &[u8]) {
        if let Err(err) = self.io.send(interface, frame) {
            warn!("failed to send frame on {interface}: {err}");
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        info!("router shutting down");
    }
}
