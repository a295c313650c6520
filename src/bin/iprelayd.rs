//! CLI entry point: wires a `Router` to real `AF_PACKET` sockets and runs
//! its capture loop.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use iprelayd::io::RawSocketIo;
use iprelayd::{Ipv4Addr, Router, RoutingTable};
use log::error;

/// A userspace IPv4 router operating at the link layer.
#[derive(Parser, Debug)]
#[command(name = "iprelayd", version, about)]
struct Cli {
    /// Path to the routing table seed file.
    #[arg(long)]
    routes: std::path::PathBuf,

    /// MTU applied to every outgoing interface, in bytes.
    #[arg(long, default_value_t = 1500)]
    mtu: u16,

    /// An attached interface and the IPv4 address the router owns on it,
    /// as `<name>=<address>`. Repeat for each attached interface.
    #[arg(long = "interface", value_parser = parse_interface, required = true)]
    interfaces: Vec<(String, Ipv4Addr)>,
}

fn parse_interface(raw: &str) -> Result<(String, Ipv4Addr), String> {
    let (name, addr) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <name>=<address>, got {raw:?}"))?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| format!("invalid IPv4 address: {addr:?}"))?;
    Ok((name.to_string(), addr))
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    let routing_table = match RoutingTable::from_file(&cli.routes) {
        Ok(table) => table,
        Err(err) => {
            error!("failed to load routing table from {:?}: {err}", cli.routes);
            return ExitCode::FAILURE;
        }
    };

    let interface_names: Vec<&str> = cli.interfaces.iter().map(|(name, _)| name.as_str()).collect();
    let io = match RawSocketIo::attach(&interface_names) {
        Ok(io) => io,
        Err(err) => {
            error!("failed to attach to interfaces {interface_names:?}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let interface_ips: HashMap<String, Ipv4Addr> = cli.interfaces.into_iter().collect();
    let router = Arc::new(Router::new(Arc::new(io), interface_ips, routing_table, cli.mtu));
    router.run();
}
