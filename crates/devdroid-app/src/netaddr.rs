//! LAN address discovery
//!
//! Finds a locally-bound IPv4 address a device on the same network can reach.
//! VPNs, container runtimes, and hypervisors all register adapters that look
//! plausible but are unreachable from the device, so candidates are gathered
//! from two strategies and filtered against known virtual ranges before one
//! is picked.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

use devdroid_core::prelude::*;

/// Prefixes that never lead to a reachable host: loopback, link-local, and
/// the docker/WSL bridge-network default pool.
const EXCLUDED_PREFIXES: &[&str] = &[
    "127.", "169.254.", "172.17.", "172.18.", "172.19.", "172.20.", "172.21.", "172.22.",
    "172.23.", "172.24.", "172.25.", "172.26.", "172.27.", "172.28.", "172.29.", "172.30.",
    "172.31.",
];

/// Adapter-description keywords that mark a virtual adapter on Windows.
const VIRTUAL_ADAPTER_KEYWORDS: &[&str] = &[
    "vmware",
    "virtualbox",
    "wsl",
    "docker",
    "hyper-v",
    "vethernet",
    "virtual",
];

/// Interface-name prefixes that mark a virtual interface on Linux/macOS.
const VIRTUAL_INTERFACE_PREFIXES: &[&str] =
    &["docker", "veth", "br-", "virbr", "vmnet", "tun", "tap", "zt"];

/// Matches the IPv4 line of an `ipconfig` adapter block. The label between
/// `IPv4` and the address is locale-dependent (and may arrive mangled when
/// the console codepage isn't UTF-8), so only the `IPv4` marker and the
/// dotted quad itself are relied on.
static IPCONFIG_V4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"IPv4[^\r\n]*?(\d{1,3}(?:\.\d{1,3}){3})").expect("Invalid ipconfig pattern")
});

/// Matches one record of `ip -o -4 addr show`: index, interface name, address.
static IP_ADDR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+:\s+(\S+)\s+inet\s+(\d{1,3}(?:\.\d{1,3}){3})").expect("Invalid ip pattern")
});

/// Which discovery strategy produced an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    /// Read back from a connectionless socket associated with an external
    /// address -- the OS routing table's pick.
    DirectSocket,
    /// Parsed from the platform's adapter-listing tool.
    AdapterScan,
    /// Supplied by the user, bypassing discovery.
    Manual,
}

/// A discovered IPv4 address.
///
/// `0.0.0.0` marks total resolution failure; it must never be used to
/// configure a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAddress {
    pub addr: Ipv4Addr,
    pub source: AddressSource,
}

impl NetworkAddress {
    pub fn new(addr: Ipv4Addr, source: AddressSource) -> Self {
        Self { addr, source }
    }

    /// The resolver-failure marker.
    pub fn unspecified() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, AddressSource::DirectSocket)
    }

    pub fn is_unspecified(&self) -> bool {
        self.addr.is_unspecified()
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

/// Detect the LAN address. Never fails; total failure yields the
/// `0.0.0.0` marker and the caller must refuse to proceed on it.
pub async fn resolve(extra_excluded: &[String]) -> NetworkAddress {
    info!("Detecting LAN address...");

    let mut candidates: Vec<NetworkAddress> = Vec::new();

    // Strategy 1: let the routing table pick. Best-effort; no packet is sent.
    if let Some(addr) = probe_route() {
        push_unique(&mut candidates, addr, AddressSource::DirectSocket);
    }

    // Strategy 2: enumerate adapters and filter the virtual ones out.
    match scan_adapters().await {
        Ok(addrs) => {
            for addr in addrs {
                push_unique(&mut candidates, addr, AddressSource::AdapterScan);
            }
        }
        Err(e) => {
            // The socket probe (if it worked) still stands.
            warn!("Adapter enumeration failed: {}", e);
        }
    }

    select_address(candidates, extra_excluded)
}

/// Associate a UDP socket with a well-known external address and read back
/// the locally-bound one. Nothing is actually sent.
fn probe_route() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    match socket.local_addr().ok()? {
        SocketAddr::V4(v4) => Some(*v4.ip()),
        SocketAddr::V6(_) => None,
    }
}

/// Run the platform's adapter-listing tool and extract IPv4 addresses from
/// non-virtual adapters, in listing order.
async fn scan_adapters() -> Result<Vec<Ipv4Addr>> {
    let (program, args): (&str, &[&str]) = if cfg!(windows) {
        ("ipconfig", &["/all"])
    } else {
        ("ip", &["-o", "-4", "addr", "show"])
    };

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program)
            } else {
                Error::process_spawn(e.to_string())
            }
        })?;

    if !output.status.success() {
        return Err(Error::command_failed(program, output.status.code()));
    }

    // Lossy decode: the output may be in the console's native codepage. The
    // parsers only rely on ASCII markers and digits.
    let text = String::from_utf8_lossy(&output.stdout);
    if cfg!(windows) {
        Ok(parse_ipconfig(&text))
    } else {
        Ok(parse_ip_addr(&text))
    }
}

/// Parse `ipconfig` output: one block per adapter, blocks starting at
/// lines with no leading whitespace. Blocks describing virtual adapters
/// are skipped entirely.
fn parse_ipconfig(text: &str) -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    for block in split_adapter_blocks(text) {
        let lowered = block.to_lowercase();
        if VIRTUAL_ADAPTER_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            continue;
        }
        for caps in IPCONFIG_V4.captures_iter(&block) {
            if let Ok(addr) = caps[1].parse::<Ipv4Addr>() {
                addrs.push(addr);
            }
        }
    }
    addrs
}

/// Group `ipconfig` output into per-adapter blocks. A block begins at a
/// line whose first character is not whitespace.
fn split_adapter_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    for line in text.lines() {
        let starts_block = line
            .chars()
            .next()
            .map(|c| !c.is_whitespace())
            .unwrap_or(false);
        if starts_block || blocks.is_empty() {
            blocks.push(String::new());
        }
        if let Some(block) = blocks.last_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }
    blocks
}

/// Parse `ip -o -4 addr show` output: one interface record per line.
fn parse_ip_addr(text: &str) -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    for line in text.lines() {
        let Some(caps) = IP_ADDR_LINE.captures(line.trim_start()) else {
            continue;
        };
        let interface = &caps[1];
        if VIRTUAL_INTERFACE_PREFIXES
            .iter()
            .any(|p| interface.starts_with(p))
        {
            continue;
        }
        if let Ok(addr) = caps[2].parse::<Ipv4Addr>() {
            addrs.push(addr);
        }
    }
    addrs
}

fn push_unique(candidates: &mut Vec<NetworkAddress>, addr: Ipv4Addr, source: AddressSource) {
    if !candidates.iter().any(|c| c.addr == addr) {
        candidates.push(NetworkAddress::new(addr, source));
    }
}

fn is_excluded(addr: Ipv4Addr, extra: &[String]) -> bool {
    let value = addr.to_string();
    EXCLUDED_PREFIXES.iter().any(|p| value.starts_with(p))
        || extra.iter().any(|p| value.starts_with(p))
}

/// Pick the final address from the gathered candidates.
///
/// Candidates surviving the prefix filter are ranked with the common
/// home/office `192.168.` range first (stable otherwise, preserving
/// discovery order). An empty survivor set falls back to the raw candidate
/// list; an empty candidate list yields the `0.0.0.0` marker.
fn select_address(candidates: Vec<NetworkAddress>, extra_excluded: &[String]) -> NetworkAddress {
    let mut valid: Vec<NetworkAddress> = candidates
        .iter()
        .copied()
        .filter(|c| !is_excluded(c.addr, extra_excluded))
        .collect();

    valid.sort_by_key(|c| !c.addr.to_string().starts_with("192.168."));

    if let Some(first) = valid.first() {
        if valid.len() > 1 {
            info!("Several plausible adapter addresses found:");
            for (i, c) in valid.iter().enumerate() {
                info!("    {}. {}", i + 1, c);
            }
            info!("Picking the highest ranked: {}", first);
        }
        return *first;
    }

    if let Some(first) = candidates.first() {
        warn!(
            "No ideal physical adapter address found, falling back to the first detected: {}",
            first
        );
        return *first;
    }

    NetworkAddress::unspecified()
}
