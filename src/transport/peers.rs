//! Peer address table
//!
//! Maps node identifiers to UDP endpoints. Well-known peers come from the
//! configuration at startup and have their hostnames resolved exactly once;
//! "last sender" entries are created lazily when a datagram arrives, so a
//! reply can be routed to whoever last spoke without a prior table entry.
//! Entries live for the lifetime of the process.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use crate::protocol::NodeId;

/// Resolve a host/port pair to a socket address, once.
///
/// `localhost` is special-cased to the IPv4 loopback address so agents on a
/// standalone machine never depend on name service configuration.
pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
    }

    let mut addrs = tokio::net::lookup_host((host, port)).await?;
    addrs.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no address found for {host}:{port}"),
        )
    })
}

/// One peer table entry with its cached resolved address.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerEntry {
    pub host: String,
    pub port: u16,
    pub addr: SocketAddr,
}

/// Process-lifetime table of known peers.
#[derive(Debug, Default)]
pub struct PeerTable {
    entries: HashMap<NodeId, PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a well-known peer, resolving its hostname once.
    pub async fn add_peer(&mut self, id: NodeId, host: &str, port: u16) -> io::Result<()> {
        let addr = resolve(host, port).await?;
        self.entries.insert(
            id,
            PeerEntry {
                host: host.to_string(),
                port,
                addr,
            },
        );
        Ok(())
    }

    /// Record the observed address of a sender so replies can be routed to
    /// it. Overwrites any previous entry for the same node.
    pub fn note_sender(&mut self, id: NodeId, addr: SocketAddr) {
        self.entries.insert(
            id,
            PeerEntry {
                host: addr.ip().to_string(),
                port: addr.port(),
                addr,
            },
        );
    }

    pub fn lookup(&self, id: &NodeId) -> Option<SocketAddr> {
        self.entries.get(id).map(|entry| entry.addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
