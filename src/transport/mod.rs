//! Transport layer for agent communication
//!
//! This module provides the datagram transport abstraction and its UDP
//! implementation, plus the peer table that maps node identifiers to
//! resolved socket addresses.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;

pub mod peers;
pub mod udp;

pub use peers::{resolve, PeerEntry, PeerTable};
pub use udp::{UdpTransport, RECV_BUFFER_LEN};

/// Datagram transport trait
///
/// Abstraction over the UDP socket so [`crate::node::AgentNode`] and
/// [`crate::reactor::Reactor`] can be exercised against a mock in tests.
/// Sends are fire-and-forget; receives are expected to be awaited only from
/// the reactor's readiness wait.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Address actually bound, so an ephemeral port can be advertised.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Send one datagram. An empty payload short-circuits to `Ok(0)`.
    async fn send(&self, target: SocketAddr, payload: &[u8]) -> io::Result<usize>;

    /// Receive one datagram together with its sender address.
    async fn recv(&self) -> io::Result<(Bytes, SocketAddr)>;
}
