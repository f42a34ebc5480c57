//! UDP socket transport
//!
//! One socket per agent process. Binding to port 0 requests an OS-assigned
//! ephemeral port; the bound address is read back so the agent can advertise
//! it. A bind failure is fatal to startup by design — the operator must see
//! and resolve a port conflict, so there is no silent retry on another port.

use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::warn;

use super::Transport;

/// Fixed receive buffer size, sized for the short command/status messages
/// the protocol carries. A datagram that fills the buffer completely may
/// have been truncated by the OS; it is delivered anyway with a warning.
pub const RECV_BUFFER_LEN: usize = 2048;

/// UDP implementation of [`Transport`].
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind the agent socket. `port == 0` requests an ephemeral port.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        Ok(UdpTransport { socket })
    }
}

#[async_trait::async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send(&self, target: SocketAddr, payload: &[u8]) -> io::Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        self.socket.send_to(payload, target).await
    }

    async fn recv(&self) -> io::Result<(Bytes, SocketAddr)> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        if len == RECV_BUFFER_LEN {
            warn!(%from, "datagram filled the receive buffer; payload may be truncated");
        }
        Ok((Bytes::copy_from_slice(&buf[..len]), from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_bind_reads_back_port() {
        let transport = UdpTransport::bind(0).await.unwrap();
        let local = transport.local_addr().unwrap();
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_is_a_no_op() {
        let transport = UdpTransport::bind(0).await.unwrap();
        let target = "127.0.0.1:9".parse().unwrap();
        let sent = transport.send(target, b"").await.unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_loopback_send_and_receive() {
        let a = UdpTransport::bind(0).await.unwrap();
        let b = UdpTransport::bind(0).await.unwrap();
        let b_addr: SocketAddr = format!("127.0.0.1:{}", b.local_addr().unwrap().port())
            .parse()
            .unwrap();

        let sent = a.send(b_addr, b"IT>IS PING\r").await.unwrap();
        assert_eq!(sent, 11);

        let (payload, from) = b.recv().await.unwrap();
        assert_eq!(&payload[..], b"IT>IS PING\r");
        assert_eq!(from.port(), a.local_addr().unwrap().port());
    }
}
