//! Protocol endpoint: identity, peer routing, and the liveness convention
//!
//! [`AgentNode`] ties together the agent's identity, its transport socket,
//! the codec, and the peer table. It exposes the send/receive primitives the
//! reactor drives and keeps the *most recent* message per socket — each new
//! datagram replaces the cache, there is no queue.
//!
//! The only body content interpreted at this layer is the liveness
//! convention: an inbound body of exactly `"PING"` is answered with `"PONG"`
//! regardless of message kind. Everything else is handed back to the caller
//! for command dispatch.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AgentError, AgentResult};
use crate::protocol::{Message, MessageKind, NodeId};
use crate::transport::{PeerTable, Transport};

/// Traffic-log collaborator. Every encoded message that leaves or enters
/// the node is echoed here, even when the transport send later fails —
/// outbound traffic echoing is an observable side effect in its own right.
pub trait TrafficLog: Send + Sync {
    fn outbound(&self, wire: &str);
    fn inbound(&self, wire: &str);
}

/// Default traffic log: routes wire echoes to the process log.
pub struct TracingTrafficLog;

impl TrafficLog for TracingTrafficLog {
    fn outbound(&self, wire: &str) {
        info!(target: "traffic", ">> {wire}");
    }

    fn inbound(&self, wire: &str) {
        info!(target: "traffic", "<< {wire}");
    }
}

/// One received datagram, parsed. Invalid datagrams keep their raw text for
/// diagnostics with the parsed fields reset.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: Message,
    pub valid: bool,
    pub raw: String,
    pub from: SocketAddr,
    pub received_at: DateTime<Utc>,
}

/// What became of one inbound datagram.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Fully handled at this layer (liveness reply or invalid datagram);
    /// only the message cache was updated.
    Handled,
    /// A well-formed message for the command dispatcher.
    Command(ReceivedMessage),
}

/// Protocol endpoint bound to one UDP socket.
pub struct AgentNode<T: Transport> {
    id: NodeId,
    broker: NodeId,
    transport: T,
    peers: PeerTable,
    last: Option<ReceivedMessage>,
    traffic: Arc<dyn TrafficLog>,
}

impl<T: Transport> AgentNode<T> {
    pub fn new(
        id: NodeId,
        broker: NodeId,
        transport: T,
        peers: PeerTable,
        traffic: Arc<dyn TrafficLog>,
    ) -> Self {
        AgentNode {
            id,
            broker,
            transport,
            peers,
            last: None,
            traffic,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn broker(&self) -> &NodeId {
        &self.broker
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The most recent message received on this socket, if any.
    pub fn last_message(&self) -> Option<&ReceivedMessage> {
        self.last.as_ref()
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    pub fn peers_mut(&mut self) -> &mut PeerTable {
        &mut self.peers
    }

    /// Send an implicit-REQUEST message.
    pub async fn send_to(&mut self, recipient: &str, body: &str) -> AgentResult<usize> {
        self.send_message(recipient, MessageKind::Request, body).await
    }

    /// Encode and send one message.
    ///
    /// An empty recipient or empty body is a success no-op (0 bytes, no
    /// traffic echo), so conditional senders need no guards. An
    /// unresolvable recipient is likewise a no-op, but the outbound echo
    /// still fires: the message existed even if nowhere to route it.
    pub async fn send_message(
        &mut self,
        recipient: &str,
        kind: MessageKind,
        body: &str,
    ) -> AgentResult<usize> {
        if recipient.is_empty() || body.is_empty() {
            return Ok(0);
        }

        let wire = Message::new(self.id.as_str(), recipient, kind, body).encode()?;
        self.traffic.outbound(wire.trim_end_matches('\r'));

        let Some(target) = self.lookup_recipient(recipient) else {
            debug!(%recipient, "no route to recipient; send skipped");
            return Ok(0);
        };

        self.transport
            .send(target, wire.as_bytes())
            .await
            .map_err(AgentError::Transport)
    }

    /// Startup liveness probe to the configured broker peer.
    pub async fn send_ping(&mut self) -> AgentResult<usize> {
        let broker = self.broker.as_str().to_string();
        self.send_to(&broker, "PING").await
    }

    /// Await the next datagram (the reactor's readiness source).
    pub async fn recv_raw(&self) -> io::Result<(Bytes, SocketAddr)> {
        self.transport.recv().await
    }

    /// Receive and process one datagram.
    pub async fn on_datagram_ready(&mut self) -> AgentResult<Inbound> {
        let (payload, from) = self.recv_raw().await.map_err(AgentError::Transport)?;
        self.handle_datagram(payload, from).await
    }

    /// Decode one datagram, update the message cache and the last-sender
    /// peer entry, and answer the liveness convention.
    pub async fn handle_datagram(
        &mut self,
        payload: Bytes,
        from: SocketAddr,
    ) -> AgentResult<Inbound> {
        let raw = String::from_utf8_lossy(&payload).into_owned();
        self.traffic.inbound(raw.trim_end_matches(['\r', '\n']));

        let decoded = Message::decode(&raw);
        let received = ReceivedMessage {
            message: decoded.message,
            valid: decoded.valid,
            raw,
            from,
            received_at: Utc::now(),
        };

        // The cache is updated even for junk so the operator can inspect
        // what actually arrived.
        self.last = Some(received.clone());

        if !received.valid {
            warn!(%from, raw = %received.raw.trim_end(), "invalid datagram received");
            return Ok(Inbound::Handled);
        }

        match NodeId::new(&received.message.sender) {
            Ok(sender) => self.peers.note_sender(sender, from),
            Err(e) => debug!(sender = %received.message.sender, error = %e, "sender not recorded"),
        }

        if received.message.body == "PING" {
            let sender = received.message.sender.clone();
            self.send_message(&sender, MessageKind::Request, "PONG")
                .await?;
            return Ok(Inbound::Handled);
        }

        Ok(Inbound::Command(received))
    }

    /// Rare synchronous exchange: send a request and perform a dedicated
    /// bounded wait for a reply from that peer. Other traffic arriving
    /// during the wait still refreshes the cache and the liveness reply.
    pub async fn send_and_wait(
        &mut self,
        recipient: &str,
        body: &str,
        wait: Duration,
    ) -> AgentResult<ReceivedMessage> {
        self.send_to(recipient, body).await?;

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let Some(remaining) =
                deadline.checked_duration_since(tokio::time::Instant::now())
            else {
                return Err(AgentError::ReplyTimeout {
                    peer: recipient.to_string(),
                    waited_ms: wait.as_millis() as u64,
                });
            };

            let datagram = tokio::time::timeout(remaining, self.transport.recv()).await;
            let received = match datagram {
                Err(_) => {
                    return Err(AgentError::ReplyTimeout {
                        peer: recipient.to_string(),
                        waited_ms: wait.as_millis() as u64,
                    })
                }
                Ok(Err(e)) => return Err(AgentError::Transport(e)),
                Ok(Ok((payload, from))) => self.handle_datagram(payload, from).await?,
            };

            if let Inbound::Command(reply) = received {
                if reply.message.sender.eq_ignore_ascii_case(recipient) {
                    return Ok(reply);
                }
            }
        }
    }

    fn lookup_recipient(&self, recipient: &str) -> Option<SocketAddr> {
        let id = NodeId::new(recipient).ok()?;
        self.peers.lookup(&id)
    }
}
