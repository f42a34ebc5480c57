//! Single-threaded reactor loop
//!
//! One cooperative event loop multiplexes everything an agent reacts to:
//! the UDP socket, operator console lines, unsolicited device output, and
//! interrupt signals. The wait timeout is not fixed — it is derived from
//! the state of the configured operations, so an agent polls its hardware
//! twice a second while an operation runs and sits in an unbounded wait
//! when it has nothing to watch.
//!
//! The loop never dies on a recoverable error: failed receives, malformed
//! datagrams, and failed replies are logged and the loop continues. Only an
//! explicit shutdown (QUIT/EXIT command or a termination signal) ends it.

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::device::DeviceLine;
use crate::dispatch::{CommandContext, CommandRegistry, CommandStatus};
use crate::error::AgentResult;
use crate::node::{AgentNode, Inbound, ReceivedMessage};
use crate::operation::{ClientNotifier, Operation, Severity};
use crate::protocol::MessageKind;
use crate::transport::Transport;

/// Interrupt signals forwarded into the reactor.
///
/// A `Break` (SIGINT) is a recoverable interruption of the current wait,
/// not a termination request; only `Terminate` (SIGTERM) requests shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Break,
    Terminate,
}

enum Wakeup {
    Tick,
    Datagram(std::io::Result<(Bytes, SocketAddr)>),
    Console(Option<String>),
    Device(Option<DeviceLine>),
    Interrupt(Option<Interrupt>),
}

/// The agent event loop.
pub struct Reactor<T: Transport> {
    node: AgentNode<T>,
    registry: CommandRegistry,
    notifier: Arc<dyn ClientNotifier>,
    ops: Vec<Operation>,
    console: Option<mpsc::UnboundedReceiver<String>>,
    devices: Option<mpsc::UnboundedReceiver<DeviceLine>>,
    interrupts: Option<mpsc::UnboundedReceiver<Interrupt>>,
    shutdown: bool,
}

impl<T: Transport> Reactor<T> {
    pub fn new(
        node: AgentNode<T>,
        registry: CommandRegistry,
        notifier: Arc<dyn ClientNotifier>,
    ) -> Self {
        Reactor {
            node,
            registry,
            notifier,
            ops: Vec::new(),
            console: None,
            devices: None,
            interrupts: None,
            shutdown: false,
        }
    }

    /// Attach the operator console line feed.
    pub fn set_console(&mut self, console: mpsc::UnboundedReceiver<String>) {
        self.console = Some(console);
    }

    /// Attach the merged unsolicited-device-output feed.
    pub fn set_device_feed(&mut self, devices: mpsc::UnboundedReceiver<DeviceLine>) {
        self.devices = Some(devices);
    }

    /// Attach the interrupt-signal feed.
    pub fn set_interrupts(&mut self, interrupts: mpsc::UnboundedReceiver<Interrupt>) {
        self.interrupts = Some(interrupts);
    }

    pub fn add_operation(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn node(&self) -> &AgentNode<T> {
        &self.node
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Wait timeout for the next readiness wait, derived from operation
    /// state. With several operations the fastest-polling one wins; with
    /// none the wait is unbounded.
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.ops
            .iter()
            .map(|op| op.machine.state().poll_interval())
            .min()
    }

    /// Run until an explicit shutdown is requested.
    pub async fn run(&mut self) -> AgentResult<()> {
        info!(node = %self.node.id(), "reactor started");

        // Announce ourselves to the configured broker peer.
        if let Err(e) = self.node.send_ping().await {
            warn!(error = %e, "startup ping failed; continuing");
        }

        while !self.shutdown {
            match self.next_wakeup().await {
                Wakeup::Tick => self.on_tick().await,
                Wakeup::Datagram(Ok((payload, from))) => self.on_datagram(payload, from).await,
                Wakeup::Datagram(Err(e)) => {
                    warn!(error = %e, "datagram receive failed; continuing");
                }
                Wakeup::Console(Some(line)) => self.on_console_line(&line).await,
                Wakeup::Console(None) => {
                    info!("console input closed");
                    self.console = None;
                }
                Wakeup::Device(Some(line)) => {
                    // Raw passthrough: unsolicited device output goes to the
                    // operator verbatim.
                    self.notifier
                        .notify(Severity::Status, &format!("{}: {}", line.device, line.line));
                }
                Wakeup::Device(None) => {
                    info!("device feed closed");
                    self.devices = None;
                }
                Wakeup::Interrupt(Some(Interrupt::Break)) => {
                    info!("interrupt received; send QUIT to stop the agent");
                }
                Wakeup::Interrupt(Some(Interrupt::Terminate)) => {
                    info!("termination requested");
                    self.shutdown = true;
                }
                Wakeup::Interrupt(None) => self.interrupts = None,
            }
        }

        // Release sources in reverse acquisition order; the socket goes
        // last, when the node itself is dropped.
        self.devices = None;
        self.console = None;
        self.notifier.notify(Severity::Done, "agent stopped");
        info!(node = %self.node.id(), "reactor stopped");
        Ok(())
    }

    async fn next_wakeup(&mut self) -> Wakeup {
        let timeout = self.poll_timeout();
        tokio::select! {
            _ = idle_wait(timeout) => Wakeup::Tick,
            result = self.node.recv_raw() => Wakeup::Datagram(result),
            line = next_item(self.console.as_mut()) => Wakeup::Console(line),
            line = next_item(self.devices.as_mut()) => Wakeup::Device(line),
            interrupt = next_item(self.interrupts.as_mut()) => Wakeup::Interrupt(interrupt),
        }
    }

    /// The wait timed out: advance device polling on every operation.
    async fn on_tick(&mut self) {
        for op in &mut self.ops {
            op.tick().await;
        }
    }

    async fn on_datagram(&mut self, payload: Bytes, from: SocketAddr) {
        match self.node.handle_datagram(payload, from).await {
            Ok(Inbound::Handled) => {}
            Ok(Inbound::Command(received)) => self.on_message(received).await,
            Err(e) => warn!(error = %e, "inbound datagram handling failed; continuing"),
        }
    }

    /// Dispatch a well-formed inbound message. Only REQUEST and EXEC carry
    /// commands; everything else is informational and already cached.
    async fn on_message(&mut self, received: ReceivedMessage) {
        match received.message.kind {
            MessageKind::Request | MessageKind::Exec => {
                let outcome = {
                    let mut ctx = CommandContext {
                        ops: &mut self.ops,
                        shutdown: &mut self.shutdown,
                        node_id: self.node.id(),
                    };
                    self.registry.dispatch(&mut ctx, &received.message.body).await
                };

                let kind = match outcome.status {
                    CommandStatus::Done => MessageKind::Done,
                    CommandStatus::Error => MessageKind::Error,
                };
                if let Err(e) = self
                    .node
                    .send_message(&received.message.sender, kind, &outcome.reply)
                    .await
                {
                    warn!(error = %e, "command reply send failed; continuing");
                }
            }
            kind => {
                debug!(?kind, sender = %received.message.sender, "informational message recorded");
            }
        }
    }

    async fn on_console_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let outcome = {
            let mut ctx = CommandContext {
                ops: &mut self.ops,
                shutdown: &mut self.shutdown,
                node_id: self.node.id(),
            };
            self.registry.dispatch(&mut ctx, line).await
        };

        if outcome.reply.is_empty() {
            return;
        }
        let severity = match outcome.status {
            CommandStatus::Done => Severity::Done,
            CommandStatus::Error => Severity::Error,
        };
        self.notifier.notify(severity, &outcome.reply);
    }
}

/// Sleep for the reactor wait timeout; an absent timeout waits forever.
async fn idle_wait(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Await the next item on an optional channel; a detached channel never
/// becomes ready.
async fn next_item<M>(rx: Option<&mut mpsc::UnboundedReceiver<M>>) -> Option<M> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
