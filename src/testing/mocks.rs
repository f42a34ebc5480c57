//! Mock implementations for testing
//!
//! Provides a recording in-memory [`Transport`], a scriptable
//! [`StatusPoller`], and recording notifier/traffic-log collaborators so
//! the node, reactor, and state machine can be exercised without sockets
//! or hardware.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

use crate::node::TrafficLog;
use crate::operation::{
    ClientNotifier, DeviceQueryError, OperationState, PollReport, Severity, StatusPoller,
};
use crate::transport::Transport;

/// In-memory transport that records every sent frame and replays injected
/// datagrams. Clones share the same state, so a probe handle can be kept
/// after the transport is moved into a node.
#[derive(Clone)]
pub struct MockTransport {
    local: SocketAddr,
    sent: Arc<StdMutex<Vec<(SocketAddr, Vec<u8>)>>>,
    inbound_tx: mpsc::UnboundedSender<(Bytes, SocketAddr)>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<(Bytes, SocketAddr)>>>,
    fail_sends: Arc<StdMutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        MockTransport {
            local: "127.0.0.1:5000".parse().expect("static address"),
            sent: Arc::new(StdMutex::new(Vec::new())),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            fail_sends: Arc::new(StdMutex::new(false)),
        }
    }

    /// Queue an inbound datagram as if it arrived from `from`.
    pub fn inject(&self, payload: &str, from: SocketAddr) {
        self.inbound_tx
            .send((Bytes::copy_from_slice(payload.as_bytes()), from))
            .expect("mock inbound channel open");
    }

    /// Every frame sent so far, decoded as text.
    pub fn sent_frames(&self) -> Vec<(SocketAddr, String)> {
        self.sent
            .lock()
            .expect("mock lock")
            .iter()
            .map(|(addr, payload)| (*addr, String::from_utf8_lossy(payload).into_owned()))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().expect("mock lock").clear();
    }

    /// Make subsequent sends fail with a mock OS error.
    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().expect("mock lock") = fail;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    async fn send(&self, target: SocketAddr, payload: &[u8]) -> io::Result<usize> {
        if *self.fail_sends.lock().expect("mock lock") {
            return Err(io::Error::new(io::ErrorKind::Other, "mock send failure"));
        }
        if payload.is_empty() {
            return Ok(0);
        }
        self.sent
            .lock()
            .expect("mock lock")
            .push((target, payload.to_vec()));
        Ok(payload.len())
    }

    async fn recv(&self) -> io::Result<(Bytes, SocketAddr)> {
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(datagram) => Ok(datagram),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "mock inbound channel closed",
            )),
        }
    }
}

/// Status poller fed from a prepared script, falling back to a fixed state
/// once the script runs out.
pub struct ScriptedPoller {
    script: VecDeque<Result<PollReport, DeviceQueryError>>,
    fallback: OperationState,
}

impl ScriptedPoller {
    pub fn new() -> Self {
        ScriptedPoller {
            script: VecDeque::new(),
            fallback: OperationState::Idle,
        }
    }

    pub fn report(mut self, state: OperationState, status: &str) -> Self {
        self.script.push_back(Ok(PollReport {
            state,
            status: status.to_string(),
        }));
        self
    }

    pub fn fail(mut self, message: &str) -> Self {
        self.script
            .push_back(Err(DeviceQueryError(message.to_string())));
        self
    }

    /// State reported once the script is exhausted.
    pub fn then_hold(mut self, state: OperationState) -> Self {
        self.fallback = state;
        self
    }
}

impl Default for ScriptedPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusPoller for ScriptedPoller {
    async fn poll_status(&mut self) -> Result<PollReport, DeviceQueryError> {
        self.script.pop_front().unwrap_or_else(|| {
            Ok(PollReport {
                state: self.fallback,
                status: "holding".to_string(),
            })
        })
    }
}

/// Notifier that records every notification for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    events: StdMutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Severity, String)> {
        self.events.lock().expect("mock lock").clone()
    }
}

impl ClientNotifier for RecordingNotifier {
    fn notify(&self, severity: Severity, text: &str) {
        self.events
            .lock()
            .expect("mock lock")
            .push((severity, text.to_string()));
    }
}

/// Traffic log that records wire echoes with direction markers.
#[derive(Default)]
pub struct RecordingTrafficLog {
    lines: StdMutex<Vec<String>>,
}

impl RecordingTrafficLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("mock lock").clone()
    }
}

impl TrafficLog for RecordingTrafficLog {
    fn outbound(&self, wire: &str) {
        self.lines
            .lock()
            .expect("mock lock")
            .push(format!(">> {wire}"));
    }

    fn inbound(&self, wire: &str) {
        self.lines
            .lock()
            .expect("mock lock")
            .push(format!("<< {wire}"));
    }
}
