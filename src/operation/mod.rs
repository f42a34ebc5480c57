//! Long-running-operation state machine
//!
//! Every agent that drives hardware through multi-second operations
//! (exposures, mechanism moves) runs one of these machines per controlled
//! device. The machine holds no device knowledge itself: commands request
//! transitions, and the reactor's idle tick reconciles the machine against
//! what the device actually reports through a pluggable [`StatusPoller`].
//!
//! The commanded states Paused/Resuming/Aborting are sticky: the machine
//! stays in them until a poll confirms the hardware followed. In particular
//! an abort only *requests* cessation — the machine does not return to Idle
//! until a later poll reports the device idle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Poll interval while an operation is actively running.
pub const RUNNING_POLL: Duration = Duration::from_millis(500);
/// Poll interval while an operation is winding down or aborting.
pub const FINISHING_POLL: Duration = Duration::from_secs(1);
/// Poll interval while idle or paused, as a liveness backstop.
pub const IDLE_POLL: Duration = Duration::from_secs(120);

/// Duration hints longer than this enable the countdown display in
/// periodic status notifications.
pub const COUNTDOWN_HINT_THRESHOLD: Duration = Duration::from_secs(5);

/// Phase of one long-running device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// No operation in progress (initial and terminal state).
    Idle,
    /// Operation accepted, device being prepared.
    Setup,
    /// Device actively working (integrating, moving).
    Running,
    /// Suspension confirmed or requested.
    Paused,
    /// Resumption requested, waiting for the device to pick back up.
    Resuming,
    /// First finishing phase: the device is completing its action.
    Completing,
    /// Second finishing phase: results being stored and the device settled.
    Finalizing,
    /// Cessation requested, waiting for the hardware to actually stop.
    Aborting,
}

impl OperationState {
    /// Reactor wait timeout appropriate for this phase.
    pub fn poll_interval(self) -> Duration {
        match self {
            OperationState::Setup | OperationState::Running | OperationState::Resuming => {
                RUNNING_POLL
            }
            OperationState::Completing | OperationState::Finalizing | OperationState::Aborting => {
                FINISHING_POLL
            }
            OperationState::Idle | OperationState::Paused => IDLE_POLL,
        }
    }
}

/// Severity attached to client notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Status,
    Done,
    Warning,
    Error,
}

/// Console/remote notification collaborator, invoked on every state
/// transition. The notification channel is the operator's only visibility
/// into the system, so the text must always be human-readable.
pub trait ClientNotifier: Send + Sync {
    fn notify(&self, severity: Severity, text: &str);
}

/// Default notifier: routes notifications to the process log.
pub struct TracingNotifier;

impl ClientNotifier for TracingNotifier {
    fn notify(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Status => info!(target: "notify", "{text}"),
            Severity::Done => info!(target: "notify", "DONE {text}"),
            Severity::Warning => warn!(target: "notify", "{text}"),
            Severity::Error => error!(target: "notify", "{text}"),
        }
    }
}

/// What a device status query reported.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub state: OperationState,
    pub status: String,
}

/// Device status query failure
#[derive(Debug, Error, PartialEq)]
#[error("device query failed: {0}")]
pub struct DeviceQueryError(pub String);

/// Device status collaborator supplied by the device-specific agent.
#[async_trait]
pub trait StatusPoller: Send {
    /// Query the device and report the phase it is actually in.
    async fn poll_status(&mut self) -> Result<PollReport, DeviceQueryError>;
}

/// Rejected command-level transition request
#[derive(Debug, Error, PartialEq)]
#[error("cannot {request} while {from:?}")]
pub struct TransitionError {
    pub from: OperationState,
    pub request: &'static str,
}

/// One state machine plus the poller that grounds it in hardware.
pub struct Operation {
    pub machine: OperationStateMachine,
    pub poller: Box<dyn StatusPoller>,
}

impl Operation {
    pub fn new(machine: OperationStateMachine, poller: Box<dyn StatusPoller>) -> Self {
        Operation { machine, poller }
    }

    pub fn name(&self) -> &str {
        self.machine.name()
    }

    /// Advance device polling on a reactor idle tick.
    pub async fn tick(&mut self) {
        self.machine.on_idle_tick(self.poller.as_mut()).await;
    }
}

/// Generic long-running-operation sequencer.
pub struct OperationStateMachine {
    name: String,
    state: OperationState,
    started: Option<Instant>,
    hint: Option<Duration>,
    countdown: bool,
    notifier: Arc<dyn ClientNotifier>,
}

impl OperationStateMachine {
    pub fn new(name: &str, notifier: Arc<dyn ClientNotifier>) -> Self {
        OperationStateMachine {
            name: name.to_string(),
            state: OperationState::Idle,
            started: None,
            hint: None,
            countdown: false,
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn countdown_enabled(&self) -> bool {
        self.countdown
    }

    /// Accept a new operation: Idle -> Setup.
    pub fn begin(&mut self, hint: Option<Duration>) -> Result<(), TransitionError> {
        if self.state != OperationState::Idle {
            return Err(TransitionError {
                from: self.state,
                request: "begin",
            });
        }
        self.started = Some(Instant::now());
        self.hint = hint;
        self.countdown = hint.is_some_and(|h| h > COUNTDOWN_HINT_THRESHOLD);
        self.set_state(OperationState::Setup, Severity::Status, "setup started");
        Ok(())
    }

    /// Request suspension: Running -> Paused.
    pub fn pause(&mut self) -> Result<(), TransitionError> {
        if self.state != OperationState::Running {
            return Err(TransitionError {
                from: self.state,
                request: "pause",
            });
        }
        self.set_state(OperationState::Paused, Severity::Status, "pause requested");
        Ok(())
    }

    /// Request resumption: Paused -> Resuming (Running follows on the next
    /// poll that sees the device working again).
    pub fn resume(&mut self) -> Result<(), TransitionError> {
        if self.state != OperationState::Paused {
            return Err(TransitionError {
                from: self.state,
                request: "resume",
            });
        }
        self.set_state(
            OperationState::Resuming,
            Severity::Status,
            "resume requested",
        );
        Ok(())
    }

    /// Request cessation: Running|Paused -> Aborting. Asynchronous by
    /// design: Idle is reached only when a later poll confirms the hardware
    /// actually stopped.
    pub fn abort(&mut self) -> Result<(), TransitionError> {
        if !matches!(
            self.state,
            OperationState::Running | OperationState::Paused
        ) {
            return Err(TransitionError {
                from: self.state,
                request: "abort",
            });
        }
        self.set_state(
            OperationState::Aborting,
            Severity::Warning,
            "abort requested",
        );
        Ok(())
    }

    /// Advance device polling when the reactor's wait timed out.
    ///
    /// A failed status query forces the machine to Idle: the agent must
    /// never keep believing an operation is in progress when the query
    /// itself failed.
    pub async fn on_idle_tick(&mut self, poller: &mut dyn StatusPoller) {
        if self.state == OperationState::Idle {
            return;
        }

        let report = match poller.poll_status().await {
            Ok(report) => report,
            Err(e) => {
                self.set_state(
                    OperationState::Idle,
                    Severity::Error,
                    &format!("status query failed, operation abandoned: {e}"),
                );
                return;
            }
        };
        self.apply_report(report);
    }

    fn apply_report(&mut self, report: PollReport) {
        use OperationState::*;

        match (self.state, report.state) {
            (Aborting, Idle) => {
                self.set_state(Idle, Severity::Done, &format!("aborted: {}", report.status));
            }
            (Aborting, _) => self.periodic(&format!("abort pending, {}", report.status)),
            // Pause was requested but the device has not stopped yet.
            (Paused, Setup) | (Paused, Running) => {
                self.periodic(&format!("pause pending, {}", report.status));
            }
            (Resuming, Running) => self.set_state(Running, Severity::Status, &report.status),
            (current, observed) if current == observed => self.periodic(&report.status),
            (_, Idle) => {
                self.set_state(Idle, Severity::Done, &format!("complete: {}", report.status));
            }
            (_, observed) => self.set_state(observed, Severity::Status, &report.status),
        }
    }

    /// Periodic (no-transition) status, with remaining time appended while
    /// the countdown display is active.
    fn periodic(&self, status: &str) {
        let text = match self.remaining() {
            Some(remaining) if self.countdown && self.state == OperationState::Running => {
                format!(
                    "{}: {} ({}s remaining)",
                    self.name,
                    status,
                    remaining.as_secs()
                )
            }
            _ => format!("{}: {}", self.name, status),
        };
        self.notifier.notify(Severity::Status, &text);
    }

    fn remaining(&self) -> Option<Duration> {
        match (self.started, self.hint) {
            (Some(started), Some(hint)) => Some(hint.saturating_sub(started.elapsed())),
            _ => None,
        }
    }

    fn set_state(&mut self, next: OperationState, severity: Severity, text: &str) {
        let prev = self.state;
        self.state = next;
        if next == OperationState::Idle {
            self.started = None;
            self.hint = None;
            self.countdown = false;
        }
        debug!(operation = %self.name, ?prev, ?next, "operation state change");
        self.notifier
            .notify(severity, &format!("{}: {}", self.name, text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{RecordingNotifier, ScriptedPoller};

    fn machine(notifier: Arc<RecordingNotifier>) -> OperationStateMachine {
        OperationStateMachine::new("CAM", notifier)
    }

    #[test]
    fn test_poll_interval_per_state() {
        assert_eq!(OperationState::Running.poll_interval(), RUNNING_POLL);
        assert_eq!(OperationState::Setup.poll_interval(), RUNNING_POLL);
        assert_eq!(OperationState::Completing.poll_interval(), FINISHING_POLL);
        assert_eq!(OperationState::Finalizing.poll_interval(), FINISHING_POLL);
        assert_eq!(OperationState::Aborting.poll_interval(), FINISHING_POLL);
        assert_eq!(OperationState::Idle.poll_interval(), IDLE_POLL);
        assert_eq!(OperationState::Paused.poll_interval(), IDLE_POLL);
    }

    #[test]
    fn test_begin_only_from_idle() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier);

        assert!(m.begin(None).is_ok());
        assert_eq!(m.state(), OperationState::Setup);

        let err = m.begin(None).unwrap_err();
        assert_eq!(err.from, OperationState::Setup);
        assert_eq!(err.request, "begin");
    }

    #[test]
    fn test_countdown_flag_follows_duration_hint() {
        let notifier = Arc::new(RecordingNotifier::new());

        let mut short = machine(notifier.clone());
        short.begin(Some(Duration::from_secs(2))).unwrap();
        assert!(!short.countdown_enabled());

        let mut long = machine(notifier);
        long.begin(Some(Duration::from_secs(30))).unwrap();
        assert!(long.countdown_enabled());
    }

    #[test]
    fn test_pause_resume_validity() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier);

        // Pause is only legal while running.
        assert!(m.pause().is_err());
        m.begin(None).unwrap();
        assert!(m.pause().is_err());
    }

    #[tokio::test]
    async fn test_tick_follows_device_reports() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier.clone());
        let mut poller = ScriptedPoller::new()
            .report(OperationState::Running, "integrating")
            .report(OperationState::Completing, "reading out")
            .report(OperationState::Finalizing, "storing")
            .report(OperationState::Idle, "readout complete");

        m.begin(None).unwrap();
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Running);
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Completing);
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Finalizing);
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Idle);

        let events = notifier.events();
        let last = events.last().unwrap();
        assert_eq!(last.0, Severity::Done);
        assert!(last.1.contains("complete"));
    }

    #[tokio::test]
    async fn test_abort_is_asynchronous() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier);
        let mut poller = ScriptedPoller::new()
            .report(OperationState::Running, "integrating")
            .report(OperationState::Running, "still integrating")
            .report(OperationState::Idle, "shutter closed");

        m.begin(None).unwrap();
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Running);

        // Abort transitions immediately, but only to Aborting.
        m.abort().unwrap();
        assert_eq!(m.state(), OperationState::Aborting);

        // Device still winding down: no transition to Idle yet.
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Aborting);

        // Hardware confirms completion.
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Idle);
    }

    #[tokio::test]
    async fn test_poll_failure_forces_idle() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier.clone());
        let mut poller = ScriptedPoller::new()
            .report(OperationState::Running, "moving")
            .fail("serial link down");

        m.begin(None).unwrap();
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Running);

        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Idle);

        let events = notifier.events();
        let last = events.last().unwrap();
        assert_eq!(last.0, Severity::Error);
        assert!(last.1.contains("serial link down"));
    }

    #[tokio::test]
    async fn test_idle_machine_does_not_poll() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier.clone());
        let mut poller = ScriptedPoller::new().fail("must not be called");

        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Idle);
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn test_resume_waits_for_device() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut m = machine(notifier);
        let mut poller = ScriptedPoller::new()
            .report(OperationState::Running, "integrating")
            .report(OperationState::Paused, "held")
            .report(OperationState::Running, "integrating");

        m.begin(None).unwrap();
        m.on_idle_tick(&mut poller).await;
        m.pause().unwrap();
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Paused);

        m.resume().unwrap();
        assert_eq!(m.state(), OperationState::Resuming);
        m.on_idle_tick(&mut poller).await;
        assert_eq!(m.state(), OperationState::Running);
    }
}
