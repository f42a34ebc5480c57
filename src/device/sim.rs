//! Simulated device backend
//!
//! A timer-driven stand-in for real hardware, enabled from the
//! configuration. It lets a deployment be checked out end to end — command
//! dispatch, state machine, polling cadence, notifications — with no device
//! attached. The simulator models a timed "exposure": a running phase of
//! the commanded length, then a short readout and store sequence back to
//! idle.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::dispatch::builtin::{parse_target_and_seconds, select_op};
use crate::dispatch::{
    CommandContext, CommandHandler, CommandOutcome, CommandRegistry, DispatchError,
};
use crate::operation::{DeviceQueryError, OperationState, PollReport, StatusPoller};

/// Running time used when GO is given without a duration.
pub const DEFAULT_RUN: Duration = Duration::from_secs(10);
/// Length of the simulated readout phase.
const READOUT: Duration = Duration::from_secs(2);
/// Length of the simulated store-and-settle phase.
const SETTLE: Duration = Duration::from_secs(1);
/// Time the simulated hardware takes to honor an abort.
const ABORT_WINDDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Exposing { until: Instant },
    Paused { remaining: Duration },
    ReadingOut { until: Instant },
    Storing { until: Instant },
    Stopping { until: Instant },
}

/// Shared control handle for the simulated hardware, used by the command
/// handlers the simulator registers.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<Phase>>,
}

impl SimHandle {
    pub fn start(&self, run_for: Duration) {
        let mut phase = self.lock();
        *phase = Phase::Exposing {
            until: Instant::now() + run_for,
        };
    }

    pub fn pause(&self) {
        let mut phase = self.lock();
        if let Phase::Exposing { until } = *phase {
            *phase = Phase::Paused {
                remaining: until.saturating_duration_since(Instant::now()),
            };
        }
    }

    pub fn resume(&self) {
        let mut phase = self.lock();
        if let Phase::Paused { remaining } = *phase {
            *phase = Phase::Exposing {
                until: Instant::now() + remaining,
            };
        }
    }

    pub fn abort(&self) {
        let mut phase = self.lock();
        if matches!(*phase, Phase::Exposing { .. } | Phase::Paused { .. }) {
            *phase = Phase::Stopping {
                until: Instant::now() + ABORT_WINDDOWN,
            };
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Phase> {
        // The state is only touched from the reactor task; a poisoned lock
        // cannot occur without a panic there first.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The poller side of the simulated hardware.
pub struct SimulatedDevice {
    state: Arc<Mutex<Phase>>,
}

/// Create the simulated hardware and its control handle.
pub fn simulated_device() -> (SimulatedDevice, SimHandle) {
    let state = Arc::new(Mutex::new(Phase::Idle));
    (
        SimulatedDevice {
            state: state.clone(),
        },
        SimHandle { state },
    )
}

impl SimulatedDevice {
    /// Advance the phase timers, then report the current phase.
    fn observe(&self) -> PollReport {
        let mut phase = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();

        loop {
            *phase = match *phase {
                Phase::Exposing { until } if now >= until => Phase::ReadingOut {
                    until: now + READOUT,
                },
                Phase::ReadingOut { until } if now >= until => {
                    Phase::Storing { until: now + SETTLE }
                }
                Phase::Storing { until } if now >= until => Phase::Idle,
                Phase::Stopping { until } if now >= until => Phase::Idle,
                other => {
                    *phase = other;
                    break;
                }
            };
        }

        match *phase {
            Phase::Idle => PollReport {
                state: OperationState::Idle,
                status: "idle".to_string(),
            },
            Phase::Exposing { until } => PollReport {
                state: OperationState::Running,
                status: format!(
                    "integrating, {}s left",
                    until.saturating_duration_since(now).as_secs()
                ),
            },
            Phase::Paused { .. } => PollReport {
                state: OperationState::Paused,
                status: "integration held".to_string(),
            },
            Phase::ReadingOut { .. } => PollReport {
                state: OperationState::Completing,
                status: "reading out".to_string(),
            },
            Phase::Storing { .. } => PollReport {
                state: OperationState::Finalizing,
                status: "storing frame".to_string(),
            },
            Phase::Stopping { .. } => PollReport {
                state: OperationState::Aborting,
                status: "stopping".to_string(),
            },
        }
    }
}

#[async_trait]
impl StatusPoller for SimulatedDevice {
    async fn poll_status(&mut self) -> Result<PollReport, DeviceQueryError> {
        Ok(self.observe())
    }
}

/// Override the generic operation verbs with variants that also drive the
/// simulated hardware, the way a device-specific agent couples its own
/// command strings to the machine transitions.
pub fn register_sim_commands(registry: &mut CommandRegistry, handle: SimHandle) {
    registry.register(
        "GO",
        Box::new(SimGo {
            handle: handle.clone(),
        }),
    );
    registry.register(
        "BEGIN",
        Box::new(SimGo {
            handle: handle.clone(),
        }),
    );
    registry.register(
        "PAUSE",
        Box::new(SimPause {
            handle: handle.clone(),
        }),
    );
    registry.register(
        "RESUME",
        Box::new(SimResume {
            handle: handle.clone(),
        }),
    );
    registry.register("ABORT", Box::new(SimAbort { handle }));
}

struct SimGo {
    handle: SimHandle,
}

#[async_trait]
impl CommandHandler for SimGo {
    fn describe(&self) -> &'static str {
        "GO [operation] [seconds] - start a simulated exposure"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let (name, hint) = parse_target_and_seconds(args)?;
        let op = select_op(ctx.ops, name)?;
        let run_for = hint.unwrap_or(DEFAULT_RUN);
        op.machine.begin(Some(run_for))?;
        self.handle.start(run_for);
        Ok(CommandOutcome::done(format!(
            "{}: started ({}s)",
            op.name(),
            run_for.as_secs()
        )))
    }
}

struct SimPause {
    handle: SimHandle,
}

#[async_trait]
impl CommandHandler for SimPause {
    fn describe(&self) -> &'static str {
        "PAUSE [operation] - hold the simulated exposure"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let op = select_op(ctx.ops, args.first().copied())?;
        op.machine.pause()?;
        self.handle.pause();
        Ok(CommandOutcome::done(format!("{}: paused", op.name())))
    }
}

struct SimResume {
    handle: SimHandle,
}

#[async_trait]
impl CommandHandler for SimResume {
    fn describe(&self) -> &'static str {
        "RESUME [operation] - resume the held exposure"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let op = select_op(ctx.ops, args.first().copied())?;
        op.machine.resume()?;
        self.handle.resume();
        Ok(CommandOutcome::done(format!("{}: resuming", op.name())))
    }
}

struct SimAbort {
    handle: SimHandle,
}

#[async_trait]
impl CommandHandler for SimAbort {
    fn describe(&self) -> &'static str {
        "ABORT [operation] - stop the simulated exposure"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let op = select_op(ctx.ops, args.first().copied())?;
        op.machine.abort()?;
        self.handle.abort();
        Ok(CommandOutcome::done(format!(
            "{}: abort requested",
            op.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_exposure_sequence() {
        let (mut device, handle) = simulated_device();

        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Idle);

        handle.start(Duration::from_secs(3));
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Running);

        tokio::time::advance(Duration::from_secs(4)).await;
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Completing);

        tokio::time::advance(READOUT).await;
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Finalizing);

        tokio::time::advance(SETTLE).await;
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_the_clock() {
        let (mut device, handle) = simulated_device();
        handle.start(Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(2)).await;
        handle.pause();
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Paused);

        // Time passing while paused does not finish the exposure.
        tokio::time::advance(Duration::from_secs(60)).await;
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Paused);

        handle.resume();
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_winds_down_then_idles() {
        let (mut device, handle) = simulated_device();
        handle.start(Duration::from_secs(30));

        handle.abort();
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Aborting);

        tokio::time::advance(ABORT_WINDDOWN).await;
        let report = device.poll_status().await.unwrap();
        assert_eq!(report.state, OperationState::Idle);
    }
}
