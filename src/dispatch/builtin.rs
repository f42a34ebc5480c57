//! Generic built-in command handlers
//!
//! These drive the operation state machine and the agent lifecycle without
//! any device knowledge. Device-specific agents register their own handlers
//! on top (and may override these verbs) to couple the machine transitions
//! to real hardware commands.

use async_trait::async_trait;
use std::time::Duration;

use super::{CommandContext, CommandHandler, CommandOutcome, CommandRegistry, DispatchError};
use crate::operation::Operation;

pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register("GO", Box::new(Go));
    registry.register("BEGIN", Box::new(Go));
    registry.register("PAUSE", Box::new(Pause));
    registry.register("RESUME", Box::new(Resume));
    registry.register("ABORT", Box::new(Abort));
    registry.register("STATUS", Box::new(Status));
    registry.register("QUIT", Box::new(Quit));
    registry.register("EXIT", Box::new(Quit));
    registry.register("PONG", Box::new(Pong));
}

/// Pick the target operation: by name when given, otherwise the only one.
pub(crate) fn select_op<'a>(
    ops: &'a mut [Operation],
    name: Option<&str>,
) -> Result<&'a mut Operation, DispatchError> {
    match name {
        Some(name) => ops
            .iter_mut()
            .find(|op| op.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| DispatchError::UnknownOperation(name.to_string())),
        None => match ops.len() {
            0 => Err(DispatchError::NoOperations),
            1 => Ok(&mut ops[0]),
            _ => Err(DispatchError::AmbiguousOperation),
        },
    }
}

/// Parse `[operation] [seconds]` argument forms shared by GO-style verbs.
pub(crate) fn parse_target_and_seconds<'a>(
    args: &[&'a str],
) -> Result<(Option<&'a str>, Option<Duration>), DispatchError> {
    match args {
        [] => Ok((None, None)),
        [single] => match single.parse::<u64>() {
            Ok(secs) => Ok((None, Some(Duration::from_secs(secs)))),
            Err(_) => Ok((Some(*single), None)),
        },
        [name, secs] => {
            let secs: u64 = secs
                .parse()
                .map_err(|_| DispatchError::BadArgument(format!("bad duration '{secs}'")))?;
            Ok((Some(*name), Some(Duration::from_secs(secs))))
        }
        _ => Err(DispatchError::BadArgument(
            "usage: GO [operation] [seconds]".to_string(),
        )),
    }
}

struct Go;

#[async_trait]
impl CommandHandler for Go {
    fn describe(&self) -> &'static str {
        "GO [operation] [seconds] - start an operation, with an optional duration hint"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let (name, hint) = parse_target_and_seconds(args)?;
        let op = select_op(ctx.ops, name)?;
        op.machine.begin(hint)?;
        Ok(CommandOutcome::done(format!("{}: started", op.name())))
    }
}

struct Pause;

#[async_trait]
impl CommandHandler for Pause {
    fn describe(&self) -> &'static str {
        "PAUSE [operation] - suspend a running operation"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let op = select_op(ctx.ops, args.first().copied())?;
        op.machine.pause()?;
        Ok(CommandOutcome::done(format!("{}: paused", op.name())))
    }
}

struct Resume;

#[async_trait]
impl CommandHandler for Resume {
    fn describe(&self) -> &'static str {
        "RESUME [operation] - resume a paused operation"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let op = select_op(ctx.ops, args.first().copied())?;
        op.machine.resume()?;
        Ok(CommandOutcome::done(format!("{}: resuming", op.name())))
    }
}

struct Abort;

#[async_trait]
impl CommandHandler for Abort {
    fn describe(&self) -> &'static str {
        "ABORT [operation] - request cessation of a running or paused operation"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        let op = select_op(ctx.ops, args.first().copied())?;
        op.machine.abort()?;
        Ok(CommandOutcome::done(format!(
            "{}: abort requested",
            op.name()
        )))
    }
}

struct Status;

#[async_trait]
impl CommandHandler for Status {
    fn describe(&self) -> &'static str {
        "STATUS - report the state of every configured operation"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        _args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        if ctx.ops.is_empty() {
            return Ok(CommandOutcome::done(format!(
                "NODE={} no operations configured",
                ctx.node_id
            )));
        }

        let states: Vec<String> = ctx
            .ops
            .iter()
            .map(|op| format!("{}={:?}", op.name(), op.machine.state()))
            .collect();
        Ok(CommandOutcome::done(format!(
            "NODE={} {}",
            ctx.node_id,
            states.join(" ")
        )))
    }
}

struct Quit;

#[async_trait]
impl CommandHandler for Quit {
    fn describe(&self) -> &'static str {
        "QUIT - stop the agent cleanly"
    }

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        _args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        *ctx.shutdown = true;
        Ok(CommandOutcome::done("shutting down"))
    }
}

/// Liveness replies decode as implicit REQUESTs, so "PONG" lands here.
/// Acknowledged silently: the empty reply suppresses the response message.
struct Pong;

#[async_trait]
impl CommandHandler for Pong {
    fn describe(&self) -> &'static str {
        "PONG - liveness reply from a peer, acknowledged silently"
    }

    async fn invoke(
        &self,
        _ctx: &mut CommandContext<'_>,
        _args: &[&str],
    ) -> Result<CommandOutcome, DispatchError> {
        Ok(CommandOutcome::done(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CommandStatus;
    use crate::operation::{OperationState, OperationStateMachine};
    use crate::protocol::NodeId;
    use crate::testing::mocks::{RecordingNotifier, ScriptedPoller};
    use std::sync::Arc;

    fn one_op() -> Vec<Operation> {
        let notifier = Arc::new(RecordingNotifier::new());
        let machine = OperationStateMachine::new("CAM", notifier);
        vec![Operation::new(machine, Box::new(ScriptedPoller::new()))]
    }

    #[tokio::test]
    async fn test_go_with_duration_hint() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = one_op();
        let mut shutdown = false;
        let node_id = NodeId::new("IT").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "GO 30").await;
        assert_eq!(outcome.status, CommandStatus::Done);
        assert_eq!(ops[0].machine.state(), OperationState::Setup);
        assert!(ops[0].machine.countdown_enabled());
    }

    #[tokio::test]
    async fn test_go_rejects_garbage_duration() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = one_op();
        let mut shutdown = false;
        let node_id = NodeId::new("IT").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "GO CAM soon").await;
        assert_eq!(outcome.status, CommandStatus::Error);
        assert!(outcome.reply.contains("soon"));
    }

    #[tokio::test]
    async fn test_pause_outside_running_reports_transition_error() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = one_op();
        let mut shutdown = false;
        let node_id = NodeId::new("IT").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "PAUSE").await;
        assert_eq!(outcome.status, CommandStatus::Error);
        assert!(outcome.reply.contains("pause"));
    }

    #[tokio::test]
    async fn test_status_reports_all_operations() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = one_op();
        let mut shutdown = false;
        let node_id = NodeId::new("IT").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "STATUS").await;
        assert_eq!(outcome.status, CommandStatus::Done);
        assert!(outcome.reply.contains("NODE=IT"));
        assert!(outcome.reply.contains("CAM=Idle"));
    }

    #[tokio::test]
    async fn test_status_without_operations() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = Vec::new();
        let mut shutdown = false;
        let node_id = NodeId::new("ENV").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "STATUS").await;
        assert_eq!(outcome.status, CommandStatus::Done);
        assert!(outcome.reply.contains("no operations"));
    }

    #[tokio::test]
    async fn test_go_without_operations() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = Vec::new();
        let mut shutdown = false;
        let node_id = NodeId::new("IT").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "GO").await;
        assert_eq!(outcome.status, CommandStatus::Error);
        assert!(outcome.reply.contains("no operation"));
    }

    #[tokio::test]
    async fn test_pong_is_acknowledged_silently() {
        let registry = CommandRegistry::with_builtins();
        let mut ops = Vec::new();
        let mut shutdown = false;
        let node_id = NodeId::new("IT").unwrap();
        let mut ctx = CommandContext {
            ops: &mut ops,
            shutdown: &mut shutdown,
            node_id: &node_id,
        };

        let outcome = registry.dispatch(&mut ctx, "PONG").await;
        assert_eq!(outcome.status, CommandStatus::Done);
        assert!(outcome.reply.is_empty());
    }
}
