//! Command dispatch for inbound requests and console input
//!
//! Commands are single-line verb-plus-arguments strings, arriving either as
//! the body of an inbound REQUEST/EXEC message or as an operator console
//! line. Handlers implement [`CommandHandler`] and are looked up in a
//! registry built once at startup, so device-specific agents can override
//! or extend the generic vocabulary.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::operation::{Operation, TransitionError};
use crate::protocol::NodeId;

pub mod builtin;

/// Reply classification for a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Done,
    Error,
}

/// Outcome of one dispatched command. The reply text becomes the body of
/// the DONE:/ERROR: message sent back to the requester; an empty reply
/// suppresses the reply message entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub status: CommandStatus,
    pub reply: String,
}

impl CommandOutcome {
    pub fn done(reply: impl Into<String>) -> Self {
        CommandOutcome {
            status: CommandStatus::Done,
            reply: reply.into(),
        }
    }

    pub fn error(reply: impl Into<String>) -> Self {
        CommandOutcome {
            status: CommandStatus::Error,
            reply: reply.into(),
        }
    }
}

/// Mutable agent state a handler may act on.
pub struct CommandContext<'a> {
    pub ops: &'a mut Vec<Operation>,
    pub shutdown: &'a mut bool,
    pub node_id: &'a NodeId,
}

/// One command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// One-line usage summary shown by HELP.
    fn describe(&self) -> &'static str;

    async fn invoke(
        &self,
        ctx: &mut CommandContext<'_>,
        args: &[&str],
    ) -> Result<CommandOutcome, DispatchError>;
}

/// Command-level failures, all converted to ERROR replies.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("no operation configured")]
    NoOperations,
    #[error("operation name required (several configured)")]
    AmbiguousOperation,
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// String-keyed handler registry, built once at startup.
pub struct CommandRegistry {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry {
            handlers: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the generic command vocabulary.
    pub fn with_builtins() -> Self {
        let mut registry = CommandRegistry::new();
        builtin::register_builtins(&mut registry);
        registry
    }

    /// Register a handler, replacing any previous one for the same verb.
    pub fn register(&mut self, verb: &str, handler: Box<dyn CommandHandler>) {
        self.handlers.insert(verb.to_ascii_uppercase(), handler);
    }

    pub fn verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = self.handlers.keys().cloned().collect();
        verbs.sort_unstable();
        verbs
    }

    /// Tokenize and dispatch one raw command line. Never fails: every
    /// problem becomes an ERROR outcome with human-readable text.
    pub async fn dispatch(&self, ctx: &mut CommandContext<'_>, raw: &str) -> CommandOutcome {
        let mut words = raw.split_whitespace();
        let Some(verb) = words.next() else {
            return CommandOutcome::error("empty command");
        };
        let verb = verb.to_ascii_uppercase();
        let args: Vec<&str> = words.collect();

        if verb == "HELP" {
            return self.help(&args);
        }

        let result = match self.handlers.get(&verb) {
            None => Err(DispatchError::UnknownCommand(verb)),
            Some(handler) => handler.invoke(ctx, &args).await,
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => CommandOutcome::error(e.to_string()),
        }
    }

    fn help(&self, args: &[&str]) -> CommandOutcome {
        match args.first() {
            Some(verb) => match self.handlers.get(&verb.to_ascii_uppercase()) {
                Some(handler) => CommandOutcome::done(handler.describe()),
                None => CommandOutcome::error(format!("unknown command: {verb}")),
            },
            None => CommandOutcome::done(format!("commands: HELP {}", self.verbs().join(" "))),
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
