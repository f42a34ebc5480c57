//! Observability for agent processes
//!
//! Structured logging is the operator's window into a headless agent; all
//! transport and reactor diagnostics go through `tracing` with the setup
//! in [`logging`].

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
