//! impagent - IMPv2 instrument-control agent entry point
//!
//! Loads the agent configuration, binds the UDP socket, wires the console
//! and signal feeds into the reactor, and runs the event loop until a QUIT
//! command or termination signal. Exit code is 0 on a normal quit and
//! nonzero on configuration or bind failure.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use impagent::config::{AgentConfig, ConfigError};
use impagent::device::sim;
use impagent::dispatch::CommandRegistry;
use impagent::error::{AgentError, AgentResult};
use impagent::node::{AgentNode, TracingTrafficLog};
use impagent::observability::init_default_logging;
use impagent::operation::{ClientNotifier, Operation, OperationStateMachine, TracingNotifier};
use impagent::reactor::{Interrupt, Reactor};
use impagent::transport::{PeerTable, Transport, UdpTransport};

/// IMPv2 instrument-control agent
#[derive(Parser)]
#[command(name = "impagent")]
#[command(about = "IMPv2 instrument-control agent")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent (the default)
    Run,
    /// Validate the configuration
    Config {
        /// Show the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_default_logging();

    let cli = Cli::parse();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_agent(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("agent failed: {e}");
        process::exit(1);
    }

    info!("agent shutdown complete");
}

fn load_configuration(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    if let Some(path) = path {
        info!("loading configuration from {}", path.display());
        return AgentConfig::load_from_file(path);
    }

    for candidate in ["agent.toml", "config/agent.toml"] {
        let path = Path::new(candidate);
        if path.exists() {
            info!("loading configuration from {}", path.display());
            return AgentConfig::load_from_file(path);
        }
    }

    Err(ConfigError::FileRead(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "no configuration file found; pass one as an argument or create agent.toml",
    )))
}

async fn run_agent(config: AgentConfig) -> AgentResult<()> {
    // Bind failure is fatal by design: the operator must see and resolve a
    // port conflict, so no silent retry on another port.
    let transport = UdpTransport::bind(config.node.port)
        .await
        .map_err(|source| AgentError::Bind {
            port: config.node.port,
            source,
        })?;
    let local = transport.local_addr().map_err(AgentError::Transport)?;
    info!(node = %config.node.id, %local, "agent socket bound");

    let node_id = config.node_id()?;
    let broker_id = config.peer_id()?;

    let mut peers = PeerTable::new();
    peers
        .add_peer(broker_id.clone(), &config.isis.host, config.isis.port)
        .await
        .map_err(|source| AgentError::Resolve {
            host: config.isis.host.clone(),
            port: config.isis.port,
            source,
        })?;

    let node = AgentNode::new(
        node_id,
        broker_id,
        transport,
        peers,
        Arc::new(TracingTrafficLog),
    );

    let notifier: Arc<dyn ClientNotifier> = Arc::new(TracingNotifier);
    let mut registry = CommandRegistry::with_builtins();

    let simulated = if config.simulator.enabled {
        let (device, handle) = sim::simulated_device();
        sim::register_sim_commands(&mut registry, handle);
        let machine = OperationStateMachine::new(&config.simulator.name, notifier.clone());
        Some(Operation::new(machine, Box::new(device)))
    } else {
        None
    };

    let mut reactor = Reactor::new(node, registry, notifier);
    if let Some(op) = simulated {
        info!(name = %config.simulator.name, "simulated device attached");
        reactor.add_operation(op);
    }

    let (interrupt_tx, interrupt_rx) = mpsc::unbounded_channel();
    spawn_signal_forwarder(interrupt_tx);
    reactor.set_interrupts(interrupt_rx);

    if config.node.console {
        let (console_tx, console_rx) = mpsc::unbounded_channel();
        spawn_console_reader(console_tx);
        reactor.set_console(console_rx);
    }

    reactor.run().await
}

fn handle_config_command(config: &AgentConfig, show: bool) -> AgentResult<()> {
    if show {
        match toml::to_string_pretty(config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => error!("failed to render configuration: {e}"),
        }
    }

    info!("configuration validation complete");
    Ok(())
}

/// Forward process signals into the reactor. SIGINT is a recoverable
/// interruption; only SIGTERM requests shutdown.
fn spawn_signal_forwarder(tx: mpsc::UnboundedSender<Interrupt>) {
    tokio::spawn(async move {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("signal handler setup failed: {e}");
                return;
            }
        };

        loop {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if result.is_err() || tx.send(Interrupt::Break).is_err() {
                        break;
                    }
                }
                _ = sigterm.recv() => {
                    if tx.send(Interrupt::Terminate).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Feed operator console lines from stdin into the reactor.
fn spawn_console_reader(tx: mpsc::UnboundedSender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("console read failed: {e}");
                    break;
                }
            }
        }
    });
}
