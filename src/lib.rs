//! impagent - IMPv2 instrument-control agent framework
//!
//! A framework for the agent processes of a distributed instrument-control
//! network: camera and stage controllers, environment monitors, telescope
//! bridges, and operator consoles exchanging short command/status messages
//! over a LAN while each agent drives its hardware through multi-second
//! operations.
//!
//! The crate provides:
//! - IMPv2 message encoding, decoding, and keyword extraction
//! - UDP transport with peer resolution and last-sender reply routing
//! - the single-threaded reactor loop that multiplexes console, socket,
//!   and device input with an adaptive wait timeout
//! - the generic long-running-operation state machine polled by the reactor
//!
//! # Quick Start
//!
//! ```rust
//! use impagent::protocol::{extract, Message, MessageKind};
//!
//! // Encode an implicit-REQUEST message for the wire.
//! let ping = Message::request("IT", "IS", "PING");
//! assert_eq!(ping.encode().unwrap(), "IT>IS PING\r");
//!
//! // Decode an inbound status report and pull its keywords.
//! let decoded = Message::decode("CAM>IT STATUS: EXPSTATUS=INTEGRATING +VERBOSE\r");
//! assert!(decoded.valid);
//! assert_eq!(decoded.message.kind, MessageKind::Status);
//!
//! let keywords = extract(&decoded.message.body);
//! assert_eq!(keywords.get("EXPSTATUS"), Some("INTEGRATING"));
//! assert_eq!(keywords.get("VERBOSE"), Some("T"));
//! ```

pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod observability;
pub mod operation;
pub mod protocol;
pub mod reactor;
pub mod testing;
pub mod transport;

pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use node::AgentNode;
pub use operation::{Operation, OperationState, OperationStateMachine};
pub use protocol::{KeywordDict, Message, MessageKind, NodeId};
pub use reactor::Reactor;
pub use transport::{Transport, UdpTransport};
