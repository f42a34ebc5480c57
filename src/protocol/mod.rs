//! IMPv2 protocol types and validation
//!
//! This module implements the wire-level core of the protocol: message
//! framing and classification, node identifier validation, and keyword
//! extraction from message bodies. Everything here is pure and synchronous;
//! socket handling lives in [`crate::transport`].

pub mod keywords;
pub mod message;
pub mod node_id;

pub use keywords::{extract, KeywordDict};
pub use message::{Decoded, EncodeError, Message, MessageKind, TERMINATOR};
pub use node_id::{validate_node_id, NodeId, NodeIdError, MAX_NODE_ID_LEN};
