//! Node identifier validation for the IMPv2 protocol
//!
//! Every protocol endpoint is addressed by a short case-insensitive token.
//! This module implements the exact identifier rules the rest of the crate
//! relies on: non-empty, at most eight characters, printable ASCII with no
//! whitespace and no `>` (which delimits sender from recipient on the wire).

use std::fmt;
use thiserror::Error;

/// Maximum length of a node identifier on the wire.
pub const MAX_NODE_ID_LEN: usize = 8;

/// Validated logical endpoint name, stored in its canonical upper-case form.
///
/// Identifiers compare case-insensitively everywhere in the protocol, so the
/// canonical form is fixed at construction and used for peer-table lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Validate `raw` and return its canonical form.
    pub fn new(raw: &str) -> Result<Self, NodeIdError> {
        validate_node_id(raw)?;
        Ok(NodeId(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_node_id(id: &str) -> Result<(), NodeIdError> {
    if id.is_empty() {
        return Err(NodeIdError::Empty);
    }

    if id.len() > MAX_NODE_ID_LEN {
        return Err(NodeIdError::TooLong(id.len()));
    }

    for ch in id.chars() {
        if !ch.is_ascii_graphic() || ch == '>' {
            return Err(NodeIdError::InvalidChar(ch));
        }
    }

    Ok(())
}

/// Validation errors for node identifiers
#[derive(Debug, Error, PartialEq)]
pub enum NodeIdError {
    #[error("node id cannot be empty")]
    Empty,
    #[error("node id exceeds {MAX_NODE_ID_LEN} characters (got {0})")]
    TooLong(usize),
    #[error("node id contains invalid character: '{0}'")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn valid_ids_always_pass(id in "[A-Za-z0-9._-]{1,8}") {
            prop_assert!(validate_node_id(&id).is_ok(), "valid id should pass: {}", id);
        }

        #[test]
        fn canonical_form_is_upper_case(id in "[A-Za-z0-9._-]{1,8}") {
            let node = NodeId::new(&id).unwrap();
            prop_assert_eq!(node.as_str(), id.to_ascii_uppercase());
        }
    }

    #[test]
    fn test_id_validation_examples() {
        assert!(validate_node_id("IT").is_ok());
        assert!(validate_node_id("isis1").is_ok());
        assert!(validate_node_id("M1.RC").is_ok());
        assert!(validate_node_id("AGWFILT8").is_ok());

        assert_eq!(validate_node_id(""), Err(NodeIdError::Empty));
        assert_eq!(
            validate_node_id("LONGNAME9"),
            Err(NodeIdError::TooLong(9))
        );
        assert_eq!(validate_node_id("A>B"), Err(NodeIdError::InvalidChar('>')));
        assert_eq!(validate_node_id("A B"), Err(NodeIdError::InvalidChar(' ')));
    }

    #[test]
    fn test_ids_compare_case_insensitively() {
        let lower = NodeId::new("it").unwrap();
        let upper = NodeId::new("IT").unwrap();
        assert_eq!(lower, upper);
    }
}
