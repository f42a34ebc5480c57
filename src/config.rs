//! Agent configuration
//!
//! One TOML file per agent process supplies the node identity, the broker
//! peer most traffic routes through, and the console flag. Identifiers are
//! validated at load time so a bad config fails the process before any
//! socket is opened.
//!
//! ```toml
//! [node]
//! id = "IT"
//! port = 10700
//! console = true
//!
//! [isis]
//! id = "IS"
//! host = "localhost"
//! port = 6600
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::protocol::{NodeId, NodeIdError};

/// Top-level agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub node: NodeSection,
    pub isis: PeerSection,
    #[serde(default)]
    pub simulator: SimulatorSection,
}

/// This agent's own identity and socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// Node identifier advertised on the wire (max 8 characters).
    pub id: String,
    /// UDP port to bind; 0 requests an OS-assigned ephemeral port.
    #[serde(default)]
    pub port: u16,
    /// Whether the operator console reads commands from stdin.
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_console() -> bool {
    true
}

/// The well-known broker peer (ISIS server) most traffic routes through
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerSection {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// Optional simulated device for bench checkout without hardware
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatorSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_sim_name")]
    pub name: String,
}

fn default_sim_name() -> String {
    "SIM".to_string()
}

impl Default for SimulatorSection {
    fn default() -> Self {
        SimulatorSection {
            enabled: false,
            name: default_sim_name(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid node id '{id}': {source}")]
    InvalidNodeId {
        id: String,
        #[source]
        source: NodeIdError,
    },
}

impl AgentConfig {
    /// Load and validate a configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_id(&self.node.id)?;
        validate_id(&self.isis.id)?;
        if self.simulator.enabled {
            validate_id(&self.simulator.name)?;
        }
        Ok(())
    }

    /// This agent's validated identity.
    pub fn node_id(&self) -> Result<NodeId, ConfigError> {
        parse_id(&self.node.id)
    }

    /// The broker peer's validated identity.
    pub fn peer_id(&self) -> Result<NodeId, ConfigError> {
        parse_id(&self.isis.id)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[node]
id = "IT"
port = 10700

[isis]
id = "IS"
host = "localhost"
port = 6600
"#;
        toml::from_str(toml_content).expect("test config should parse")
    }
}

fn validate_id(id: &str) -> Result<(), ConfigError> {
    parse_id(id).map(|_| ())
}

fn parse_id(id: &str) -> Result<NodeId, ConfigError> {
    NodeId::new(id).map_err(|source| ConfigError::InvalidNodeId {
        id: id.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[node]
id = "IT"
port = 10700
console = false

[isis]
id = "IS"
host = "isis.lan"
port = 6600

[simulator]
enabled = true
name = "CAM"
"#;
        let config: AgentConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.node.id, "IT");
        assert_eq!(config.node.port, 10700);
        assert!(!config.node.console);
        assert_eq!(config.isis.host, "isis.lan");
        assert!(config.simulator.enabled);
        assert_eq!(config.simulator.name, "CAM");
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml_content = r#"
[node]
id = "ENV"

[isis]
id = "IS"
host = "localhost"
port = 6600
"#;
        let config: AgentConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.node.port, 0);
        assert!(config.node.console);
        assert!(!config.simulator.enabled);
        assert_eq!(config.simulator.name, "SIM");
    }

    #[test]
    fn test_invalid_node_id_rejected() {
        let toml_content = r#"
[node]
id = "LONGNAME9"

[isis]
id = "IS"
host = "localhost"
port = 6600
"#;
        let config: AgentConfig = toml::from_str(toml_content).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNodeId { .. }));
        assert!(err.to_string().contains("LONGNAME9"));
    }

    #[test]
    fn test_node_id_accessors() {
        let config = AgentConfig::test_config();
        assert_eq!(config.node_id().unwrap().as_str(), "IT");
        assert_eq!(config.peer_id().unwrap().as_str(), "IS");
    }
}
