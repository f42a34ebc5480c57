//! Configuration loading integration tests

use impagent::config::{AgentConfig, ConfigError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_valid_config_file() {
    let file = write_config(
        r#"
[node]
id = "IT"
port = 10700
console = false

[isis]
id = "IS"
host = "localhost"
port = 6600
"#,
    );

    let config = AgentConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.node.id, "IT");
    assert_eq!(config.node.port, 10700);
    assert!(!config.node.console);
    assert_eq!(config.isis.port, 6600);
    assert_eq!(config.node_id().unwrap().as_str(), "IT");
}

#[test]
fn test_load_applies_defaults() {
    let file = write_config(
        r#"
[node]
id = "ENV"

[isis]
id = "IS"
host = "localhost"
port = 6600
"#,
    );

    let config = AgentConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.node.port, 0);
    assert!(config.node.console);
    assert!(!config.simulator.enabled);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let err = AgentConfig::load_from_file(std::path::Path::new("/nonexistent/agent.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileRead(_)));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let file = write_config("[node\nid = ");
    let err = AgentConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::TomlParse(_)));
}

#[test]
fn test_overlong_node_id_is_rejected() {
    let file = write_config(
        r#"
[node]
id = "TOOLONGID"

[isis]
id = "IS"
host = "localhost"
port = 6600
"#,
    );

    let err = AgentConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidNodeId { .. }));
    assert!(err.to_string().contains("TOOLONGID"));
}

#[test]
fn test_simulator_section_round_trips() {
    let file = write_config(
        r#"
[node]
id = "IT"

[isis]
id = "IS"
host = "localhost"
port = 6600

[simulator]
enabled = true
name = "CAM"
"#,
    );

    let config = AgentConfig::load_from_file(file.path()).unwrap();
    assert!(config.simulator.enabled);
    assert_eq!(config.simulator.name, "CAM");

    // The parsed config renders back out for `impagent config --show`.
    let rendered = toml::to_string_pretty(&config).unwrap();
    assert!(rendered.contains("name = \"CAM\""));
}
