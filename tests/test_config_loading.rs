//! Configuration loading integration tests

use hausbus::config::{BusConfig, ConfigError};
use std::io::Write;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_config_round_trip() {
    let file = write_config(
        r#"
[bus]
client_id = "greenhouse-controller"
status_topic = "agent/greenhouse-controller/status"

[broker]
url = "mqtts://broker.example.org:8884"
username_env = "GREENHOUSE_BUS_USER"
password_env = "GREENHOUSE_BUS_PASS"
ca_file = "/etc/hausbus/ca.crt"
keep_alive_secs = 15
"#,
    );

    let config = BusConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.bus.client_id, "greenhouse-controller");
    assert_eq!(config.broker.url, "mqtts://broker.example.org:8884");
    assert_eq!(config.broker.keep_alive_secs, 15);
    assert_eq!(
        config.broker.ca_file.as_deref(),
        Some(std::path::Path::new("/etc/hausbus/ca.crt"))
    );
}

#[test]
fn test_credentials_resolved_from_environment() {
    let file = write_config(
        r#"
[bus]
client_id = "panel"
status_topic = "agent/panel/status"

[broker]
url = "mqtt://localhost:1883"
username_env = "HAUSBUS_TEST_USERNAME_A1"
password_env = "HAUSBUS_TEST_PASSWORD_A1"
"#,
    );
    let config = BusConfig::load_from_file(file.path()).unwrap();

    // Unset: credentials resolve to nothing rather than erroring.
    assert_eq!(config.broker_username(), None);
    assert_eq!(config.broker_password(), None);

    std::env::set_var("HAUSBUS_TEST_USERNAME_A1", "alice");
    std::env::set_var("HAUSBUS_TEST_PASSWORD_A1", "hunter2");
    assert_eq!(config.broker_username().as_deref(), Some("alice"));
    assert_eq!(config.broker_password().as_deref(), Some("hunter2"));
    std::env::remove_var("HAUSBUS_TEST_USERNAME_A1");
    std::env::remove_var("HAUSBUS_TEST_PASSWORD_A1");
}

#[test]
fn test_missing_sections_rejected() {
    let file = write_config("[bus]\nclient_id = \"x\"\n");
    assert!(matches!(
        BusConfig::load_from_file(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_wildcard_status_topic_rejected() {
    let file = write_config(
        r#"
[bus]
client_id = "panel"
status_topic = "agent/+/status"

[broker]
url = "mqtt://localhost:1883"
"#,
    );
    assert!(matches!(
        BusConfig::load_from_file(file.path()),
        Err(ConfigError::Invalid(_))
    ));
}
