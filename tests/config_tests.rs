//! Integration tests for YAML configuration loading

use std::io::Write;
use std::time::Duration;
use wavesync::prelude::*;

#[test]
fn test_empty_yaml_uses_defaults() {
    let config = SyncConfig::from_yaml_str("{}").unwrap();

    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.base_url, "/");
    assert!(!config.editable);
    assert_eq!(config.timings.write_wait(), Duration::from_secs(10));
    assert_eq!(config.timings.pong_wait(), Duration::from_secs(60));
    assert_eq!(config.timings.ping_period(), Duration::from_secs(54));
    assert_eq!(config.timings.max_message_size, 1024 * 1024);
    assert_eq!(config.timings.send_buffer, 256);
    assert_eq!(config.auth.inactivity_timeout(), Duration::from_secs(1800));
}

#[test]
fn test_partial_yaml_keeps_other_defaults() {
    let yaml = r#"
base_url: /app/
editable: true
timings:
  pong_wait_ms: 30000
auth:
  inactivity_timeout_secs: 0
"#;
    let config = SyncConfig::from_yaml_str(yaml).unwrap();

    assert_eq!(config.base_url, "/app/");
    assert!(config.editable);
    assert_eq!(config.timings.ping_period(), Duration::from_secs(27));
    assert_eq!(config.timings.write_wait_ms, 10_000);
    assert!(config.auth.inactivity_timeout().is_zero());
}

#[test]
fn test_invalid_base_url_is_rejected() {
    let err = SyncConfig::from_yaml_str("base_url: /app").unwrap_err();
    assert!(err.to_string().contains("must end with '/'"));
}

#[test]
fn test_zero_send_buffer_is_rejected() {
    let yaml = "timings:\n  send_buffer: 0\n";
    assert!(SyncConfig::from_yaml_str(yaml).is_err());
}

#[test]
fn test_malformed_yaml_is_an_error() {
    assert!(SyncConfig::from_yaml_str("timings: [1, 2").is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "base_url: /sync/").unwrap();
    writeln!(file, "editable: true").unwrap();

    let config = SyncConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.base_url, "/sync/");
    assert!(config.editable);
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    assert!(SyncConfig::from_yaml_file(path.to_str().unwrap()).is_err());
}
