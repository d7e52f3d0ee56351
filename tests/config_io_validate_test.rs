use evlink::config::{Config, EntryConfig};
use std::fs;

#[test]
fn save_and_load_yaml_roundtrip() {
    let tmp_dir = tempfile::tempdir().unwrap();
    let path = tmp_dir.path().join("config.yaml");

    let mut cfg = Config::default();
    cfg.entry = Some(EntryConfig::new(
        "key".to_string(),
        "sandbox".to_string(),
        "veh-1".to_string(),
    ));
    cfg.logging.file = path.with_extension("log").to_string_lossy().to_string();

    cfg.save_to_file(&path).unwrap();
    let loaded = Config::from_file(&path).unwrap();

    assert_eq!(loaded.entry, cfg.entry);
    assert_eq!(loaded.logging.file, cfg.logging.file);
}

#[test]
fn config_validation_errors() {
    let mut cfg = Config::default();

    // No environments
    cfg.environments.clear();
    assert!(cfg.validate().is_err());

    // Non-http base URL
    cfg = Config::default();
    cfg.environments
        .insert("prod".to_string(), "ftp://example.com".to_string());
    assert!(cfg.validate().is_err());

    // Zero timeout
    cfg = Config::default();
    cfg.api.request_timeout_secs = 0;
    assert!(cfg.validate().is_err());

    // Zero activation retry
    cfg = Config::default();
    cfg.activation_retry_secs = 0;
    assert!(cfg.validate().is_err());

    // Entry with empty key
    cfg = Config::default();
    cfg.entry = Some(EntryConfig::new(
        " ".to_string(),
        "prod".to_string(),
        "veh-1".to_string(),
    ));
    assert!(cfg.validate().is_err());

    // Entry with interval out of range
    cfg = Config::default();
    let mut entry = EntryConfig::new("k".to_string(), "prod".to_string(), "veh-1".to_string());
    entry.poll_interval_minutes = 61;
    cfg.entry = Some(entry);
    assert!(cfg.validate().is_err());
}

#[test]
fn minimal_yaml_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(
        tmp.path(),
        b"entry:\n  entry_id: e1\n  title: EVLink\n  api_key: k\n  environment: prod\n  vehicle_id: v1\n  webhook_id: w1\n",
    )
    .unwrap();
    let cfg = Config::from_file(tmp.path()).unwrap();
    let entry = cfg.entry.as_ref().unwrap();
    assert_eq!(entry.poll_interval_minutes, 5);
    assert_eq!(cfg.api.path_prefix, "/api/v1/ha");
    assert!(cfg.validate().is_ok());
}

#[test]
fn from_file_with_invalid_yaml_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    fs::write(tmp.path(), b"bad: [unclosed").unwrap();
    let err = Config::from_file(tmp.path()).unwrap_err();
    let msg = format!("{}", err);
    assert!(msg.contains("Serialization error"));
}
