#![cfg(test)]

use super::config::*;

fn entry() -> EntryConfig {
    EntryConfig::new(
        "secret-key".to_string(),
        "prod".to_string(),
        "veh-1".to_string(),
    )
}

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.entry.is_none());
    assert_eq!(config.web.port, 8088);
    assert_eq!(config.api.auth_scheme, AuthScheme::ApiKeyHeader);
    assert!(config.environments.contains_key("prod"));
    assert!(config.environments.contains_key("sandbox"));
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.entry = Some(entry());
    assert!(config.validate().is_ok());

    // Unknown environment
    if let Some(e) = config.entry.as_mut() {
        e.environment = "staging".to_string();
    }
    assert!(config.validate().is_err());

    // Reset and test invalid port
    config = Config::default();
    config.web.port = 0;
    assert!(config.validate().is_err());
}

#[test]
fn poll_interval_bounds() {
    assert!(validate_poll_interval(0).is_err());
    assert!(validate_poll_interval(1).is_ok());
    assert!(validate_poll_interval(60).is_ok());
    assert!(validate_poll_interval(61).is_err());
}

#[test]
fn redaction_hides_api_key() {
    let mut config = Config::default();
    config.entry = Some(entry());
    let shown = config.redacted();
    let e = shown.entry.unwrap();
    assert_ne!(e.api_key, "secret-key");
    assert_eq!(e.vehicle_id, "veh-1");
}

#[test]
fn base_url_strips_trailing_slash() {
    let mut config = Config::default();
    config
        .environments
        .insert("local".to_string(), "http://127.0.0.1:9000/".to_string());
    assert_eq!(config.base_url("local").unwrap(), "http://127.0.0.1:9000");
    assert!(config.base_url("missing").is_err());
}

#[test]
fn test_config_serialization() {
    let mut config = Config::default();
    config.entry = Some(entry());
    let yaml = serde_yaml::to_string(&config).unwrap();
    let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(deserialized.entry, config.entry);
}
