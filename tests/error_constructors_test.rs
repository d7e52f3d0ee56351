use evlink::error::EvlinkError;

#[test]
fn error_constructors_group_1() {
    assert!(matches!(
        EvlinkError::config("x"),
        EvlinkError::Config { .. }
    ));
    assert!(matches!(EvlinkError::setup("x"), EvlinkError::Setup { .. }));
}

#[test]
fn error_constructors_group_2() {
    let ser = EvlinkError::Serialization {
        message: "s".into(),
    };
    assert!(matches!(ser, EvlinkError::Serialization { .. }));
    assert!(matches!(EvlinkError::io("x"), EvlinkError::Io { .. }));
    assert!(matches!(
        EvlinkError::network("x"),
        EvlinkError::Network { .. }
    ));
    assert!(matches!(EvlinkError::api("x"), EvlinkError::Api { .. }));
}

#[test]
fn error_constructors_group_3() {
    assert!(matches!(
        EvlinkError::validation("f", "m"),
        EvlinkError::Validation { .. }
    ));
    assert!(matches!(
        EvlinkError::timeout("x"),
        EvlinkError::Timeout { .. }
    ));
    assert!(matches!(
        EvlinkError::rate_limited("x"),
        EvlinkError::RateLimited { .. }
    ));
}

#[test]
fn only_rate_limit_is_retryable() {
    assert!(EvlinkError::rate_limited("429").is_retryable());
    assert!(!EvlinkError::network("down").is_retryable());
    assert!(!EvlinkError::timeout("slow").is_retryable());
    assert!(!EvlinkError::api("bad").is_retryable());
}

#[test]
fn display_messages() {
    let e = EvlinkError::validation("field", "bad");
    let s = format!("{}", e);
    assert!(s.contains("Validation error"));
    assert!(s.contains("field"));
}

#[test]
fn json_errors_convert_to_serialization() {
    let err: EvlinkError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(matches!(err, EvlinkError::Serialization { .. }));
}
