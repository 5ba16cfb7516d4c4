use devauth_client::{AuthorizationError, AuthorizationOutcome, ClientError};
use devauth_crypto::CryptoError;

#[test]
fn error_display_missing_secret() {
    let err = ClientError::MissingSecret;
    assert!(format!("{err}").contains("CLIENT_SECRET"));
}

#[test]
fn error_display_invalid_config() {
    let err = ClientError::InvalidConfig("server_url is empty".into());
    let msg = format!("{err}");
    assert!(msg.contains("invalid configuration"));
    assert!(msg.contains("server_url"));
}

#[test]
fn error_display_transport() {
    let err = ClientError::Transport("tls backend".into());
    assert!(format!("{err}").contains("transport error"));
}

#[test]
fn error_from_crypto() {
    let err: ClientError = CryptoError::MissingSecret.into();
    assert!(matches!(err, ClientError::Crypto(_)));
}

#[test]
fn error_from_serde() {
    let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
    let err: ClientError = json_err.into();
    assert!(format!("{err}").contains("serialization error"));
}

#[test]
fn client_error_is_std_error() {
    let err = ClientError::MissingSecret;
    let _: &dyn std::error::Error = &err;
}

// ── AuthorizationError ───────────────────────────────────────────

fn from(outcome: AuthorizationOutcome) -> AuthorizationError {
    AuthorizationError::from_outcome(outcome, "dev-1", "http://srv")
}

#[test]
fn authorization_error_displays_message() {
    let err = from(AuthorizationOutcome::failure("server error: 502"));
    assert_eq!(err.to_string(), "server error: 502");
    assert_eq!(err.message(), "server error: 502");
    assert_eq!(err.device_id(), Some("dev-1"));
    assert_eq!(err.server_url(), Some("http://srv"));
}

#[test]
fn network_keywords() {
    for message in [
        "connection failed: refused",
        "connection failed: operation timed out",
        "Network unreachable",
        "read timeout",
    ] {
        assert!(from(AuthorizationOutcome::failure(message)).is_network_error(), "{message}");
    }
    assert!(!from(AuthorizationOutcome::failure("server error: 500")).is_network_error());
    assert!(!from(AuthorizationOutcome::failure("decryption failed")).is_network_error());
}

#[test]
fn forbidden_is_never_a_network_error() {
    let err = from(AuthorizationOutcome::rejected("connection not trusted"));
    assert!(!err.is_network_error());
    assert!(err.is_validation_error());
}

#[test]
fn server_verdict_is_never_a_network_error() {
    let err = from(AuthorizationOutcome::online(
        false,
        "device disabled: too many connections",
    ));
    assert!(!err.is_network_error());
    assert!(err.is_unauthorized());
    assert!(!err.is_validation_error());

    let cached = from(AuthorizationOutcome::cached(false, "network timeout policy"));
    assert!(!cached.is_network_error());
    assert!(cached.is_unauthorized());
}

#[test]
fn outcome_fields_drive_classification() {
    let unauthorized = from(AuthorizationOutcome::online(false, "device not authorized"));
    assert!(unauthorized.is_unauthorized());
    assert!(!unauthorized.is_validation_error());

    let cached_denial = from(AuthorizationOutcome::cached(false, "device not authorized"));
    assert!(cached_denial.is_unauthorized());

    let failed = from(AuthorizationOutcome::failure("decryption failed"));
    assert!(failed.is_validation_error());
    assert!(!failed.is_unauthorized());
}

#[test]
fn message_only_errors_fall_back_to_text() {
    let err = AuthorizationError::from_message("Device not authorized");
    assert!(err.is_unauthorized());
    assert!(!err.is_validation_error());
    assert!(err.outcome().is_none());

    let err = AuthorizationError::from_message("decryption failed, cannot verify device");
    assert!(err.is_validation_error());

    let err = AuthorizationError::from_message("connection reset");
    assert!(err.is_network_error());
}

#[test]
fn outcome_serialization_hides_default_auth_flag() {
    let json = serde_json::to_value(AuthorizationOutcome::online(true, "ok")).unwrap();
    assert!(json.get("is_auth_error").is_none());

    let json = serde_json::to_value(AuthorizationOutcome::rejected("no")).unwrap();
    assert_eq!(json["is_auth_error"], true);
    assert_eq!(json["success"], false);
}
