//! Tests for error types

use host_substrate::core::RuntimeError;

#[test]
fn test_resource_exhausted_error() {
    let err = RuntimeError::ResourceExhausted("no slot free within 250ms".to_string());
    assert_eq!(format!("{}", err), "resource exhausted: no slot free within 250ms");
}

#[test]
fn test_server_busy_error() {
    let err = RuntimeError::ServerBusy;
    assert_eq!(format!("{}", err), "server busy");
}

#[test]
fn test_backend_error() {
    let err = RuntimeError::Backend("WRONGTYPE".to_string());
    assert_eq!(format!("{}", err), "backend error: WRONGTYPE");
    assert!(!err.poisons_connection());
}

#[test]
fn test_transport_errors_poison_connection() {
    let io = RuntimeError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
    assert!(io.poisons_connection());
    assert!(RuntimeError::Unavailable("refused".to_string()).poisons_connection());
}

#[test]
fn test_serde_error_converts() {
    let parsed: Result<u32, _> = serde_json::from_str("nope");
    let err = RuntimeError::from(parsed.unwrap_err());
    assert!(matches!(err, RuntimeError::Serialization(_)));
}
