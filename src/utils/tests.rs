use super::error::{BrokerError, FrameError, PersistenceError};
use super::logging;
use std::io;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("DEBUG");
    logging::init("not-a-level");
}

#[test]
fn unknown_log_level_falls_back_to_info() {
    assert_eq!(logging::level_directive("not-a-level"), "info");
    assert_eq!(logging::level_directive(""), "info");
    assert_eq!(logging::level_directive("WARNING"), "warn");
    assert_eq!(logging::level_directive(" Debug "), "debug");
    assert_eq!(logging::level_directive("error"), "error");
}

#[test]
fn invalid_utf8_frame_error_message() {
    assert_eq!(FrameError::InvalidUtf8.to_string(), "frame is not valid UTF-8");
}

#[test]
fn frame_error_converts_into_broker_error() {
    let err: BrokerError = FrameError::TooLong(16).into();
    assert!(matches!(err, BrokerError::Frame(FrameError::TooLong(16))));
    assert_eq!(err.to_string(), "frame exceeds 16 bytes");
}

#[test]
fn persistence_error_names_operation_and_path() {
    let err = PersistenceError::io(
        "write",
        "/data/orders/m1",
        io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
    );
    let text = err.to_string();
    assert!(text.contains("write"));
    assert!(text.contains("/data/orders/m1"));
    assert!(text.contains("denied"));
}
