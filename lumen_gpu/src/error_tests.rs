//! Unit tests for error.rs

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("queue submit failed".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("queue submit failed"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_contract_violation_display() {
    let err = Error::ContractViolation("Secondary slot on a Single buffer".to_string());
    let display = format!("{}", err);
    assert!(display.starts_with("Contract violation"));
    assert!(display.contains("Secondary slot"));
}

#[test]
fn test_io_and_unsupported_display() {
    assert!(format!("{}", Error::Io("missing.spv".to_string())).contains("missing.spv"));
    assert!(format!("{}", Error::Unsupported("ray tracing".to_string())).starts_with("Unsupported"));
}

// ============================================================================
// CONVERSIONS AND HELPERS
// ============================================================================

#[test]
fn test_from_io_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "shader.spv not found");
    let err: Error = io.into();
    match err {
        Error::Io(msg) => assert!(msg.contains("shader.spv")),
        other => panic!("expected Io, got {:?}", other),
    }
}

#[test]
fn test_is_contract_violation() {
    assert!(Error::ContractViolation("x".to_string()).is_contract_violation());
    assert!(!Error::OutOfMemory.is_contract_violation());
}

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_result_question_mark() {
    fn inner() -> Result<u32> {
        Err(Error::InvalidResource("bad".to_string()))
    }
    fn outer() -> Result<u32> {
        let v = inner()?;
        Ok(v + 1)
    }
    assert_eq!(outer(), Err(Error::InvalidResource("bad".to_string())));
}
