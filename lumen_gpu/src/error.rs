//! Error types for the Lumen GPU layer
//!
//! A single error enum covers device failures, resource misuse and
//! shader/asset I/O. All fallible operations return [`Result`].

use std::fmt;

/// Result type for Lumen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lumen errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (a device call failed)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, etc.)
    InvalidResource(String),

    /// Initialization failed (device, renderer, subsystems)
    InitializationFailed(String),

    /// The caller broke an API contract (wrong slot, wrong state,
    /// descriptor kind mismatch, capacity exceeded...)
    ContractViolation(String),

    /// File system error while loading shaders or assets
    Io(String),

    /// Feature not supported by the active backend
    Unsupported(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl Error {
    /// Whether this error reports caller misuse rather than a device failure
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::ContractViolation(_))
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
