#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use thiserror::Error;

/// Error code constants for type-safe error handling
pub mod code {
    pub const INVALID: &str = "INVALID";
    pub const NOTFOUND: &str = "NOTFOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const INVARIANT: &str = "INVARIANT";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("State store error: {0}")]
    StoreError(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Scheduler driver error: {0}")]
    DriverError(String),

    #[error("Node management error: {0}")]
    ManagementError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Returns the protocol error code for this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) | Self::SerializationError(_) => code::INVALID,
            Self::NotFound(_) => code::NOTFOUND,
            Self::Conflict(_) => code::CONFLICT,
            Self::StoreError(_)
            | Self::SqlxError(_)
            | Self::DriverError(_)
            | Self::ManagementError(_)
            | Self::IoError(_) => code::DEPENDENCY,
            Self::InvariantViolation(_) => code::INVARIANT,
            Self::Internal(_) => code::INTERNAL,
        }
    }

    /// Returns the exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::StoreError(_) | Self::SqlxError(_) => 3,
            Self::NotFound(_) => 4,
            Self::Conflict(_) => 5,
            Self::DriverError(_) | Self::ManagementError(_) => 6,
            Self::IoError(_) => 7,
            Self::SerializationError(_) => 8,
            Self::InvariantViolation(_) => 10,
            Self::Internal(_) => 9,
        }
    }

    /// Errors after which the scheduler process must not keep running with its
    /// in-memory view of the cluster.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation(_) | Self::StoreError(_) | Self::SqlxError(_)
        )
    }
}

/// Error code descriptions and suggested fixes, as printed by the CLI.
pub const ERROR_CODES: &[(&str, &str, &str)] = &[
    (
        code::INVALID,
        "Invalid configuration or payload",
        "Check the config file and command arguments",
    ),
    (
        code::NOTFOUND,
        "Cluster or node was not found",
        "Run 'orchestrator clusters' and verify the name",
    ),
    (
        code::CONFLICT,
        "Resource already exists",
        "Use a different cluster name or remove the existing one",
    ),
    (
        code::DEPENDENCY,
        "External collaborator unavailable",
        "Check the state store and cluster master connectivity",
    ),
    (
        code::INVARIANT,
        "Scheduler bookkeeping diverged from the cluster master",
        "Inspect logs; the scheduler must be restarted",
    ),
    (
        code::INTERNAL,
        "Unexpected internal failure",
        "Inspect logs and retry command",
    ),
];

/// Get error code details (description and fix) for a given error code
#[must_use]
pub fn get_error_info(error_code: &str) -> Option<(&'static str, &'static str)> {
    ERROR_CODES
        .iter()
        .find(|(code, _, _)| *code == error_code)
        .map(|(_, desc, fix)| (*desc, *fix))
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_and_store_failures_are_fatal() {
        assert!(OrchestratorError::InvariantViolation("x".to_string()).is_fatal());
        assert!(OrchestratorError::StoreError("x".to_string()).is_fatal());
        assert!(!OrchestratorError::NotFound("x".to_string()).is_fatal());
        assert!(!OrchestratorError::ManagementError("x".to_string()).is_fatal());
    }

    #[test]
    fn every_code_has_error_info() {
        let errors = [
            OrchestratorError::ConfigError(String::new()),
            OrchestratorError::NotFound(String::new()),
            OrchestratorError::Conflict(String::new()),
            OrchestratorError::DriverError(String::new()),
            OrchestratorError::InvariantViolation(String::new()),
            OrchestratorError::Internal(String::new()),
        ];
        for error in &errors {
            assert!(get_error_info(error.code()).is_some(), "{}", error.code());
        }
    }
}
