//! # Simulator Error Types
//!
//! Unified error handling for the governance rehearsal orchestrator.
//! The taxonomy mirrors the stage structure of the flow engine: configuration
//! and provisioning errors abort before any chain interaction, deployment and
//! verification errors name the stage that failed, and reporting errors are
//! never allowed to escalate into the run's own exit status.

use thiserror::Error;

/// Simulator operation result type
pub type SimulatorResult<T> = Result<T, SimulatorError>;

/// Comprehensive error types for simulator operations
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("RPC call {method} failed: {message}")]
    Rpc { method: String, message: String },

    #[error("Artifact not found: {0}")]
    Artifact(String),

    #[error("Deployment failed: {0}")]
    Deployment(String),

    #[error("Transaction verification failed at {stage}: {message}")]
    Verification { stage: String, message: String },

    #[error("Event discovery failed: {0}")]
    EventDiscovery(String),

    #[error("Timeout waiting for operation: {operation}")]
    Timeout { operation: String },

    #[error("Publishing error: {0}")]
    Publishing(String),
}

impl SimulatorError {
    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an RPC error from a failed JSON-RPC call
    pub fn rpc_error(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rpc {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a verification error naming the flow stage that failed
    pub fn verification(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Verification {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for a bounded wait
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if this error may be recovered locally (downgraded to a warning)
    /// rather than aborting the run.
    ///
    /// Only pre-setup, funding, and time-advance failures are recoverable;
    /// everything else is fatal at the stage level.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SimulatorError::Publishing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_error_names_the_stage() {
        let err = SimulatorError::verification("execution", "status 0x0");
        assert_eq!(
            err.to_string(),
            "Transaction verification failed at execution: status 0x0"
        );
    }

    #[test]
    fn publishing_errors_are_not_fatal() {
        assert!(!SimulatorError::Publishing("comment update failed".into()).is_fatal());
        assert!(SimulatorError::Provisioning("api down".into()).is_fatal());
    }
}
