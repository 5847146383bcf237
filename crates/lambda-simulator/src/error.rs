//! Error types for the Lambda runtime simulator.

use thiserror::Error;

/// Errors that can occur during simulation operations.
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// Error starting the HTTP server.
    #[error("Failed to start server: {0}")]
    ServerStart(String),

    /// Error binding to the specified address.
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    /// Timeout occurred during operation.
    #[error("Timeout occurred: {0}")]
    Timeout(String),

    /// Invocation not found.
    #[error("Invocation not found: {0}")]
    InvocationNotFound(String),
}

/// Errors that can occur when building invocations.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Required field is missing.
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Result type for simulator operations.
pub type SimulatorResult<T> = Result<T, SimulatorError>;
