//! Error types for the bootstrap runtime.

use std::fmt;
use std::io;
use thiserror::Error;

/// Errors that prevent the runtime from entering the invocation loop.
///
/// Once the loop is running it never exits: transport failures while polling
/// are retried with backoff, and failures while reporting an outcome are
/// logged and the invocation is considered complete.
#[derive(Debug, Error)]
pub enum Error {
    /// The execution environment is missing or carries invalid configuration.
    #[error("invalid execution environment")]
    Config(#[from] ConfigError),

    /// The runtime API endpoint could not be reached during initialization.
    #[error("runtime API unreachable")]
    Connect(#[source] TransportError),
}

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mandatory environment variable was not set.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// An environment variable was set to a value that cannot be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidVar {
        /// The variable name.
        name: &'static str,
        /// The raw value found in the environment.
        value: String,
    },
}

/// Errors from the HTTP transport to the runtime API.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure; the connection is discarded and re-established
    /// on the next request.
    #[error("runtime API connection failed")]
    Io(#[from] io::Error),

    /// The endpoint answered with something that is not parseable HTTP/1.1.
    #[error("malformed runtime API response: {0}")]
    Protocol(String),

    /// The endpoint answered with a non-2xx status.
    #[error("runtime API rejected the request with status {0}")]
    Status(u16),
}

/// Errors returned by the streaming delegate to the handler.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A write, flush, or publish was attempted before `open`.
    #[error("response stream has not been opened")]
    NotOpen,

    /// `open` was called a second time.
    #[error("response stream is already open")]
    AlreadyOpen,

    /// The stream was already closed, explicitly or by `close_with_error`.
    #[error("response stream is closed")]
    Closed,

    /// The underlying connection failed mid-stream.
    #[error("response stream transport failed")]
    Transport(#[from] TransportError),
}

/// An error reported by a handler.
///
/// The `error_type` names the failure for the control plane (it becomes the
/// `errorType` field and the `Lambda-Runtime-Function-Error-Type` header);
/// the message is a best-effort human rendering. Rust has no reflection to
/// derive a type name from an arbitrary error value, so handlers supply one
/// explicitly, or use [`HandlerError::from_error`] for the generic fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    error_type: String,
    message: String,
}

impl HandlerError {
    /// Creates a handler error with an explicit type name.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Wraps any error value under the fallback type name `HandlerError`.
    pub fn from_error<E: std::error::Error>(err: E) -> Self {
        Self::new("HandlerError", err.to_string())
    }

    /// The identifier reported as `errorType`.
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    /// The message reported as `errorMessage`.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<StreamError> for HandlerError {
    fn from(err: StreamError) -> Self {
        let error_type = match err {
            StreamError::NotOpen => "StreamNotOpen",
            StreamError::AlreadyOpen => "StreamAlreadyOpen",
            StreamError::Closed => "StreamClosed",
            StreamError::Transport(_) => "StreamTransport",
        };
        Self::new(error_type, err.to_string())
    }
}
