//! Per-invocation handler context.

use crate::arena::Arena;
use crate::config::Config;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Metadata delivered with one invocation, discarded when it completes.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Unique id of this invocation (`Lambda-Runtime-Aws-Request-Id`).
    pub request_id: String,
    /// X-Ray trace header value (`Lambda-Runtime-Trace-Id`); may be empty.
    pub xray_trace_id: String,
    /// ARN the function was invoked through
    /// (`Lambda-Runtime-Invoked-Function-Arn`).
    pub invoked_function_arn: String,
    /// Epoch milliseconds by which the invocation must complete
    /// (`Lambda-Runtime-Deadline-Ms`). Advisory; enforcement is the
    /// platform's.
    pub deadline_ms: u64,
    /// Mobile SDK client context (`Lambda-Runtime-Client-Context`).
    pub client_context: Option<String>,
    /// Cognito identity (`Lambda-Runtime-Cognito-Identity`).
    pub cognito_identity: Option<String>,
}

/// The immutable view a handler receives for one invocation.
///
/// Long-lived allocations are ordinary owned values on the process heap and
/// are the handler's to release; [`arena`] allocations are scratch space the
/// runtime reclaims wholesale after the handler returns.
///
/// [`arena`]: Context::arena
pub struct Context<'a> {
    config: &'a Config,
    request: &'a RequestMeta,
    arena: &'a Arena,
}

impl<'a> Context<'a> {
    pub(crate) fn new(config: &'a Config, request: &'a RequestMeta, arena: &'a Arena) -> Self {
        Self {
            config,
            request,
            arena,
        }
    }

    /// The process-wide configuration snapshot.
    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Metadata for the current invocation.
    pub fn request(&self) -> &'a RequestMeta {
        self.request
    }

    /// The per-invocation scratch allocator. Everything allocated here is
    /// invalidated when the handler returns.
    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    /// Looks up `key` in the environment captured at process start.
    /// Case-sensitive; returns `None` for unset keys, never an empty
    /// stand-in.
    pub fn env(&self, key: &str) -> Option<&'a str> {
        self.config.env(key)
    }

    /// The current invocation's request id.
    pub fn request_id(&self) -> &'a str {
        &self.request.request_id
    }

    /// The X-Ray trace header value, also installed in `_X_AMZN_TRACE_ID`
    /// for the duration of the invocation.
    pub fn xray_trace_id(&self) -> &'a str {
        &self.request.xray_trace_id
    }

    /// The ARN this invocation came in through.
    pub fn invoked_function_arn(&self) -> &'a str {
        &self.request.invoked_function_arn
    }

    /// The invocation deadline as wall-clock time.
    pub fn deadline(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.request.deadline_ms)
    }

    /// Time left until the platform kills the invocation. Zero once the
    /// deadline has passed.
    pub fn remaining_time(&self) -> Duration {
        self.deadline()
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}
