//! Lambda Runtime API HTTP endpoints implementation.
//!
//! Implements the Lambda Runtime API as documented at:
//! <https://docs.aws.amazon.com/lambda/latest/dg/runtimes-api.html>

use crate::invocation::{InvocationError, InvocationResponse};
use crate::simulator::SimulatorConfig;
use crate::state::{RecordResult, RuntimeState};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

const RESPONSE_MODE_HEADER: &str = "lambda-runtime-function-response-mode";

/// Shared state for Runtime API endpoints.
#[derive(Clone)]
pub(crate) struct RuntimeApiState {
    pub runtime: Arc<RuntimeState>,
    pub config: Arc<SimulatorConfig>,
}

/// Creates the Runtime API router.
///
/// # Arguments
///
/// * `state` - Shared runtime API state
///
/// # Returns
///
/// An axum router configured with all Runtime API endpoints.
pub(crate) fn create_runtime_api_router(state: RuntimeApiState) -> Router {
    // Oversize handling is the simulator's own 413, not the framework's, so
    // the framework limit sits well above the configured response cap.
    let body_limit = state.config.max_response_bytes.saturating_mul(4);
    Router::new()
        .route("/2018-06-01/runtime/invocation/next", get(next_invocation))
        .route(
            "/2018-06-01/runtime/invocation/{request_id}/response",
            post(invocation_response),
        )
        .route(
            "/2018-06-01/runtime/invocation/{request_id}/error",
            post(invocation_error),
        )
        .route("/2018-06-01/runtime/init/error", post(init_error))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Helper function to safely insert a header value.
#[allow(clippy::result_large_err)]
fn safe_header_insert(
    headers: &mut HeaderMap,
    name: &'static str,
    value: impl AsRef<str>,
) -> Result<(), Response> {
    match HeaderValue::from_str(value.as_ref()) {
        Ok(header_value) => {
            headers.insert(name, header_value);
            Ok(())
        }
        Err(_) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create header {}", name),
        )
            .into_response()),
    }
}

/// GET /2018-06-01/runtime/invocation/next
///
/// Retrieves the next invocation. This is a long-poll endpoint that blocks
/// until an invocation is available. The first call marks the runtime as
/// initialized.
async fn next_invocation(State(state): State<RuntimeApiState>) -> Response {
    state.runtime.mark_initialized();

    let invocation = state.runtime.next_invocation().await;

    tracing::debug!(
        "Delivering invocation {} to the runtime",
        invocation.request_id
    );

    let mut headers = HeaderMap::new();

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Aws-Request-Id",
        &invocation.request_id,
    ) {
        return e;
    }

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Deadline-Ms",
        invocation.deadline_ms().to_string(),
    ) {
        return e;
    }

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Invoked-Function-Arn",
        &invocation.invoked_function_arn,
    ) {
        return e;
    }

    if let Err(e) = safe_header_insert(
        &mut headers,
        "Lambda-Runtime-Trace-Id",
        &invocation.trace_id,
    ) {
        return e;
    }

    if let Some(client_context) = &invocation.client_context
        && let Err(e) = safe_header_insert(
            &mut headers,
            "Lambda-Runtime-Client-Context",
            client_context,
        )
    {
        return e;
    }

    if let Some(cognito_identity) = &invocation.cognito_identity
        && let Err(e) = safe_header_insert(
            &mut headers,
            "Lambda-Runtime-Cognito-Identity",
            cognito_identity,
        )
    {
        return e;
    }

    (StatusCode::OK, headers, invocation.payload).into_response()
}

/// POST /2018-06-01/runtime/invocation/:request_id/response
///
/// Reports a successful invocation response. The body is recorded verbatim;
/// for a streamed response it arrives chunked and is recorded as the
/// concatenation of the chunks, with the response-mode header preserved.
///
/// Returns 404 if the request ID is not found.
/// Returns 400 if a response or error has already been recorded.
/// Returns 413 if the body exceeds the configured response size limit.
async fn invocation_response(
    State(state): State<RuntimeApiState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.runtime.get_invocation_state(&request_id).await.is_none() {
        return (
            StatusCode::NOT_FOUND,
            format!("Unknown request ID: {}", request_id),
        )
            .into_response();
    }

    if body.len() > state.config.max_response_bytes {
        tracing::debug!(
            "Rejecting {} byte response for {} (limit {})",
            body.len(),
            request_id,
            state.config.max_response_bytes
        );
        return (StatusCode::PAYLOAD_TOO_LARGE, "Response payload too large").into_response();
    }

    let response_mode = headers
        .get(RESPONSE_MODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    let response = InvocationResponse {
        request_id: request_id.clone(),
        payload: body.to_vec(),
        response_mode,
        received_at: Utc::now(),
    };

    match state.runtime.record_response(response).await {
        RecordResult::Recorded => StatusCode::ACCEPTED.into_response(),
        RecordResult::AlreadyCompleted => (
            StatusCode::BAD_REQUEST,
            "Response already submitted for this invocation",
        )
            .into_response(),
        RecordResult::NotFound => (
            StatusCode::NOT_FOUND,
            format!("Unknown request ID: {}", request_id),
        )
            .into_response(),
    }
}

/// POST /2018-06-01/runtime/invocation/:request_id/error
///
/// Reports an invocation error.
///
/// Returns 404 if the request ID is not found.
/// Returns 400 if the body is not a JSON error document, or if a response
/// or error has already been recorded for this invocation.
async fn invocation_error(
    State(state): State<RuntimeApiState>,
    Path(request_id): Path<String>,
    body: String,
) -> Response {
    // Parse the error payload manually; runtimes do not reliably send a
    // Content-Type header with it.
    let error_payload: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)).into_response();
        }
    };

    let error_type = error_payload
        .get("errorType")
        .and_then(|v| v.as_str())
        .unwrap_or("UnknownError")
        .to_string();

    let error_message = error_payload
        .get("errorMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error")
        .to_string();

    let stack_trace = error_payload
        .get("stackTrace")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        });

    let error = InvocationError {
        request_id: request_id.clone(),
        error_type,
        error_message,
        stack_trace,
        received_at: Utc::now(),
    };

    match state.runtime.record_error(error).await {
        RecordResult::Recorded => StatusCode::ACCEPTED.into_response(),
        RecordResult::AlreadyCompleted => (
            StatusCode::BAD_REQUEST,
            "Response already submitted for this invocation",
        )
            .into_response(),
        RecordResult::NotFound => (
            StatusCode::NOT_FOUND,
            format!("Unknown request ID: {}", request_id),
        )
            .into_response(),
    }
}

/// POST /2018-06-01/runtime/init/error
///
/// Reports an initialization error.
async fn init_error(
    State(state): State<RuntimeApiState>,
    Json(error_payload): Json<Value>,
) -> Response {
    let error_type = error_payload
        .get("errorType")
        .and_then(|v| v.as_str())
        .unwrap_or("UnknownError");

    let error_message = error_payload
        .get("errorMessage")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown error");

    let error_string = format!("{}: {}", error_type, error_message);
    state.runtime.record_init_error(error_string).await;

    StatusCode::ACCEPTED.into_response()
}
