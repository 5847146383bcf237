//! Integration tests for the Lambda runtime simulator.

use lambda_simulator::{InvocationBuilder, InvocationStatus, Simulator};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_basic_invocation_flow() {
    let simulator = Simulator::builder()
        .function_name("test-function")
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    let invocation = InvocationBuilder::new()
        .payload_json(&json!({"message": "Hello, Lambda!"}))
        .build()
        .unwrap();

    let request_id = invocation.request_id.clone();
    simulator.enqueue(invocation).await;

    let next_url = format!("{}/2018-06-01/runtime/invocation/next", runtime_api_url);
    let response = client
        .get(&next_url)
        .send()
        .await
        .expect("Failed to get invocation");

    assert_eq!(response.status(), 200);

    let aws_request_id = response
        .headers()
        .get("Lambda-Runtime-Aws-Request-Id")
        .expect("Missing request ID header")
        .to_str()
        .unwrap();

    assert_eq!(aws_request_id, request_id);
    assert!(simulator.is_initialized());

    let payload: serde_json::Value = response.json().await.expect("Failed to parse payload");
    assert_eq!(payload["message"], "Hello, Lambda!");

    let response_url = format!(
        "{}/2018-06-01/runtime/invocation/{}/response",
        runtime_api_url, request_id
    );
    let response = client
        .post(&response_url)
        .body("raw result bytes")
        .send()
        .await
        .expect("Failed to send response");

    assert_eq!(response.status(), 202);

    let state = simulator
        .get_invocation_state(&request_id)
        .await
        .expect("Invocation state not found");

    assert_eq!(state.status, InvocationStatus::Success);
    let recorded = state.response.expect("Response not recorded");
    assert_eq!(recorded.payload, b"raw result bytes");
    assert_eq!(recorded.response_mode, None);

    assert_eq!(simulator.get_all_invocation_states().await.len(), 1);

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_invocation_error() {
    let simulator = Simulator::builder()
        .function_name("test-function")
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    simulator.enqueue_payload(json!({"trigger": "error"})).await;

    let next_url = format!("{}/2018-06-01/runtime/invocation/next", runtime_api_url);
    let response = client
        .get(&next_url)
        .send()
        .await
        .expect("Failed to get invocation");

    let request_id = response
        .headers()
        .get("Lambda-Runtime-Aws-Request-Id")
        .expect("Missing request ID header")
        .to_str()
        .unwrap()
        .to_string();

    let error_url = format!(
        "{}/2018-06-01/runtime/invocation/{}/error",
        runtime_api_url, request_id
    );

    let response = client
        .post(&error_url)
        .body(
            json!({
                "errorType": "RuntimeError",
                "errorMessage": "Something went wrong",
                "stackTrace": ["line 1", "line 2"]
            })
            .to_string(),
        )
        .send()
        .await
        .expect("Failed to send error");

    assert_eq!(response.status(), 202);

    let state = simulator
        .get_invocation_state(&request_id)
        .await
        .expect("Invocation state not found");

    assert_eq!(state.status, InvocationStatus::Error);

    let error = state.error.expect("Error not recorded");
    assert_eq!(error.error_type, "RuntimeError");
    assert_eq!(error.error_message, "Something went wrong");
    assert_eq!(
        error.stack_trace,
        Some(vec!["line 1".to_string(), "line 2".to_string()])
    );

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_init_error() {
    let simulator = Simulator::builder()
        .function_name("test-function")
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    let init_error_url = format!("{}/2018-06-01/runtime/init/error", runtime_api_url);

    let response = client
        .post(&init_error_url)
        .json(&json!({
            "errorType": "InitError",
            "errorMessage": "Failed to load configuration"
        }))
        .send()
        .await
        .expect("Failed to send init error");

    assert_eq!(response.status(), 202);

    let error = simulator
        .wait_for_init_error(Duration::from_secs(1))
        .await
        .expect("Init error should be recorded");
    assert!(error.contains("InitError"));
    assert!(error.contains("Failed to load configuration"));

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_unknown_request_id_is_not_found() {
    let simulator = Simulator::builder()
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    let response_url = format!(
        "{}/2018-06-01/runtime/invocation/no-such-id/response",
        runtime_api_url
    );
    let response = client
        .post(&response_url)
        .body("whatever")
        .send()
        .await
        .expect("Failed to send response");

    assert_eq!(response.status(), 404);

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_double_report_is_rejected() {
    let simulator = Simulator::builder()
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    let request_id = simulator.enqueue_payload(json!({})).await;

    let next_url = format!("{}/2018-06-01/runtime/invocation/next", runtime_api_url);
    client.get(&next_url).send().await.expect("next");

    let response_url = format!(
        "{}/2018-06-01/runtime/invocation/{}/response",
        runtime_api_url, request_id
    );

    let first = client
        .post(&response_url)
        .body("first")
        .send()
        .await
        .expect("first response");
    assert_eq!(first.status(), 202);

    let second = client
        .post(&response_url)
        .body("second")
        .send()
        .await
        .expect("second response");
    assert_eq!(second.status(), 400);

    // First wins.
    let state = simulator
        .get_invocation_state(&request_id)
        .await
        .expect("state");
    assert_eq!(
        state.response.expect("recorded response").payload,
        b"first"
    );

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_oversized_response_is_rejected_with_413() {
    let simulator = Simulator::builder()
        .max_response_bytes(1024)
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    let request_id = simulator.enqueue_payload(json!({})).await;

    let next_url = format!("{}/2018-06-01/runtime/invocation/next", runtime_api_url);
    client.get(&next_url).send().await.expect("next");

    let response_url = format!(
        "{}/2018-06-01/runtime/invocation/{}/response",
        runtime_api_url, request_id
    );
    let response = client
        .post(&response_url)
        .body(vec![0u8; 4096])
        .send()
        .await
        .expect("oversized response");

    assert_eq!(response.status(), 413);

    // The invocation has not been recorded as completed.
    let state = simulator
        .get_invocation_state(&request_id)
        .await
        .expect("state");
    assert_eq!(state.status, InvocationStatus::InProgress);

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_long_poll_blocks_until_enqueue() {
    let simulator = Simulator::builder()
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    let next_url = format!("{}/2018-06-01/runtime/invocation/next", runtime_api_url);
    let poll = tokio::spawn(async move { client.get(&next_url).send().await });

    // Give the poll a moment to arrive and park.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!poll.is_finished());

    let request_id = simulator.enqueue_bytes(b"raw event".to_vec()).await;

    let response = poll
        .await
        .expect("join")
        .expect("poll should resolve after enqueue");
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("Lambda-Runtime-Aws-Request-Id")
            .and_then(|value| value.to_str().ok()),
        Some(request_id.as_str())
    );
    let body = response.bytes().await.expect("body");
    assert_eq!(&body[..], b"raw event");

    simulator.shutdown().await;
}

#[tokio::test]
async fn test_raw_payload_round_trips_untouched() {
    let simulator = Simulator::builder()
        .build()
        .await
        .expect("Failed to start simulator");

    let runtime_api_url = simulator.runtime_api_url();
    let client = Client::new();

    // Not JSON on purpose.
    let request_id = simulator.enqueue_bytes(&b"\x00\x01binary event\xff"[..]).await;

    let next_url = format!("{}/2018-06-01/runtime/invocation/next", runtime_api_url);
    let response = client.get(&next_url).send().await.expect("next");
    let body = response.bytes().await.expect("body");
    assert_eq!(&body[..], b"\x00\x01binary event\xff");

    let response_url = format!(
        "{}/2018-06-01/runtime/invocation/{}/response",
        runtime_api_url, request_id
    );
    client
        .post(&response_url)
        .body(&b"\xde\xad\xbe\xef"[..])
        .send()
        .await
        .expect("response");

    let state = simulator
        .wait_for_invocation_complete(&request_id, Duration::from_secs(1))
        .await
        .expect("complete");
    assert_eq!(
        state.response.expect("recorded").payload,
        b"\xde\xad\xbe\xef"
    );

    simulator.shutdown().await;
}
