//! End-to-end tests running the blocking runtime against the simulator.
//!
//! The runtime is synchronous and never returns from its loop, so each test
//! gives it a thread of its own and drives it purely through the simulator:
//! enqueue an invocation, wait for the recorded outcome, assert on it.

use lambda_bootstrap::{Config, HandlerError, Runtime};
use lambda_simulator::{InvocationBuilder, InvocationStatus, Simulator};
use serde_json::json;
use serial_test::serial;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

async fn start_simulator() -> Simulator {
    Simulator::builder()
        .function_name("e2e-function")
        .handler("bootstrap")
        .build()
        .await
        .expect("simulator starts")
}

fn spawn_buffered<H>(vars: HashMap<String, String>, handler: H)
where
    H: FnMut(&lambda_bootstrap::Context<'_>, &[u8]) -> Result<Vec<u8>, HandlerError>
        + Send
        + 'static,
{
    thread::spawn(move || {
        let config = Config::from_table(vars).expect("simulator env is a complete config");
        match Runtime::new(config) {
            Ok(runtime) => runtime.run_buffered(handler),
            Err(err) => panic!("runtime failed to connect: {err}"),
        }
    });
}

fn spawn_streaming<H>(vars: HashMap<String, String>, handler: H)
where
    H: FnMut(
            &lambda_bootstrap::Context<'_>,
            &[u8],
            &mut lambda_bootstrap::ResponseStream<'_>,
        ) -> Result<(), HandlerError>
        + Send
        + 'static,
{
    thread::spawn(move || {
        let config = Config::from_table(vars).expect("simulator env is a complete config");
        match Runtime::new(config) {
            Ok(runtime) => runtime.run_streaming(handler),
            Err(err) => panic!("runtime failed to connect: {err}"),
        }
    });
}

#[tokio::test]
#[serial]
async fn buffered_handler_round_trip() {
    let simulator = start_simulator().await;
    spawn_buffered(simulator.lambda_env_vars(), |_ctx, event| {
        Ok(event.to_vec())
    });

    let request_id = simulator.enqueue_payload(json!({"message": "hi"})).await;
    let state = simulator
        .wait_for_invocation_complete(&request_id, WAIT)
        .await
        .expect("invocation completes");

    assert_eq!(state.status, InvocationStatus::Success);
    assert_eq!(
        state.response.expect("recorded response").payload,
        json!({"message": "hi"}).to_string().into_bytes()
    );
    assert!(simulator.is_initialized());

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn sequential_invocations_reuse_the_runtime() {
    let simulator = start_simulator().await;
    let mut count = 0u32;
    spawn_buffered(simulator.lambda_env_vars(), move |_ctx, _event| {
        count += 1;
        Ok(count.to_string().into_bytes())
    });

    simulator
        .wait_for(|| async { simulator.is_initialized() }, WAIT)
        .await
        .expect("runtime starts polling");

    for expected in ["1", "2", "3"] {
        let request_id = simulator.enqueue_payload(json!({})).await;
        let state = simulator
            .wait_for_invocation_complete(&request_id, WAIT)
            .await
            .expect("invocation completes");
        assert_eq!(
            state.response.expect("recorded response").payload,
            expected.as_bytes()
        );
    }

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn handler_error_is_reported_with_its_type() {
    let simulator = start_simulator().await;
    spawn_buffered(simulator.lambda_env_vars(), |_ctx, _event| {
        Err(HandlerError::new("BadInput", "field `id` is required"))
    });

    let request_id = simulator.enqueue_payload(json!({"bogus": true})).await;
    let state = simulator
        .wait_for_invocation_complete(&request_id, WAIT)
        .await
        .expect("invocation completes");

    assert_eq!(state.status, InvocationStatus::Error);
    let error = state.error.expect("recorded error");
    assert_eq!(error.error_type, "BadInput");
    assert_eq!(error.error_message, "field `id` is required");

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn oversized_response_fails_that_invocation_only() {
    let simulator = start_simulator().await;

    let mut first = true;
    spawn_buffered(simulator.lambda_env_vars(), move |_ctx, _event| {
        if first {
            first = false;
            // Over the simulator's 6 MiB buffered response limit.
            Ok(vec![b'x'; 10 * 1024 * 1024])
        } else {
            Ok(b"ok".to_vec())
        }
    });

    let oversized = simulator.enqueue_payload(json!({})).await;
    let follow_up = simulator.enqueue_payload(json!({})).await;

    // The control plane rejects the first with 413; the runtime treats the
    // invocation as complete anyway and serves the next one.
    let state = simulator
        .wait_for_invocation_complete(&follow_up, WAIT)
        .await
        .expect("follow-up completes");
    assert_eq!(state.status, InvocationStatus::Success);
    assert_eq!(state.response.expect("recorded response").payload, b"ok");

    let rejected = simulator
        .get_invocation_state(&oversized)
        .await
        .expect("state exists");
    assert_eq!(rejected.status, InvocationStatus::InProgress);

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn request_metadata_reaches_the_handler() {
    let simulator = start_simulator().await;
    spawn_buffered(simulator.lambda_env_vars(), |ctx, _event| {
        let report = json!({
            "requestId": ctx.request_id(),
            "arn": ctx.invoked_function_arn(),
            "clientContext": ctx.request().client_context,
            "deadlineMs": ctx.request().deadline_ms,
            "region": ctx.config().region,
            "trace": ctx.xray_trace_id(),
            "installedTrace": std::env::var("_X_AMZN_TRACE_ID").ok(),
        });
        Ok(report.to_string().into_bytes())
    });

    let invocation = InvocationBuilder::new()
        .payload_json(&json!({}))
        .function_arn("arn:aws:lambda:us-east-1:123456789012:function:e2e-function")
        .client_context("mobile-ctx")
        .build()
        .expect("invocation builds");
    let trace_id = invocation.trace_id.clone();
    let request_id = simulator.enqueue(invocation).await;

    let state = simulator
        .wait_for_invocation_complete(&request_id, WAIT)
        .await
        .expect("invocation completes");
    let report: serde_json::Value =
        serde_json::from_slice(&state.response.expect("recorded response").payload)
            .expect("report is JSON");

    assert_eq!(report["requestId"], request_id.as_str());
    assert_eq!(
        report["arn"],
        "arn:aws:lambda:us-east-1:123456789012:function:e2e-function"
    );
    assert_eq!(report["clientContext"], "mobile-ctx");
    assert!(report["deadlineMs"].as_u64().unwrap_or(0) > 0);
    assert_eq!(report["region"], "us-east-1");
    assert_eq!(report["trace"], trace_id.as_str());
    assert_eq!(report["installedTrace"], trace_id.as_str());

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn arena_is_empty_at_every_dispatch() {
    let simulator = start_simulator().await;
    spawn_buffered(simulator.lambda_env_vars(), |ctx, _event| {
        let used_at_entry = ctx.arena().used();
        // Leave allocations behind; the runtime must reclaim them before
        // the next dispatch.
        ctx.arena().alloc(64 * 1024);
        Ok(used_at_entry.to_string().into_bytes())
    });

    for _ in 0..3 {
        let request_id = simulator.enqueue_payload(json!({})).await;
        let state = simulator
            .wait_for_invocation_complete(&request_id, WAIT)
            .await
            .expect("invocation completes");
        assert_eq!(state.response.expect("recorded response").payload, b"0");
    }

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn streamed_response_is_recorded_with_streaming_mode() {
    let simulator = start_simulator().await;
    spawn_streaming(simulator.lambda_env_vars(), |_ctx, _event, stream| {
        stream.open("text/event-stream")?;
        stream.publish(b"A")?;
        stream.write(b"B")?;
        stream.flush()?;
        stream.publish_fmt(format_args!("{}", 3))?;
        Ok(())
    });

    let request_id = simulator.enqueue_payload(json!({})).await;
    let state = simulator
        .wait_for_invocation_complete(&request_id, WAIT)
        .await
        .expect("invocation completes");

    assert_eq!(state.status, InvocationStatus::Success);
    let response = state.response.expect("recorded response");
    assert_eq!(response.payload, b"AB3");
    assert_eq!(response.response_mode.as_deref(), Some("streaming"));

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn streaming_error_before_open_reaches_the_error_endpoint() {
    let simulator = start_simulator().await;
    spawn_streaming(simulator.lambda_env_vars(), |_ctx, event, stream| {
        if event == b"\"fail early\"" {
            return Err(HandlerError::new("EarlyBoom", "never opened"));
        }
        stream.open("text/plain")?;
        stream.publish(b"fine")?;
        Ok(())
    });

    let failing = simulator.enqueue_payload(json!("fail early")).await;
    let state = simulator
        .wait_for_invocation_complete(&failing, WAIT)
        .await
        .expect("invocation completes");
    assert_eq!(state.status, InvocationStatus::Error);
    assert_eq!(state.error.expect("recorded error").error_type, "EarlyBoom");

    // The loop is still healthy afterwards.
    let ok = simulator.enqueue_payload(json!("carry on")).await;
    let state = simulator
        .wait_for_invocation_complete(&ok, WAIT)
        .await
        .expect("invocation completes");
    assert_eq!(state.status, InvocationStatus::Success);
    assert_eq!(state.response.expect("recorded response").payload, b"fine");

    simulator.shutdown().await;
}

#[tokio::test]
#[serial]
async fn init_failure_is_reported_when_the_endpoint_is_known() {
    let simulator = start_simulator().await;

    let mut vars: Vec<(String, Option<String>)> = simulator
        .lambda_env_vars()
        .into_iter()
        .map(|(key, value)| (key, Some(value)))
        .collect();
    // Knock out one mandatory variable; the endpoint stays reachable.
    vars.push(("AWS_REGION".to_string(), None));

    let result = temp_env::async_with_vars(vars, async {
        tokio::task::spawn_blocking(Runtime::from_env)
            .await
            .expect("join")
    })
    .await;

    assert!(result.is_err());
    let report = simulator
        .wait_for_init_error(WAIT)
        .await
        .expect("init error is reported");
    assert!(report.contains("Runtime.InitError"));
    assert!(report.contains("AWS_REGION"));

    simulator.shutdown().await;
}
