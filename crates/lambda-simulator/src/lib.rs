//! # Lambda Runtime Simulator
//!
//! A local AWS Lambda Runtime API simulator for testing custom runtimes
//! without deploying to AWS.
//!
//! ## Overview
//!
//! The simulator implements the server side of the Lambda Runtime API:
//! invocations are queued and delivered to a runtime via long-polling on
//! `/runtime/invocation/next`, and the runtime's responses and error
//! reports are recorded for inspection by test code. Event payloads and
//! recorded responses are raw bytes, matching what a custom runtime's
//! handlers actually see.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lambda_simulator::Simulator;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let simulator = Simulator::builder()
//!         .function_name("my-test-function")
//!         .build()
//!         .await?;
//!
//!     // Point the runtime at the simulator.
//!     println!("AWS_LAMBDA_RUNTIME_API={}", simulator.addr());
//!
//!     // Enqueue an invocation for it to pick up.
//!     simulator.enqueue_payload(json!({"message": "Hello"})).await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Testing a runtime
//!
//! The simulator provides event-driven wait helpers that eliminate flaky
//! sleep-based synchronisation:
//!
//! ```no_run
//! use lambda_simulator::{InvocationStatus, Simulator};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let simulator = Simulator::builder().build().await.unwrap();
//!
//! let request_id = simulator.enqueue_payload(json!({"key": "value"})).await;
//!
//! // Start your runtime against simulator.addr() ...
//!
//! let state = simulator
//!     .wait_for_invocation_complete(&request_id, Duration::from_secs(5))
//!     .await
//!     .expect("Invocation should complete");
//! assert_eq!(state.status, InvocationStatus::Success);
//! # }
//! ```
//!
//! ## AWS Lambda Runtime API
//!
//! The simulator implements these endpoints:
//!
//! - `GET /2018-06-01/runtime/invocation/next` - Get next invocation (long-poll)
//! - `POST /2018-06-01/runtime/invocation/{requestId}/response` - Submit response
//! - `POST /2018-06-01/runtime/invocation/{requestId}/error` - Report error
//! - `POST /2018-06-01/runtime/init/error` - Report initialization error
//!
//! For more details on the Lambda Runtime API, see:
//! <https://docs.aws.amazon.com/lambda/latest/dg/runtimes-api.html>

pub mod error;
pub mod invocation;
pub(crate) mod runtime_api;
pub mod simulator;
pub(crate) mod state;

pub use error::{BuilderError, SimulatorError, SimulatorResult};
pub use invocation::{
    Invocation, InvocationBuilder, InvocationError, InvocationResponse, InvocationStatus,
};
pub use simulator::{Simulator, SimulatorBuilder, SimulatorConfig};
pub use state::InvocationState;
