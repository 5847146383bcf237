//! Main simulator orchestration and builder.

use crate::error::{SimulatorError, SimulatorResult};
use crate::invocation::{Invocation, InvocationStatus};
use crate::runtime_api::{RuntimeApiState, create_runtime_api_router};
use crate::state::{InvocationState, RuntimeState};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Configuration for the Lambda runtime simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Default timeout for invocations in milliseconds.
    ///
    /// Used for deadline calculation (the `Lambda-Runtime-Deadline-Ms`
    /// header); invocations are not forcibly terminated.
    pub invocation_timeout_ms: u64,

    /// Function name.
    pub function_name: String,

    /// Function version.
    pub function_version: String,

    /// Function memory size in MB.
    pub memory_size_mb: u32,

    /// Log group name.
    pub log_group_name: String,

    /// Log stream name.
    pub log_stream_name: String,

    /// Function handler name (the `_HANDLER` environment variable).
    pub handler: Option<String>,

    /// AWS account ID, used in ARN construction.
    pub account_id: Option<String>,

    /// AWS region, used for environment variables and ARN construction.
    /// Defaults to "us-east-1".
    pub region: String,

    /// Largest response body the simulator accepts before answering 413,
    /// matching Lambda's 6 MiB buffered response limit.
    pub max_response_bytes: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: 3000,
            function_name: "test-function".to_string(),
            function_version: "$LATEST".to_string(),
            memory_size_mb: 128,
            log_group_name: "/aws/lambda/test-function".to_string(),
            log_stream_name: "2024/01/01/[$LATEST]test".to_string(),
            handler: None,
            account_id: None,
            region: "us-east-1".to_string(),
            max_response_bytes: 6 * 1024 * 1024,
        }
    }
}

/// Builder for creating a Lambda runtime simulator.
///
/// # Examples
///
/// ```no_run
/// use lambda_simulator::Simulator;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let simulator = Simulator::builder()
///     .invocation_timeout(Duration::from_secs(30))
///     .function_name("my-function")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct SimulatorBuilder {
    config: SimulatorConfig,
    port: Option<u16>,
}

impl SimulatorBuilder {
    /// Creates a new simulator builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the invocation timeout used for deadline calculation.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.config.invocation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the function name.
    pub fn function_name(mut self, name: impl Into<String>) -> Self {
        self.config.function_name = name.into();
        self
    }

    /// Sets the function version.
    pub fn function_version(mut self, version: impl Into<String>) -> Self {
        self.config.function_version = version.into();
        self
    }

    /// Sets the function memory size in MB.
    pub fn memory_size_mb(mut self, memory: u32) -> Self {
        self.config.memory_size_mb = memory;
        self
    }

    /// Sets the function handler name, used for the `_HANDLER` environment
    /// variable.
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.config.handler = Some(handler.into());
        self
    }

    /// Sets the AWS region.
    ///
    /// Default: "us-east-1"
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    /// Sets the AWS account ID.
    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.config.account_id = Some(account_id.into());
        self
    }

    /// Sets the largest response body accepted before a 413.
    ///
    /// Default: 6 MiB, Lambda's buffered response limit.
    pub fn max_response_bytes(mut self, limit: usize) -> Self {
        self.config.max_response_bytes = limit;
        self
    }

    /// Sets the port to bind to. If not specified, a random available port
    /// will be used.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builds and starts the simulator.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to start or bind.
    pub async fn build(self) -> SimulatorResult<Simulator> {
        let runtime_state = RuntimeState::new_shared();
        let config = Arc::new(self.config);

        let runtime_api_state = RuntimeApiState {
            runtime: runtime_state.clone(),
            config: config.clone(),
        };
        let router = create_runtime_api_router(runtime_api_state).fallback(
            |req: axum::extract::Request| async move {
                tracing::warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    "Unhandled request"
                );
                axum::http::StatusCode::NOT_FOUND
            },
        );

        let addr: SocketAddr = if let Some(port) = self.port {
            ([127, 0, 0, 1], port).into()
        } else {
            ([127, 0, 0, 1], 0).into()
        };

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SimulatorError::BindError(e.to_string()))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| SimulatorError::ServerStart(e.to_string()))?;

        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .map_err(|e| SimulatorError::ServerStart(e.to_string()))
        });

        tracing::debug!("Runtime API simulator listening on {}", local_addr);

        Ok(Simulator {
            runtime_state,
            config,
            addr: local_addr,
            server_handle,
        })
    }
}

/// A running Lambda runtime simulator.
///
/// The simulator provides an HTTP server that implements the Lambda Runtime
/// API, allowing custom runtimes to be exercised locally.
pub struct Simulator {
    runtime_state: Arc<RuntimeState>,
    config: Arc<SimulatorConfig>,
    addr: SocketAddr,
    server_handle: JoinHandle<SimulatorResult<()>>,
}

impl Simulator {
    /// Creates a new simulator builder.
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::new()
    }

    /// Returns the base URL for the Runtime API.
    ///
    /// Strip the `http://` prefix for the `AWS_LAMBDA_RUNTIME_API`
    /// environment variable, which carries a bare `host:port`.
    pub fn runtime_api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Returns the socket address the simulator is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Enqueues an invocation for processing.
    ///
    /// # Returns
    ///
    /// The request ID of the enqueued invocation.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lambda_simulator::{InvocationBuilder, Simulator};
    /// use serde_json::json;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let simulator = Simulator::builder().build().await?;
    ///
    /// let invocation = InvocationBuilder::new()
    ///     .payload_json(&json!({"key": "value"}))
    ///     .build()?;
    ///
    /// let request_id = simulator.enqueue(invocation).await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn enqueue(&self, invocation: Invocation) -> String {
        let request_id = invocation.request_id.clone();
        self.runtime_state.enqueue_invocation(invocation).await;
        request_id
    }

    /// Enqueues an invocation whose event is the JSON serialization of
    /// `payload`.
    pub async fn enqueue_payload(&self, payload: Value) -> String {
        let invocation = Invocation::new(
            payload.to_string().into_bytes(),
            self.config.invocation_timeout_ms,
        );
        self.enqueue(invocation).await
    }

    /// Enqueues an invocation with raw event bytes.
    pub async fn enqueue_bytes(&self, payload: impl Into<Vec<u8>>) -> String {
        let invocation = Invocation::new(payload.into(), self.config.invocation_timeout_ms);
        self.enqueue(invocation).await
    }

    /// Gets the state of a specific invocation.
    pub async fn get_invocation_state(&self, request_id: &str) -> Option<InvocationState> {
        self.runtime_state.get_invocation_state(request_id).await
    }

    /// Gets all invocation states.
    pub async fn get_all_invocation_states(&self) -> Vec<InvocationState> {
        self.runtime_state.get_all_states().await
    }

    /// Checks if the runtime has polled `/next` at least once.
    pub fn is_initialized(&self) -> bool {
        self.runtime_state.is_initialized()
    }

    /// Gets the initialization error if one occurred.
    pub async fn get_init_error(&self) -> Option<String> {
        self.runtime_state.get_init_error().await
    }

    /// Waits for an initialization error report.
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError::Timeout` if no init error arrives in time.
    pub async fn wait_for_init_error(&self, timeout: Duration) -> SimulatorResult<String> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(error) = self.get_init_error().await {
                return Ok(error);
            }

            tokio::select! {
                _ = self.runtime_state.wait_for_state_change() => {},
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(SimulatorError::Timeout(format!(
                        "No init error was reported within {:?}",
                        timeout
                    )));
                }
            }
        }
    }

    /// Shuts down the simulator, aborting the HTTP server.
    pub async fn shutdown(self) {
        self.server_handle.abort();
        let _ = self.server_handle.await;
    }

    /// Waits for an invocation to reach a terminal state (Success or Error).
    ///
    /// This method uses event-driven waiting instead of polling, making
    /// tests more reliable and faster.
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError::Timeout` if the invocation doesn't complete
    /// within the timeout, or `SimulatorError::InvocationNotFound` if the
    /// request ID doesn't exist.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lambda_simulator::Simulator;
    /// use serde_json::json;
    /// use std::time::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let simulator = Simulator::builder().build().await?;
    /// let request_id = simulator.enqueue_payload(json!({"test": "data"})).await;
    ///
    /// let state = simulator
    ///     .wait_for_invocation_complete(&request_id, Duration::from_secs(5))
    ///     .await?;
    /// assert_eq!(state.status, lambda_simulator::InvocationStatus::Success);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn wait_for_invocation_complete(
        &self,
        request_id: &str,
        timeout: Duration,
    ) -> SimulatorResult<InvocationState> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(state) = self.runtime_state.get_invocation_state(request_id).await {
                match state.status {
                    InvocationStatus::Success | InvocationStatus::Error => {
                        return Ok(state);
                    }
                    _ => {}
                }
            } else {
                return Err(SimulatorError::InvocationNotFound(request_id.to_string()));
            }

            tokio::select! {
                _ = self.runtime_state.wait_for_state_change() => {},
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(SimulatorError::Timeout(format!(
                        "Invocation {} did not complete within {:?}",
                        request_id, timeout
                    )));
                }
            }
        }
    }

    /// Waits for a condition to become true.
    ///
    /// This is a general-purpose helper that polls a condition function.
    /// For invocation completion, use `wait_for_invocation_complete`.
    ///
    /// # Errors
    ///
    /// Returns `SimulatorError::Timeout` if the condition doesn't become
    /// true within the timeout.
    pub async fn wait_for<F, Fut>(&self, condition: F, timeout: Duration) -> SimulatorResult<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        let poll_interval = Duration::from_millis(10);

        loop {
            if condition().await {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(SimulatorError::Timeout(format!(
                    "Condition did not become true within {:?}",
                    timeout
                )));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Generates a map of standard AWS Lambda environment variables.
    ///
    /// These are the variables AWS Lambda sets for function execution,
    /// including placeholder execution-role credentials, so a custom
    /// runtime's configuration loader can be pointed at the simulator
    /// without any extra plumbing.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lambda_simulator::Simulator;
    /// use std::process::Command;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let simulator = Simulator::builder()
    ///     .function_name("my-function")
    ///     .handler("bootstrap")
    ///     .build()
    ///     .await?;
    ///
    /// let mut cmd = Command::new("./bootstrap");
    /// for (key, value) in &simulator.lambda_env_vars() {
    ///     cmd.env(key, value);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn lambda_env_vars(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        let config = &self.config;

        env.insert(
            "AWS_LAMBDA_FUNCTION_NAME".to_string(),
            config.function_name.clone(),
        );
        env.insert(
            "AWS_LAMBDA_FUNCTION_VERSION".to_string(),
            config.function_version.clone(),
        );
        env.insert(
            "AWS_LAMBDA_FUNCTION_MEMORY_SIZE".to_string(),
            config.memory_size_mb.to_string(),
        );
        env.insert(
            "AWS_LAMBDA_LOG_GROUP_NAME".to_string(),
            config.log_group_name.clone(),
        );
        env.insert(
            "AWS_LAMBDA_LOG_STREAM_NAME".to_string(),
            config.log_stream_name.clone(),
        );

        let host_port = format!("127.0.0.1:{}", self.addr.port());
        env.insert("AWS_LAMBDA_RUNTIME_API".to_string(), host_port);

        env.insert(
            "AWS_LAMBDA_INITIALIZATION_TYPE".to_string(),
            "on-demand".to_string(),
        );

        env.insert("AWS_REGION".to_string(), config.region.clone());
        env.insert("AWS_DEFAULT_REGION".to_string(), config.region.clone());

        // Placeholder execution-role credentials.
        env.insert("AWS_ACCESS_KEY_ID".to_string(), "AKIASIMULATED".to_string());
        env.insert(
            "AWS_SECRET_ACCESS_KEY".to_string(),
            "simulated-secret-access-key".to_string(),
        );
        env.insert(
            "AWS_SESSION_TOKEN".to_string(),
            "simulated-session-token".to_string(),
        );

        env.insert(
            "AWS_EXECUTION_ENV".to_string(),
            "AWS_Lambda_provided.al2023".to_string(),
        );
        env.insert("LAMBDA_TASK_ROOT".to_string(), "/var/task".to_string());
        env.insert("LAMBDA_RUNTIME_DIR".to_string(), "/var/runtime".to_string());

        if let Some(handler) = &config.handler {
            env.insert("_HANDLER".to_string(), handler.clone());
        }

        if let Some(account_id) = &config.account_id {
            env.insert("AWS_ACCOUNT_ID".to_string(), account_id.clone());
        }

        env
    }
}
