//! The fetch-invoke-respond loop.
//!
//! One [`Runtime`] owns everything that outlives an invocation: the
//! configuration snapshot, the runtime API connection, and the scratch
//! arena. The entry wrappers construct it and hand it the handler; after a
//! successful init the loop never returns, because the platform terminates
//! the sandbox by freezing or killing the process, never by asking nicely.

use crate::arena::Arena;
use crate::config::{Config, RUNTIME_API_VAR};
use crate::context::{Context, RequestMeta};
use crate::error::{Error, HandlerError};
use crate::logger;
use crate::stream::{HttpSink, ResponseStream};
use crate::transport::RuntimeClient;
use std::thread;
use std::time::Duration;

const BACKOFF_FLOOR_MS: u64 = 50;
const BACKOFF_CEIL_MS: u64 = 2_000;

/// Installed into the process environment per invocation so downstream AWS
/// SDK calls join the trace.
const XRAY_ENV_VAR: &str = "_X_AMZN_TRACE_ID";

const INIT_ERROR_TYPE: &str = "Runtime.InitError";

/// A buffered handler: raw event bytes in, response bytes out.
pub trait BufferedHandler: FnMut(&Context<'_>, &[u8]) -> Result<Vec<u8>, HandlerError> {}
impl<F> BufferedHandler for F where F: FnMut(&Context<'_>, &[u8]) -> Result<Vec<u8>, HandlerError> {}

/// A streaming handler: drives the response through the stream delegate.
pub trait StreamingHandler:
    FnMut(&Context<'_>, &[u8], &mut ResponseStream<'_>) -> Result<(), HandlerError>
{
}
impl<F> StreamingHandler for F where
    F: FnMut(&Context<'_>, &[u8], &mut ResponseStream<'_>) -> Result<(), HandlerError>
{
}

/// The long-lived state behind both invocation loops.
pub struct Runtime {
    config: Config,
    client: RuntimeClient,
    arena: Arena,
}

impl Runtime {
    /// Initializes from the process environment: loads configuration,
    /// installs the log sink, and opens the runtime API connection.
    ///
    /// On a configuration failure the error is reported through the
    /// init-error endpoint when the endpoint itself is known; with
    /// `AWS_LAMBDA_RUNTIME_API` unset there is nowhere to send it and the
    /// failure is only logged.
    pub fn from_env() -> Result<Self, Error> {
        logger::init();
        match Config::from_env() {
            Ok(config) => Self::new(config),
            Err(err) => {
                log::error!("initialization failed: {err}");
                if let Ok(endpoint) = std::env::var(RUNTIME_API_VAR) {
                    match RuntimeClient::connect(&endpoint) {
                        Ok(mut client) => {
                            if let Err(report_err) =
                                client.post_init_error(INIT_ERROR_TYPE, &err.to_string())
                            {
                                log::error!("failed to report init error: {report_err}");
                            }
                        }
                        Err(connect_err) => {
                            log::error!("failed to report init error: {connect_err}");
                        }
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Builds a runtime from an explicit configuration. Integration tests
    /// use this to target a local simulator.
    pub fn new(config: Config) -> Result<Self, Error> {
        logger::init();
        let client = match RuntimeClient::connect(&config.runtime_api) {
            Ok(client) => client,
            Err(err) => {
                log::error!(
                    "cannot reach runtime API at {}: {err}",
                    config.runtime_api
                );
                return Err(Error::Connect(err));
            }
        };
        Ok(Self {
            config,
            client,
            arena: Arena::new(),
        })
    }

    /// The configuration snapshot this runtime was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drives the buffered invocation loop forever.
    pub fn run_buffered<H>(mut self, mut handler: H) -> !
    where
        H: BufferedHandler,
    {
        loop {
            let (meta, event) = poll(&mut self.client);
            self.enter(&meta);

            let outcome = {
                let ctx = Context::new(&self.config, &meta, &self.arena);
                handler(&ctx, &event)
            };

            match outcome {
                Ok(body) => {
                    if let Err(err) = self.client.post_response(&meta.request_id, &body) {
                        log::error!("failed to deliver response: {err}");
                    }
                }
                Err(fault) => {
                    log::error!("handler failed: {fault}");
                    if let Err(err) = self.client.post_invoke_error(
                        &meta.request_id,
                        fault.error_type(),
                        fault.message(),
                    ) {
                        log::error!("failed to report handler error: {err}");
                    }
                }
            }

            self.leave();
        }
    }

    /// Drives the streaming invocation loop forever.
    pub fn run_streaming<H>(mut self, mut handler: H) -> !
    where
        H: StreamingHandler,
    {
        loop {
            let (meta, event) = poll(&mut self.client);
            self.enter(&meta);

            {
                let mut sink = HttpSink::new(&mut self.client, &meta.request_id);
                let mut stream = ResponseStream::new(&mut sink);
                let outcome = {
                    let ctx = Context::new(&self.config, &meta, &self.arena);
                    handler(&ctx, &event, &mut stream)
                };
                if let Err(fault) = &outcome {
                    log::error!("handler failed: {fault}");
                }
                if let Err(err) = stream.finalize(outcome.as_ref().err()) {
                    log::error!("failed to settle response stream: {err}");
                }
            }

            self.leave();
        }
    }

    /// Per-invocation setup: trace propagation, log request id binding, and
    /// an empty arena for the handler.
    fn enter(&mut self, meta: &RequestMeta) {
        install_trace(&meta.xray_trace_id);
        logger::set_request_id(&meta.request_id);
        self.arena.reset();
    }

    /// Per-invocation cleanup, run whether the handler succeeded or failed.
    fn leave(&mut self) {
        logger::clear_request_id();
        self.arena.reset();
    }
}

/// Initializes the runtime from the Lambda environment and drives the
/// buffered loop. Returns only when initialization fails (the failure has
/// already been reported and logged); callers exit non-zero with it.
///
/// # Examples
///
/// ```no_run
/// fn main() {
///     let error = lambda_bootstrap::run_buffered(|_ctx, event| Ok(event.to_vec()));
///     eprintln!("runtime exited: {error}");
///     std::process::exit(1);
/// }
/// ```
pub fn run_buffered<H>(handler: H) -> Error
where
    H: BufferedHandler,
{
    match Runtime::from_env() {
        Ok(runtime) => runtime.run_buffered(handler),
        Err(err) => err,
    }
}

/// Initializes the runtime from the Lambda environment and drives the
/// streaming loop. Returns only when initialization fails.
///
/// # Examples
///
/// ```no_run
/// fn main() {
///     let error = lambda_bootstrap::run_streaming(|_ctx, _event, stream| {
///         stream.open("text/event-stream")?;
///         stream.publish(b"data: hello\n\n")?;
///         Ok(())
///     });
///     eprintln!("runtime exited: {error}");
///     std::process::exit(1);
/// }
/// ```
pub fn run_streaming<H>(handler: H) -> Error
where
    H: StreamingHandler,
{
    match Runtime::from_env() {
        Ok(runtime) => runtime.run_streaming(handler),
        Err(err) => err,
    }
}

/// Long-polls for the next invocation. Transport failures retry with
/// exponential backoff forever; the platform offers no other recourse and
/// enforces its own invocation deadline.
fn poll(client: &mut RuntimeClient) -> (RequestMeta, Vec<u8>) {
    let mut attempt: u32 = 0;
    loop {
        match client.next() {
            Ok(next) => return next,
            Err(err) => {
                let delay = backoff_delay(attempt);
                log::warn!(
                    "polling for the next invocation failed ({err}); retrying in {}ms",
                    delay.as_millis()
                );
                thread::sleep(delay);
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    // The shift is clamped well past the point where the cap takes over.
    let ms = (BACKOFF_FLOOR_MS << attempt.min(16)).min(BACKOFF_CEIL_MS);
    Duration::from_millis(ms)
}

/// Installs (or clears) the X-Ray trace header value for this invocation.
fn install_trace(trace_id: &str) {
    // SAFETY: the runtime is strictly single threaded; nothing reads or
    // writes the process environment concurrently with this.
    unsafe {
        if trace_id.is_empty() {
            std::env::remove_var(XRAY_ENV_VAR);
        } else {
            std::env::set_var(XRAY_ENV_VAR, trace_id);
        }
    }
}
