//! # Lambda Bootstrap
//!
//! A custom runtime for the AWS Lambda "OS-only" execution environment.
//! The function package ships a single self-contained executable named
//! `bootstrap`; when the platform starts a sandbox it execs that binary,
//! which must then drive the [Lambda Runtime API] until the sandbox is
//! frozen or torn down. This crate is that driver: it discovers the
//! execution environment, performs one-time initialization, and enters an
//! unbounded fetch-invoke-respond loop bridging runtime API HTTP traffic to
//! a handler function, in either buffered or streamed delivery mode.
//!
//! ## Buffered handlers
//!
//! ```no_run
//! use lambda_bootstrap::HandlerError;
//!
//! fn main() {
//!     let error = lambda_bootstrap::run_buffered(|ctx, event| {
//!         log::info!("handling {} bytes", event.len());
//!         if event.is_empty() {
//!             return Err(HandlerError::new("BadInput", "empty event"));
//!         }
//!         Ok(event.to_vec())
//!     });
//!     eprintln!("runtime exited: {error}");
//!     std::process::exit(1);
//! }
//! ```
//!
//! ## Streaming handlers
//!
//! Streaming handlers write through a delegate that frames the response as
//! HTTP/1.1 chunked transfer. Failures after the headers are on the wire
//! travel back to the platform in trailers:
//!
//! ```no_run
//! fn main() {
//!     let error = lambda_bootstrap::run_streaming(|_ctx, _event, stream| {
//!         stream.open("text/event-stream")?;
//!         for n in 0..3 {
//!             stream.publish_fmt(format_args!("data: tick {n}\n\n"))?;
//!         }
//!         Ok(())
//!     });
//!     eprintln!("runtime exited: {error}");
//!     std::process::exit(1);
//! }
//! ```
//!
//! ## Execution model
//!
//! Strictly single-threaded, synchronous, blocking I/O: the platform
//! delivers one invocation at a time, so the runtime holds one TCP
//! connection to the runtime API and blocks on it. Handlers get two
//! allocation regimes through the [`Context`]: ordinary owned values on the
//! process heap, and a per-invocation [`arena`](Arena) that is reset in
//! place between invocations.
//!
//! Handler-visible logging goes through the [`log`] facade to a sink that
//! writes CloudWatch-ingestible lines on stderr; in release builds every
//! level below `error` is compiled out.
//!
//! [Lambda Runtime API]: https://docs.aws.amazon.com/lambda/latest/dg/runtimes-api.html

pub mod arena;
pub mod config;
pub mod context;
pub mod error;
mod invocation;
mod logger;
pub mod stream;
pub mod transport;

pub use arena::Arena;
pub use config::{Config, InitializationType};
pub use context::{Context, RequestMeta};
pub use error::{ConfigError, Error, HandlerError, StreamError, TransportError};
pub use invocation::{
    BufferedHandler, Runtime, StreamingHandler, run_buffered, run_streaming,
};
pub use stream::{ResponseStream, StreamSink};
pub use transport::RuntimeClient;
