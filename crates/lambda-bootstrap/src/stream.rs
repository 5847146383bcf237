//! Response streaming delegate.
//!
//! A streaming handler drives its response through [`ResponseStream`], which
//! buffers writes and emits one HTTP chunk per flush so small messages do
//! not pay per-token framing overhead. The stream is in exactly one of four
//! states; errors after `open` can only reach the platform through the
//! trailer block, because the response headers are already on the wire.
//!
//! ```text
//! Unopened --open--> OpenEmpty <--flush/publish-- OpenBuffered
//!     |                  |                             |
//!     +------------- close / close_with_error --------+
//!                        |
//!                      Closed
//! ```

use crate::error::{HandlerError, StreamError};
use crate::transport::{
    FUNCTION_ERROR_BODY_TRAILER, FUNCTION_ERROR_TYPE_HEADER, RuntimeClient,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fmt;

/// Where the delegate's bytes go.
///
/// The production sink frames chunked HTTP over the runtime API connection;
/// tests substitute a recording sink to assert on the call sequence.
pub trait StreamSink {
    /// Emits the response head for a streamed response.
    fn open(&mut self, content_type: &str) -> Result<(), StreamError>;

    /// Emits one non-empty body chunk.
    fn chunk(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// Terminates the stream with empty trailers on success or error
    /// trailers describing the failure.
    fn finish(&mut self, error: Option<&HandlerError>) -> Result<(), StreamError>;

    /// Reports a failure through the invoke-error endpoint. Only valid
    /// while the stream is unopened.
    fn reject(&mut self, error: &HandlerError) -> Result<(), StreamError>;

    /// Delivers a buffered response. Only valid while the stream is
    /// unopened.
    fn respond(&mut self, body: &[u8]) -> Result<(), StreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unopened,
    OpenEmpty,
    OpenBuffered,
    Closed,
}

/// The streaming handler's view of the response.
pub struct ResponseStream<'a> {
    sink: &'a mut dyn StreamSink,
    state: State,
    buf: Vec<u8>,
}

impl<'a> ResponseStream<'a> {
    pub(crate) fn new(sink: &'a mut dyn StreamSink) -> Self {
        Self {
            sink,
            state: State::Unopened,
            buf: Vec::new(),
        }
    }

    /// Sends the response headers with the given content type. No body
    /// bytes are emitted yet. Fails with [`StreamError::AlreadyOpen`] on a
    /// second call without altering stream state.
    pub fn open(&mut self, content_type: &str) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => {
                self.sink.open(content_type)?;
                self.state = State::OpenEmpty;
                Ok(())
            }
            State::OpenEmpty | State::OpenBuffered => Err(StreamError::AlreadyOpen),
            State::Closed => Err(StreamError::Closed),
        }
    }

    /// Appends to the internal buffer without emitting a chunk.
    pub fn write(&mut self, data: &[u8]) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => Err(StreamError::NotOpen),
            State::OpenEmpty | State::OpenBuffered => {
                self.buf.extend_from_slice(data);
                if !self.buf.is_empty() {
                    self.state = State::OpenBuffered;
                }
                Ok(())
            }
            State::Closed => Err(StreamError::Closed),
        }
    }

    /// Appends formatted text to the internal buffer. Lets handlers use
    /// `write!(stream, ...)`.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => Err(StreamError::NotOpen),
            State::OpenEmpty | State::OpenBuffered => {
                let mut text = String::new();
                // Formatting into a String cannot fail.
                let _ = fmt::Write::write_fmt(&mut text, args);
                self.write(text.as_bytes())
            }
            State::Closed => Err(StreamError::Closed),
        }
    }

    /// Emits the buffer as a single chunk if it is non-empty, then clears
    /// it. A no-op with an empty buffer.
    pub fn flush(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => Err(StreamError::NotOpen),
            State::OpenEmpty => Ok(()),
            State::OpenBuffered => {
                self.sink.chunk(&self.buf)?;
                self.buf.clear();
                self.state = State::OpenEmpty;
                Ok(())
            }
            State::Closed => Err(StreamError::Closed),
        }
    }

    /// Appends then immediately flushes: one chunk carrying any previously
    /// buffered bytes plus `data`.
    pub fn publish(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.write(data)?;
        self.flush()
    }

    /// Appends formatted text then immediately flushes.
    pub fn publish_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<(), StreamError> {
        self.write_fmt(args)?;
        self.flush()
    }

    /// Terminates the stream normally: flushes any buffered bytes, then the
    /// zero-length chunk with empty trailers. A no-op before `open` and
    /// after close.
    pub fn close(&mut self) -> Result<(), StreamError> {
        match self.state {
            State::Unopened | State::Closed => Ok(()),
            State::OpenEmpty | State::OpenBuffered => {
                self.flush()?;
                self.sink.finish(None)?;
                self.state = State::Closed;
                Ok(())
            }
        }
    }

    /// Terminates the stream reporting a failure, short-circuiting any
    /// further writes. Before `open` this reports through the ordinary
    /// invoke-error endpoint; after `open` the failure travels in the
    /// trailer block.
    pub fn close_with_error(&mut self, error: &HandlerError) -> Result<(), StreamError> {
        match self.state {
            State::Unopened => {
                self.sink.reject(error)?;
                self.state = State::Closed;
                Ok(())
            }
            State::OpenEmpty | State::OpenBuffered => {
                self.flush()?;
                self.sink.finish(Some(error))?;
                self.state = State::Closed;
                Ok(())
            }
            State::Closed => Ok(()),
        }
    }

    /// Settles the invocation after the handler returned. Every request id
    /// gets exactly one terminal report:
    ///
    /// - already closed: nothing further, the terminator is on the wire;
    /// - open: buffered bytes are flushed and the terminator goes out, with
    ///   error trailers when the handler failed;
    /// - never opened: an ordinary response (empty body) or invoke-error.
    pub(crate) fn finalize(mut self, error: Option<&HandlerError>) -> Result<(), StreamError> {
        match self.state {
            State::Closed => Ok(()),
            State::Unopened => match error {
                Some(error) => self.sink.reject(error),
                None => self.sink.respond(&[]),
            },
            State::OpenEmpty | State::OpenBuffered => {
                self.flush()?;
                self.sink.finish(error)
            }
        }
    }
}

/// Production sink: frames the stream over the runtime API connection.
pub(crate) struct HttpSink<'a> {
    client: &'a mut RuntimeClient,
    request_id: &'a str,
}

impl<'a> HttpSink<'a> {
    pub(crate) fn new(client: &'a mut RuntimeClient, request_id: &'a str) -> Self {
        Self { client, request_id }
    }
}

impl StreamSink for HttpSink<'_> {
    fn open(&mut self, content_type: &str) -> Result<(), StreamError> {
        self.client.open_stream(self.request_id, content_type)?;
        Ok(())
    }

    fn chunk(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.client.write_chunk(data)?;
        Ok(())
    }

    fn finish(&mut self, error: Option<&HandlerError>) -> Result<(), StreamError> {
        let trailers = match error {
            None => Vec::new(),
            Some(error) => vec![
                (
                    FUNCTION_ERROR_TYPE_HEADER,
                    error.error_type().to_string(),
                ),
                (FUNCTION_ERROR_BODY_TRAILER, encode_error_body(error)),
            ],
        };
        self.client.finish_stream(&trailers)?;
        Ok(())
    }

    fn reject(&mut self, error: &HandlerError) -> Result<(), StreamError> {
        self.client
            .post_invoke_error(self.request_id, error.error_type(), error.message())?;
        Ok(())
    }

    fn respond(&mut self, body: &[u8]) -> Result<(), StreamError> {
        self.client.post_response(self.request_id, body)?;
        Ok(())
    }
}

/// Base64 of the JSON error document; trailer values cannot carry raw
/// newlines or control bytes.
fn encode_error_body(error: &HandlerError) -> String {
    let document = serde_json::json!({
        "errorType": error.error_type(),
        "errorMessage": error.message(),
    })
    .to_string();
    BASE64.encode(document)
}
