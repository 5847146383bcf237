//! Blocking HTTP/1.1 client for the Lambda Runtime API.
//!
//! One long-lived TCP connection to `AWS_LAMBDA_RUNTIME_API`, re-established
//! transparently when it drops. The loop is strictly sequential so there is
//! no pooling; request framing and response parsing are written by hand
//! because the contract is small and fixed: the client needs exactly the
//! status line, a handful of named headers, and a Content-Length-bounded
//! body. Response streaming uses chunked transfer encoding with declared
//! trailers, which is also framed here.

use crate::context::RequestMeta;
use crate::error::TransportError;
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;

const API_VERSION: &str = "2018-06-01";
const USER_AGENT: &str = concat!("lambda-bootstrap/", env!("CARGO_PKG_VERSION"));

const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const TRACE_ID_HEADER: &str = "lambda-runtime-trace-id";
const FUNCTION_ARN_HEADER: &str = "lambda-runtime-invoked-function-arn";
const DEADLINE_MS_HEADER: &str = "lambda-runtime-deadline-ms";
const CLIENT_CONTEXT_HEADER: &str = "lambda-runtime-client-context";
const COGNITO_IDENTITY_HEADER: &str = "lambda-runtime-cognito-identity";

/// Error-type header sent with invoke and init error reports, and declared
/// as a trailer on streamed responses.
pub const FUNCTION_ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";
/// Error-body trailer on streamed responses.
pub const FUNCTION_ERROR_BODY_TRAILER: &str = "Lambda-Runtime-Function-Error-Body";

/// A parsed runtime API response.
#[derive(Debug)]
pub(crate) struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

struct Conn {
    write: TcpStream,
    read: BufReader<TcpStream>,
}

impl Conn {
    fn open(endpoint: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(endpoint)?;
        stream.set_nodelay(true)?;
        // The long poll blocks for as long as the platform likes; timing is
        // the platform's responsibility, never the client's.
        stream.set_read_timeout(None)?;
        let read = BufReader::new(stream.try_clone()?);
        Ok(Self {
            write: stream,
            read,
        })
    }
}

/// The HTTP client bound to the runtime API endpoint.
pub struct RuntimeClient {
    endpoint: String,
    conn: Option<Conn>,
}

impl RuntimeClient {
    /// Connects to the runtime API at `endpoint` (`host:port`).
    pub fn connect(endpoint: &str) -> Result<Self, TransportError> {
        let conn = Conn::open(endpoint)?;
        Ok(Self {
            endpoint: endpoint.to_owned(),
            conn: Some(conn),
        })
    }

    /// Long-polls `invocation/next`, blocking until the platform delivers an
    /// event. Returns the request metadata and the raw event bytes.
    pub fn next(&mut self) -> Result<(RequestMeta, Vec<u8>), TransportError> {
        let head = request_head(
            "GET",
            &format!("/{API_VERSION}/runtime/invocation/next"),
            &self.endpoint,
            &[],
            None,
        );
        let response = self.roundtrip(head.as_bytes(), &[])?;
        if !is_success(response.status) {
            return Err(TransportError::Status(response.status));
        }
        let meta = parse_meta(&response.headers)?;
        Ok((meta, response.body))
    }

    /// Posts a buffered response for `request_id`.
    pub fn post_response(&mut self, request_id: &str, body: &[u8]) -> Result<(), TransportError> {
        let head = request_head(
            "POST",
            &format!("/{API_VERSION}/runtime/invocation/{request_id}/response"),
            &self.endpoint,
            &[],
            Some(body.len()),
        );
        let response = self.roundtrip(head.as_bytes(), body)?;
        if is_success(response.status) {
            Ok(())
        } else {
            Err(TransportError::Status(response.status))
        }
    }

    /// Reports a handler failure for `request_id`.
    pub fn post_invoke_error(
        &mut self,
        request_id: &str,
        error_type: &str,
        message: &str,
    ) -> Result<(), TransportError> {
        let path = format!("/{API_VERSION}/runtime/invocation/{request_id}/error");
        self.post_error_document(&path, error_type, message)
    }

    /// Reports a failure that happened before any invocation was pulled.
    pub fn post_init_error(&mut self, error_type: &str, message: &str) -> Result<(), TransportError> {
        let path = format!("/{API_VERSION}/runtime/init/error");
        self.post_error_document(&path, error_type, message)
    }

    fn post_error_document(
        &mut self,
        path: &str,
        error_type: &str,
        message: &str,
    ) -> Result<(), TransportError> {
        let body = error_document(error_type, message);
        let head = request_head(
            "POST",
            path,
            &self.endpoint,
            &[
                (FUNCTION_ERROR_TYPE_HEADER, error_type),
                ("Content-Type", "application/json"),
            ],
            Some(body.len()),
        );
        let response = self.roundtrip(head.as_bytes(), &body)?;
        if is_success(response.status) {
            Ok(())
        } else {
            Err(TransportError::Status(response.status))
        }
    }

    /// Begins a streamed response for `request_id`: emits the request line,
    /// headers, and the trailer declaration. Body chunks follow through
    /// [`write_chunk`] and the exchange completes with [`finish_stream`].
    ///
    /// Streamed requests are not replayable once bytes are on the wire, so
    /// the stream always opens on a fresh connection instead of risking a
    /// stale keep-alive one.
    ///
    /// [`write_chunk`]: RuntimeClient::write_chunk
    /// [`finish_stream`]: RuntimeClient::finish_stream
    pub fn open_stream(
        &mut self,
        request_id: &str,
        content_type: &str,
    ) -> Result<(), TransportError> {
        self.conn = None;
        let trailer = format!("{FUNCTION_ERROR_TYPE_HEADER}, {FUNCTION_ERROR_BODY_TRAILER}");
        let head = request_head(
            "POST",
            &format!("/{API_VERSION}/runtime/invocation/{request_id}/response"),
            &self.endpoint,
            &[
                ("Content-Type", content_type),
                ("Lambda-Runtime-Function-Response-Mode", "streaming"),
                ("Transfer-Encoding", "chunked"),
                ("Trailer", &trailer),
            ],
            None,
        );
        let result: io::Result<()> = (|| {
            let conn = self.ensure_connected()?;
            conn.write.write_all(head.as_bytes())?;
            conn.write.flush()
        })();
        if let Err(err) = result {
            self.conn = None;
            return Err(err.into());
        }
        Ok(())
    }

    /// Emits one non-empty body chunk on an open stream.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            // A zero-length frame is the terminator; never emit one here.
            return Ok(());
        }
        let result: Result<(), TransportError> = (|| {
            let conn = self.stream_conn()?;
            write!(conn.write, "{:x}\r\n", data.len())?;
            conn.write.write_all(data)?;
            conn.write.write_all(b"\r\n")?;
            conn.write.flush()?;
            Ok(())
        })();
        if result.is_err() {
            self.conn = None;
        }
        result
    }

    /// Terminates an open stream: zero-length chunk, then the trailer block
    /// (empty on success), then the final CRLF. Reads and checks the
    /// control plane's response.
    pub fn finish_stream(&mut self, trailers: &[(&str, String)]) -> Result<(), TransportError> {
        let result: Result<HttpResponse, TransportError> = (|| {
            let conn = self.stream_conn()?;
            conn.write.write_all(b"0\r\n")?;
            for (name, value) in trailers {
                write!(conn.write, "{name}: {value}\r\n")?;
            }
            conn.write.write_all(b"\r\n")?;
            conn.write.flush()?;
            read_response(&mut conn.read)
        })();
        match result {
            Ok(response) if is_success(response.status) => Ok(()),
            Ok(response) => {
                self.conn = None;
                Err(TransportError::Status(response.status))
            }
            Err(err) => {
                self.conn = None;
                Err(err)
            }
        }
    }

    fn ensure_connected(&mut self) -> io::Result<&mut Conn> {
        if self.conn.is_none() {
            self.conn = Some(Conn::open(&self.endpoint)?);
        }
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(io::Error::other("connection missing after open")),
        }
    }

    fn stream_conn(&mut self) -> Result<&mut Conn, TransportError> {
        match self.conn.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(TransportError::Protocol(
                "stream connection was lost".to_string(),
            )),
        }
    }

    /// Sends one request and reads the response. When a reused keep-alive
    /// connection turns out to be stale, reconnects once and replays; the
    /// request has not been observed by the peer in that case.
    fn roundtrip(&mut self, head: &[u8], body: &[u8]) -> Result<HttpResponse, TransportError> {
        let reused = self.conn.is_some();
        match self.try_roundtrip(head, body) {
            Err(TransportError::Io(_)) if reused => self.try_roundtrip(head, body),
            other => other,
        }
    }

    fn try_roundtrip(&mut self, head: &[u8], body: &[u8]) -> Result<HttpResponse, TransportError> {
        let result: io::Result<()> = (|| {
            let conn = self.ensure_connected()?;
            conn.write.write_all(head)?;
            conn.write.write_all(body)?;
            conn.write.flush()?;
            Ok(())
        })();
        let response = match result {
            Ok(()) => match self.conn.as_mut() {
                Some(conn) => read_response(&mut conn.read),
                None => Err(TransportError::Protocol(
                    "connection missing after send".to_string(),
                )),
            },
            Err(err) => Err(TransportError::Io(err)),
        };
        if response.is_err() {
            self.conn = None;
        }
        response
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn error_document(error_type: &str, message: &str) -> Vec<u8> {
    serde_json::json!({
        "errorType": error_type,
        "errorMessage": message,
    })
    .to_string()
    .into_bytes()
}

fn request_head(
    method: &str,
    path: &str,
    host: &str,
    extra_headers: &[(&str, &str)],
    content_length: Option<usize>,
) -> String {
    let mut head = format!("{method} {path} HTTP/1.1\r\n");
    head.push_str(&format!("Host: {host}\r\n"));
    head.push_str(&format!("User-Agent: {USER_AGENT}\r\n"));
    for (name, value) in extra_headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(len) = content_length {
        head.push_str(&format!("Content-Length: {len}\r\n"));
    }
    head.push_str("\r\n");
    head
}

fn read_response<R: BufRead>(reader: &mut R) -> Result<HttpResponse, TransportError> {
    let status_line = read_line(reader)?;
    let status = parse_status_line(&status_line)?;

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length = headers
        .get("content-length")
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body)?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, TransportError> {
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw)?;
    if n == 0 {
        return Err(TransportError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-response",
        )));
    }
    while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw)
        .map_err(|_| TransportError::Protocol("non-UTF-8 header line".to_string()))
}

fn parse_status_line(line: &str) -> Result<u16, TransportError> {
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::Protocol(format!("bad status line {line:?}")))
}

fn parse_meta(headers: &HashMap<String, String>) -> Result<RequestMeta, TransportError> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .cloned()
        .ok_or_else(|| TransportError::Protocol("next response lacks a request id".to_string()))?;
    Ok(RequestMeta {
        request_id,
        xray_trace_id: headers.get(TRACE_ID_HEADER).cloned().unwrap_or_default(),
        invoked_function_arn: headers
            .get(FUNCTION_ARN_HEADER)
            .cloned()
            .unwrap_or_default(),
        deadline_ms: headers
            .get(DEADLINE_MS_HEADER)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0),
        client_context: headers.get(CLIENT_CONTEXT_HEADER).cloned(),
        cognito_identity: headers.get(COGNITO_IDENTITY_HEADER).cloned(),
    })
}
