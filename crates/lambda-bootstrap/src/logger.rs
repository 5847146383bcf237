//! CloudWatch-visible log sink.
//!
//! One line per record on standard error, `<LEVEL>\t<request id or "-">\t<message>`,
//! which CloudWatch Logs ingests as-is. The request id column is bound by the
//! invocation loop for the duration of a dispatch; records emitted outside
//! any invocation carry `-`.
//!
//! Non-error levels are compiled out of release builds through the `log`
//! crate's `release_max_level_error` feature, so `log::debug!` and friends
//! cost nothing on the deployed binary.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

static SINK: Sink = Sink {
    request_id: Mutex::new(None),
};

struct Sink {
    request_id: Mutex<Option<String>>,
}

/// Installs the sink as the process logger. Called by the entry wrappers;
/// a second call is a no-op.
pub(crate) fn init() {
    if log::set_logger(&SINK).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}

/// Binds the request id column for records emitted until the next
/// [`clear_request_id`].
pub(crate) fn set_request_id(request_id: &str) {
    *lock_request_id() = Some(request_id.to_owned());
}

/// Unbinds the request id column; later records carry `-`.
pub(crate) fn clear_request_id() {
    *lock_request_id() = None;
}

fn lock_request_id() -> std::sync::MutexGuard<'static, Option<String>> {
    // The slot is only written between invocations; recover rather than
    // propagate if a panicking handler poisoned it.
    SINK.request_id
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn format_line(level: Level, request_id: Option<&str>, args: &fmt::Arguments<'_>) -> String {
    format!("{}\t{}\t{}\n", level.as_str(), request_id.unwrap_or("-"), args)
}

impl Log for Sink {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let request_id = lock_request_id();
        let line = format_line(record.level(), request_id.as_deref(), record.args());
        drop(request_id);
        let _ = std::io::stderr().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
