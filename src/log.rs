//! Level-gated HTTP traffic logging.
//!
//! When enabled, each call writes an ordered sequence of lines to a [`Log`]
//! sink: a request block starting with `--->`, a response block starting with
//! `<---`, and for failures an error block starting with `----`. Bodies that
//! must be read for logging are buffered and replaced with an identical copy,
//! so logging never changes what the rest of the call observes.

use crate::request::Request;
use crate::response::RawResponse;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// How much of each call is logged. Levels are ordered; each includes the
/// ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum LogLevel {
    /// No logging.
    #[default]
    None = 0,
    /// Request line, response status line and elapsed time.
    Basic = 1,
    /// Adds headers and body sizes.
    Headers = 2,
    /// Adds the call arguments and the converted response value.
    HeadersAndArgs = 3,
    /// Adds full request and response bodies.
    Full = 4,
}

impl LogLevel {
    /// Returns `true` unless the level is [`LogLevel::None`].
    pub fn logs(self) -> bool {
        self != LogLevel::None
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LogLevel::Basic,
            2 => LogLevel::Headers,
            3 => LogLevel::HeadersAndArgs,
            4 => LogLevel::Full,
            _ => LogLevel::None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::None => "NONE",
            LogLevel::Basic => "BASIC",
            LogLevel::Headers => "HEADERS",
            LogLevel::HeadersAndArgs => "HEADERS_AND_ARGS",
            LogLevel::Full => "FULL",
        };
        f.write_str(name)
    }
}

/// A log level shared by a client and read once per call.
#[derive(Debug, Default)]
pub(crate) struct SharedLogLevel(AtomicU8);

impl SharedLogLevel {
    pub(crate) fn new(level: LogLevel) -> Self {
        Self(AtomicU8::new(level as u8))
    }

    pub(crate) fn get(&self) -> LogLevel {
        LogLevel::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, level: LogLevel) {
        self.0.store(level as u8, Ordering::Release);
    }
}

/// Destination for traffic log lines.
pub trait Log: Send + Sync {
    /// Writes one line.
    fn log(&self, line: &str);
}

impl<F> Log for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, line: &str) {
        self(line)
    }
}

/// Forwards every line as a `tracing` event with target `restbind::http`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl Log for TracingLog {
    fn log(&self, line: &str) {
        tracing::info!(target: "restbind::http", "{}", line);
    }
}

fn body_size(length: Option<u64>) -> String {
    match length {
        Some(length) => format!("{length}-byte"),
        None => "unknown-length".to_string(),
    }
}

/// Logs `request` at `level` and returns an identical request.
///
/// `args` are the rendered call arguments, dumped at
/// [`LogLevel::HeadersAndArgs`] when the request has a body.
///
/// # Errors
///
/// Returns the I/O error raised while buffering the body at
/// [`LogLevel::Full`].
pub fn log_and_replace_request(
    log: &dyn Log,
    level: LogLevel,
    mut request: Request,
    args: &[String],
) -> io::Result<Request> {
    log.log(&format!("---> HTTP {} {}", request.method(), request.url()));

    if level < LogLevel::Headers {
        return Ok(request);
    }

    for header in request.headers() {
        log.log(&header.to_string());
    }

    let mut size = "no".to_string();
    if let Some(mut body) = request.take_body() {
        if level >= LogLevel::Full {
            body = body.buffer()?;
        }
        if let Some(media_type) = body.media_type() {
            log.log(&format!("Content-Type: {media_type}"));
        }
        if let Some(length) = body.length() {
            log.log(&format!("Content-Length: {length}"));
        }
        size = body_size(body.length());

        if level >= LogLevel::Full {
            if !request.headers().is_empty() {
                log.log("");
            }
            log.log(&body.text().unwrap_or_default());
        } else if level >= LogLevel::HeadersAndArgs {
            if !request.headers().is_empty() {
                log.log("---> REQUEST:");
            }
            for (i, arg) in args.iter().enumerate() {
                log.log(&format!("#{i}: {arg}"));
            }
        }
        request.replace_body(Some(body));
    }

    log.log(&format!("---> END HTTP ({size} body)"));
    Ok(request)
}

/// Logs `response` at `level` and returns an identical response.
///
/// # Errors
///
/// Returns the I/O error raised while buffering the body at
/// [`LogLevel::Full`].
pub fn log_and_replace_response(
    log: &dyn Log,
    level: LogLevel,
    url: &str,
    mut response: RawResponse,
    elapsed: Duration,
) -> io::Result<RawResponse> {
    log.log(&format!(
        "<--- HTTP {} {} ({}ms)",
        response.status().as_u16(),
        url,
        elapsed.as_millis()
    ));

    if level < LogLevel::Headers {
        return Ok(response);
    }

    for header in response.headers() {
        log.log(&header.to_string());
    }

    let mut size = Some(0);
    if let Some(mut body) = response.take_body() {
        size = body.length();
        if level >= LogLevel::Full {
            if !response.headers().is_empty() {
                log.log("");
            }
            body = body.buffer()?;
            size = body.length();
            log.log(&body.text().unwrap_or_default());
        }
        response.replace_body(Some(body));
    }

    log.log(&format!("<--- END HTTP ({} body)", body_size(size)));
    Ok(response)
}

/// Logs the converted response value. Only [`LogLevel::HeadersAndArgs`]
/// shows it.
pub fn log_response_body(log: &dyn Log, level: LogLevel, value: &Value) {
    if level == LogLevel::HeadersAndArgs {
        log.log("<--- BODY:");
        log.log(&value.to_string());
    }
}

/// Logs a failure that prevented a response from being handled.
pub fn log_error(log: &dyn Log, url: &str, error: &(dyn StdError + 'static)) {
    log.log(&format!("---- ERROR {url}"));

    let mut trace = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        trace.push_str("\nCaused by: ");
        trace.push_str(&cause.to_string());
        source = cause.source();
    }
    log.log(&trace);

    log.log("---- END ERROR");
}
