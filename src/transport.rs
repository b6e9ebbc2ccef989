//! The transport capability and its `reqwest` implementation.
//!
//! A [`Transport`] performs one physical HTTP exchange. Timeouts, pooling and
//! TLS are its concern; the engine never retries.

use crate::body::Body;
use crate::error::BuildError;
use crate::request::{Header, Request};
use crate::response::RawResponse;
use http::header::CONTENT_TYPE;
use std::io;
use std::time::Duration;
use tokio::runtime::Handle;

/// A transport failure.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// An I/O failure; no response was obtained.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The request could not be sent for a reason other than I/O.
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The outcome of one exchange.
pub type TransportResult = Result<RawResponse, TransportError>;

/// Completion handed to [`Transport::execute_async`].
pub type TransportCallback = Box<dyn FnOnce(TransportResult) + Send>;

/// Performs HTTP exchanges.
///
/// # Examples
///
/// ```
/// use restbind::{Body, RawResponse, Request, Transport, TransportResult};
/// use http::StatusCode;
///
/// struct Fixed;
///
/// impl Transport for Fixed {
///     fn execute(&self, request: Request) -> TransportResult {
///         Ok(RawResponse::new(
///             request.url(),
///             StatusCode::OK,
///             vec![],
///             Some(Body::from_bytes(Some("application/json"), "{}")),
///         ))
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Performs `request` on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] when no response was obtained.
    fn execute(&self, request: Request) -> TransportResult;

    /// Performs `request` and invokes `on_complete` exactly once with the
    /// outcome. The default runs [`Transport::execute`] on the calling thread.
    fn execute_async(&self, request: Request, on_complete: TransportCallback) {
        on_complete(self.execute(request));
    }
}

/// A [`Transport`] backed by `reqwest` and a Tokio runtime.
///
/// Asynchronous exchanges are spawned on the runtime; response bodies are
/// buffered before they are handed back.
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    handle: Handle,
}

impl ReqwestTransport {
    /// Uses a default `reqwest::Client` on the runtime behind `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(handle: Handle) -> std::result::Result<Self, BuildError> {
        Self::build(handle, None)
    }

    /// Like [`ReqwestTransport::new`], with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(
        handle: Handle,
        timeout: Duration,
    ) -> std::result::Result<Self, BuildError> {
        Self::build(handle, Some(timeout))
    }

    /// Uses a preconfigured `reqwest::Client`.
    pub fn with_client(http_client: reqwest::Client, handle: Handle) -> Self {
        Self { http_client, handle }
    }

    fn build(handle: Handle, timeout: Option<Duration>) -> std::result::Result<Self, BuildError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(|e| {
            BuildError::Configuration(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { http_client, handle })
    }

    fn prepare(&self, mut request: Request) -> Result<reqwest::RequestBuilder, TransportError> {
        let mut builder = self
            .http_client
            .request(request.method().clone(), request.url());

        for header in request.headers() {
            builder = builder.header(header.name(), header.value());
        }

        if let Some(body) = request.take_body() {
            if let Some(media_type) = body.media_type() {
                builder = builder.header(CONTENT_TYPE, media_type);
            }
            let body = body.buffer()?;
            builder = builder.body(body.bytes().cloned().unwrap_or_default());
        }

        Ok(builder)
    }
}

async fn send(builder: reqwest::RequestBuilder) -> TransportResult {
    let response = builder.send().await.map_err(classify)?;

    let url = response.url().to_string();
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            Header::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned())
        })
        .collect::<Vec<_>>();
    let media_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response.bytes().await.map_err(classify)?;
    let body = Body::from_bytes(media_type.as_deref(), bytes);

    Ok(RawResponse::new(url, status, headers, Some(body)))
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_builder() {
        return TransportError::Other(Box::new(error));
    }
    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else if error.is_connect() {
        io::ErrorKind::ConnectionRefused
    } else {
        io::ErrorKind::Other
    };
    TransportError::Io(io::Error::new(kind, error))
}

impl Transport for ReqwestTransport {
    /// Blocks on the runtime. Must not be called from inside an async
    /// context of the same runtime.
    fn execute(&self, request: Request) -> TransportResult {
        let builder = self.prepare(request)?;
        self.handle.block_on(send(builder))
    }

    fn execute_async(&self, request: Request, on_complete: TransportCallback) {
        let builder = match self.prepare(request) {
            Ok(builder) => builder,
            Err(e) => return on_complete(Err(e)),
        };
        self.handle.spawn(async move {
            on_complete(send(builder).await);
        });
    }
}
