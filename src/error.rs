//! Error types for building clients and invoking remote methods.
//!
//! Every failure of a call is classified into exactly one [`ErrorKind`] at the
//! point it is detected. HTTP and conversion failures keep the raw response and
//! the declared success type, so an error body can be decoded after the fact.

use crate::converter::{ConversionError, Converter};
use crate::descriptor::DescriptorError;
use crate::metadata::TypeRef;
use crate::response::RawResponse;
use http::StatusCode;
use serde_json::Value;
use std::io;
use std::sync::Arc;

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport failed before a response was obtained.
    Network,
    /// A response was obtained with a status outside `[200, 300)`.
    Http,
    /// A body could not be encoded, or a 2xx body could not be decoded.
    Conversion,
    /// Anything else, including misbehaving hooks.
    Unexpected,
}

/// The error type of a remote call.
///
/// # Examples
///
/// ```no_run
/// use restbind::{Args, Error, Service};
///
/// # fn example(service: &Service) {
/// match service.call("user", Args::new().with(42)) {
///     Ok(response) => println!("User: {}", response.data),
///     Err(Error::Http { response, .. }) => {
///         eprintln!("HTTP {}: {:?}", response.status(), response.text());
///     }
///     Err(Error::Conversion { source, .. }) => eprintln!("Bad body: {}", source),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport raised an I/O error; no response was obtained.
    #[error("Network error for {url}: {source}")]
    Network {
        /// The request URL.
        url: String,
        /// The transport's error.
        #[source]
        source: io::Error,
    },

    /// The server answered with a non-2xx status.
    ///
    /// The response body is buffered so it can be read or decoded with
    /// [`Error::body_as`].
    #[error("HTTP {} {} for {url}", .response.status().as_u16(), .response.reason())]
    Http {
        /// The request URL.
        url: String,
        /// The response, with a buffered body.
        response: Box<RawResponse>,
        /// The type a successful response would have had.
        success_type: TypeRef,
        /// The converter active for the call.
        converter: Arc<dyn Converter>,
    },

    /// Encoding the request body or decoding a 2xx response body failed.
    ///
    /// For decode failures the response body is removed: the converter may
    /// have consumed part of it.
    #[error("Conversion error for {url}: {source}")]
    Conversion {
        /// The request URL.
        url: String,
        /// The response, when the failure happened while decoding.
        response: Option<Box<RawResponse>>,
        /// The type the converter was asked for.
        success_type: TypeRef,
        /// The converter active for the call.
        converter: Arc<dyn Converter>,
        /// The converter's error.
        #[source]
        source: ConversionError,
    },

    /// Any other failure.
    #[error("Unexpected error for {url}: {source}")]
    Unexpected {
        /// The request URL, empty if the failure happened before resolution.
        url: String,
        /// The cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// A network error.
    pub fn network(url: impl Into<String>, source: io::Error) -> Self {
        Error::Network {
            url: url.into(),
            source,
        }
    }

    /// An unexpected error.
    pub fn unexpected(
        url: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Unexpected {
            url: url.into(),
            source: source.into(),
        }
    }

    /// The classified kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } => ErrorKind::Network,
            Error::Http { .. } => ErrorKind::Http,
            Error::Conversion { .. } => ErrorKind::Conversion,
            Error::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// The request URL.
    pub fn url(&self) -> &str {
        match self {
            Error::Network { url, .. }
            | Error::Http { url, .. }
            | Error::Conversion { url, .. }
            | Error::Unexpected { url, .. } => url,
        }
    }

    /// Returns the HTTP status code if a response was obtained.
    pub fn status(&self) -> Option<StatusCode> {
        self.response().map(RawResponse::status)
    }

    /// Returns the raw response if one was obtained.
    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            Error::Http { response, .. } => Some(response),
            Error::Conversion { response, .. } => response.as_deref(),
            _ => None,
        }
    }

    /// Returns the declared success type for HTTP and conversion errors.
    pub fn success_type(&self) -> Option<&TypeRef> {
        match self {
            Error::Http { success_type, .. } | Error::Conversion { success_type, .. } => {
                Some(success_type)
            }
            _ => None,
        }
    }

    /// Decodes the response body as the declared success type.
    ///
    /// # Errors
    ///
    /// See [`Error::body_as`].
    pub fn body(&self) -> std::result::Result<Option<Value>, ConversionError> {
        match self.success_type() {
            Some(ty) => self.body_as(ty),
            None => Ok(None),
        }
    }

    /// Decodes the response body as `ty` with the converter used for the call.
    ///
    /// Returns `Ok(None)` when there is no response, no body, or no
    /// converter (network and unexpected errors).
    ///
    /// # Errors
    ///
    /// Returns the converter's error if the body does not describe a `ty`.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::{Body, Error, JsonConverter, RawResponse, TypeRef};
    /// use http::StatusCode;
    /// use serde_json::json;
    /// use std::sync::Arc;
    ///
    /// let response = RawResponse::new(
    ///     "http://example.com/users",
    ///     StatusCode::BAD_REQUEST,
    ///     vec![],
    ///     Some(Body::from_bytes(Some("application/json"), r#"{"error":"name is required"}"#)),
    /// );
    /// let err = Error::Http {
    ///     url: "http://example.com/users".into(),
    ///     response: Box::new(response),
    ///     success_type: TypeRef::named("User"),
    ///     converter: Arc::new(JsonConverter),
    /// };
    ///
    /// let body = err.body_as(&TypeRef::named("ApiError")).unwrap();
    /// assert_eq!(body, Some(json!({"error": "name is required"})));
    /// ```
    pub fn body_as(&self, ty: &TypeRef) -> std::result::Result<Option<Value>, ConversionError> {
        let (response, converter) = match self {
            Error::Http {
                response,
                converter,
                ..
            } => (Some(&**response), converter),
            Error::Conversion {
                response,
                converter,
                ..
            } => (response.as_deref(), converter),
            _ => return Ok(None),
        };

        let Some(bytes) = response.and_then(RawResponse::body).and_then(|b| b.bytes()) else {
            return Ok(None);
        };
        let media_type = response.and_then(RawResponse::body).and_then(|b| b.media_type());
        let mut reader: &[u8] = bytes;
        converter.from_body(media_type, &mut reader, ty).map(Some)
    }
}

/// Hook that sees every classified failure exactly once before the caller.
///
/// The handler may return the same error or a replacement. Returning `None`
/// is itself reported as an [`ErrorKind::Unexpected`] failure.
///
/// # Examples
///
/// ```
/// use restbind::{Error, ErrorHandler};
///
/// struct Unauthorized;
///
/// impl ErrorHandler for Unauthorized {
///     fn handle_error(&self, error: Error) -> Option<Error> {
///         match error.status() {
///             Some(status) if status.as_u16() == 401 => {
///                 Some(Error::unexpected(error.url().to_string(), "session expired"))
///             }
///             _ => Some(error),
///         }
///     }
/// }
/// ```
pub trait ErrorHandler: Send + Sync {
    /// Returns the error to report in place of `error`.
    fn handle_error(&self, error: Error) -> Option<Error>;
}

/// The default handler: reports every error unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ErrorHandler for PassThrough {
    fn handle_error(&self, error: Error) -> Option<Error> {
        Some(error)
    }
}

impl<F> ErrorHandler for F
where
    F: Fn(Error) -> Option<Error> + Send + Sync,
{
    fn handle_error(&self, error: Error) -> Option<Error> {
        self(error)
    }
}

/// Errors raised while building a client or creating a service.
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    /// No endpoint was configured.
    #[error("Endpoint may not be null.")]
    MissingEndpoint,

    /// No transport was configured.
    #[error("Transport may not be null.")]
    MissingTransport,

    /// The service declares a parent service.
    #[error("Interface definitions must not extend other interfaces.")]
    InterfaceInheritance {
        /// The offending service.
        service: String,
    },

    /// Two methods share a name.
    #[error("{service}: method \"{method}\" is declared more than once")]
    DuplicateMethod {
        /// The offending service.
        service: String,
        /// The method name.
        method: String,
    },

    /// A method declaration is invalid.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The endpoint is not a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Any other invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A specialized `Result` type for remote calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::converter::JsonConverter;
    use serde_json::json;

    fn http_error(body: Option<Body>) -> Error {
        Error::Http {
            url: "http://h/x".into(),
            response: Box::new(RawResponse::new(
                "http://h/x",
                StatusCode::INTERNAL_SERVER_ERROR,
                vec![],
                body,
            )),
            success_type: TypeRef::named("Item"),
            converter: Arc::new(JsonConverter),
        }
    }

    #[test]
    fn test_accessors() {
        let err = http_error(None);
        assert_eq!(err.kind(), ErrorKind::Http);
        assert_eq!(err.url(), "http://h/x");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(err.success_type(), Some(&TypeRef::named("Item")));
        assert_eq!(err.to_string(), "HTTP 500 Internal Server Error for http://h/x");

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        let err = Error::network("http://h/y", timed_out);
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.status(), None);
        assert!(err.response().is_none());
        assert!(err.success_type().is_none());
    }

    #[test]
    fn test_body_decode() {
        let err = http_error(Some(Body::from_bytes(None, r#"{"code": 7}"#)));
        assert_eq!(err.body().unwrap(), Some(json!({"code": 7})));

        let err = http_error(None);
        assert_eq!(err.body().unwrap(), None);

        let err = http_error(Some(Body::from_bytes(None, "<html>")));
        assert!(err.body().is_err());
    }

    #[test]
    fn test_body_as_reports_converter_errors() {
        let err = Error::Conversion {
            url: "http://h/x".into(),
            response: Some(Box::new(RawResponse::new(
                "http://h/x",
                StatusCode::OK,
                vec![],
                Some(Body::from_bytes(None, "not json")),
            ))),
            success_type: TypeRef::named("Item"),
            converter: Arc::new(JsonConverter),
            source: ConversionError::new("bad body"),
        };
        let decoded: std::result::Result<Option<Value>, ConversionError> =
            err.body_as(&TypeRef::named("ApiError"));
        assert!(decoded.unwrap_err().message().contains("JSON"));

        let err = Error::network("http://h/x", io::Error::new(io::ErrorKind::Other, "reset"));
        assert_eq!(err.body_as(&TypeRef::named("ApiError")).unwrap(), None);
    }

    #[test]
    fn test_pass_through_and_closure_handlers() {
        let err = PassThrough.handle_error(http_error(None)).unwrap();
        assert_eq!(err.kind(), ErrorKind::Http);

        let replace = |e: Error| Some(Error::unexpected(e.url().to_string(), "replaced"));
        let err = replace.handle_error(http_error(None)).unwrap();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.url(), "http://h/x");
    }

    #[test]
    fn test_build_error_messages() {
        let err = BuildError::InterfaceInheritance {
            service: "Child".into(),
        };
        assert_eq!(err.to_string(), "Interface definitions must not extend other interfaces.");
    }
}
