//! Call arguments, transport-ready requests and request assembly.

use crate::body::{form_body, Body, Multipart};
use crate::converter::{ConversionError, Converter};
use crate::descriptor::{BodyEncoding, MethodDescriptor};
use crate::metadata::BindingKind;
use crate::resolver::query_texts;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::io;

/// One call-site argument.
#[derive(Debug)]
pub enum Argument {
    /// A plain value, bound according to its parameter's kind.
    Value(Value),
    /// An already-encoded body, sent without the converter.
    Encoded(Body),
}

impl Argument {
    /// The plain value, or `None` for a pre-encoded body.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Value(value) => Some(value),
            Argument::Encoded(_) => None,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(value) => write!(f, "{value}"),
            Argument::Encoded(body) => {
                write!(f, "{}", body.media_type().unwrap_or("application/octet-stream"))?;
                match body.length() {
                    Some(length) => write!(f, " ({length}-byte body)"),
                    None => f.write_str(" (unknown-length body)"),
                }
            }
        }
    }
}

/// The ordered arguments of one call, one per declared parameter.
///
/// # Examples
///
/// ```
/// use restbind::Args;
///
/// let args = Args::new().with("books").with(2).with_opt(None::<&str>);
/// assert_eq!(args.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct Args {
    args: Vec<Argument>,
}

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plain value.
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.args.push(Argument::Value(value.into()));
        self
    }

    /// Appends a value, or null for `None`.
    pub fn with_opt<V: Into<Value>>(self, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with(value),
            None => self.with_null(),
        }
    }

    /// Appends null.
    pub fn with_null(self) -> Self {
        self.with(Value::Null)
    }

    /// Appends any serializable value.
    ///
    /// # Errors
    ///
    /// Returns the serialization error if `value` cannot be represented.
    pub fn with_serialized<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(self.with(serde_json::to_value(value)?))
    }

    /// Appends an already-encoded body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.args.push(Argument::Encoded(body));
        self
    }

    /// The number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The arguments as a slice.
    pub fn as_slice(&self) -> &[Argument] {
        &self.args
    }

    /// Consumes the builder.
    pub fn into_vec(self) -> Vec<Argument> {
        self.args
    }
}

impl From<Vec<Argument>> for Args {
    fn from(args: Vec<Argument>) -> Self {
        Self { args }
    }
}

/// A header name and value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Creates a header.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The header name, as declared.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The header value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// A transport-ready request, owned by exactly one invocation.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: String,
    headers: Vec<Header>,
    body: Option<Body>,
}

impl Request {
    /// Creates a request.
    pub fn new(
        method: Method,
        url: impl Into<String>,
        headers: Vec<Header>,
        body: Option<Body>,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            headers,
            body,
        }
    }

    /// The HTTP verb.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The fully resolved URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The headers, in the order they were added.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(Header::value)
    }

    /// The body, if any.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Removes and returns the body.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    pub(crate) fn replace_body(&mut self, body: Option<Body>) {
        self.body = body;
    }
}

/// Mutable view of a request handed to a [`RequestInterceptor`].
///
/// Headers and query parameters may be added; the verb and body are out of
/// reach.
pub struct RequestFacade<'a> {
    url: &'a mut String,
    headers: &'a mut Vec<Header>,
}

impl RequestFacade<'_> {
    /// Adds a header, keeping any existing ones with the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push(Header::new(name, value));
    }

    /// Replaces every header named `name` with a single one.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|h| !h.name.eq_ignore_ascii_case(&name));
        self.headers.push(Header::new(name, value));
    }

    /// Appends a query parameter, URL-encoding name and value.
    pub fn add_query_param(&mut self, name: &str, value: &str) {
        let pair = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(name, value)
            .finish();
        self.push_query(&pair);
    }

    /// Appends a query parameter whose name and value are already encoded.
    pub fn add_encoded_query_param(&mut self, name: &str, value: &str) {
        self.push_query(&format!("{name}={value}"));
    }

    /// The URL as resolved so far.
    pub fn url(&self) -> &str {
        self.url
    }

    fn push_query(&mut self, pair: &str) {
        self.url.push(if self.url.contains('?') { '&' } else { '?' });
        self.url.push_str(pair);
    }
}

/// Hook invoked once per call, after headers are bound and before dispatch.
///
/// Typical uses are authentication and tracing headers.
///
/// # Examples
///
/// ```
/// use restbind::{RequestFacade, RequestInterceptor};
///
/// struct BearerAuth(String);
///
/// impl RequestInterceptor for BearerAuth {
///     fn intercept(&self, request: &mut RequestFacade<'_>) {
///         request.set_header("Authorization", format!("Bearer {}", self.0));
///     }
/// }
/// ```
pub trait RequestInterceptor: Send + Sync {
    /// Mutates the request under construction.
    fn intercept(&self, request: &mut RequestFacade<'_>);
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut RequestFacade<'_>) + Send + Sync,
{
    fn intercept(&self, request: &mut RequestFacade<'_>) {
        self(request)
    }
}

/// Reasons a request cannot be assembled.
#[derive(thiserror::Error, Debug)]
pub enum AssembleError {
    /// The converter failed to encode a body or part.
    #[error("unable to encode \"{name}\"")]
    Conversion {
        /// The parameter name.
        name: String,
        /// The converter's error.
        #[source]
        source: ConversionError,
    },

    /// The body argument was null.
    #[error("body parameter \"{0}\" value must not be null")]
    NullBody(String),

    /// A pre-encoded body where only plain values are accepted.
    #[error("{kind} parameter \"{name}\" cannot take a pre-encoded body")]
    EncodedValue {
        /// The parameter name.
        name: String,
        /// The parameter kind.
        kind: BindingKind,
    },

    /// Every part of a multipart body was null.
    #[error("multipart requests must contain at least one part")]
    EmptyMultipart,

    /// A part body could not be read.
    #[error("unable to read part \"{name}\"")]
    Io {
        /// The parameter name.
        name: String,
        /// The I/O error.
        #[source]
        source: io::Error,
    },
}

/// Builds the request of one invocation.
///
/// Static headers come first, then header-bound arguments (null values are
/// skipped, arrays add one header per element). The interceptor runs next,
/// and the body is encoded last.
///
/// # Errors
///
/// Returns an [`AssembleError`]; [`AssembleError::Conversion`] when the
/// converter rejects a body.
pub fn assemble(
    descriptor: &MethodDescriptor,
    mut url: String,
    args: Vec<Argument>,
    interceptor: Option<&dyn RequestInterceptor>,
    converter: &dyn Converter,
) -> Result<Request, AssembleError> {
    let params = descriptor.parameters();
    let mut headers = descriptor.headers().to_vec();

    for (param, arg) in params.iter().zip(&args) {
        if param.kind != BindingKind::Header {
            continue;
        }
        let value = arg.as_value().ok_or_else(|| AssembleError::EncodedValue {
            name: param.name.clone(),
            kind: param.kind,
        })?;
        for text in query_texts(value) {
            headers.push(Header::new(param.name.clone(), text));
        }
    }

    if let Some(interceptor) = interceptor {
        let mut facade = RequestFacade {
            url: &mut url,
            headers: &mut headers,
        };
        interceptor.intercept(&mut facade);
    }

    let body = match descriptor.body_encoding() {
        BodyEncoding::None => None,
        BodyEncoding::Single => single_body(descriptor, args, converter)?,
        BodyEncoding::FormUrlEncoded => Some(form(descriptor, &args)?),
        BodyEncoding::Multipart => Some(multipart(descriptor, args, converter)?),
    };

    Ok(Request::new(descriptor.http_method().clone(), url, headers, body))
}

fn single_body(
    descriptor: &MethodDescriptor,
    args: Vec<Argument>,
    converter: &dyn Converter,
) -> Result<Option<Body>, AssembleError> {
    let Some((param, arg)) = descriptor
        .parameters()
        .iter()
        .zip(args)
        .find(|(param, _)| param.kind == BindingKind::Body)
    else {
        return Ok(None);
    };

    match arg {
        Argument::Encoded(body) => Ok(Some(body)),
        Argument::Value(Value::Null) => Err(AssembleError::NullBody(param.name.clone())),
        Argument::Value(value) => converter
            .to_body(&value)
            .map(Some)
            .map_err(|source| AssembleError::Conversion {
                name: param.name.clone(),
                source,
            }),
    }
}

fn form(descriptor: &MethodDescriptor, args: &[Argument]) -> Result<Body, AssembleError> {
    let mut fields = Vec::new();
    for (param, arg) in descriptor.parameters().iter().zip(args) {
        if param.kind != BindingKind::Field {
            continue;
        }
        let value = arg.as_value().ok_or_else(|| AssembleError::EncodedValue {
            name: param.name.clone(),
            kind: param.kind,
        })?;
        for text in query_texts(value) {
            fields.push((param.name.as_str(), text));
        }
    }
    Ok(form_body(fields.iter().map(|(name, text)| (*name, text.as_str()))))
}

fn multipart(
    descriptor: &MethodDescriptor,
    args: Vec<Argument>,
    converter: &dyn Converter,
) -> Result<Body, AssembleError> {
    let mut multipart = Multipart::new();
    for (param, arg) in descriptor.parameters().iter().zip(args) {
        if param.kind != BindingKind::Part {
            continue;
        }
        let body = match arg {
            Argument::Encoded(body) => body,
            Argument::Value(Value::Null) => continue,
            Argument::Value(Value::String(text)) => {
                Body::from_bytes(Some("text/plain; charset=UTF-8"), text)
            }
            Argument::Value(value) => {
                converter
                    .to_body(&value)
                    .map_err(|source| AssembleError::Conversion {
                        name: param.name.clone(),
                        source,
                    })?
            }
        };
        multipart
            .add_part(&param.name, body)
            .map_err(|source| AssembleError::Io {
                name: param.name.clone(),
                source,
            })?;
    }

    if multipart.is_empty() {
        return Err(AssembleError::EmptyMultipart);
    }
    Ok(multipart.finish())
}

/// Renders the per-argument lines used by the `HeadersAndArgs` log level.
pub(crate) fn describe_args(args: &[Argument]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}
