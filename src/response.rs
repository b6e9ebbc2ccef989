//! Raw transport responses and the successful call result.
//!
//! A [`RawResponse`] is what a [`Transport`](crate::Transport) hands back:
//! status, headers and an optional body. A [`Response`] wraps the converted
//! value together with the raw response it came from and the call latency.

use crate::body::Body;
use crate::request::Header;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// An HTTP response as produced by a transport.
#[derive(Debug)]
pub struct RawResponse {
    url: String,
    status: StatusCode,
    reason: String,
    headers: Vec<Header>,
    body: Option<Body>,
}

impl RawResponse {
    /// Creates a response. The reason phrase defaults to the canonical one
    /// for `status`.
    pub fn new(
        url: impl Into<String>,
        status: StatusCode,
        headers: Vec<Header>,
        body: Option<Body>,
    ) -> Self {
        Self {
            url: url.into(),
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        }
    }

    /// Overrides the reason phrase.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// The URL the response was received from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The reason phrase.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns `true` for a status in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The headers, in the order received.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The first header named `name`, compared case-insensitively.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::{Header, RawResponse};
    /// use http::StatusCode;
    ///
    /// let response = RawResponse::new(
    ///     "http://example.com/",
    ///     StatusCode::OK,
    ///     vec![Header::new("Content-Type", "application/json")],
    ///     None,
    /// );
    ///
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name().eq_ignore_ascii_case(name))
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

    /// The buffered body as text, if the body is buffered.
    pub fn text(&self) -> Option<String> {
        self.body.as_ref().and_then(Body::text)
    }

    pub(crate) fn replace_body(&mut self, body: Option<Body>) {
        self.body = body;
    }
}

/// A successful call.
///
/// Dereferences to the converted value; the raw response stays available
/// for headers and debugging. For methods declared with the raw-response
/// type the value is `null` and the content lives in [`Response::raw`].
///
/// # Examples
///
/// ```
/// use restbind::{RawResponse, Response};
/// use http::StatusCode;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let raw = RawResponse::new("http://example.com/n", StatusCode::OK, vec![], None);
/// let response = Response::new(json!(42), raw, Duration::from_millis(5));
///
/// let number = response.decode::<u32>().unwrap();
/// assert_eq!(number.data, 42);
/// assert_eq!(number.status(), StatusCode::OK);
/// ```
#[derive(Debug)]
pub struct Response<T> {
    /// The converted body.
    pub data: T,

    /// The response the value was converted from.
    pub raw: RawResponse,

    /// Time from dispatch until the response was received.
    pub latency: Duration,
}

impl<T> Response<T> {
    /// Creates a `Response`.
    pub fn new(data: T, raw: RawResponse, latency: Duration) -> Self {
        Self { data, raw, latency }
    }

    /// Maps the value, keeping the response metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw: self.raw,
            latency: self.latency,
        }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.raw.status()
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }
}

impl Response<Value> {
    /// Deserializes the value into `T`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the value does not describe a `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Response<T>, serde_json::Error> {
        Ok(Response {
            data: serde_json::from_value(self.data)?,
            raw: self.raw,
            latency: self.latency,
        })
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_reason_defaults_to_canonical() {
        let raw = RawResponse::new("http://h", StatusCode::NOT_FOUND, vec![], None);
        assert_eq!(raw.reason(), "Not Found");
        assert!(!raw.is_success());

        let raw = raw.with_reason("Nope");
        assert_eq!(raw.reason(), "Nope");
    }

    #[test]
    fn test_map_and_deref() {
        let raw = RawResponse::new(
            "http://h",
            StatusCode::OK,
            vec![Header::new("X-Id", "7")],
            Some(Body::from_bytes(None, "7")),
        );
        let response = Response::new(7, raw, Duration::from_millis(1)).map(|n| n * 2);

        assert_eq!(*response, 14);
        assert_eq!(response.header("x-id"), Some("7"));
        assert_eq!(response.raw.text().as_deref(), Some("7"));
    }

    #[test]
    fn test_decode_typed() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct User {
            id: u64,
        }

        let raw = RawResponse::new("http://h", StatusCode::OK, vec![], None);
        let ok = Response::new(json!({"id": 3}), raw, Duration::ZERO).decode::<User>().unwrap();
        assert_eq!(ok.data, User { id: 3 });

        let raw = RawResponse::new("http://h", StatusCode::OK, vec![], None);
        assert!(Response::new(json!("x"), raw, Duration::ZERO).decode::<User>().is_err());
    }
}
