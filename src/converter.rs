//! The converter boundary: objects to wire bodies and back.
//!
//! The engine works with [`serde_json::Value`] as its object model. A
//! [`Converter`] decides the wire format; [`JsonConverter`] is the default.

use crate::body::{decode_text, parse_charset, Body};
use crate::metadata::TypeRef;
use serde_json::Value;
use std::fmt;
use std::io::{BufRead, BufReader, Read};

/// Media type produced by [`JsonConverter`].
pub const JSON_MEDIA_TYPE: &str = "application/json; charset=UTF-8";

/// A body could not be encoded or decoded.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConversionError {
    /// A conversion error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// A conversion error caused by `source`.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Encodes objects into request bodies and decodes response bodies.
///
/// Implementations must be thread-safe; one converter serves every call made
/// through a client.
///
/// # Examples
///
/// ```
/// use restbind::{Body, Converter, ConversionError, TypeRef};
/// use serde_json::Value;
/// use std::io::Read;
///
/// #[derive(Debug)]
/// struct PlainText;
///
/// impl Converter for PlainText {
///     fn from_body(
///         &self,
///         _media_type: Option<&str>,
///         body: &mut dyn Read,
///         _target: &TypeRef,
///     ) -> Result<Value, ConversionError> {
///         let mut text = String::new();
///         body.read_to_string(&mut text)
///             .map_err(|e| ConversionError::with_source("not UTF-8", e))?;
///         Ok(Value::String(text))
///     }
///
///     fn to_body(&self, value: &Value) -> Result<Body, ConversionError> {
///         Ok(Body::from_bytes(Some("text/plain; charset=UTF-8"), value.to_string()))
///     }
/// }
/// ```
pub trait Converter: fmt::Debug + Send + Sync {
    /// Decodes a response body into a value of type `target`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] if the body does not describe a `target`.
    fn from_body(
        &self,
        media_type: Option<&str>,
        body: &mut dyn Read,
        target: &TypeRef,
    ) -> Result<Value, ConversionError>;

    /// Encodes `value` as a request body.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversionError`] if `value` cannot be encoded.
    fn to_body(&self, value: &Value) -> Result<Body, ConversionError>;
}

/// JSON bodies through `serde_json`.
///
/// An empty response body decodes to [`Value::Null`]. Non-UTF-8 charsets
/// declared by the media type are transcoded before parsing.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConverter;

impl Converter for JsonConverter {
    fn from_body(
        &self,
        media_type: Option<&str>,
        body: &mut dyn Read,
        target: &TypeRef,
    ) -> Result<Value, ConversionError> {
        let parse_failed = |e: serde_json::Error| {
            ConversionError::with_source(format!("body is not valid JSON for {target}"), e)
        };

        let charset = parse_charset(media_type, "UTF-8");
        if !charset.eq_ignore_ascii_case("UTF-8") {
            let mut bytes = Vec::new();
            body.read_to_end(&mut bytes)
                .map_err(|e| ConversionError::with_source("unable to read body", e))?;
            let text = decode_text(&bytes, media_type);
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(parse_failed);
        }

        let mut reader = BufReader::new(body);
        let empty = reader
            .fill_buf()
            .map_err(|e| ConversionError::with_source("unable to read body", e))?
            .is_empty();
        if empty {
            return Ok(Value::Null);
        }
        serde_json::from_reader(reader).map_err(parse_failed)
    }

    fn to_body(&self, value: &Value) -> Result<Body, ConversionError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| ConversionError::with_source("unable to encode JSON body", e))?;
        Ok(Body::from_bytes(Some(JSON_MEDIA_TYPE), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn decode(media_type: Option<&str>, bytes: &[u8]) -> Result<Value, ConversionError> {
        JsonConverter.from_body(media_type, &mut Cursor::new(bytes.to_vec()), &TypeRef::default())
    }

    #[test]
    fn test_decode_json() {
        let value = decode(Some("application/json"), br#"{"id": 1, "name": "Jake"}"#).unwrap();
        assert_eq!(value, json!({"id": 1, "name": "Jake"}));
    }

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(decode(None, b"").unwrap(), Value::Null);
    }

    #[test]
    fn test_malformed_body() {
        let err = decode(None, b"{not json").unwrap_err();
        assert!(err.message().contains("not valid JSON"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_decode_latin1() {
        let latin1 = [b'"', 0xE9, b'"'];
        let value = decode(Some("application/json; charset=ISO-8859-1"), &latin1).unwrap();
        assert_eq!(value, json!("é"));
    }

    #[test]
    fn test_encode_json() {
        let body = JsonConverter.to_body(&json!({"a": [1, 2]})).unwrap();
        assert_eq!(body.media_type(), Some(JSON_MEDIA_TYPE));
        assert_eq!(body.text().as_deref(), Some(r#"{"a":[1,2]}"#));
    }
}
