//! Request and response bodies on the wire.
//!
//! A [`Body`] is either buffered bytes or a one-shot reader, tagged with a
//! media type and an optional length. The logging interceptor and the engine
//! buffer bodies with [`Body::buffer`] when they need to read them without
//! consuming them.

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;
use std::io::{self, Cursor, Read};

const MULTIPART_CRLF: &[u8] = b"\r\n";

/// Media type of form-url-encoded bodies.
pub const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// Where the bytes of a [`Body`] come from.
pub enum BodySource {
    /// Fully buffered content.
    Bytes(Bytes),
    /// Unread content, consumed at most once.
    Reader(Box<dyn Read + Send>),
}

/// A request or response body with its media type.
pub struct Body {
    media_type: Option<String>,
    length: Option<u64>,
    source: BodySource,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            BodySource::Bytes(bytes) => format!("{} buffered bytes", bytes.len()),
            BodySource::Reader(_) => "unbuffered reader".to_string(),
        };
        f.debug_struct("Body")
            .field("media_type", &self.media_type)
            .field("length", &self.length)
            .field("source", &source)
            .finish()
    }
}

impl Body {
    /// A buffered body.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::Body;
    ///
    /// let body = Body::from_bytes(Some("text/plain"), "hello");
    /// assert_eq!(body.length(), Some(5));
    /// assert_eq!(body.text().as_deref(), Some("hello"));
    /// ```
    pub fn from_bytes(media_type: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            media_type: media_type.map(str::to_string),
            length: Some(bytes.len() as u64),
            source: BodySource::Bytes(bytes),
        }
    }

    /// An unbuffered body backed by `reader`. `length` is `None` when unknown.
    pub fn from_reader(
        media_type: Option<&str>,
        length: Option<u64>,
        reader: impl Read + Send + 'static,
    ) -> Self {
        Self {
            media_type: media_type.map(str::to_string),
            length,
            source: BodySource::Reader(Box::new(reader)),
        }
    }

    /// The declared media type, e.g. `application/json; charset=UTF-8`.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// The length in bytes, if known.
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Returns `true` if the content is held in memory.
    pub fn is_buffered(&self) -> bool {
        matches!(self.source, BodySource::Bytes(_))
    }

    /// The buffered content, or `None` for an unbuffered body.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.source {
            BodySource::Bytes(bytes) => Some(bytes),
            BodySource::Reader(_) => None,
        }
    }

    /// The buffered content decoded with the media type's charset.
    pub fn text(&self) -> Option<String> {
        self.bytes()
            .map(|bytes| decode_text(bytes, self.media_type()))
    }

    /// Reads an unbuffered body fully into memory. Buffered bodies are
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised by the underlying reader.
    pub fn buffer(self) -> io::Result<Self> {
        match self.source {
            BodySource::Bytes(_) => Ok(self),
            BodySource::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Self {
                    media_type: self.media_type,
                    length: Some(buf.len() as u64),
                    source: BodySource::Bytes(Bytes::from(buf)),
                })
            }
        }
    }

    /// Consumes the body, returning a reader over its content.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self.source {
            BodySource::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            BodySource::Reader(reader) => reader,
        }
    }

    /// Splits the body into its media type and source.
    pub fn into_parts(self) -> (Option<String>, BodySource) {
        (self.media_type, self.source)
    }
}

/// Returns the `charset` parameter of `media_type`, or `default` when there
/// is none or the media type does not parse.
///
/// # Examples
///
/// ```
/// use restbind::body::parse_charset;
///
/// assert_eq!(parse_charset(Some("text/plain; charset=ISO-8859-1"), "UTF-8"), "ISO-8859-1");
/// assert_eq!(parse_charset(Some("application/json"), "UTF-8"), "UTF-8");
/// ```
pub fn parse_charset(media_type: Option<&str>, default: &str) -> String {
    media_type
        .and_then(|mt| mt.parse::<mime::Mime>().ok())
        .and_then(|mt| {
            mt.get_param(mime::CHARSET)
                .map(|charset| charset.as_str().trim_matches('"').to_string())
        })
        .filter(|charset| !charset.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Decodes `bytes` as text using the charset declared by `media_type`.
///
/// UTF-8, ISO-8859-1 and US-ASCII are decoded exactly; any other charset
/// falls back to lossy UTF-8.
pub fn decode_text(bytes: &[u8], media_type: Option<&str>) -> String {
    let charset = parse_charset(media_type, "UTF-8");
    if charset.eq_ignore_ascii_case("ISO-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else if charset.eq_ignore_ascii_case("US-ASCII") {
        bytes
            .iter()
            .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
            .collect()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Encodes `fields` as an `application/x-www-form-urlencoded` body.
pub fn form_body<'a>(fields: impl IntoIterator<Item = (&'a str, &'a str)>) -> Body {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in fields {
        serializer.append_pair(name, value);
    }
    Body::from_bytes(Some(FORM_URL_ENCODED), serializer.finish())
}

/// Builds a `multipart/form-data` body, one section per named part.
pub struct Multipart {
    boundary: String,
    content: Vec<u8>,
    parts: usize,
}

impl Multipart {
    /// Starts a multipart body with a random boundary.
    pub fn new() -> Self {
        let boundary: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        Self::with_boundary(boundary)
    }

    /// Starts a multipart body with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            content: Vec::new(),
            parts: 0,
        }
    }

    /// The boundary separating sections.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Appends one section. The part body is buffered.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while buffering an unbuffered part.
    pub fn add_part(&mut self, name: &str, body: Body) -> io::Result<()> {
        let body = body.buffer()?;
        let content = &mut self.content;

        content.extend_from_slice(b"--");
        content.extend_from_slice(self.boundary.as_bytes());
        content.extend_from_slice(MULTIPART_CRLF);
        content.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"").as_bytes(),
        );
        content.extend_from_slice(MULTIPART_CRLF);
        if let Some(media_type) = body.media_type() {
            content.extend_from_slice(format!("Content-Type: {media_type}").as_bytes());
            content.extend_from_slice(MULTIPART_CRLF);
        }
        let bytes = body.bytes().cloned().unwrap_or_default();
        content.extend_from_slice(format!("Content-Length: {}", bytes.len()).as_bytes());
        content.extend_from_slice(MULTIPART_CRLF);
        content.extend_from_slice(b"Content-Transfer-Encoding: binary");
        content.extend_from_slice(MULTIPART_CRLF);
        content.extend_from_slice(MULTIPART_CRLF);
        content.extend_from_slice(&bytes);
        content.extend_from_slice(MULTIPART_CRLF);

        self.parts += 1;
        Ok(())
    }

    /// The number of sections added so far.
    pub fn len(&self) -> usize {
        self.parts
    }

    /// Returns `true` if no section was added.
    pub fn is_empty(&self) -> bool {
        self.parts == 0
    }

    /// Closes the body.
    pub fn finish(mut self) -> Body {
        self.content.extend_from_slice(b"--");
        self.content.extend_from_slice(self.boundary.as_bytes());
        self.content.extend_from_slice(b"--");
        self.content.extend_from_slice(MULTIPART_CRLF);
        let media_type = format!("multipart/form-data; boundary={}", self.boundary);
        Body::from_bytes(Some(&media_type), self.content)
    }
}

impl Default for Multipart {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a reader and remembers the first I/O error it raised.
///
/// Converters see the error as usual; afterwards the caller can tell a
/// broken connection apart from a malformed body.
pub struct ExceptionCatchingReader<R> {
    inner: R,
    error: Option<io::Error>,
}

impl<R: Read> ExceptionCatchingReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner, error: None }
    }

    /// Returns `true` if the wrapped reader failed.
    pub fn threw(&self) -> bool {
        self.error.is_some()
    }

    /// Takes the recorded I/O error, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

impl<R: Read> Read for ExceptionCatchingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(io::Error::new(e.kind(), e.to_string()));
                }
                Err(e)
            }
        }
    }
}
