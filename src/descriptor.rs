//! Compiled, immutable method descriptors.
//!
//! [`compile`] validates a [`MethodMetadata`] and normalizes it into a
//! [`MethodDescriptor`]. Descriptors are built once per method and shared by
//! every invocation of it (see [`registry`](crate::registry)).

use crate::metadata::{BindingKind, MethodMetadata, Parameter, ReturnShape, TypeRef};
use crate::request::Header;
use crate::resolver::{placeholders, TemplateError};
use http::{HeaderName, HeaderValue, Method};
use std::collections::HashSet;
use std::fmt;

/// Identity of a method: the service it belongs to and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodId {
    /// The service name.
    pub service: String,
    /// The method name.
    pub method: String,
}

impl MethodId {
    /// Creates a method identity.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// How the outcome of a call reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// The calling thread waits for the outcome.
    Blocking,
    /// The outcome is handed to a callback on the callback executor.
    Callback,
    /// The outcome is emitted by a single-element stream.
    Stream,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionMode::Blocking => "blocking",
            ExecutionMode::Callback => "callback",
            ExecutionMode::Stream => "stream",
        };
        f.write_str(name)
    }
}

/// How the body of a request is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// The verb carries no body.
    None,
    /// The single `Body` parameter is converted, if one is declared.
    Single,
    /// `Part` parameters become multipart sections.
    Multipart,
    /// `Field` parameters become a form-url-encoded body.
    FormUrlEncoded,
}

/// Reasons a method declaration cannot be compiled.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// No HTTP verb marker.
    #[error("{method}: HTTP method annotation is required (e.g., GET, POST)")]
    NoVerb {
        /// The offending method.
        method: MethodId,
    },

    /// More than one HTTP verb marker.
    #[error("{method}: only one HTTP method is allowed, found {found}")]
    MultipleVerbs {
        /// The offending method.
        method: MethodId,
        /// The verbs that were declared.
        found: String,
    },

    /// Multipart marker on a verb without a body.
    #[error("{method}: multipart can only be specified on HTTP methods with a body (e.g., POST)")]
    MultipartWithoutBody {
        /// The offending method.
        method: MethodId,
    },

    /// Form marker on a verb without a body.
    #[error(
        "{method}: form-url-encoded can only be specified on HTTP methods with a body (e.g., POST)"
    )]
    FormWithoutBody {
        /// The offending method.
        method: MethodId,
    },

    /// Multipart and form encoding together.
    #[error("{method}: only one encoding is allowed (multipart or form-url-encoded)")]
    ConflictingEncodings {
        /// The offending method.
        method: MethodId,
    },

    /// The path template does not start with `/`.
    #[error("{method}: URL path \"{path}\" must start with '/'")]
    RelativePath {
        /// The offending method.
        method: MethodId,
        /// The declared template.
        path: String,
    },

    /// The path template is malformed.
    #[error("{method}: {source}")]
    Template {
        /// The offending method.
        method: MethodId,
        /// What is wrong with the template.
        #[source]
        source: TemplateError,
    },

    /// A placeholder has no matching path parameter.
    #[error("{method}: URL placeholder {{{name}}} has no matching path parameter")]
    UnboundPlaceholder {
        /// The offending method.
        method: MethodId,
        /// The placeholder name.
        name: String,
    },

    /// A path parameter does not appear in the template.
    #[error("{method}: URL \"{path}\" does not contain {{{name}}}")]
    UnusedPathParameter {
        /// The offending method.
        method: MethodId,
        /// The declared template.
        path: String,
        /// The parameter name.
        name: String,
    },

    /// The same path parameter name is declared twice.
    #[error("{method}: path parameter \"{name}\" is declared more than once")]
    DuplicatePathParameter {
        /// The offending method.
        method: MethodId,
        /// The parameter name.
        name: String,
    },

    /// More than one body parameter.
    #[error("{method}: multiple body parameters found")]
    MultipleBodies {
        /// The offending method.
        method: MethodId,
    },

    /// A body parameter on a verb that carries no body.
    #[error("{method}: non-body HTTP method cannot contain a body parameter")]
    BodyOnNonBodyVerb {
        /// The offending method.
        method: MethodId,
    },

    /// A body parameter alongside form or multipart encoding.
    #[error("{method}: body parameters cannot be used with form or multipart encoding")]
    BodyWithEncoding {
        /// The offending method.
        method: MethodId,
    },

    /// A parameter kind that requires a specific encoding.
    #[error("{method}: {kind} parameter \"{name}\" can only be used with {required} encoding")]
    MisplacedParameter {
        /// The offending method.
        method: MethodId,
        /// The parameter name.
        name: String,
        /// The parameter kind.
        kind: BindingKind,
        /// The encoding the kind needs.
        required: &'static str,
    },

    /// Multipart method without parts.
    #[error("{method}: multipart method must contain at least one part")]
    NoParts {
        /// The offending method.
        method: MethodId,
    },

    /// Form method without fields.
    #[error("{method}: form-url-encoded method must contain at least one field")]
    NoFields {
        /// The offending method.
        method: MethodId,
    },

    /// Both a return value and a trailing callback.
    #[error("{method}: must have return type or callback as last argument, not both")]
    CallbackAndReturn {
        /// The offending method.
        method: MethodId,
    },

    /// Neither a return value nor a trailing callback.
    #[error("{method}: must have either a return type or callback as last argument")]
    NoReturnOrCallback {
        /// The offending method.
        method: MethodId,
    },

    /// Streaming marker on a non-raw response type.
    #[error("{method}: only methods returning the raw response may be streaming")]
    StreamingWithoutRawResponse {
        /// The offending method.
        method: MethodId,
    },

    /// A static header that is not `Name: value`.
    #[error("{method}: header \"{header}\" must be in the form \"Name: Value\"")]
    MalformedHeader {
        /// The offending method.
        method: MethodId,
        /// The declared header.
        header: String,
    },

    /// The method was already compiled from a different declaration.
    #[error("{method}: already declared differently on this client")]
    ConflictingDeclaration {
        /// The offending method.
        method: MethodId,
    },
}

/// The normalized, immutable representation of one remote method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    id: MethodId,
    http_method: Method,
    has_body: bool,
    path_template: String,
    headers: Vec<Header>,
    parameters: Vec<Parameter>,
    body_encoding: BodyEncoding,
    execution_mode: ExecutionMode,
    response_type: TypeRef,
    streaming: bool,
}

impl MethodDescriptor {
    /// The method identity.
    pub fn id(&self) -> &MethodId {
        &self.id
    }

    /// The HTTP verb.
    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    /// Whether requests carry a body.
    pub fn has_body(&self) -> bool {
        self.has_body
    }

    /// The path template, e.g. `/category/{cat}`.
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Static headers, in declaration order.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The bound parameters, in declaration order. A trailing callback is
    /// not a parameter.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// How the request body is produced.
    pub fn body_encoding(&self) -> BodyEncoding {
        self.body_encoding
    }

    /// Whether the body is multipart.
    pub fn is_multipart(&self) -> bool {
        self.body_encoding == BodyEncoding::Multipart
    }

    /// How the outcome is delivered.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    /// The type the converter must produce on success.
    pub fn response_type(&self) -> &TypeRef {
        &self.response_type
    }

    /// Whether a raw response body is handed over unbuffered.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

/// Validates `meta` and builds its descriptor.
///
/// # Errors
///
/// Returns a [`DescriptorError`] if the declaration violates any descriptor
/// invariant: verb count, encoding markers, template placeholders, body
/// parameters, or the call shape.
///
/// # Examples
///
/// ```
/// use restbind::descriptor::{compile, ExecutionMode};
/// use restbind::{MethodMetadata, TypeRef};
///
/// let meta = MethodMetadata::new("user")
///     .get("/users/{id}")
///     .path("id")
///     .returns(TypeRef::named("User"));
/// let descriptor = compile("Users", &meta).unwrap();
///
/// assert_eq!(descriptor.execution_mode(), ExecutionMode::Blocking);
/// assert!(!descriptor.has_body());
/// ```
pub fn compile(service: &str, meta: &MethodMetadata) -> Result<MethodDescriptor, DescriptorError> {
    let id = MethodId::new(service, meta.name.clone());

    let verb = match meta.verbs.as_slice() {
        [] => return Err(DescriptorError::NoVerb { method: id }),
        [verb] => verb,
        verbs => {
            let found = verbs
                .iter()
                .map(|v| v.method.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DescriptorError::MultipleVerbs { method: id, found });
        }
    };

    let body_encoding = body_encoding(&id, meta, verb.has_body)?;
    check_template(&id, &verb.path, &meta.params)?;
    check_parameters(&id, &meta.params, body_encoding)?;
    let (execution_mode, response_type) = execution_shape(&id, meta)?;

    if meta.streaming && !response_type.is_raw() {
        return Err(DescriptorError::StreamingWithoutRawResponse { method: id });
    }

    let headers = meta
        .headers
        .iter()
        .map(|raw| parse_header(&id, raw))
        .collect::<Result<Vec<_>, _>>()?;

    if verb.has_body
        && meta
            .params
            .iter()
            .any(|p| p.kind == BindingKind::QueryParameter || p.kind == BindingKind::Raw)
    {
        tracing::warn!(
            method = %id,
            verb = %verb.method,
            "query parameters are only appended for verbs without a body"
        );
    }

    tracing::debug!(
        method = %id,
        verb = %verb.method,
        path = %verb.path,
        mode = %execution_mode,
        "Compiled method descriptor"
    );

    Ok(MethodDescriptor {
        id,
        http_method: verb.method.clone(),
        has_body: verb.has_body,
        path_template: verb.path.clone(),
        headers,
        parameters: meta.params.clone(),
        body_encoding,
        execution_mode,
        response_type,
        streaming: meta.streaming,
    })
}

fn body_encoding(
    id: &MethodId,
    meta: &MethodMetadata,
    has_body: bool,
) -> Result<BodyEncoding, DescriptorError> {
    match (meta.multipart, meta.form_url_encoded) {
        (true, true) => Err(DescriptorError::ConflictingEncodings { method: id.clone() }),
        (true, false) if !has_body => {
            Err(DescriptorError::MultipartWithoutBody { method: id.clone() })
        }
        (false, true) if !has_body => Err(DescriptorError::FormWithoutBody { method: id.clone() }),
        (true, false) => Ok(BodyEncoding::Multipart),
        (false, true) => Ok(BodyEncoding::FormUrlEncoded),
        (false, false) if has_body => Ok(BodyEncoding::Single),
        (false, false) => Ok(BodyEncoding::None),
    }
}

fn check_template(id: &MethodId, path: &str, params: &[Parameter]) -> Result<(), DescriptorError> {
    if !path.starts_with('/') {
        return Err(DescriptorError::RelativePath {
            method: id.clone(),
            path: path.to_string(),
        });
    }

    let names = placeholders(path).map_err(|source| DescriptorError::Template {
        method: id.clone(),
        source,
    })?;

    let mut path_params = HashSet::new();
    for param in params.iter().filter(|p| p.kind == BindingKind::PathSubstitution) {
        if !path_params.insert(param.name.as_str()) {
            return Err(DescriptorError::DuplicatePathParameter {
                method: id.clone(),
                name: param.name.clone(),
            });
        }
        if !names.contains(&param.name.as_str()) {
            return Err(DescriptorError::UnusedPathParameter {
                method: id.clone(),
                path: path.to_string(),
                name: param.name.clone(),
            });
        }
    }

    if let Some(name) = names.iter().find(|name| !path_params.contains(*name)) {
        return Err(DescriptorError::UnboundPlaceholder {
            method: id.clone(),
            name: (*name).to_string(),
        });
    }

    Ok(())
}

fn check_parameters(
    id: &MethodId,
    params: &[Parameter],
    encoding: BodyEncoding,
) -> Result<(), DescriptorError> {
    let mut bodies = 0;
    let mut parts = 0;
    let mut fields = 0;

    for param in params {
        match param.kind {
            BindingKind::Body => {
                match encoding {
                    BodyEncoding::None => {
                        return Err(DescriptorError::BodyOnNonBodyVerb { method: id.clone() })
                    }
                    BodyEncoding::Multipart | BodyEncoding::FormUrlEncoded => {
                        return Err(DescriptorError::BodyWithEncoding { method: id.clone() })
                    }
                    BodyEncoding::Single => {}
                }
                bodies += 1;
                if bodies > 1 {
                    return Err(DescriptorError::MultipleBodies { method: id.clone() });
                }
            }
            BindingKind::Part => {
                if encoding != BodyEncoding::Multipart {
                    return Err(misplaced(id, param, "multipart"));
                }
                parts += 1;
            }
            BindingKind::Field => {
                if encoding != BodyEncoding::FormUrlEncoded {
                    return Err(misplaced(id, param, "form-url-encoded"));
                }
                fields += 1;
            }
            BindingKind::PathSubstitution
            | BindingKind::QueryParameter
            | BindingKind::Header
            | BindingKind::Raw => {}
        }
    }

    match encoding {
        BodyEncoding::Multipart if parts == 0 => {
            Err(DescriptorError::NoParts { method: id.clone() })
        }
        BodyEncoding::FormUrlEncoded if fields == 0 => {
            Err(DescriptorError::NoFields { method: id.clone() })
        }
        _ => Ok(()),
    }
}

fn misplaced(id: &MethodId, param: &Parameter, required: &'static str) -> DescriptorError {
    DescriptorError::MisplacedParameter {
        method: id.clone(),
        name: param.name.clone(),
        kind: param.kind,
        required,
    }
}

fn execution_shape(
    id: &MethodId,
    meta: &MethodMetadata,
) -> Result<(ExecutionMode, TypeRef), DescriptorError> {
    match (&meta.returns, &meta.callback) {
        (ReturnShape::Unit, Some(ty)) => Ok((ExecutionMode::Callback, ty.clone())),
        (ReturnShape::Stream(ty), None) => Ok((ExecutionMode::Stream, ty.clone())),
        (ReturnShape::Value(ty), None) => Ok((ExecutionMode::Blocking, ty.clone())),
        (ReturnShape::Unit, None) => {
            Err(DescriptorError::NoReturnOrCallback { method: id.clone() })
        }
        (ReturnShape::Value(_) | ReturnShape::Stream(_), Some(_)) => {
            Err(DescriptorError::CallbackAndReturn { method: id.clone() })
        }
    }
}

fn parse_header(id: &MethodId, raw: &str) -> Result<Header, DescriptorError> {
    let malformed = || DescriptorError::MalformedHeader {
        method: id.clone(),
        header: raw.to_string(),
    };

    let (name, value) = raw.split_once(':').ok_or_else(malformed)?;
    let (name, value) = (name.trim(), value.trim());
    if HeaderName::try_from(name).is_err() || HeaderValue::try_from(value).is_err() {
        return Err(malformed());
    }
    Ok(Header::new(name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_one(meta: MethodMetadata) -> Result<MethodDescriptor, DescriptorError> {
        compile("Example", &meta)
    }

    #[test]
    fn test_blocking_get() {
        let descriptor = compile_one(
            MethodMetadata::new("list")
                .get("/category/{cat}")
                .path("cat")
                .query("page")
                .header("Foo: Bar")
                .returns(TypeRef::named("Items")),
        )
        .unwrap();

        assert_eq!(descriptor.id(), &MethodId::new("Example", "list"));
        assert_eq!(descriptor.http_method(), &Method::GET);
        assert!(!descriptor.has_body());
        assert_eq!(descriptor.body_encoding(), BodyEncoding::None);
        assert_eq!(descriptor.execution_mode(), ExecutionMode::Blocking);
        assert_eq!(descriptor.response_type(), &TypeRef::named("Items"));
        assert_eq!(descriptor.headers(), &[Header::new("Foo", "Bar")]);
        assert_eq!(descriptor.parameters().len(), 2);
    }

    #[test]
    fn test_execution_modes() {
        let callback = compile_one(MethodMetadata::new("a").get("/").callback(TypeRef::named("S")));
        assert_eq!(callback.unwrap().execution_mode(), ExecutionMode::Callback);

        let stream =
            compile_one(MethodMetadata::new("b").get("/").returns_stream(TypeRef::named("S")));
        assert_eq!(stream.unwrap().execution_mode(), ExecutionMode::Stream);

        let both = compile_one(
            MethodMetadata::new("c")
                .get("/")
                .returns(TypeRef::named("S"))
                .callback(TypeRef::named("S")),
        );
        assert!(matches!(both, Err(DescriptorError::CallbackAndReturn { .. })));

        let neither = compile_one(MethodMetadata::new("d").get("/"));
        assert!(matches!(neither, Err(DescriptorError::NoReturnOrCallback { .. })));
    }

    #[test]
    fn test_verb_count() {
        let none = compile_one(MethodMetadata::new("a").returns(TypeRef::default()));
        assert!(matches!(none, Err(DescriptorError::NoVerb { .. })));

        let two = compile_one(
            MethodMetadata::new("a")
                .get("/")
                .post("/")
                .returns(TypeRef::default()),
        );
        match two {
            Err(DescriptorError::MultipleVerbs { found, .. }) => assert_eq!(found, "GET, POST"),
            other => panic!("Expected MultipleVerbs, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_verb_body_override() {
        let descriptor = compile_one(
            MethodMetadata::new("report")
                .verb(Method::from_bytes(b"REPORT").unwrap(), "/r", true)
                .body("query")
                .returns(TypeRef::default()),
        )
        .unwrap();

        assert!(descriptor.has_body());
        assert_eq!(descriptor.body_encoding(), BodyEncoding::Single);
    }

    #[test]
    fn test_multipart_requires_body_verb() {
        let result = compile_one(
            MethodMetadata::new("a")
                .get("/")
                .multipart()
                .part("file")
                .returns(TypeRef::default()),
        );
        assert!(matches!(result, Err(DescriptorError::MultipartWithoutBody { .. })));

        let ok = compile_one(
            MethodMetadata::new("a")
                .post("/")
                .multipart()
                .part("file")
                .part("name")
                .returns(TypeRef::default()),
        )
        .unwrap();
        assert!(ok.is_multipart());
    }

    #[test]
    fn test_placeholder_must_be_bound() {
        let result = compile_one(
            MethodMetadata::new("a")
                .get("/users/{id}")
                .query("id")
                .returns(TypeRef::default()),
        );
        match result {
            Err(DescriptorError::UnboundPlaceholder { name, .. }) => assert_eq!(name, "id"),
            other => panic!("Expected UnboundPlaceholder, got {:?}", other),
        }

        let unused = compile_one(
            MethodMetadata::new("a")
                .get("/users")
                .path("id")
                .returns(TypeRef::default()),
        );
        assert!(matches!(unused, Err(DescriptorError::UnusedPathParameter { .. })));

        let duplicate = compile_one(
            MethodMetadata::new("a")
                .get("/users/{id}")
                .path("id")
                .path("id")
                .returns(TypeRef::default()),
        );
        assert!(matches!(duplicate, Err(DescriptorError::DuplicatePathParameter { .. })));
    }

    #[test]
    fn test_placeholder_is_case_sensitive() {
        let result = compile_one(
            MethodMetadata::new("a")
                .get("/users/{ID}")
                .path("id")
                .returns(TypeRef::default()),
        );
        assert!(matches!(result, Err(DescriptorError::UnusedPathParameter { .. })));
    }

    #[test]
    fn test_body_rules() {
        let on_get =
            compile_one(MethodMetadata::new("a").get("/").body("b").returns(TypeRef::default()));
        assert!(matches!(on_get, Err(DescriptorError::BodyOnNonBodyVerb { .. })));

        let two = compile_one(
            MethodMetadata::new("a")
                .post("/")
                .body("b")
                .body("c")
                .returns(TypeRef::default()),
        );
        assert!(matches!(two, Err(DescriptorError::MultipleBodies { .. })));

        let with_form = compile_one(
            MethodMetadata::new("a")
                .post("/")
                .form_url_encoded()
                .field("f")
                .body("b")
                .returns(TypeRef::default()),
        );
        assert!(matches!(with_form, Err(DescriptorError::BodyWithEncoding { .. })));

        let stray_part =
            compile_one(MethodMetadata::new("a").post("/").part("p").returns(TypeRef::default()));
        assert!(matches!(stray_part, Err(DescriptorError::MisplacedParameter { .. })));

        let no_fields = compile_one(
            MethodMetadata::new("a")
                .post("/")
                .form_url_encoded()
                .returns(TypeRef::default()),
        );
        assert!(matches!(no_fields, Err(DescriptorError::NoFields { .. })));
    }

    #[test]
    fn test_streaming_requires_raw_response() {
        let result = compile_one(
            MethodMetadata::new("a")
                .get("/")
                .streaming()
                .returns(TypeRef::named("User")),
        );
        assert!(matches!(result, Err(DescriptorError::StreamingWithoutRawResponse { .. })));

        let ok = compile_one(MethodMetadata::new("a").get("/").streaming().returns(TypeRef::raw()))
            .unwrap();
        assert!(ok.is_streaming());
    }

    #[test]
    fn test_malformed_header() {
        let result = compile_one(
            MethodMetadata::new("a")
                .get("/")
                .header("NoColonHere")
                .returns(TypeRef::default()),
        );
        assert!(matches!(result, Err(DescriptorError::MalformedHeader { .. })));
    }

    #[test]
    fn test_relative_path_rejected() {
        let result = compile_one(MethodMetadata::new("a").get("users").returns(TypeRef::default()));
        assert!(matches!(result, Err(DescriptorError::RelativePath { .. })));
    }
}
