//! Declarative method and service metadata.
//!
//! A [`MethodMetadata`] is the raw, unvalidated description of one remote
//! method: verb markers, path template, parameter bindings and the declared
//! call shape. It is turned into a [`MethodDescriptor`](crate::MethodDescriptor)
//! by [`compile`](crate::descriptor::compile).

use http::Method;
use std::borrow::Cow;
use std::fmt;

/// A declared type name.
///
/// Types are carried by name so that descriptors stay plain data. The
/// converter receives the declared response type and errors carry it so the
/// caller can attempt a typed re-decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef(Cow<'static, str>);

const RAW_RESPONSE: &str = "restbind::RawResponse";

impl TypeRef {
    /// A type referenced by an arbitrary name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The type name of `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// use restbind::TypeRef;
    ///
    /// assert_eq!(TypeRef::of::<String>().name(), "alloc::string::String");
    /// ```
    pub fn of<T: ?Sized>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// The raw-response sentinel: the caller wants the unconverted response.
    pub fn raw() -> Self {
        Self(Cow::Borrowed(RAW_RESPONSE))
    }

    /// Returns `true` for the raw-response sentinel.
    pub fn is_raw(&self) -> bool {
        self.0 == RAW_RESPONSE
    }

    /// The type name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for TypeRef {
    fn default() -> Self {
        Self::of::<serde_json::Value>()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a parameter value is used to build a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Replaces the `{name}` placeholder in the path template.
    PathSubstitution,
    /// Appended to the query string as `name=value`, URL-encoded.
    QueryParameter,
    /// Converted into the request body.
    Body,
    /// Sent as a request header named after the parameter.
    Header,
    /// Appended to the query string verbatim; the value is already encoded.
    Raw,
    /// One section of a multipart body.
    Part,
    /// One field of a form-url-encoded body.
    Field,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindingKind::PathSubstitution => "path",
            BindingKind::QueryParameter => "query",
            BindingKind::Body => "body",
            BindingKind::Header => "header",
            BindingKind::Raw => "encoded query",
            BindingKind::Part => "part",
            BindingKind::Field => "field",
        };
        f.write_str(name)
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// The binding name (placeholder, query key, header name, ...).
    pub name: String,
    /// How the value is bound.
    pub kind: BindingKind,
    /// The declared type of the argument.
    pub declared_type: TypeRef,
}

/// An HTTP verb marker with its relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbMarker {
    /// The HTTP method.
    pub method: Method,
    /// The path template, relative to the endpoint.
    pub path: String,
    /// Whether requests with this verb carry a body.
    pub has_body: bool,
}

/// The declared return shape of a method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReturnShape {
    /// Nothing is returned; the result must go to a trailing callback.
    #[default]
    Unit,
    /// A value of the given type is returned to the caller.
    Value(TypeRef),
    /// A single-element stream of the given type is returned.
    Stream(TypeRef),
}

/// Metadata for one remote method, as declared.
///
/// This type only records what was declared. Contradictions (two verbs, a
/// callback alongside a return value, ...) are reported when it is compiled.
///
/// # Examples
///
/// ```
/// use restbind::{MethodMetadata, TypeRef};
///
/// let meta = MethodMetadata::new("category_list")
///     .get("/category/{cat}")
///     .path("cat")
///     .query("page")
///     .returns(TypeRef::named("Vec<Item>"));
///
/// assert_eq!(meta.name(), "category_list");
/// assert_eq!(meta.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMetadata {
    pub(crate) name: String,
    pub(crate) verbs: Vec<VerbMarker>,
    pub(crate) headers: Vec<String>,
    pub(crate) params: Vec<Parameter>,
    pub(crate) returns: ReturnShape,
    pub(crate) callback: Option<TypeRef>,
    pub(crate) multipart: bool,
    pub(crate) form_url_encoded: bool,
    pub(crate) streaming: bool,
}

impl MethodMetadata {
    /// Starts the declaration of a method called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbs: Vec::new(),
            headers: Vec::new(),
            params: Vec::new(),
            returns: ReturnShape::Unit,
            callback: None,
            multipart: false,
            form_url_encoded: false,
            streaming: false,
        }
    }

    /// Adds a verb marker. Exactly one must be present when compiled.
    pub fn verb(mut self, method: Method, path: impl Into<String>, has_body: bool) -> Self {
        self.verbs.push(VerbMarker {
            method,
            path: path.into(),
            has_body,
        });
        self
    }

    /// Marks the method as `GET path`.
    pub fn get(self, path: impl Into<String>) -> Self {
        self.verb(Method::GET, path, false)
    }

    /// Marks the method as `HEAD path`.
    pub fn head(self, path: impl Into<String>) -> Self {
        self.verb(Method::HEAD, path, false)
    }

    /// Marks the method as `DELETE path`.
    pub fn delete(self, path: impl Into<String>) -> Self {
        self.verb(Method::DELETE, path, false)
    }

    /// Marks the method as `POST path`.
    pub fn post(self, path: impl Into<String>) -> Self {
        self.verb(Method::POST, path, true)
    }

    /// Marks the method as `PUT path`.
    pub fn put(self, path: impl Into<String>) -> Self {
        self.verb(Method::PUT, path, true)
    }

    /// Marks the method as `PATCH path`.
    pub fn patch(self, path: impl Into<String>) -> Self {
        self.verb(Method::PATCH, path, true)
    }

    /// Adds a static header in `Name: value` form.
    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }

    /// Declares the next parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        kind: BindingKind,
        declared_type: TypeRef,
    ) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            kind,
            declared_type,
        });
        self
    }

    /// Declares a path substitution parameter.
    pub fn path(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::PathSubstitution, TypeRef::default())
    }

    /// Declares a query parameter.
    pub fn query(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::QueryParameter, TypeRef::default())
    }

    /// Declares a query parameter whose values are already URL-encoded.
    pub fn encoded_query(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::Raw, TypeRef::default())
    }

    /// Declares the body parameter.
    pub fn body(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::Body, TypeRef::default())
    }

    /// Declares a per-call header parameter.
    pub fn header_param(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::Header, TypeRef::default())
    }

    /// Declares a multipart section parameter.
    pub fn part(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::Part, TypeRef::default())
    }

    /// Declares a form field parameter.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.param(name, BindingKind::Field, TypeRef::default())
    }

    /// Declares that the method returns a value of type `ty`.
    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.returns = ReturnShape::Value(ty);
        self
    }

    /// Declares that the method returns a single-element stream of `ty`.
    pub fn returns_stream(mut self, ty: TypeRef) -> Self {
        self.returns = ReturnShape::Stream(ty);
        self
    }

    /// Declares a trailing callback receiving values of type `ty`.
    pub fn callback(mut self, ty: TypeRef) -> Self {
        self.callback = Some(ty);
        self
    }

    /// Marks the body as multipart.
    pub fn multipart(mut self) -> Self {
        self.multipart = true;
        self
    }

    /// Marks the body as form-url-encoded.
    pub fn form_url_encoded(mut self) -> Self {
        self.form_url_encoded = true;
        self
    }

    /// Delivers the raw response body without buffering it first.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared parameters, in order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }
}

/// A named group of remote methods, the unit handed to
/// [`Client::create`](crate::Client::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub(crate) name: String,
    pub(crate) parents: Vec<String>,
    pub(crate) methods: Vec<MethodMetadata>,
}

impl ServiceDefinition {
    /// Starts a service definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Declares that this service extends another one.
    ///
    /// Services are composed, not inherited: a definition with a parent is
    /// rejected by [`Client::create`](crate::Client::create).
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Adds a method.
    pub fn method(mut self, method: MethodMetadata) -> Self {
        self.methods.push(method);
        self
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared methods.
    pub fn methods(&self) -> &[MethodMetadata] {
        &self.methods
    }
}
