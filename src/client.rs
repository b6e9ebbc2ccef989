//! Client configuration and generated services.
//!
//! The [`Client`] type holds the shared configuration and the descriptor
//! cache. [`Client::create`] turns a [`ServiceDefinition`] into a
//! [`Service`] whose methods are invoked by name.

use crate::callback::Callback;
use crate::converter::{Converter, JsonConverter};
use crate::descriptor::{ExecutionMode, MethodDescriptor, MethodId};
use crate::engine::Engine;
use crate::error::{BuildError, Error, ErrorHandler, PassThrough, Result};
use crate::executor::{Executor, SynchronousExecutor};
use crate::log::{Log, LogLevel, SharedLogLevel, TracingLog};
use crate::metadata::ServiceDefinition;
use crate::registry::Registry;
use crate::request::{Args, RequestInterceptor};
use crate::response::Response;
use crate::stream::Observable;
use crate::transport::Transport;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Supplies the base URL, consulted once per call.
///
/// Implement this for endpoints that change at runtime; fixed endpoints are
/// configured with [`ClientBuilder::endpoint`].
pub trait Endpoint: Send + Sync {
    /// The base URL for the next call.
    fn url(&self) -> String;
}

impl<F> Endpoint for F
where
    F: Fn() -> String + Send + Sync,
{
    fn url(&self) -> String {
        self()
    }
}

/// An endpoint that never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedEndpoint(String);

impl FixedEndpoint {
    /// Validates and wraps `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is not an absolute URL.
    pub fn new(url: impl AsRef<str>) -> std::result::Result<Self, BuildError> {
        Url::parse(url.as_ref())?;
        Ok(Self(url.as_ref().to_string()))
    }
}

impl Endpoint for FixedEndpoint {
    fn url(&self) -> String {
        self.0.clone()
    }
}

/// Turns service definitions into callable services.
///
/// The client is designed to be created once and shared. Cloning is cheap;
/// clones share configuration, log level and descriptor cache.
///
/// # Examples
///
/// ```no_run
/// use restbind::{Args, Client, MethodMetadata, ReqwestTransport, ServiceDefinition, TypeRef};
///
/// # fn example(handle: tokio::runtime::Handle) -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::builder()
///     .endpoint("https://api.example.com")?
///     .transport(ReqwestTransport::new(handle)?)
///     .build()?;
///
/// let users = client.create(
///     ServiceDefinition::new("Users").method(
///         MethodMetadata::new("user")
///             .get("/users/{id}")
///             .path("id")
///             .returns(TypeRef::named("User")),
///     ),
/// )?;
///
/// let response = users.call("user", Args::new().with(123))?;
/// println!("User: {}", response.data);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    engine: Arc<Engine>,
    registry: Registry,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.engine.endpoint.url())
            .field("log_level", &self.log_level())
            .field("descriptors", &self.inner.registry.len())
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a service from `definition`.
    ///
    /// Every method is compiled here, through the descriptor cache, so an
    /// invalid declaration fails now rather than on first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition extends another service, declares
    /// two methods with the same name, or contains an invalid method.
    pub fn create(
        &self,
        definition: ServiceDefinition,
    ) -> std::result::Result<Service, BuildError> {
        if !definition.parents.is_empty() {
            return Err(BuildError::InterfaceInheritance {
                service: definition.name,
            });
        }

        let mut methods = HashMap::with_capacity(definition.methods.len());
        for meta in &definition.methods {
            if methods.contains_key(meta.name()) {
                return Err(BuildError::DuplicateMethod {
                    service: definition.name.clone(),
                    method: meta.name().to_string(),
                });
            }
            let descriptor = self.inner.registry.get_or_compile(&definition.name, meta)?;
            methods.insert(meta.name().to_string(), descriptor);
        }

        tracing::debug!(
            service = %definition.name,
            methods = methods.len(),
            "Created service"
        );

        Ok(Service {
            name: definition.name,
            engine: Arc::clone(&self.inner.engine),
            methods,
        })
    }

    /// Returns the cached descriptor of a method, if it was compiled.
    pub fn descriptor(&self, service: &str, method: &str) -> Option<Arc<MethodDescriptor>> {
        self.inner.registry.get(&MethodId::new(service, method))
    }

    /// Changes the log level. Calls already in flight keep the level they
    /// started with.
    pub fn set_log_level(&self, level: LogLevel) {
        self.inner.engine.log_level.set(level);
    }

    /// The current log level.
    pub fn log_level(&self) -> LogLevel {
        self.inner.engine.log_level.get()
    }
}

/// A created service. Methods are invoked by name, with the call shape their
/// declaration dictates.
#[derive(Clone)]
pub struct Service {
    name: String,
    engine: Arc<Engine>,
    methods: HashMap<String, Arc<MethodDescriptor>>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &methods)
            .finish()
    }
}

impl Service {
    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor of `method`.
    pub fn descriptor(&self, method: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(method)
    }

    /// Calls a blocking method and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the classified failure, after the error handler has seen it.
    /// Calling an unknown method, or one declared with another call shape,
    /// is an unexpected error.
    pub fn call(&self, method: &str, args: Args) -> Result<Response<Value>> {
        match self.lookup(method, ExecutionMode::Blocking) {
            Ok(descriptor) => self.engine.execute_blocking(descriptor, args),
            Err(reason) => {
                let (tx, rx) = std::sync::mpsc::sync_channel(1);
                let url = self.engine.endpoint.url();
                self.engine.reject(
                    url.clone(),
                    Error::unexpected(url.clone(), reason),
                    Box::new(move |outcome| {
                        let _ = tx.send(outcome);
                    }),
                );
                rx.recv()
                    .unwrap_or_else(|_| Err(Error::unexpected(url, "call was not completed")))
            }
        }
    }

    /// Calls a callback method. The outcome reaches `callback` on the
    /// callback executor.
    pub fn enqueue(&self, method: &str, args: Args, callback: Box<dyn Callback>) {
        match self.lookup(method, ExecutionMode::Callback) {
            Ok(descriptor) => self.engine.enqueue(descriptor, args, callback),
            Err(reason) => {
                let url = self.engine.endpoint.url();
                let deliver = self.engine.callback_delivery(callback);
                self.engine.reject(url.clone(), Error::unexpected(url, reason), deliver);
            }
        }
    }

    /// Prepares a stream method. Nothing is sent until the returned
    /// [`Observable`] is subscribed.
    pub fn observe(&self, method: &str, args: Args) -> Observable {
        match self.lookup(method, ExecutionMode::Stream) {
            Ok(descriptor) => Observable::new(Arc::clone(&self.engine), descriptor, args),
            Err(reason) => Observable::rejected(Arc::clone(&self.engine), reason),
        }
    }

    /// Finds `method` and checks its call shape. The error is the reason the
    /// call is rejected; the endpoint is only consulted when it is reported.
    fn lookup(
        &self,
        method: &str,
        mode: ExecutionMode,
    ) -> std::result::Result<Arc<MethodDescriptor>, String> {
        let descriptor = self
            .methods
            .get(method)
            .ok_or_else(|| format!("{}: no method named \"{}\"", self.name, method))?;

        if descriptor.execution_mode() != mode {
            return Err(format!(
                "{} is a {} method and cannot be invoked as {}",
                descriptor.id(),
                descriptor.execution_mode(),
                mode
            ));
        }

        Ok(Arc::clone(descriptor))
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// An endpoint and a transport are required. Everything else has a default:
/// [`JsonConverter`], [`SynchronousExecutor`] for both executors, no request
/// interceptor, a pass-through error handler, [`TracingLog`] and
/// [`LogLevel::None`].
///
/// # Examples
///
/// ```no_run
/// use restbind::{ClientBuilder, LogLevel, ReqwestTransport, ThreadExecutor, TokioExecutor};
/// use std::time::Duration;
///
/// # fn example(handle: tokio::runtime::Handle) -> Result<(), restbind::BuildError> {
/// let client = ClientBuilder::new()
///     .endpoint("https://api.example.com")?
///     .transport(ReqwestTransport::with_timeout(handle.clone(), Duration::from_secs(30))?)
///     .http_executor(TokioExecutor::new(handle))
///     .callback_executor(ThreadExecutor::new())
///     .request_interceptor(|request: &mut restbind::RequestFacade<'_>| {
///         request.add_header("User-Agent", "my-app/1.0");
///     })
///     .log_level(LogLevel::Basic)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    endpoint: Option<Arc<dyn Endpoint>>,
    transport: Option<Arc<dyn Transport>>,
    converter: Arc<dyn Converter>,
    http_executor: Arc<dyn Executor>,
    callback_executor: Arc<dyn Executor>,
    interceptor: Option<Arc<dyn RequestInterceptor>>,
    error_handler: Arc<dyn ErrorHandler>,
    log: Arc<dyn Log>,
    log_level: LogLevel,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            transport: None,
            converter: Arc::new(JsonConverter),
            http_executor: Arc::new(SynchronousExecutor),
            callback_executor: Arc::new(SynchronousExecutor),
            interceptor: None,
            error_handler: Arc::new(PassThrough),
            log: Arc::new(TracingLog),
            log_level: LogLevel::None,
        }
    }

    /// Sets a fixed base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn endpoint(mut self, url: impl AsRef<str>) -> std::result::Result<Self, BuildError> {
        self.endpoint = Some(Arc::new(FixedEndpoint::new(url)?));
        Ok(self)
    }

    /// Sets an endpoint consulted on every call.
    pub fn dynamic_endpoint(mut self, endpoint: impl Endpoint + 'static) -> Self {
        self.endpoint = Some(Arc::new(endpoint));
        self
    }

    /// Sets the transport.
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Sets the body converter.
    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Arc::new(converter);
        self
    }

    /// Sets the executor that dispatches calls to the transport.
    pub fn http_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.http_executor = Arc::new(executor);
        self
    }

    /// Sets the executor that runs callbacks.
    pub fn callback_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.callback_executor = Arc::new(executor);
        self
    }

    /// Sets the hook run on every request before dispatch.
    pub fn request_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Sets the hook that sees every failure before the caller does.
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Sets the traffic log sink.
    pub fn log(mut self, log: impl Log + 'static) -> Self {
        self.log = Arc::new(log);
        self
    }

    /// Sets the initial log level.
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no endpoint or no transport was provided.
    pub fn build(self) -> std::result::Result<Client, BuildError> {
        let endpoint = self.endpoint.ok_or(BuildError::MissingEndpoint)?;
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;

        let engine = Engine {
            endpoint,
            transport,
            converter: self.converter,
            http_executor: self.http_executor,
            callback_executor: self.callback_executor,
            interceptor: self.interceptor,
            error_handler: self.error_handler,
            log: self.log,
            log_level: SharedLogLevel::new(self.log_level),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                engine: Arc::new(engine),
                registry: Registry::new(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
