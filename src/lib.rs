//! # Restbind - declarative HTTP API bindings
//!
//! Restbind turns a declarative description of a remote API into a callable
//! client. Each remote method is described once: HTTP verb, path template,
//! parameter bindings and call shape. The client then builds requests,
//! dispatches them through a pluggable transport, converts bodies, and reports
//! results the same way whether the caller blocks, passes a callback, or
//! subscribes to a stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use restbind::{Args, Client, MethodMetadata, ReqwestTransport, ServiceDefinition, TypeRef};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Item {
//!     id: u64,
//!     name: String,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = tokio::runtime::Runtime::new()?;
//!
//!     let client = Client::builder()
//!         .endpoint("https://api.example.com")?
//!         .transport(ReqwestTransport::new(runtime.handle().clone())?)
//!         .build()?;
//!
//!     let shop = client.create(
//!         ServiceDefinition::new("Shop").method(
//!             MethodMetadata::new("category")
//!                 .get("/category/{cat}")
//!                 .path("cat")
//!                 .query("page")
//!                 .returns(TypeRef::of::<Vec<Item>>()),
//!         ),
//!     )?;
//!
//!     // GET https://api.example.com/category/books?page=2
//!     let items = shop.call("category", Args::new().with("books").with(2))?;
//!     let items = items.decode::<Vec<Item>>()?;
//!     println!("{} items in {:?}", items.data.len(), items.latency);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Call shapes
//!
//! The declaration decides how a method is invoked:
//!
//! - **Blocking** (`returns`): [`Service::call`] waits for the outcome.
//! - **Callback** (`callback`): [`Service::enqueue`] returns immediately; the
//!   outcome reaches a [`Callback`] on the callback executor.
//! - **Stream** (`returns_stream`): [`Service::observe`] returns a cold
//!   [`Observable`]; each subscription sends one request and yields one item.
//!
//! All three share one pipeline: the same request assembly, the same error
//! classification, the same error handler and the same traffic log.
//!
//! ## Error Handling
//!
//! Failures are classified into four kinds. HTTP and conversion errors keep the
//! raw response and the declared success type:
//!
//! ```no_run
//! use restbind::{Args, Error, Service, TypeRef};
//!
//! # fn example(service: &Service) {
//! match service.call("create_user", Args::new().with(serde_json::json!({"name": ""}))) {
//!     Ok(response) => println!("Created: {}", response.data),
//!     Err(e @ Error::Http { .. }) => {
//!         let details = e.body_as(&TypeRef::named("ApiError"));
//!         eprintln!("HTTP {:?}: {:?}", e.status(), details);
//!     }
//!     Err(Error::Conversion { source, .. }) => eprintln!("Bad body: {}", source),
//!     Err(Error::Network { source, .. }) => eprintln!("Network: {}", source),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```
//!
//! ## Logging
//!
//! Structured diagnostics go through `tracing`. Traffic logging is separate
//! and level-gated: set a [`LogLevel`] on the client and each call writes
//! `--->`/`<---` lines to the configured [`Log`] sink (by default as `tracing`
//! events with target `restbind::http`).

pub mod body;
pub mod callback;
mod client;
pub mod converter;
pub mod descriptor;
mod engine;
mod error;
pub mod executor;
pub mod log;
pub mod metadata;
pub mod registry;
pub mod request;
pub mod resolver;
mod response;
pub mod stream;
pub mod transport;

pub use body::Body;
pub use callback::Callback;
pub use client::{Client, ClientBuilder, Endpoint, FixedEndpoint, Service};
pub use converter::{ConversionError, Converter, JsonConverter};
pub use descriptor::{ExecutionMode, MethodDescriptor, MethodId};
pub use engine::Outcome;
pub use error::{BuildError, Error, ErrorHandler, ErrorKind, PassThrough, Result};
pub use executor::{Executor, SynchronousExecutor, ThreadExecutor, TokioExecutor};
pub use log::{Log, LogLevel, TracingLog};
pub use metadata::{BindingKind, MethodMetadata, ServiceDefinition, TypeRef};
pub use request::{Args, Argument, Header, Request, RequestFacade, RequestInterceptor};
pub use response::{RawResponse, Response};
pub use stream::{Observable, ResponseStream};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResult};
