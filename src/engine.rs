//! The execution engine shared by every call shape.
//!
//! One invocation goes through the same stages whatever the caller asked
//! for:
//!
//! 1. On the calling thread: read the log level once, consult the endpoint,
//!    resolve the URL, assemble and log the request.
//! 2. On the HTTP executor: hand the request to the transport.
//! 3. On transport completion: log the response, classify the status and
//!    convert the body.
//! 4. Pass any failure through the error handler, then deliver the outcome
//!    exactly once.
//!
//! Blocking, callback and stream delivery only differ in the last step.

use crate::body::{Body, ExceptionCatchingReader};
use crate::callback::Callback;
use crate::client::Endpoint;
use crate::converter::Converter;
use crate::descriptor::MethodDescriptor;
use crate::error::{Error, ErrorHandler, ErrorKind, Result};
use crate::executor::Executor;
use crate::log::{self, Log, LogLevel, SharedLogLevel};
use crate::request::{
    assemble, describe_args, Args, Argument, AssembleError, Request, RequestInterceptor,
};
use crate::resolver::resolve;
use crate::response::{RawResponse, Response};
use crate::transport::{Transport, TransportError, TransportResult};
use serde_json::Value;
use std::io;
use std::sync::{mpsc, Arc};
use std::time::Instant;

/// The terminal result of one invocation.
pub type Outcome = Result<Response<Value>>;

pub(crate) type Deliver = Box<dyn FnOnce(Outcome) + Send>;

const ABANDONED: &str = "request abandoned before completion";

/// Delivers an outcome exactly once. If dropped before
/// [`Completion::complete`] runs, it delivers an unexpected error instead.
struct Completion {
    url: String,
    finish: Option<Deliver>,
}

impl Completion {
    fn new(url: String, finish: Deliver) -> Self {
        Self {
            url,
            finish: Some(finish),
        }
    }

    fn complete(mut self, outcome: Outcome) {
        if let Some(finish) = self.finish.take() {
            finish(outcome);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(finish) = self.finish.take() {
            tracing::warn!(url = %self.url, "Request dropped before completion");
            finish(Err(Error::unexpected(std::mem::take(&mut self.url), ABANDONED)));
        }
    }
}

pub(crate) struct Engine {
    pub(crate) endpoint: Arc<dyn Endpoint>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) converter: Arc<dyn Converter>,
    pub(crate) http_executor: Arc<dyn Executor>,
    pub(crate) callback_executor: Arc<dyn Executor>,
    pub(crate) interceptor: Option<Arc<dyn RequestInterceptor>>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) log: Arc<dyn Log>,
    pub(crate) log_level: SharedLogLevel,
}

impl Engine {
    /// Runs one invocation and hands its outcome to `deliver`, exactly once.
    pub(crate) fn invoke(
        self: &Arc<Self>,
        descriptor: Arc<MethodDescriptor>,
        args: Args,
        deliver: Deliver,
    ) {
        let level = self.log_level.get();
        let base_url = self.endpoint.url();
        let completion = self.completion(base_url.clone(), level, deliver);

        let request = match self.prepare(&descriptor, &base_url, args.into_vec(), level) {
            Ok(request) => request,
            Err(e) => return completion.complete(Err(e)),
        };
        let mut completion = completion;
        completion.url = request.url().to_string();

        let engine = Arc::clone(self);
        self.http_executor.execute(Box::new(move || {
            let transport = Arc::clone(&engine.transport);
            let url = completion.url.clone();
            let started = Instant::now();
            transport.execute_async(
                request,
                Box::new(move |result| {
                    let outcome = engine.handle_response(&descriptor, &url, level, started, result);
                    completion.complete(outcome);
                }),
            );
        }));
    }

    /// Reports `error` as the outcome of an invocation that never started.
    pub(crate) fn reject(self: &Arc<Self>, url: String, error: Error, deliver: Deliver) {
        let level = self.log_level.get();
        self.completion(url, level, deliver).complete(Err(error));
    }

    /// Runs an invocation and waits for its outcome on the calling thread.
    pub(crate) fn execute_blocking(
        self: &Arc<Self>,
        descriptor: Arc<MethodDescriptor>,
        args: Args,
    ) -> Outcome {
        let (tx, rx) = mpsc::sync_channel(1);
        let url = descriptor.path_template().to_string();
        self.invoke(
            descriptor,
            args,
            Box::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        rx.recv()
            .unwrap_or_else(|_| Err(Error::unexpected(url, ABANDONED)))
    }

    /// Runs an invocation and delivers its outcome to `callback` on the
    /// callback executor.
    pub(crate) fn enqueue(
        self: &Arc<Self>,
        descriptor: Arc<MethodDescriptor>,
        args: Args,
        callback: Box<dyn Callback>,
    ) {
        let deliver = self.callback_delivery(callback);
        self.invoke(descriptor, args, deliver);
    }

    pub(crate) fn callback_delivery(&self, callback: Box<dyn Callback>) -> Deliver {
        let executor = Arc::clone(&self.callback_executor);
        Box::new(move |outcome| {
            executor.execute(Box::new(move || match outcome {
                Ok(response) => callback.success(response),
                Err(error) => callback.failure(error),
            }));
        })
    }

    fn completion(self: &Arc<Self>, url: String, level: LogLevel, deliver: Deliver) -> Completion {
        let engine = Arc::clone(self);
        Completion::new(
            url,
            Box::new(move |outcome| deliver(outcome.map_err(|e| engine.fail(level, e)))),
        )
    }

    /// The single failure path: trace, log, then the error handler.
    fn fail(&self, level: LogLevel, error: Error) -> Error {
        tracing::warn!(
            error = %error,
            kind = ?error.kind(),
            url = %error.url(),
            "Request failed"
        );

        if level.logs() && matches!(error.kind(), ErrorKind::Network | ErrorKind::Unexpected) {
            log::log_error(self.log.as_ref(), error.url(), &error);
        }

        let url = error.url().to_string();
        self.error_handler
            .handle_error(error)
            .unwrap_or_else(|| Error::unexpected(url, "error handler returned no replacement"))
    }

    fn prepare(
        &self,
        descriptor: &MethodDescriptor,
        base_url: &str,
        args: Vec<Argument>,
        level: LogLevel,
    ) -> Result<Request> {
        let url = resolve(base_url, descriptor, &args).map_err(|e| Error::unexpected(base_url, e))?;

        let arg_lines = if level >= LogLevel::HeadersAndArgs {
            describe_args(&args)
        } else {
            Vec::new()
        };

        let request = assemble(
            descriptor,
            url.clone(),
            args,
            self.interceptor.as_deref(),
            self.converter.as_ref(),
        )
        .map_err(|e| match e {
            AssembleError::Conversion { source, .. } => Error::Conversion {
                url: url.clone(),
                response: None,
                success_type: descriptor.response_type().clone(),
                converter: Arc::clone(&self.converter),
                source,
            },
            other => Error::unexpected(url.clone(), other),
        })?;

        tracing::debug!(
            method = %descriptor.id(),
            verb = %request.method(),
            url = %request.url(),
            mode = %descriptor.execution_mode(),
            "Dispatching request"
        );

        if !level.logs() {
            return Ok(request);
        }
        let url = request.url().to_string();
        log::log_and_replace_request(self.log.as_ref(), level, request, &arg_lines).map_err(|e| {
            Error::unexpected(
                url,
                io::Error::new(e.kind(), format!("Unable to buffer request while logging: {e}")),
            )
        })
    }

    fn handle_response(
        &self,
        descriptor: &MethodDescriptor,
        url: &str,
        level: LogLevel,
        started: Instant,
        result: TransportResult,
    ) -> Outcome {
        let latency = started.elapsed();
        let response = match result {
            Ok(response) => response,
            Err(TransportError::Io(e)) => return Err(Error::network(url, e)),
            Err(TransportError::Other(e)) => return Err(Error::unexpected(url, e)),
        };

        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            url = %url,
            "Received HTTP response"
        );

        let mut response = if level.logs() {
            log::log_and_replace_response(self.log.as_ref(), level, url, response, latency)
                .map_err(|e| Error::network(url, e))?
        } else {
            response
        };

        let success_type = descriptor.response_type();

        if !response.is_success() {
            buffer_body(&mut response).map_err(|e| Error::network(url, e))?;
            return Err(Error::Http {
                url: url.to_string(),
                response: Box::new(response),
                success_type: success_type.clone(),
                converter: Arc::clone(&self.converter),
            });
        }

        if success_type.is_raw() {
            if !descriptor.is_streaming() {
                buffer_body(&mut response).map_err(|e| Error::network(url, e))?;
            }
            return Ok(Response::new(Value::Null, response, latency));
        }

        let Some(body) = response.take_body() else {
            return Ok(Response::new(Value::Null, response, latency));
        };

        let media_type = body.media_type().map(str::to_string);
        let buffered = body.bytes().cloned();
        let mut reader = ExceptionCatchingReader::new(body.into_reader());

        match self
            .converter
            .from_body(media_type.as_deref(), &mut reader, success_type)
        {
            Ok(value) => {
                log::log_response_body(self.log.as_ref(), level, &value);
                if let Some(bytes) = buffered {
                    response.replace_body(Some(Body::from_bytes(media_type.as_deref(), bytes)));
                }
                Ok(Response::new(value, response, latency))
            }
            Err(source) => {
                if let Some(e) = reader.take_error() {
                    return Err(Error::network(url, e));
                }
                Err(Error::Conversion {
                    url: url.to_string(),
                    response: Some(Box::new(response)),
                    success_type: success_type.clone(),
                    converter: Arc::clone(&self.converter),
                    source,
                })
            }
        }
    }
}

fn buffer_body(response: &mut RawResponse) -> io::Result<()> {
    if let Some(body) = response.take_body() {
        response.replace_body(Some(body.buffer()?));
    }
    Ok(())
}
