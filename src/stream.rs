//! Single-element streams for methods declared with a stream return.

use crate::descriptor::MethodDescriptor;
use crate::engine::{Engine, Outcome};
use crate::error::Error;
use crate::request::Args;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

enum Source {
    Ready {
        engine: Arc<Engine>,
        descriptor: Arc<MethodDescriptor>,
        args: Args,
    },
    Rejected {
        engine: Arc<Engine>,
        reason: String,
    },
}

/// A cold, single-shot call. Nothing is sent until [`Observable::subscribe`].
///
/// Subscribing consumes the observable, so each one dispatches at most once.
/// Arguments may carry one-shot body readers and cannot be replayed; call
/// [`Service::observe`](crate::Service::observe) again for another dispatch.
///
/// # Examples
///
/// ```no_run
/// use futures::StreamExt;
/// use restbind::{Args, Service};
///
/// # async fn example(service: &Service) {
/// let mut stream = service.observe("user", Args::new().with(42)).subscribe();
/// match stream.next().await {
///     Some(Ok(response)) => println!("User: {}", response.data),
///     Some(Err(e)) => eprintln!("Failed: {}", e),
///     None => unreachable!("a subscription always yields one item"),
/// }
/// # }
/// ```
pub struct Observable {
    source: Source,
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.source {
            Source::Ready { descriptor, .. } => descriptor.id().to_string(),
            Source::Rejected { reason, .. } => format!("rejected: {reason}"),
        };
        f.debug_struct("Observable").field("source", &state).finish()
    }
}

impl Observable {
    pub(crate) fn new(engine: Arc<Engine>, descriptor: Arc<MethodDescriptor>, args: Args) -> Self {
        Self {
            source: Source::Ready {
                engine,
                descriptor,
                args,
            },
        }
    }

    pub(crate) fn rejected(engine: Arc<Engine>, reason: String) -> Self {
        Self {
            source: Source::Rejected { engine, reason },
        }
    }

    /// Dispatches the call and returns a stream yielding its outcome once.
    ///
    /// The outcome is sent straight to the stream; the callback executor is
    /// not involved. Failures have already passed through the error handler.
    pub fn subscribe(self) -> ResponseStream {
        let (tx, rx) = oneshot::channel();
        let deliver = Box::new(move |outcome: Outcome| {
            let _ = tx.send(outcome);
        });

        match self.source {
            Source::Ready {
                engine,
                descriptor,
                args,
            } => engine.invoke(descriptor, args, deliver),
            Source::Rejected { engine, reason } => {
                let url = engine.endpoint.url();
                engine.reject(url.clone(), Error::unexpected(url, reason), deliver)
            }
        }

        ResponseStream { receiver: Some(rx) }
    }
}

/// The stream returned by [`Observable::subscribe`]: one `Ok` or `Err`
/// item, then the end of the stream.
#[derive(Debug)]
pub struct ResponseStream {
    receiver: Option<oneshot::Receiver<Outcome>>,
}

impl Stream for ResponseStream {
    type Item = Outcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Poll::Ready(None);
        };

        let outcome = match Pin::new(receiver).poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => Err(Error::unexpected(
                String::new(),
                "request abandoned before completion",
            )),
        };
        self.receiver = None;
        Poll::Ready(Some(outcome))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.receiver {
            Some(_) => (1, Some(1)),
            None => (0, Some(0)),
        }
    }
}
