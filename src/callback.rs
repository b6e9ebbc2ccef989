//! Callbacks for [`Service::enqueue`](crate::Service::enqueue).

use crate::error::Error;
use crate::response::Response;
use serde_json::Value;

/// Receives the outcome of an enqueued call. Exactly one of the two methods
/// is invoked, exactly once, on the client's callback executor.
pub trait Callback: Send + 'static {
    /// The call succeeded.
    fn success(self: Box<Self>, response: Response<Value>);

    /// The call failed.
    fn failure(self: Box<Self>, error: Error);
}

struct FnCallback<S, F> {
    on_success: S,
    on_failure: F,
}

impl<S, F> Callback for FnCallback<S, F>
where
    S: FnOnce(Response<Value>) + Send + 'static,
    F: FnOnce(Error) + Send + 'static,
{
    fn success(self: Box<Self>, response: Response<Value>) {
        (self.on_success)(response)
    }

    fn failure(self: Box<Self>, error: Error) {
        (self.on_failure)(error)
    }
}

/// Builds a [`Callback`] from two closures.
///
/// # Examples
///
/// ```
/// use restbind::callback;
///
/// let cb = callback::from_fn(
///     |response| println!("got {}", response.data),
///     |error| eprintln!("failed: {}", error),
/// );
/// # let _ = cb;
/// ```
pub fn from_fn<S, F>(on_success: S, on_failure: F) -> Box<dyn Callback>
where
    S: FnOnce(Response<Value>) + Send + 'static,
    F: FnOnce(Error) + Send + 'static,
{
    Box::new(FnCallback {
        on_success,
        on_failure,
    })
}

/// Builds a [`Callback`] from one closure receiving the call's result.
pub fn from_result<R>(on_result: R) -> Box<dyn Callback>
where
    R: FnOnce(Result<Response<Value>, Error>) + Send + 'static,
{
    struct ResultCallback<R>(R);

    impl<R> Callback for ResultCallback<R>
    where
        R: FnOnce(Result<Response<Value>, Error>) + Send + 'static,
    {
        fn success(self: Box<Self>, response: Response<Value>) {
            (self.0)(Ok(response))
        }

        fn failure(self: Box<Self>, error: Error) {
            (self.0)(Err(error))
        }
    }

    Box::new(ResultCallback(on_result))
}
