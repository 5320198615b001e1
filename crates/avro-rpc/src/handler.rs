//! Message handlers.

use crate::call::Call;
use crate::error::HandlerError;
use crate::value::Value;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Result of handling one call.
pub type HandlerResult = Result<Value, HandlerError>;

/// Trait for handling calls to one message.
///
/// The decoded arguments are passed in explicitly; handlers do not reach for
/// any request-scoped state.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle a call, returning the response value or a failure.
    async fn handle(&self, call: Call) -> HandlerResult;
}

#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(Call) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, call: Call) -> HandlerResult {
        self(call)
    }
}

/// Adapts an async closure into a [`MessageHandler`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a handler.
///
/// ```
/// use avro_rpc::{Call, HandlerError, Value, handler_fn};
///
/// let echo = handler_fn(|call: Call| async move {
///     Ok::<_, HandlerError>(call.arg("arg1").cloned().unwrap_or(Value::Null))
/// });
/// # let _ = echo;
/// ```
pub const fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, call: Call) -> HandlerResult {
        (self.f)(call).await
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}
