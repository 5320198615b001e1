//! Server-side processing of a single call.

use crate::call::{decode_call, encode_declared_error, encode_remote_exception, encode_result};
use crate::dispatch::DispatchTable;
use crate::error::{Error, HandlerError, Result};
use crate::schema::validate;
use bytes::Bytes;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, instrument, warn};

/// Remote exception text for a result that does not match its response type.
pub const RESPONSE_SCHEMA_VIOLATION: &str = "Server response did not conform to its local schema.";

/// Where a [`Responder`] is in processing its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Nothing received yet.
    AwaitingCall,
    /// Decoding the call payload.
    Decoding,
    /// Waiting for the handler.
    Dispatching,
    /// Checking the handler's result against the response type.
    Validating,
    /// Writing the reply.
    Encoding,
    /// A success reply was produced.
    Done,
    /// The call failed. Absorbing.
    Errored,
}

impl CallState {
    /// Whether no further transitions are possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }
}

/// Decodes one call, dispatches it, validates the result and encodes the
/// reply.
///
/// Message-level failures (no handler, handler failure, response schema
/// violation) end in [`CallState::Errored`] but still produce a reply: a
/// remote exception, or a declared error. Only a malformed call or a failure
/// to encode is returned as an error.
#[derive(Debug)]
pub struct Responder<'a> {
    table: &'a DispatchTable,
    state: CallState,
}

impl<'a> Responder<'a> {
    /// Create a responder for one call against `table`.
    pub const fn new(table: &'a DispatchTable) -> Self {
        Self {
            table,
            state: CallState::AwaitingCall,
        }
    }

    /// Current state.
    pub const fn state(&self) -> CallState {
        self.state
    }

    /// Process an unframed call payload and return the unframed reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedCall`] if the payload cannot be decoded and
    /// [`Error::Codec`] if the reply cannot be encoded. Calling a responder
    /// that already finished fails with [`Error::ResponderFinished`].
    #[instrument(skip_all, fields(len = payload.len()))]
    pub async fn respond(&mut self, payload: &[u8]) -> Result<Bytes> {
        if self.state != CallState::AwaitingCall {
            return Err(Error::ResponderFinished);
        }

        self.state = CallState::Decoding;
        let protocol = self.table.protocol();
        let call = match decode_call(protocol, payload) {
            Ok(call) => call,
            Err(e) => {
                warn!("Rejecting malformed call: {}", e);
                self.state = CallState::Errored;
                return Err(e.into());
            }
        };
        let message = call.message().to_string();
        debug!("Decoded call to '{}'", message);

        self.state = CallState::Dispatching;
        let Some(handler) = self.table.resolve(&message) else {
            warn!("No handler registered for message '{}'", message);
            self.state = CallState::Errored;
            return Ok(encode_remote_exception(&format!(
                "No handler registered for: '{message}'"
            )));
        };

        let outcome = match AssertUnwindSafe(handler.handle(call)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        };

        self.state = CallState::Validating;
        let value = match outcome {
            Ok(value) => value,
            Err(HandlerError::Declared(value)) => {
                self.state = CallState::Errored;
                return self.declared_error(&message, &value);
            }
            Err(e) => {
                error!("Handler for '{}' failed: {}", message, e);
                self.state = CallState::Errored;
                return Ok(encode_remote_exception(&e.to_string()));
            }
        };

        let response = protocol
            .message(&message)
            .map(|def| def.response())
            .ok_or_else(|| Error::UnknownMessage(message.clone()))?;
        if !validate(response, &value, protocol.types()) {
            error!(
                "Handler for '{}' returned a {} value that does not conform to response type {}",
                message,
                value.kind(),
                response
            );
            self.state = CallState::Errored;
            return Ok(encode_remote_exception(RESPONSE_SCHEMA_VIOLATION));
        }

        self.state = CallState::Encoding;
        match encode_result(protocol, &message, &value) {
            Ok(reply) => {
                self.state = CallState::Done;
                Ok(reply)
            }
            Err(e) => {
                self.state = CallState::Errored;
                Err(e)
            }
        }
    }

    fn declared_error(&self, message: &str, value: &crate::value::Value) -> Result<Bytes> {
        match encode_declared_error(self.table.protocol(), message, value) {
            Ok(reply) => {
                debug!("Handler for '{}' raised a declared error", message);
                Ok(reply)
            }
            Err(Error::Codec(e)) => {
                error!(
                    "Handler for '{}' raised an error that matches none of its declared errors: {}",
                    message, e
                );
                Ok(encode_remote_exception(RESPONSE_SCHEMA_VIOLATION))
            }
            Err(e) => Err(e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{Call, Reply, decode_reply, encode_call};
    use crate::error::MalformedCallError;
    use crate::handler::HandlerResult;
    use crate::protocol::Protocol;
    use crate::value::Value;
    use indexmap::IndexMap;
    use std::sync::Arc;

    const PROTOCOL: &str = r#"{
        "protocol": "Test",
        "types": [{"type": "error", "name": "Oops", "fields": [{"name": "code", "type": "int"}]}],
        "messages": {
            "get": {"request": [{"name": "arg1", "type": "string"}], "response": "string", "errors": ["Oops"]},
            "get2": {"request": [{"name": "arg1", "type": "string"}], "response": "string"}
        }
    }"#;

    fn table() -> DispatchTable {
        DispatchTable::new(Arc::new(Protocol::parse(PROTOCOL).unwrap()))
    }

    fn call_bytes(table: &DispatchTable, message: &str) -> Bytes {
        let args = IndexMap::from([("arg1".to_string(), Value::from("arg1"))]);
        encode_call(table.protocol(), message, &args).unwrap()
    }

    async fn exchange(table: &DispatchTable, message: &str) -> (Reply, CallState) {
        let mut responder = Responder::new(table);
        let bytes = responder.respond(&call_bytes(table, message)).await.unwrap();
        let reply = decode_reply(table.protocol(), message, &bytes).unwrap();
        (reply, responder.state())
    }

    fn bind(table: &DispatchTable, f: impl Fn(Call) -> HandlerResult + Send + Sync + 'static) {
        table.bind("get", Arc::new(f)).unwrap();
    }

    #[tokio::test]
    async fn test_success_reply() {
        let table = table();
        bind(&table, |call| Ok(call.arg("arg1").cloned().unwrap_or(Value::Null)));

        let (reply, state) = exchange(&table, "get").await;
        assert_eq!(reply, Reply::Response(Value::from("arg1")));
        assert_eq!(state, CallState::Done);
    }

    #[tokio::test]
    async fn test_unbound_message() {
        let table = table();
        let (reply, state) = exchange(&table, "get2").await;
        assert_eq!(
            reply,
            Reply::RemoteException("No handler registered for: 'get2'".to_string())
        );
        assert_eq!(state, CallState::Errored);
    }

    #[tokio::test]
    async fn test_handler_failure_text() {
        let table = table();
        bind(&table, |_| Err(HandlerError::msg("disk full")));

        let (reply, state) = exchange(&table, "get").await;
        assert_eq!(reply, Reply::RemoteException("disk full".to_string()));
        assert_eq!(state, CallState::Errored);
    }

    #[tokio::test]
    async fn test_handler_panic() {
        let table = table();
        bind(&table, |_| panic!("kaboom"));

        let (reply, _) = exchange(&table, "get").await;
        assert_eq!(
            reply,
            Reply::RemoteException("Handler panicked: kaboom".to_string())
        );
    }

    #[tokio::test]
    async fn test_response_schema_violation() {
        let table = table();
        bind(&table, |_| Ok(Value::Int(42)));

        let (reply, state) = exchange(&table, "get").await;
        assert_eq!(reply, Reply::RemoteException(RESPONSE_SCHEMA_VIOLATION.to_string()));
        assert_eq!(state, CallState::Errored);
    }

    #[tokio::test]
    async fn test_declared_error() {
        let table = table();
        bind(&table, |_| {
            Err(HandlerError::Declared(Value::record([("code", Value::Int(7))])))
        });

        let (reply, _) = exchange(&table, "get").await;
        assert_eq!(
            reply,
            Reply::DeclaredError(Value::record([("code", Value::Int(7))]))
        );

        bind(&table, |_| Err(HandlerError::Declared(Value::from("nope"))));
        let (reply, _) = exchange(&table, "get").await;
        assert_eq!(reply, Reply::RemoteException(RESPONSE_SCHEMA_VIOLATION.to_string()));
    }

    #[tokio::test]
    async fn test_malformed_call() {
        let table = table();
        let mut responder = Responder::new(&table);
        let result = responder.respond(b"\x08nope").await;
        assert!(matches!(
            result,
            Err(Error::MalformedCall(MalformedCallError::UnknownMessage(_)))
        ));
        assert_eq!(responder.state(), CallState::Errored);

        // Errored is absorbing
        let again = responder.respond(&call_bytes(&table, "get")).await;
        assert!(matches!(again, Err(Error::ResponderFinished)));
        assert_eq!(responder.state(), CallState::Errored);
    }
}
