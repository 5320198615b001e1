//! Schema-driven RPC dispatch over Avro binary payloads.
//!
//! A [`Route`] owns a parsed [`Protocol`] and a table of handlers, one per
//! declared message. Each inbound call arrives as a framed message: a
//! sequence of 4-byte big-endian length-prefixed frames ended by an empty
//! frame. The route unframes it, decodes the message name and parameters,
//! invokes the bound handler, validates the result against the message's
//! response type and sends back a framed reply.
//!
//! Failures inside a message (no handler, handler error, result that does
//! not match the response type) are answered with a remote exception reply.
//! Failures of the request itself (empty body, broken framing, undecodable
//! call) are returned as errors for the transport to reject.
//!
//! # Example
//!
//! ```no_run
//! use avro_rpc::{Call, HandlerError, Route, Value};
//!
//! # async fn example(body: &[u8]) -> avro_rpc::Result<()> {
//! let route = Route::new(
//!     "echo",
//!     r#"{"protocol": "Echo", "messages": {
//!         "get": {"request": [{"name": "arg1", "type": "string"}], "response": "string"}
//!     }}"#,
//! )?;
//!
//! route.bind("get", |call: Call| -> Result<Value, HandlerError> {
//!     Ok(call.arg("arg1").cloned().unwrap_or(Value::Null))
//! })?;
//!
//! let reply = route.handle(body).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod call;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod handler;
pub mod protocol;
pub mod responder;
pub mod route;
pub mod schema;
pub mod value;

pub use call::{Call, Reply, decode_call, decode_reply, encode_call, encode_declared_error, encode_remote_exception, encode_result};
pub use dispatch::DispatchTable;
pub use error::{CodecError, Error, FramingError, HandlerError, MalformedCallError, Result, SchemaError};
pub use framing::{FramedMessageCodec, FramingConfig, read_framed_message, write_framed_message};
pub use handler::{HandlerFn, HandlerResult, MessageHandler, handler_fn};
pub use protocol::{MessageDef, Protocol};
pub use responder::{CallState, RESPONSE_SCHEMA_VIOLATION, Responder};
pub use route::Route;
pub use schema::{Schema, validate};
pub use value::Value;

// Re-export dependencies that are part of our public API
pub use bytes::Bytes;
pub use indexmap::IndexMap;
