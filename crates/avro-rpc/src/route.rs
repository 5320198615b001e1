//! A protocol bound to handlers, answering framed calls.

use crate::dispatch::DispatchTable;
use crate::error::{Error, Result};
use crate::framing::{FramingConfig, decode_framed, encode_framed, read_framed_message, write_framed_message};
use crate::handler::MessageHandler;
use crate::protocol::Protocol;
use crate::responder::Responder;
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument};

/// One service endpoint: a parsed protocol plus its dispatch table.
///
/// Cheap to clone; clones share the same bindings.
#[derive(Debug, Clone)]
pub struct Route {
    name: Arc<str>,
    table: Arc<DispatchTable>,
    framing: FramingConfig,
}

impl Route {
    /// Parse `schema_text` and create a route with no handlers bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the protocol cannot be parsed.
    pub fn new(name: impl Into<Arc<str>>, schema_text: &str) -> Result<Self> {
        let protocol = Protocol::parse(schema_text)?;
        Ok(Self::from_protocol(name, protocol))
    }

    /// Create a route for an already parsed protocol.
    pub fn from_protocol(name: impl Into<Arc<str>>, protocol: Protocol) -> Self {
        let name = name.into();
        debug!(
            "Created route '{}' for protocol '{}' with {} messages",
            name,
            protocol.fullname(),
            protocol.messages().len()
        );
        Self {
            name,
            table: Arc::new(DispatchTable::new(Arc::new(protocol))),
            framing: FramingConfig::default(),
        }
    }

    /// Use `framing` for inbound calls and outbound replies.
    #[must_use]
    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    /// Route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The route's protocol.
    pub fn protocol(&self) -> &Protocol {
        self.table.protocol()
    }

    /// The route's dispatch table.
    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.table
    }

    /// Bind `handler` to `message`, replacing any earlier binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] if the protocol does not declare
    /// `message`.
    pub fn bind<H: MessageHandler>(&self, message: &str, handler: H) -> Result<()> {
        self.table.bind(message, Arc::new(handler))
    }

    /// Bind `handler` unless `message` already has one. Returns whether it
    /// was stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] if the protocol does not declare
    /// `message`.
    pub fn bind_if_absent<H: MessageHandler>(&self, message: &str, handler: H) -> Result<bool> {
        self.table.bind_if_absent(message, Arc::new(handler))
    }

    /// Whether `message` has a handler.
    pub fn is_bound(&self, message: &str) -> bool {
        self.table.is_bound(message)
    }

    /// Answer the raw bytes of one framed call with the raw bytes of one
    /// framed reply.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyRequest`] if `body` is empty
    /// - [`Error::Framing`] if the framing is truncated or too large
    /// - [`Error::MalformedCall`] if the call cannot be decoded
    ///
    /// Unbound messages, handler failures and invalid results are not
    /// errors here; they are answered with remote exception replies.
    #[instrument(skip_all, fields(route = %self.name, len = body.len()))]
    pub async fn handle(&self, body: &[u8]) -> Result<Bytes> {
        if body.is_empty() {
            return Err(Error::EmptyRequest);
        }

        let payload = decode_framed(body, &self.framing)?;
        let reply = Responder::new(&self.table).respond(&payload).await?;
        Ok(encode_framed(&reply, &self.framing))
    }

    /// Read one framed call from `reader` and write the framed reply to
    /// `writer`.
    ///
    /// # Errors
    ///
    /// As [`Route::handle`], plus I/O errors on either side. A stream that
    /// ends before the terminating frame fails with a connection-closed
    /// framing error.
    #[instrument(skip_all, fields(route = %self.name))]
    pub async fn handle_stream<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let payload = read_framed_message(reader, &self.framing).await?;
        let reply = Responder::new(&self.table).respond(&payload).await?;
        write_framed_message(writer, &reply, &self.framing).await?;
        Ok(())
    }
}
