//! Message name to handler bindings for one protocol.

use crate::error::{Error, Result};
use crate::handler::MessageHandler;
use crate::protocol::Protocol;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Thread-safe table of handlers, restricted to the messages a protocol
/// declares.
///
/// Binding is last-writer-wins per message. Lookups run concurrently with
/// binds.
pub struct DispatchTable {
    protocol: Arc<Protocol>,
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
}

impl DispatchTable {
    /// Create an empty table for `protocol`.
    pub fn new(protocol: Arc<Protocol>) -> Self {
        Self {
            protocol,
            handlers: DashMap::new(),
        }
    }

    /// The owning protocol.
    pub const fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    /// Bind `handler` to `message`, replacing any earlier binding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] if the protocol does not declare
    /// `message`; the table is left unchanged.
    pub fn bind(&self, message: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        self.check_declared(message)?;

        if self.handlers.insert(message.to_string(), handler).is_some() {
            debug!("Replaced handler for message '{}'", message);
        } else {
            debug!("Bound handler for message '{}'", message);
        }
        Ok(())
    }

    /// Bind `handler` to `message` unless a handler is already bound.
    ///
    /// Returns whether the handler was stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownMessage`] if the protocol does not declare
    /// `message`.
    pub fn bind_if_absent(&self, message: &str, handler: Arc<dyn MessageHandler>) -> Result<bool> {
        self.check_declared(message)?;

        match self.handlers.entry(message.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(handler);
                debug!("Bound handler for message '{}'", message);
                Ok(true)
            }
        }
    }

    /// Look up the handler bound to `message`.
    pub fn resolve(&self, message: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(message).map(|handler| Arc::clone(handler.value()))
    }

    /// Whether a handler is bound to `message`.
    pub fn is_bound(&self, message: &str) -> bool {
        self.handlers.contains_key(message)
    }

    /// Names of bound messages, in protocol declaration order.
    pub fn bound_messages(&self) -> Vec<String> {
        self.protocol
            .messages()
            .keys()
            .filter(|name| self.handlers.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    fn check_declared(&self, message: &str) -> Result<()> {
        if self.protocol.has_message(message) {
            Ok(())
        } else {
            Err(Error::UnknownMessage(message.to_string()))
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("protocol", &self.protocol.fullname())
            .field("bound", &self.bound_messages())
            .finish()
    }
}
