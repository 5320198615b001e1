//! Error types for the dispatch engine.

use crate::value::Value;
use std::io;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for route construction and request handling.
///
/// Every variant here is a failure the caller must act on. Message-level
/// failures (unbound messages, handler failures, response schema violations)
/// never surface through this type; they are encoded into the reply as
/// remote exceptions.
#[derive(Debug, Error)]
pub enum Error {
    /// The protocol definition could not be parsed.
    #[error("Schema parse error: {0}")]
    Schema(#[from] SchemaError),

    /// A handler was bound to a message the protocol does not declare.
    #[error("Message '{0}' not defined.")]
    UnknownMessage(String),

    /// The request carried no body at all.
    #[error("Request body is empty")]
    EmptyRequest,

    /// Framing errors on the inbound or outbound byte stream.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// The call payload could not be decoded against the protocol.
    #[error("Malformed call: {0}")]
    MalformedCall(#[from] MalformedCallError),

    /// A responder was asked to process a second call.
    #[error("Responder already finished its call")]
    ResponderFinished,

    /// The reply could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl Error {
    /// Whether this error was caused by the client's input rather than by
    /// the server.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyRequest
                | Self::MalformedCall(_)
                | Self::Framing(FramingError::ConnectionClosed | FramingError::MessageTooLarge { .. })
        )
    }
}

/// Errors raised while parsing a protocol definition.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The text is not valid JSON or does not have the protocol shape.
    #[error("Invalid protocol JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required attribute was missing or had the wrong JSON type.
    #[error("Missing or invalid attribute '{attribute}' in {context}")]
    InvalidAttribute {
        /// Attribute name.
        attribute: &'static str,
        /// Where the attribute was expected.
        context: String,
    },

    /// A name does not follow the naming rules.
    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    /// A type string names neither a primitive nor a defined named type.
    #[error("Undeclared type reference: '{0}'")]
    UnknownType(String),

    /// Two named types share a full name.
    #[error("Duplicate type definition: '{0}'")]
    DuplicateType(String),

    /// Two messages share a name.
    #[error("Duplicate message name: '{0}'")]
    DuplicateMessage(String),

    /// A record declares the same field twice.
    #[error("Duplicate field '{field}' in '{context}'")]
    DuplicateField {
        /// Field name.
        field: String,
        /// Record or message name.
        context: String,
    },

    /// An enum declares the same symbol twice.
    #[error("Duplicate symbol '{symbol}' in enum '{name}'")]
    DuplicateSymbol {
        /// Symbol.
        symbol: String,
        /// Enum full name.
        name: String,
    },

    /// A union is nested or has two branches of the same kind.
    #[error("Invalid union: {0}")]
    InvalidUnion(String),

    /// A message lists a type that is not an error record.
    #[error("Message '{message}' declares non-error type '{schema}' in errors")]
    NotAnErrorType {
        /// Message name.
        message: String,
        /// Offending type.
        schema: String,
    },

    /// A one-way message declares a response or errors.
    #[error("One-way message '{0}' must have a null response and no errors")]
    InvalidOneWay(String),
}

/// Errors from the framed transport.
#[derive(Debug, Error)]
pub enum FramingError {
    /// The stream ended before the terminating empty frame.
    #[error("Connection closed before a complete framed message was read")]
    ConnectionClosed,

    /// The reassembled message exceeds the configured limit.
    #[error("Framed message size {size} exceeds maximum {max}")]
    MessageTooLarge {
        /// Size reached so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from the binary value codec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Decoding needed more bytes than were available.
    #[error("Unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes needed.
        needed: usize,
        /// Bytes left.
        available: usize,
    },

    /// Bytes were left over after decoding.
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),

    /// A varint ran longer than 10 bytes.
    #[error("Variable-length integer overflow")]
    VarintOverflow,

    /// A decoded long does not fit into an int.
    #[error("Value {0} out of range for int")]
    IntOutOfRange(i64),

    /// A boolean byte other than 0 or 1.
    #[error("Invalid boolean byte: {0:#x}")]
    InvalidBoolean(u8),

    /// A negative length for bytes or a string.
    #[error("Negative length: {0}")]
    NegativeLength(i64),

    /// String data is not UTF-8.
    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    /// Enum index past the declared symbols.
    #[error("Enum index {index} out of range for '{name}'")]
    EnumIndexOutOfRange {
        /// Decoded index.
        index: i64,
        /// Enum full name.
        name: String,
    },

    /// Union index past the declared branches.
    #[error("Union index {index} out of range for {branches} branches")]
    UnionIndexOutOfRange {
        /// Decoded index.
        index: i64,
        /// Number of branches.
        branches: usize,
    },

    /// Nesting exceeded the decoder's depth limit.
    #[error("Value nesting exceeds depth {0}")]
    TooDeep(usize),

    /// Arrays of zero-width items claimed more elements than allowed.
    #[error("More than {0} zero-width items")]
    TooManyEmptyItems(usize),

    /// A named reference could not be resolved.
    #[error("Unresolved type reference: '{0}'")]
    UnresolvedType(String),

    /// The value does not match the schema it is being encoded with.
    #[error("Value does not match schema {0}")]
    SchemaMismatch(String),
}

/// Errors decoding a call payload.
#[derive(Debug, Error)]
pub enum MalformedCallError {
    /// The call names a message the protocol does not declare.
    #[error("Unknown message: '{0}'")]
    UnknownMessage(String),

    /// The call body could not be decoded.
    #[error("Failed to decode call: {0}")]
    Decode(#[from] CodecError),

    /// The caller's arguments do not match the request parameters.
    #[error("Argument '{parameter}' of message '{message}' does not match its schema")]
    InvalidArgument {
        /// Message name.
        message: String,
        /// Parameter name.
        parameter: String,
    },
}

/// Failures a message handler reports instead of a response.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler failed; the text becomes the remote exception.
    #[error("{0}")]
    Failed(String),

    /// The handler panicked.
    #[error("Handler panicked: {0}")]
    Panicked(String),

    /// A value of one of the message's declared error types.
    #[error("Declared error: {}", .0.kind())]
    Declared(Value),
}

impl HandlerError {
    /// A failure with the given text.
    pub fn msg(text: impl Into<String>) -> Self {
        Self::Failed(text.into())
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{err:#}"))
    }
}

impl From<String> for HandlerError {
    fn from(text: String) -> Self {
        Self::Failed(text)
    }
}

impl From<&str> for HandlerError {
    fn from(text: &str) -> Self {
        Self::Failed(text.to_string())
    }
}
