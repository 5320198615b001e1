//! Call and reply payloads.
//!
//! A call is the message name followed by each request parameter in
//! declaration order. A reply starts with a boolean error flag: `false` is
//! followed by the response value, `true` by the message's error union, whose
//! first branch is the remote exception text.

use crate::codec::{Decoder, encode_value, put_bool, put_long, put_string};
use crate::error::{CodecError, Error, MalformedCallError, Result};
use crate::protocol::{MessageDef, Protocol};
use crate::schema::validate;
use crate::value::Value;
use bytes::{Bytes, BytesMut};
use indexmap::IndexMap;

/// A decoded call: the message name and its arguments by parameter name.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    message: String,
    args: IndexMap<String, Value>,
}

impl Call {
    /// Create a call from parts.
    pub fn new(message: impl Into<String>, args: IndexMap<String, Value>) -> Self {
        Self {
            message: message.into(),
            args,
        }
    }

    /// The called message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Argument by parameter name.
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// Arguments in parameter order.
    pub const fn args(&self) -> &IndexMap<String, Value> {
        &self.args
    }

    /// Take ownership of the arguments.
    pub fn into_args(self) -> IndexMap<String, Value> {
        self.args
    }
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The message's response value.
    Response(Value),
    /// A remote exception carrying only text.
    RemoteException(String),
    /// A value of one of the message's declared error types.
    DeclaredError(Value),
}

/// Decode a call payload against `protocol`.
///
/// # Errors
///
/// Fails if the message is not declared, the parameters cannot be decoded,
/// or bytes remain after the last parameter.
pub fn decode_call(protocol: &Protocol, payload: &[u8]) -> std::result::Result<Call, MalformedCallError> {
    let mut decoder = Decoder::new(payload);
    let name = decoder.get_string()?;

    let message = protocol
        .message(&name)
        .ok_or_else(|| MalformedCallError::UnknownMessage(name.clone()))?;

    let mut args = IndexMap::with_capacity(message.request().len());
    for param in message.request() {
        let value = decoder.get_value(&param.schema, protocol.types())?;
        args.insert(param.name.clone(), value);
    }
    decoder.finish()?;

    Ok(Call {
        message: name,
        args,
    })
}

/// Encode a call payload, validating `args` against the request parameters.
///
/// A parameter missing from `args` is sent as `null`.
///
/// # Errors
///
/// Returns [`Error::UnknownMessage`] for an undeclared message and
/// [`MalformedCallError::InvalidArgument`] for a non-conforming argument.
pub fn encode_call(protocol: &Protocol, message: &str, args: &IndexMap<String, Value>) -> Result<Bytes> {
    let def = lookup(protocol, message)?;

    let mut buf = BytesMut::new();
    put_string(&mut buf, message);
    for param in def.request() {
        let value = args.get(&param.name).unwrap_or(&Value::Null);
        if !validate(&param.schema, value, protocol.types()) {
            return Err(MalformedCallError::InvalidArgument {
                message: message.to_string(),
                parameter: param.name.clone(),
            }
            .into());
        }
        encode_value(&param.schema, value, protocol.types(), &mut buf)?;
    }

    Ok(buf.freeze())
}

/// Encode a success reply. The value is not validated first.
///
/// # Errors
///
/// Fails for an undeclared message or a value the response type cannot
/// encode.
pub fn encode_result(protocol: &Protocol, message: &str, value: &Value) -> Result<Bytes> {
    let def = lookup(protocol, message)?;

    let mut buf = BytesMut::new();
    put_bool(&mut buf, false);
    encode_value(def.response(), value, protocol.types(), &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a remote exception reply carrying `text`.
pub fn encode_remote_exception(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 3);
    put_bool(&mut buf, true);
    put_long(&mut buf, 0);
    put_string(&mut buf, text);
    buf.freeze()
}

/// Encode an error reply with a value of one of the declared error types.
///
/// The first declared error the value conforms to is used.
///
/// # Errors
///
/// Fails for an undeclared message, or with [`CodecError::SchemaMismatch`]
/// if the value conforms to none of the declared errors.
pub fn encode_declared_error(protocol: &Protocol, message: &str, value: &Value) -> Result<Bytes> {
    let def = lookup(protocol, message)?;

    let index = def
        .errors()
        .iter()
        .position(|error| validate(error, value, protocol.types()))
        .ok_or_else(|| {
            CodecError::SchemaMismatch(format!("no declared error of '{message}' for {} value", value.kind()))
        })?;

    let mut buf = BytesMut::new();
    put_bool(&mut buf, true);
    #[allow(clippy::cast_possible_wrap)]
    put_long(&mut buf, index as i64 + 1);
    encode_value(&def.errors()[index], value, protocol.types(), &mut buf)?;
    Ok(buf.freeze())
}

/// Decode a reply to `message`.
///
/// # Errors
///
/// Fails for an undeclared message or an undecodable payload.
pub fn decode_reply(protocol: &Protocol, message: &str, payload: &[u8]) -> Result<Reply> {
    let def = lookup(protocol, message)?;

    let mut decoder = Decoder::new(payload);
    let reply = if decoder.get_bool()? {
        let index = decoder.get_long()?;
        if index == 0 {
            Reply::RemoteException(decoder.get_string()?)
        } else {
            let error = usize::try_from(index - 1)
                .ok()
                .and_then(|i| def.errors().get(i))
                .ok_or(CodecError::UnionIndexOutOfRange {
                    index,
                    branches: def.errors().len() + 1,
                })?;
            Reply::DeclaredError(decoder.get_value(error, protocol.types())?)
        }
    } else {
        Reply::Response(decoder.get_value(def.response(), protocol.types())?)
    };
    decoder.finish()?;

    Ok(reply)
}

fn lookup<'p>(protocol: &'p Protocol, message: &str) -> Result<&'p MessageDef> {
    protocol
        .message(message)
        .ok_or_else(|| Error::UnknownMessage(message.to_string()))
}
