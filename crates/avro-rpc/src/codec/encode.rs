use super::{put_bool, put_bytes, put_int, put_long, put_string};
use crate::error::CodecError;
use crate::schema::{NamedSchema, NamedTypes, Schema, select_branch};
use crate::value::Value;
use bytes::{BufMut, BytesMut};

/// Encode `value` with `schema` into `buf`.
///
/// Union branches are chosen as the first branch the value validates
/// against. A missing record field is written as `null`.
///
/// # Errors
///
/// Returns [`CodecError::SchemaMismatch`] if the value does not fit the
/// schema. `buf` may hold a partial encoding afterwards.
pub fn encode_value(
    schema: &Schema,
    value: &Value,
    types: &NamedTypes,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    match (schema, value) {
        (Schema::Null, Value::Null) => {}
        (Schema::Boolean, Value::Boolean(b)) => put_bool(buf, *b),
        (Schema::Int, Value::Int(i)) => put_int(buf, *i),
        (Schema::Int, Value::Long(l)) => {
            let i = i32::try_from(*l).map_err(|_| CodecError::IntOutOfRange(*l))?;
            put_int(buf, i);
        }
        (Schema::Long, Value::Int(i)) => put_long(buf, i64::from(*i)),
        (Schema::Long, Value::Long(l)) => put_long(buf, *l),
        (Schema::Float, number) => {
            let f = as_f32(number).ok_or_else(|| mismatch(schema, value))?;
            buf.put_f32_le(f);
        }
        (Schema::Double, number) => {
            let d = as_f64(number).ok_or_else(|| mismatch(schema, value))?;
            buf.put_f64_le(d);
        }
        (Schema::Bytes, Value::Bytes(data)) => put_bytes(buf, data),
        (Schema::String, Value::String(s)) => put_string(buf, s),
        (Schema::Array(items), Value::Array(values)) => {
            if !values.is_empty() {
                put_block_count(buf, values.len());
                for item in values {
                    encode_value(items, item, types, buf)?;
                }
            }
            put_long(buf, 0);
        }
        (Schema::Map(item), Value::Map(entries)) => {
            if !entries.is_empty() {
                put_block_count(buf, entries.len());
                for (key, entry) in entries {
                    put_string(buf, key);
                    encode_value(item, entry, types, buf)?;
                }
            }
            put_long(buf, 0);
        }
        (Schema::Union(branches), value) => {
            let index =
                select_branch(branches, value, types).ok_or_else(|| mismatch(schema, value))?;
            put_block_count(buf, index);
            encode_value(&branches[index], value, types, buf)?;
        }
        (Schema::Ref(name), value) => {
            let named = types
                .resolve(name)
                .ok_or_else(|| CodecError::UnresolvedType(name.fullname()))?;
            encode_named(named, value, types, buf).map_err(|e| match e {
                CodecError::SchemaMismatch(_) => mismatch(schema, value),
                other => other,
            })?;
        }
        _ => return Err(mismatch(schema, value)),
    }

    Ok(())
}

fn encode_named(
    named: &NamedSchema,
    value: &Value,
    types: &NamedTypes,
    buf: &mut BytesMut,
) -> Result<(), CodecError> {
    match (named, value) {
        (NamedSchema::Record(record), Value::Record(fields)) => {
            for field in &record.fields {
                let field_value = fields.get(&field.name).unwrap_or(&Value::Null);
                encode_value(&field.schema, field_value, types, buf)?;
            }
            Ok(())
        }
        (NamedSchema::Enum(e), Value::Enum(symbol) | Value::String(symbol)) => {
            let index = e
                .symbols
                .iter()
                .position(|s| s == symbol)
                .ok_or_else(|| CodecError::SchemaMismatch(e.name.fullname()))?;
            put_block_count(buf, index);
            Ok(())
        }
        (NamedSchema::Fixed(f), Value::Fixed(bytes) | Value::Bytes(bytes))
            if bytes.len() == f.size =>
        {
            buf.put_slice(bytes);
            Ok(())
        }
        _ => Err(CodecError::SchemaMismatch(named.name().fullname())),
    }
}

fn put_block_count(buf: &mut BytesMut, count: usize) {
    #[allow(clippy::cast_possible_wrap)]
    put_long(buf, count as i64);
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn as_f32(value: &Value) -> Option<f32> {
    match value {
        Value::Int(i) => Some(*i as f32),
        Value::Long(l) => Some(*l as f32),
        Value::Float(f) => Some(*f),
        Value::Double(d) => Some(*d as f32),
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Long(l) => Some(*l as f64),
        Value::Float(f) => Some(*f as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

fn mismatch(schema: &Schema, value: &Value) -> CodecError {
    CodecError::SchemaMismatch(format!("{schema} for {} value", value.kind()))
}
