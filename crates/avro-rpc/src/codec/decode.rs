use super::{MAX_DEPTH, MAX_EMPTY_ITEMS};
use crate::error::CodecError;
use crate::schema::{NamedSchema, NamedTypes, Schema};
use crate::value::Value;
use bytes::Buf;
use indexmap::IndexMap;

/// Reads values sequentially out of a byte slice.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    depth: usize,
    empty_items: usize,
}

impl<'a> Decoder<'a> {
    /// Create a decoder over `input`.
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            depth: 0,
            empty_items: 0,
        }
    }

    /// Bytes not yet consumed.
    pub const fn remaining(&self) -> usize {
        self.input.len()
    }

    /// Require that all input was consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingBytes`] if input is left over.
    pub fn finish(self) -> Result<(), CodecError> {
        if self.input.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes(self.input.len()))
        }
    }

    /// Read a zig-zag varint `long`.
    pub fn get_long(&mut self) -> Result<i64, CodecError> {
        let mut n: u64 = 0;
        let mut shift = 0;
        loop {
            self.need(1)?;
            let byte = self.input.get_u8();
            n |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 63 {
                return Err(CodecError::VarintOverflow);
            }
        }
        #[allow(clippy::cast_possible_wrap)]
        let value = ((n >> 1) as i64) ^ -((n & 1) as i64);
        Ok(value)
    }

    /// Read a zig-zag varint `int`.
    pub fn get_int(&mut self) -> Result<i32, CodecError> {
        let value = self.get_long()?;
        i32::try_from(value).map_err(|_| CodecError::IntOutOfRange(value))
    }

    /// Read a `boolean`.
    pub fn get_bool(&mut self) -> Result<bool, CodecError> {
        self.need(1)?;
        match self.input.get_u8() {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBoolean(other)),
        }
    }

    /// Read length-prefixed `bytes`.
    pub fn get_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.get_long()?;
        let len = usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))?;
        self.take(len)
    }

    /// Read a length-prefixed UTF-8 `string`.
    pub fn get_string(&mut self) -> Result<String, CodecError> {
        String::from_utf8(self.get_bytes()?).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read one value of `schema`.
    pub fn get_value(&mut self, schema: &Schema, types: &NamedTypes) -> Result<Value, CodecError> {
        match schema {
            Schema::Null => Ok(Value::Null),
            Schema::Boolean => self.get_bool().map(Value::Boolean),
            Schema::Int => self.get_int().map(Value::Int),
            Schema::Long => self.get_long().map(Value::Long),
            Schema::Float => {
                self.need(4)?;
                Ok(Value::Float(self.input.get_f32_le()))
            }
            Schema::Double => {
                self.need(8)?;
                Ok(Value::Double(self.input.get_f64_le()))
            }
            Schema::Bytes => self.get_bytes().map(Value::Bytes),
            Schema::String => self.get_string().map(Value::String),
            Schema::Array(items) => self.nested(|d| {
                let mut values = Vec::new();
                d.get_blocks(takes_space(items, types), |d| {
                    values.push(d.get_value(items, types)?);
                    Ok(())
                })?;
                Ok(Value::Array(values))
            }),
            Schema::Map(item) => self.nested(|d| {
                let mut entries = IndexMap::new();
                // Every entry carries at least its key's length
                d.get_blocks(true, |d| {
                    let key = d.get_string()?;
                    let value = d.get_value(item, types)?;
                    entries.insert(key, value);
                    Ok(())
                })?;
                Ok(Value::Map(entries))
            }),
            Schema::Union(branches) => self.nested(|d| {
                let index = d.get_long()?;
                let branch = usize::try_from(index)
                    .ok()
                    .and_then(|i| branches.get(i))
                    .ok_or(CodecError::UnionIndexOutOfRange {
                        index,
                        branches: branches.len(),
                    })?;
                d.get_value(branch, types)
            }),
            Schema::Ref(name) => {
                let named = types
                    .resolve(name)
                    .ok_or_else(|| CodecError::UnresolvedType(name.fullname()))?;
                self.nested(|d| d.get_named(named, types))
            }
        }
    }

    fn get_named(&mut self, named: &NamedSchema, types: &NamedTypes) -> Result<Value, CodecError> {
        match named {
            NamedSchema::Record(record) => {
                let mut fields = IndexMap::with_capacity(record.fields.len());
                for field in &record.fields {
                    fields.insert(field.name.clone(), self.get_value(&field.schema, types)?);
                }
                Ok(Value::Record(fields))
            }
            NamedSchema::Enum(e) => {
                let index = self.get_long()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| e.symbols.get(i))
                    .map(|symbol| Value::Enum(symbol.clone()))
                    .ok_or_else(|| CodecError::EnumIndexOutOfRange {
                        index,
                        name: e.name.fullname(),
                    })
            }
            NamedSchema::Fixed(f) => self.take(f.size).map(Value::Fixed),
        }
    }

    /// Read array/map blocks, calling `item` once per element.
    ///
    /// Items that take space can't outnumber the bytes left. Zero-width
    /// items draw on the decoder's `MAX_EMPTY_ITEMS` budget instead.
    fn get_blocks<F>(&mut self, item_takes_space: bool, mut item: F) -> Result<(), CodecError>
    where
        F: FnMut(&mut Self) -> Result<(), CodecError>,
    {
        loop {
            let count = self.get_long()?;
            if count == 0 {
                return Ok(());
            }
            if count < 0 {
                // Negative counts are followed by the block's byte size
                self.get_long()?;
            }

            let count = usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX);
            if item_takes_space {
                if count > self.input.len() {
                    return Err(CodecError::UnexpectedEof {
                        needed: count,
                        available: self.input.len(),
                    });
                }
            } else {
                self.empty_items = self
                    .empty_items
                    .checked_add(count)
                    .filter(|&total| total <= MAX_EMPTY_ITEMS)
                    .ok_or(CodecError::TooManyEmptyItems(MAX_EMPTY_ITEMS))?;
            }

            for _ in 0..count {
                item(self)?;
            }
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CodecError>,
    ) -> Result<T, CodecError> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn need(&self, needed: usize) -> Result<(), CodecError> {
        if self.input.len() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                available: self.input.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        self.need(len)?;
        let (head, tail) = self.input.split_at(len);
        self.input = tail;
        Ok(head.to_vec())
    }
}

/// Whether every encoding of `schema` is at least one byte long.
fn takes_space(schema: &Schema, types: &NamedTypes) -> bool {
    fn check(schema: &Schema, types: &NamedTypes, visiting: &mut Vec<String>) -> bool {
        match schema {
            Schema::Null => false,
            Schema::Ref(name) => {
                let fullname = name.fullname();
                // A record that contains itself directly never decodes
                if visiting.contains(&fullname) {
                    return true;
                }
                match types.resolve(name) {
                    Some(NamedSchema::Record(record)) => {
                        visiting.push(fullname);
                        let any = record
                            .fields
                            .iter()
                            .any(|field| check(&field.schema, types, visiting));
                        visiting.pop();
                        any
                    }
                    Some(NamedSchema::Fixed(fixed)) => fixed.size > 0,
                    Some(NamedSchema::Enum(_)) | None => true,
                }
            }
            _ => true,
        }
    }

    check(schema, types, &mut Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_value;
    use crate::schema::SchemaParser;
    use bytes::BytesMut;
    use serde_json::json;

    fn schema(json: &serde_json::Value) -> (Schema, NamedTypes) {
        let mut types = NamedTypes::default();
        let schema = SchemaParser::new(&mut types).parse(json, None).unwrap();
        (schema, types)
    }

    fn decode_all(bytes: &[u8], schema: &Schema, types: &NamedTypes) -> Result<Value, CodecError> {
        let mut decoder = Decoder::new(bytes);
        let value = decoder.get_value(schema, types)?;
        decoder.finish()?;
        Ok(value)
    }

    #[test]
    fn test_record_with_union_and_enum() {
        let (schema, types) = schema(&json!({
            "type": "record",
            "name": "Reading",
            "fields": [
                {"name": "sensor", "type": {"type": "enum", "name": "Sensor", "symbols": ["A", "B"]}},
                {"name": "value", "type": ["null", "double"]},
                {"name": "tags", "type": {"type": "map", "values": "string"}}
            ]
        }));

        let value = Value::record([
            ("sensor", Value::Enum("B".into())),
            ("value", Value::Double(21.5)),
            ("tags", Value::Map(IndexMap::from([("room".to_string(), Value::from("lab"))]))),
        ]);

        let mut buf = BytesMut::new();
        encode_value(&schema, &value, &types, &mut buf).unwrap();
        assert_eq!(decode_all(&buf, &schema, &types).unwrap(), value);
    }

    #[test]
    fn test_negative_block_count() {
        let schema = Schema::Array(Box::new(Schema::Int));
        // count -2, byte size 2, items 1 and 2, end
        let bytes = [0x03, 0x04, 0x02, 0x04, 0x00];
        assert_eq!(
            decode_all(&bytes, &schema, &NamedTypes::default()).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_truncated_string() {
        // length 4, only 2 bytes
        let bytes = [0x08, b'a', b'b'];
        assert_eq!(
            decode_all(&bytes, &Schema::String, &NamedTypes::default()),
            Err(CodecError::UnexpectedEof {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        let types = NamedTypes::default();
        assert_eq!(
            decode_all(&[0x02], &Schema::Boolean, &types),
            Err(CodecError::InvalidBoolean(2))
        );
        assert_eq!(
            decode_all(&[0x01], &Schema::Bytes, &types),
            Err(CodecError::NegativeLength(-1))
        );
        assert_eq!(
            decode_all(&[0x04, 0xff, 0xfe], &Schema::String, &types),
            Err(CodecError::InvalidUtf8)
        );
        assert_eq!(
            decode_all(&[0x04], &Schema::Union(vec![Schema::Null, Schema::Int]), &types),
            Err(CodecError::UnionIndexOutOfRange {
                index: 2,
                branches: 2
            })
        );
        assert_eq!(
            decode_all(&[0x00, 0x00], &Schema::Int, &types),
            Err(CodecError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_huge_block_count_rejected() {
        let schema = Schema::Array(Box::new(Schema::Long));
        let mut buf = BytesMut::new();
        crate::codec::put_long(&mut buf, 1 << 40);
        assert!(matches!(
            decode_all(&buf, &schema, &NamedTypes::default()),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_zero_width_items() {
        let (empty, types) = schema(&json!({
            "type": "array",
            "items": {"type": "record", "name": "Empty", "fields": [
                {"name": "nothing", "type": "null"},
                {"name": "hash", "type": {"type": "fixed", "name": "Zero", "size": 0}}
            ]}
        }));
        let item = Value::record([("nothing", Value::Null), ("hash", Value::Fixed(Vec::new()))]);

        // count 3, end
        assert_eq!(
            decode_all(&[0x06, 0x00], &empty, &types).unwrap(),
            Value::Array(vec![item; 3])
        );

        let nulls = Schema::Array(Box::new(Schema::Null));
        assert_eq!(
            decode_all(&[0x04, 0x00], &nulls, &types).unwrap(),
            Value::Array(vec![Value::Null; 2])
        );
    }

    #[test]
    fn test_zero_width_items_are_capped() {
        let nulls = Schema::Array(Box::new(Schema::Null));
        let types = NamedTypes::default();

        let mut buf = BytesMut::new();
        crate::codec::put_long(&mut buf, 20_000_000);
        crate::codec::put_long(&mut buf, 0);
        assert_eq!(
            decode_all(&buf, &nulls, &types),
            Err(CodecError::TooManyEmptyItems(MAX_EMPTY_ITEMS))
        );

        let mut buf = BytesMut::new();
        crate::codec::put_long(&mut buf, i64::MAX);
        assert_eq!(
            decode_all(&buf, &nulls, &types),
            Err(CodecError::TooManyEmptyItems(MAX_EMPTY_ITEMS))
        );

        // The budget spans blocks and nested arrays
        let nested = Schema::Array(Box::new(nulls.clone()));
        let half = i64::try_from(MAX_EMPTY_ITEMS / 2).unwrap();
        let mut buf = BytesMut::new();
        crate::codec::put_long(&mut buf, 3);
        for _ in 0..3 {
            crate::codec::put_long(&mut buf, half);
            crate::codec::put_long(&mut buf, 0);
        }
        crate::codec::put_long(&mut buf, 0);
        assert_eq!(
            decode_all(&buf, &nested, &types),
            Err(CodecError::TooManyEmptyItems(MAX_EMPTY_ITEMS))
        );

        let mut buf = BytesMut::new();
        crate::codec::put_long(&mut buf, i64::try_from(MAX_EMPTY_ITEMS).unwrap());
        crate::codec::put_long(&mut buf, 0);
        let Value::Array(items) = decode_all(&buf, &nulls, &types).unwrap() else {
            panic!("expected an array");
        };
        assert_eq!(items.len(), MAX_EMPTY_ITEMS);
    }

    #[test]
    fn test_null_map_entries_bounded_by_input() {
        let map = Schema::Map(Box::new(Schema::Null));
        let mut buf = BytesMut::new();
        crate::codec::put_long(&mut buf, 20_000_000);
        assert!(matches!(
            decode_all(&buf, &map, &NamedTypes::default()),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_map_keeps_wire_order() {
        let map = Schema::Map(Box::new(Schema::Int));
        let types = NamedTypes::default();
        let value = Value::Map(IndexMap::from([
            ("zeta".to_string(), Value::Int(1)),
            ("alpha".to_string(), Value::Int(2)),
        ]));

        let mut first = BytesMut::new();
        encode_value(&map, &value, &types, &mut first).unwrap();
        let mut second = BytesMut::new();
        encode_value(&map, &value, &types, &mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[..8], b"\x04\x08zeta\x02\x0a");

        let Value::Map(decoded) = decode_all(&first, &map, &types).unwrap() else {
            panic!("expected a map");
        };
        assert_eq!(decoded.keys().collect::<Vec<_>>(), ["zeta", "alpha"]);
    }

    #[test]
    fn test_depth_limit() {
        let (schema, types) = schema(&json!({
            "type": "record",
            "name": "Node",
            "fields": [{"name": "next", "type": ["null", "Node"]}]
        }));

        // Every level is a union index 1 followed by the next node
        let bytes = vec![0x02; MAX_DEPTH];
        assert_eq!(
            decode_all(&bytes, &schema, &types),
            Err(CodecError::TooDeep(MAX_DEPTH))
        );
    }
}
