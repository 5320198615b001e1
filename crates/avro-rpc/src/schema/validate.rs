use super::{NamedSchema, NamedTypes, Schema};
use crate::value::Value;

/// Check that `value` structurally conforms to `schema`.
///
/// Numeric checks are lenient: a `long` accepts an `Int`, an `int` accepts a
/// `Long` that fits in 32 bits, and `float`/`double` accept any number. A
/// record field missing from the value is checked as `null`; extra fields are
/// ignored. An unresolvable reference never validates.
pub fn validate(schema: &Schema, value: &Value, types: &NamedTypes) -> bool {
    match (schema, value) {
        (Schema::Null, Value::Null)
        | (Schema::Boolean, Value::Boolean(_))
        | (Schema::Int, Value::Int(_))
        | (Schema::Long, Value::Int(_) | Value::Long(_))
        | (
            Schema::Float | Schema::Double,
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_),
        )
        | (Schema::Bytes, Value::Bytes(_))
        | (Schema::String, Value::String(_)) => true,
        (Schema::Int, Value::Long(l)) => i32::try_from(*l).is_ok(),
        (Schema::Array(items), Value::Array(values)) => {
            values.iter().all(|v| validate(items, v, types))
        }
        (Schema::Map(item), Value::Map(entries)) => {
            entries.values().all(|v| validate(item, v, types))
        }
        (Schema::Union(branches), value) => branches.iter().any(|b| validate(b, value, types)),
        (Schema::Ref(name), value) => types
            .resolve(name)
            .is_some_and(|named| validate_named(named, value, types)),
        _ => false,
    }
}

fn validate_named(named: &NamedSchema, value: &Value, types: &NamedTypes) -> bool {
    match (named, value) {
        (NamedSchema::Record(record), Value::Record(fields)) => record.fields.iter().all(|f| {
            validate(&f.schema, fields.get(&f.name).unwrap_or(&Value::Null), types)
        }),
        (NamedSchema::Enum(e), Value::Enum(symbol) | Value::String(symbol)) => {
            e.symbols.contains(symbol)
        }
        (NamedSchema::Fixed(f), Value::Fixed(bytes) | Value::Bytes(bytes)) => bytes.len() == f.size,
        _ => false,
    }
}

/// Index of the first union branch `value` conforms to.
pub(crate) fn select_branch(branches: &[Schema], value: &Value, types: &NamedTypes) -> Option<usize> {
    branches.iter().position(|b| validate(b, value, types))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaParser;
    use indexmap::IndexMap;
    use serde_json::json;

    fn schema(json: &serde_json::Value) -> (Schema, NamedTypes) {
        let mut types = NamedTypes::default();
        let schema = SchemaParser::new(&mut types).parse(json, None).unwrap();
        (schema, types)
    }

    #[test]
    fn test_numeric_leniency() {
        let types = NamedTypes::default();
        assert!(validate(&Schema::Long, &Value::Int(1), &types));
        assert!(validate(&Schema::Int, &Value::Long(7), &types));
        assert!(!validate(&Schema::Int, &Value::Long(i64::MAX), &types));
        assert!(validate(&Schema::Double, &Value::Long(3), &types));
        assert!(!validate(&Schema::String, &Value::Int(3), &types));
        assert!(!validate(&Schema::Int, &Value::Double(1.0), &types));
    }

    #[test]
    fn test_record_fields() {
        let (person, types) = schema(&json!({
            "type": "record",
            "name": "Person",
            "fields": [
                {"name": "name", "type": "string"},
                {"name": "nickname", "type": ["null", "string"]}
            ]
        }));

        assert!(validate(&person, &Value::record([("name", Value::from("Ada"))]), &types));
        assert!(validate(
            &person,
            &Value::record([("name", Value::from("Ada")), ("extra", Value::Int(1))]),
            &types
        ));
        assert!(!validate(&person, &Value::record([("nickname", Value::from("A"))]), &types));
        assert!(!validate(&person, &Value::Map(IndexMap::new()), &types));
    }

    #[test]
    fn test_enum_and_fixed() {
        let (color, types) = schema(&json!({"type": "enum", "name": "Color", "symbols": ["RED", "GREEN"]}));
        assert!(validate(&color, &Value::Enum("RED".into()), &types));
        assert!(validate(&color, &Value::from("GREEN"), &types));
        assert!(!validate(&color, &Value::from("BLUE"), &types));

        let (md5, types) = schema(&json!({"type": "fixed", "name": "MD5", "size": 16}));
        assert!(validate(&md5, &Value::Fixed(vec![0; 16]), &types));
        assert!(!validate(&md5, &Value::Fixed(vec![0; 15]), &types));
    }

    #[test]
    fn test_union_branch_selection() {
        let branches = [Schema::Null, Schema::Long, Schema::String];
        let types = NamedTypes::default();
        assert_eq!(select_branch(&branches, &Value::Null, &types), Some(0));
        assert_eq!(select_branch(&branches, &Value::Int(4), &types), Some(1));
        assert_eq!(select_branch(&branches, &Value::from("x"), &types), Some(2));
        assert_eq!(select_branch(&branches, &Value::Boolean(true), &types), None);
    }
}
