use super::{EnumSchema, Field, FixedSchema, Name, NamedSchema, NamedTypes, RecordSchema, Schema};
use crate::error::SchemaError;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

type JsonObject = Map<String, JsonValue>;

/// Parses JSON type definitions, registering named types as it goes.
///
/// Types must be defined before they are referenced, except that a record
/// may refer to itself while its fields are being parsed.
pub(crate) struct SchemaParser<'a> {
    types: &'a mut NamedTypes,
    defining: HashSet<String>,
}

impl<'a> SchemaParser<'a> {
    pub(crate) fn new(types: &'a mut NamedTypes) -> Self {
        Self {
            types,
            defining: HashSet::new(),
        }
    }

    /// Parse one type definition or reference.
    pub(crate) fn parse(
        &mut self,
        json: &JsonValue,
        namespace: Option<&str>,
    ) -> Result<Schema, SchemaError> {
        match json {
            JsonValue::String(name) => self.parse_reference(name, namespace),
            JsonValue::Array(branches) => self.parse_union(branches, namespace),
            JsonValue::Object(obj) => self.parse_object(obj, namespace),
            other => Err(SchemaError::InvalidAttribute {
                attribute: "type",
                context: other.to_string(),
            }),
        }
    }

    /// Parse a list of `{name, type}` field definitions.
    pub(crate) fn parse_fields(
        &mut self,
        fields: &[JsonValue],
        context: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Field>, SchemaError> {
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(fields.len());

        for field in fields {
            let obj = field.as_object().ok_or_else(|| SchemaError::InvalidAttribute {
                attribute: "fields",
                context: context.to_string(),
            })?;
            let name = str_attr(obj, "name", context)?;
            validate_simple_name(name)?;
            if !seen.insert(name.to_string()) {
                return Err(SchemaError::DuplicateField {
                    field: name.to_string(),
                    context: context.to_string(),
                });
            }

            let schema_json = obj.get("type").ok_or_else(|| SchemaError::InvalidAttribute {
                attribute: "type",
                context: format!("{context}.{name}"),
            })?;
            let schema = self.parse(schema_json, namespace)?;

            parsed.push(Field {
                name: name.to_string(),
                schema,
                default: obj.get("default").cloned(),
                doc: doc_attr(obj),
            });
        }

        Ok(parsed)
    }

    /// Whether `schema` refers to a declared `error` record.
    pub(crate) fn is_error_type(&self, schema: &Schema) -> bool {
        match schema {
            Schema::Ref(name) => self.types.resolve(name).is_some_and(NamedSchema::is_error),
            _ => false,
        }
    }

    fn parse_reference(&self, name: &str, namespace: Option<&str>) -> Result<Schema, SchemaError> {
        if let Some(primitive) = Schema::primitive(name) {
            return Ok(primitive);
        }

        let candidate = Name::new(name, namespace);
        if self.is_known(&candidate.fullname()) {
            return Ok(Schema::Ref(candidate));
        }

        // Unqualified names may also refer to a type in the null namespace
        if !name.contains('.') {
            let bare = Name::new(name, None);
            if self.is_known(&bare.fullname()) {
                return Ok(Schema::Ref(bare));
            }
        }

        Err(SchemaError::UnknownType(name.to_string()))
    }

    fn parse_union(
        &mut self,
        branches: &[JsonValue],
        namespace: Option<&str>,
    ) -> Result<Schema, SchemaError> {
        let mut seen = HashSet::new();
        let mut parsed = Vec::with_capacity(branches.len());

        for branch in branches {
            let schema = self.parse(branch, namespace)?;
            if matches!(schema, Schema::Union(_)) {
                return Err(SchemaError::InvalidUnion(
                    "unions may not immediately contain other unions".to_string(),
                ));
            }
            let key = schema.branch_key();
            if !seen.insert(key.clone()) {
                return Err(SchemaError::InvalidUnion(format!("duplicate branch '{key}'")));
            }
            parsed.push(schema);
        }

        Ok(Schema::Union(parsed))
    }

    fn parse_object(
        &mut self,
        obj: &JsonObject,
        namespace: Option<&str>,
    ) -> Result<Schema, SchemaError> {
        let type_attr = obj.get("type").ok_or_else(|| SchemaError::InvalidAttribute {
            attribute: "type",
            context: JsonValue::Object(obj.clone()).to_string(),
        })?;

        let type_name = match type_attr {
            JsonValue::String(type_name) => type_name.as_str(),
            nested => return self.parse(nested, namespace),
        };

        match type_name {
            "record" => self.parse_record(obj, namespace, false),
            "error" => self.parse_record(obj, namespace, true),
            "enum" => self.parse_enum(obj, namespace),
            "fixed" => self.parse_fixed(obj, namespace),
            "array" => {
                let items = obj.get("items").ok_or_else(|| SchemaError::InvalidAttribute {
                    attribute: "items",
                    context: "array".to_string(),
                })?;
                Ok(Schema::Array(Box::new(self.parse(items, namespace)?)))
            }
            "map" => {
                let values = obj.get("values").ok_or_else(|| SchemaError::InvalidAttribute {
                    attribute: "values",
                    context: "map".to_string(),
                })?;
                Ok(Schema::Map(Box::new(self.parse(values, namespace)?)))
            }
            other => self.parse_reference(other, namespace),
        }
    }

    fn parse_record(
        &mut self,
        obj: &JsonObject,
        namespace: Option<&str>,
        is_error: bool,
    ) -> Result<Schema, SchemaError> {
        let name = self.declare(obj, namespace)?;
        let fullname = name.fullname();

        let fields_json = obj
            .get("fields")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SchemaError::InvalidAttribute {
                attribute: "fields",
                context: fullname.clone(),
            })?;

        self.defining.insert(fullname.clone());
        let fields = self.parse_fields(fields_json, &fullname, name.namespace.as_deref());
        self.defining.remove(&fullname);

        self.types.insert(NamedSchema::Record(RecordSchema {
            name: name.clone(),
            fields: fields?,
            is_error,
            doc: doc_attr(obj),
        }));

        Ok(Schema::Ref(name))
    }

    fn parse_enum(
        &mut self,
        obj: &JsonObject,
        namespace: Option<&str>,
    ) -> Result<Schema, SchemaError> {
        let name = self.declare(obj, namespace)?;
        let fullname = name.fullname();

        let symbols_json = obj
            .get("symbols")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| SchemaError::InvalidAttribute {
                attribute: "symbols",
                context: fullname.clone(),
            })?;

        let mut symbols = Vec::with_capacity(symbols_json.len());
        for symbol in symbols_json {
            let symbol = symbol.as_str().ok_or_else(|| SchemaError::InvalidAttribute {
                attribute: "symbols",
                context: fullname.clone(),
            })?;
            validate_simple_name(symbol)?;
            if symbols.iter().any(|s| s == symbol) {
                return Err(SchemaError::DuplicateSymbol {
                    symbol: symbol.to_string(),
                    name: fullname,
                });
            }
            symbols.push(symbol.to_string());
        }

        self.types.insert(NamedSchema::Enum(EnumSchema {
            name: name.clone(),
            symbols,
            doc: doc_attr(obj),
        }));

        Ok(Schema::Ref(name))
    }

    fn parse_fixed(
        &mut self,
        obj: &JsonObject,
        namespace: Option<&str>,
    ) -> Result<Schema, SchemaError> {
        let name = self.declare(obj, namespace)?;

        let size = obj
            .get("size")
            .and_then(JsonValue::as_u64)
            .and_then(|size| usize::try_from(size).ok())
            .ok_or_else(|| SchemaError::InvalidAttribute {
                attribute: "size",
                context: name.fullname(),
            })?;

        self.types.insert(NamedSchema::Fixed(FixedSchema {
            name: name.clone(),
            size,
        }));

        Ok(Schema::Ref(name))
    }

    /// Validate and reserve the name of a new named type.
    fn declare(&self, obj: &JsonObject, namespace: Option<&str>) -> Result<Name, SchemaError> {
        let declared = str_attr(obj, "name", "named type")?;
        let explicit_namespace = obj.get("namespace").and_then(JsonValue::as_str);
        let name = Name::new(declared, explicit_namespace.or(namespace));

        validate_simple_name(&name.name)?;
        if let Some(ns) = &name.namespace {
            for part in ns.split('.') {
                validate_simple_name(part)?;
            }
        }
        if Schema::primitive(&name.name).is_some() {
            return Err(SchemaError::InvalidName(declared.to_string()));
        }

        let fullname = name.fullname();
        if self.is_known(&fullname) {
            return Err(SchemaError::DuplicateType(fullname));
        }

        Ok(name)
    }

    fn is_known(&self, fullname: &str) -> bool {
        self.types.contains(fullname) || self.defining.contains(fullname)
    }
}

fn str_attr<'j>(
    obj: &'j JsonObject,
    attribute: &'static str,
    context: &str,
) -> Result<&'j str, SchemaError> {
    obj.get(attribute)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| SchemaError::InvalidAttribute {
            attribute,
            context: context.to_string(),
        })
}

fn doc_attr(obj: &JsonObject) -> Option<String> {
    obj.get("doc").and_then(JsonValue::as_str).map(str::to_string)
}

/// Names start with a letter or underscore, followed by letters, digits or
/// underscores.
pub(crate) fn validate_simple_name(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: &JsonValue) -> Result<(Schema, NamedTypes), SchemaError> {
        let mut types = NamedTypes::default();
        let schema = SchemaParser::new(&mut types).parse(json, Some("test.ns"))?;
        Ok((schema, types))
    }

    #[test]
    fn test_primitives_and_containers() {
        let (schema, _) = parse(&json!({"type": "map", "values": {"type": "array", "items": "long"}})).unwrap();
        assert_eq!(schema, Schema::Map(Box::new(Schema::Array(Box::new(Schema::Long)))));

        let (schema, _) = parse(&json!({"type": "string", "logicalType": "uuid"})).unwrap();
        assert_eq!(schema, Schema::String);
    }

    #[test]
    fn test_recursive_record() {
        let (schema, types) = parse(&json!({
            "type": "record",
            "name": "Node",
            "fields": [
                {"name": "value", "type": "int"},
                {"name": "next", "type": ["null", "Node"]}
            ]
        }))
        .unwrap();

        let Schema::Ref(name) = schema else {
            panic!("expected a reference");
        };
        assert_eq!(name.fullname(), "test.ns.Node");
        let Some(NamedSchema::Record(record)) = types.resolve(&name) else {
            panic!("expected a record");
        };
        assert_eq!(record.fields[1].schema, Schema::Union(vec![Schema::Null, Schema::Ref(name.clone())]));
    }

    #[test]
    fn test_undeclared_reference() {
        let result = parse(&json!({"type": "array", "items": "Missing"}));
        assert!(matches!(result, Err(SchemaError::UnknownType(name)) if name == "Missing"));
    }

    #[test]
    fn test_invalid_unions() {
        assert!(matches!(
            parse(&json!(["null", "string", "null"])),
            Err(SchemaError::InvalidUnion(_))
        ));
        assert!(matches!(
            parse(&json!(["null", ["string"]])),
            Err(SchemaError::InvalidUnion(_))
        ));
    }

    #[test]
    fn test_duplicate_enum_symbol() {
        let result = parse(&json!({"type": "enum", "name": "Color", "symbols": ["RED", "RED"]}));
        assert!(matches!(result, Err(SchemaError::DuplicateSymbol { .. })));
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_simple_name("_ok1").is_ok());
        assert!(validate_simple_name("1bad").is_err());
        assert!(validate_simple_name("").is_err());
        assert!(validate_simple_name("has-dash").is_err());

        let result = parse(&json!({"type": "fixed", "name": "int", "size": 4}));
        assert!(matches!(result, Err(SchemaError::InvalidName(_))));
    }
}
