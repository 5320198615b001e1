//! Protocol definitions: named types plus a catalog of messages.

use crate::error::SchemaError;
use crate::schema::{Field, NamedTypes, Schema, SchemaParser};
use indexmap::IndexMap;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// A parsed protocol. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    name: String,
    namespace: Option<String>,
    doc: Option<String>,
    types: NamedTypes,
    messages: IndexMap<String, MessageDef>,
}

/// One remote message of a protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDef {
    name: String,
    doc: Option<String>,
    request: Vec<Field>,
    response: Schema,
    errors: Vec<Schema>,
    error_union: Schema,
    one_way: bool,
}

impl Protocol {
    /// Parse the JSON form of a protocol.
    ///
    /// Either the whole definition is valid and a protocol is returned, or
    /// nothing is.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first problem found.
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let raw: RawProtocol = serde_json::from_str(text)?;

        crate::schema::validate_simple_name(&raw.protocol)?;
        let namespace = raw.namespace.filter(|ns| !ns.is_empty());

        let mut types = NamedTypes::default();
        let mut parser = SchemaParser::new(&mut types);
        for definition in &raw.types {
            parser.parse(definition, namespace.as_deref())?;
        }

        let mut messages = IndexMap::with_capacity(raw.messages.0.len());
        for (name, message) in raw.messages.0 {
            crate::schema::validate_simple_name(&name)?;
            if messages.contains_key(&name) {
                return Err(SchemaError::DuplicateMessage(name));
            }
            let def = MessageDef::parse(&mut parser, &name, message, namespace.as_deref())?;
            messages.insert(name, def);
        }

        Ok(Self {
            name: raw.protocol,
            namespace,
            doc: raw.doc,
            types,
            messages,
        })
    }

    /// Protocol name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol namespace.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Dotted full name.
    pub fn fullname(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Documentation.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Named types in definition order.
    pub const fn types(&self) -> &NamedTypes {
        &self.types
    }

    /// Messages in declaration order.
    pub const fn messages(&self) -> &IndexMap<String, MessageDef> {
        &self.messages
    }

    /// Look up a message by name.
    pub fn message(&self, name: &str) -> Option<&MessageDef> {
        self.messages.get(name)
    }

    /// Whether the protocol declares `name`.
    pub fn has_message(&self, name: &str) -> bool {
        self.messages.contains_key(name)
    }
}

impl FromStr for Protocol {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl MessageDef {
    fn parse(
        parser: &mut SchemaParser<'_>,
        name: &str,
        raw: RawMessage,
        namespace: Option<&str>,
    ) -> Result<Self, SchemaError> {
        let request = parser.parse_fields(&raw.request, name, namespace)?;
        let response = parser.parse(&raw.response, namespace)?;

        let mut errors = Vec::with_capacity(raw.errors.len());
        for error in &raw.errors {
            let schema = parser.parse(error, namespace)?;
            if !parser.is_error_type(&schema) {
                return Err(SchemaError::NotAnErrorType {
                    message: name.to_string(),
                    schema: schema.to_string(),
                });
            }
            errors.push(schema);
        }

        if raw.one_way && (response != Schema::Null || !errors.is_empty()) {
            return Err(SchemaError::InvalidOneWay(name.to_string()));
        }

        // Remote exceptions travel in the implicit string branch
        let mut branches = Vec::with_capacity(errors.len() + 1);
        branches.push(Schema::String);
        branches.extend(errors.iter().cloned());

        Ok(Self {
            name: name.to_string(),
            doc: raw.doc,
            request,
            response,
            errors,
            error_union: Schema::Union(branches),
            one_way: raw.one_way,
        })
    }

    /// Message name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Documentation.
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Request parameters in declaration order.
    pub fn request(&self) -> &[Field] {
        &self.request
    }

    /// Response type.
    pub const fn response(&self) -> &Schema {
        &self.response
    }

    /// Declared error types.
    pub fn errors(&self) -> &[Schema] {
        &self.errors
    }

    /// The reply error union: `string` followed by the declared errors.
    pub const fn error_union(&self) -> &Schema {
        &self.error_union
    }

    /// Whether the message is declared one-way.
    pub const fn is_one_way(&self) -> bool {
        self.one_way
    }
}

#[derive(Debug, Deserialize)]
struct RawProtocol {
    protocol: String,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    doc: Option<String>,
    #[serde(default)]
    types: Vec<serde_json::Value>,
    #[serde(default)]
    messages: Entries<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    doc: Option<String>,
    #[serde(default)]
    request: Vec<serde_json::Value>,
    response: serde_json::Value,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    #[serde(default, rename = "one-way")]
    one_way: bool,
}

/// JSON object entries in document order, duplicates kept.
#[derive(Debug)]
struct Entries<T>(Vec<(String, T)>);

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NamedSchema;

    const MAIL: &str = r#"{
        "protocol": "Mail",
        "namespace": "example.proto",
        "types": [
            {"type": "record", "name": "Message", "fields": [
                {"name": "to", "type": "string"},
                {"name": "body", "type": "string"}
            ]},
            {"type": "error", "name": "Bounced", "fields": [
                {"name": "reason", "type": "string"}
            ]}
        ],
        "messages": {
            "send": {
                "request": [{"name": "message", "type": "Message"}],
                "response": "string",
                "errors": ["Bounced"]
            },
            "ping": {"request": [], "response": "null", "one-way": true}
        }
    }"#;

    #[test]
    fn test_parse_protocol() {
        let protocol = Protocol::parse(MAIL).unwrap();

        assert_eq!(protocol.name(), "Mail");
        assert_eq!(protocol.fullname(), "example.proto.Mail");
        assert_eq!(protocol.types().len(), 2);
        assert!(matches!(
            protocol.types().get("example.proto.Bounced"),
            Some(NamedSchema::Record(r)) if r.is_error
        ));

        let names: Vec<_> = protocol.messages().keys().cloned().collect();
        assert_eq!(names, ["send", "ping"]);

        let send = protocol.message("send").unwrap();
        assert_eq!(send.request().len(), 1);
        assert_eq!(send.request()[0].name, "message");
        assert_eq!(send.response(), &Schema::String);
        assert_eq!(send.errors().len(), 1);
        assert!(matches!(send.error_union(), Schema::Union(b) if b.len() == 2 && b[0] == Schema::String));

        assert!(protocol.message("ping").unwrap().is_one_way());
    }

    #[test]
    fn test_duplicate_message_names() {
        let text = r#"{"protocol": "P", "messages": {
            "get": {"request": [], "response": "string"},
            "get": {"request": [], "response": "int"}
        }}"#;
        assert!(matches!(
            Protocol::parse(text),
            Err(SchemaError::DuplicateMessage(name)) if name == "get"
        ));
    }

    #[test]
    fn test_undeclared_type_reference() {
        let text = r#"{"protocol": "P", "messages": {
            "get": {"request": [{"name": "a", "type": "Missing"}], "response": "string"}
        }}"#;
        assert!(matches!(Protocol::parse(text), Err(SchemaError::UnknownType(_))));
    }

    #[test]
    fn test_malformed_structure() {
        assert!(matches!(Protocol::parse("not json"), Err(SchemaError::Json(_))));
        assert!(matches!(
            Protocol::parse(r#"{"messages": {}}"#),
            Err(SchemaError::Json(_))
        ));
        assert!(matches!(
            Protocol::parse(r#"{"protocol": "P", "messages": {"m": {"request": []}}}"#),
            Err(SchemaError::Json(_))
        ));
    }

    #[test]
    fn test_duplicate_parameters() {
        let text = r#"{"protocol": "P", "messages": {
            "get": {"request": [{"name": "a", "type": "int"}, {"name": "a", "type": "int"}],
                    "response": "string"}
        }}"#;
        assert!(matches!(
            Protocol::parse(text),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_invalid_one_way() {
        let text = r#"{"protocol": "P", "messages": {
            "fire": {"request": [], "response": "string", "one-way": true}
        }}"#;
        assert!(matches!(Protocol::parse(text), Err(SchemaError::InvalidOneWay(_))));
    }

    #[test]
    fn test_errors_must_be_error_records() {
        let text = r#"{"protocol": "P",
            "types": [{"type": "record", "name": "R", "fields": []}],
            "messages": {"get": {"request": [], "response": "string", "errors": ["R"]}}
        }"#;
        assert!(matches!(
            Protocol::parse(text),
            Err(SchemaError::NotAnErrorType { .. })
        ));
    }
}
